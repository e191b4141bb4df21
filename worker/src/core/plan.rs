//! Plan steps produced by the plan generator, and the boundary parser that
//! turns raw generator output into typed steps.
//!
//! Every payload is validated and coerced here so the executor only ever sees
//! well-formed arguments for each step kind.

use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use jsonschema::Validator;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

const PLAN_STEP_SCHEMA: &str = include_str!("../../schemas/plan_step.schema.json");

/// Globs searched when a search step does not name any.
pub const DEFAULT_SEARCH_GLOBS: [&str; 5] = ["**/*.py", "**/*.md", "**/*.rs", "**/*.ts", "**/*.tsx"];

static STEP_VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    let schema: Value =
        serde_json::from_str(PLAN_STEP_SCHEMA).expect("plan step schema should be valid json");
    jsonschema::validator_for(&schema).expect("plan step schema should compile")
});

/// One (path, find, replace) edit. An empty `find` means create-or-append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEdit {
    pub path: String,
    pub find: String,
    pub replace: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchArgs {
    pub pattern: String,
    pub globs: Vec<String>,
    pub semantic: bool,
    pub query: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditArgs {
    pub edits: Vec<FileEdit>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShellArgs {
    pub cmd: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VcsAction {
    Status,
    Push,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VcsArgs {
    pub action: VcsAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidateArgs {
    pub cmd: String,
}

/// Kind-specific payload of a plan step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "args", rename_all = "snake_case")]
pub enum StepAction {
    Search(SearchArgs),
    Edit(EditArgs),
    Shell(ShellArgs),
    Vcs(VcsArgs),
    Validate(ValidateArgs),
    /// Kind the executor does not know; skipped without error.
    Unsupported { kind: String },
}

impl StepAction {
    pub fn kind(&self) -> &str {
        match self {
            StepAction::Search(_) => "search",
            StepAction::Edit(_) => "edit",
            StepAction::Shell(_) => "shell",
            StepAction::Vcs(_) => "version-control",
            StepAction::Validate(_) => "validate",
            StepAction::Unsupported { kind } => kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanStep {
    pub description: String,
    pub action: StepAction,
}

impl PlanStep {
    pub fn shell(description: &str, cmd: &str) -> Self {
        Self {
            description: description.to_string(),
            action: StepAction::Shell(ShellArgs {
                cmd: cmd.to_string(),
            }),
        }
    }

    pub fn validate(description: &str, cmd: &str) -> Self {
        Self {
            description: description.to_string(),
            action: StepAction::Validate(ValidateArgs {
                cmd: cmd.to_string(),
            }),
        }
    }

    pub fn edit(description: &str, edits: Vec<FileEdit>, message: Option<&str>) -> Self {
        Self {
            description: description.to_string(),
            action: StepAction::Edit(EditArgs {
                edits,
                message: message.map(str::to_string),
            }),
        }
    }
}

/// Parse raw generator text into plan steps.
///
/// Accepts a JSON array of `{description, kind, args}` objects, or an object
/// with a `steps` array; surrounding Markdown code fences are ignored.
pub fn parse_plan(raw: &str) -> Result<Vec<PlanStep>> {
    let body = strip_code_fence(raw);
    let value: Value = serde_json::from_str(body).context("parse plan json")?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut object) => match object.remove("steps") {
            Some(Value::Array(items)) => items,
            _ => return Err(anyhow!("plan object has no `steps` array")),
        },
        other => return Err(anyhow!("expected plan array, got {}", type_name(&other))),
    };
    Ok(plan_from_values(&items))
}

/// Convert already-parsed items, dropping those that fail the item schema.
pub fn plan_from_values(items: &[Value]) -> Vec<PlanStep> {
    let mut steps = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        if !STEP_VALIDATOR.is_valid(item) {
            let reasons: Vec<String> = STEP_VALIDATOR
                .iter_errors(item)
                .map(|err| err.to_string())
                .collect();
            warn!(index = idx, reasons = %reasons.join("; "), "dropping malformed plan step");
            continue;
        }
        if let Some(step) = step_from_object(item) {
            steps.push(step);
        }
    }
    debug!(accepted = steps.len(), offered = items.len(), "parsed plan steps");
    steps
}

fn step_from_object(item: &Value) -> Option<PlanStep> {
    let object = item.as_object()?;
    let description = object
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let kind = object.get("kind").and_then(Value::as_str)?.trim().to_lowercase();
    let args = step_args(object);
    let action = match kind.as_str() {
        "search" | "grep" => StepAction::Search(search_args(&args)),
        "edit" => StepAction::Edit(edit_args(&args)),
        "shell" | "run" | "command" => StepAction::Shell(ShellArgs {
            cmd: string_arg(&args, &["cmd", "command"]).unwrap_or_else(|| "echo noop".to_string()),
        }),
        "git" | "vcs" | "version-control" | "version_control" => StepAction::Vcs(vcs_args(&args)),
        "validate" | "check" | "test" => StepAction::Validate(ValidateArgs {
            cmd: string_arg(&args, &["cmd", "command"]).unwrap_or_else(|| "true".to_string()),
        }),
        _ => StepAction::Unsupported { kind },
    };
    Some(PlanStep {
        description,
        action,
    })
}

/// Use `args` when it is an object; otherwise fall back to the step's own
/// top-level keys (generators sometimes flatten arguments).
fn step_args(object: &Map<String, Value>) -> Map<String, Value> {
    match object.get("args") {
        Some(Value::Object(args)) => args.clone(),
        _ => object
            .iter()
            .filter(|(key, _)| !matches!(key.as_str(), "description" | "kind" | "args"))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    }
}

fn search_args(args: &Map<String, Value>) -> SearchArgs {
    let globs = match args.get("globs") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect::<Vec<_>>(),
        Some(Value::String(single)) => vec![single.clone()],
        _ => Vec::new(),
    };
    let globs = if globs.is_empty() {
        DEFAULT_SEARCH_GLOBS.iter().map(|g| g.to_string()).collect()
    } else {
        globs
    };
    SearchArgs {
        pattern: string_arg(args, &["pattern"]).unwrap_or_else(|| ".*".to_string()),
        globs,
        semantic: args.get("semantic").and_then(Value::as_bool).unwrap_or(false),
        query: string_arg(args, &["query"]),
    }
}

fn edit_args(args: &Map<String, Value>) -> EditArgs {
    let mut edits = Vec::new();
    if let Some(Value::Array(items)) = args.get("edits") {
        for item in items {
            let Some(object) = item.as_object() else {
                continue;
            };
            let path = string_arg(object, &["path", "file"]);
            let find = string_arg(object, &["find", "original", "original_substring", "search"]);
            let replace = string_arg(object, &["replace", "replacement"]);
            match (path, find, replace) {
                (Some(path), Some(find), Some(replace)) => edits.push(FileEdit {
                    path,
                    find,
                    replace,
                }),
                _ => warn!("dropping edit entry without path/find/replace"),
            }
        }
    }
    if edits.is_empty()
        && let (Some(path), Some(content)) = (
            string_arg(args, &["path", "file"]),
            string_arg(args, &["content"]),
        )
    {
        edits.push(FileEdit {
            path,
            find: String::new(),
            replace: content,
        });
    }
    EditArgs {
        edits,
        message: string_arg(args, &["message"]),
    }
}

fn vcs_args(args: &Map<String, Value>) -> VcsArgs {
    let action = match string_arg(args, &["action"]).as_deref() {
        None | Some("push") => VcsAction::Push,
        Some(_) => VcsAction::Status,
    };
    VcsArgs { action }
}

fn string_arg(args: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| args.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_kind_with_aliases() {
        let raw = r#"[
            {"description": "find", "kind": "search", "args": {"pattern": "fn main"}},
            {"description": "write", "kind": "edit", "args": {"edits": [{"path": "a.txt", "find": "", "replace": "hi"}], "message": "m"}},
            {"description": "run", "kind": "shell", "args": {"cmd": "echo hello"}},
            {"description": "status", "kind": "git", "args": {"action": "status"}},
            {"description": "check", "kind": "validate", "args": {"cmd": "true"}},
            {"description": "dance", "kind": "dance", "args": {}}
        ]"#;
        let steps = parse_plan(raw).expect("parse");
        let kinds: Vec<&str> = steps.iter().map(|s| s.action.kind()).collect();
        assert_eq!(
            kinds,
            vec!["search", "edit", "shell", "version-control", "validate", "dance"]
        );
        assert!(matches!(
            steps[3].action,
            StepAction::Vcs(VcsArgs {
                action: VcsAction::Status
            })
        ));
        assert!(matches!(steps[5].action, StepAction::Unsupported { .. }));
    }

    #[test]
    fn drops_items_failing_schema() {
        let raw = r#"[{"description": "no kind"}, 42, {"kind": "shell", "args": {"cmd": "ls"}}]"#;
        let steps = parse_plan(raw).expect("parse");
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0], PlanStep::shell("", "ls"));
    }

    #[test]
    fn coerces_defaults_and_flattened_args() {
        let raw = r#"```json
[{"kind": "shell"}, {"kind": "validate"}, {"kind": "git"}, {"kind": "run", "cmd": "make"}, {"kind": "search"}]
```"#;
        let steps = parse_plan(raw).expect("parse");
        assert_eq!(steps[0].action, StepAction::Shell(ShellArgs { cmd: "echo noop".to_string() }));
        assert_eq!(steps[1].action, StepAction::Validate(ValidateArgs { cmd: "true".to_string() }));
        assert_eq!(steps[2].action, StepAction::Vcs(VcsArgs { action: VcsAction::Push }));
        assert_eq!(steps[3].action, StepAction::Shell(ShellArgs { cmd: "make".to_string() }));
        let StepAction::Search(search) = &steps[4].action else {
            panic!("expected search");
        };
        assert_eq!(search.pattern, ".*");
        assert_eq!(search.globs.len(), DEFAULT_SEARCH_GLOBS.len());
    }

    #[test]
    fn edit_accepts_path_content_form() {
        let raw = r#"{"steps": [{"kind": "edit", "args": {"path": "src/new.rs", "content": "fn x() {}"}}]}"#;
        let steps = parse_plan(raw).expect("parse");
        let StepAction::Edit(edit) = &steps[0].action else {
            panic!("expected edit");
        };
        assert_eq!(
            edit.edits,
            vec![FileEdit {
                path: "src/new.rs".to_string(),
                find: String::new(),
                replace: "fn x() {}".to_string(),
            }]
        );
    }

    #[test]
    fn edit_entries_missing_fields_are_dropped() {
        let raw = r#"[{"kind": "edit", "args": {"edits": [{"path": "a"}, {"path": "b", "original": "x", "replacement": "y"}]}}]"#;
        let steps = parse_plan(raw).expect("parse");
        let StepAction::Edit(edit) = &steps[0].action else {
            panic!("expected edit");
        };
        assert_eq!(edit.edits.len(), 1);
        assert_eq!(edit.edits[0].path, "b");
    }

    #[test]
    fn rejects_non_list_output() {
        assert!(parse_plan("not json").is_err());
        assert!(parse_plan("\"text\"").is_err());
        assert!(parse_plan("{\"plan\": []}").is_err());
    }
}
