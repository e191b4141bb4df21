//! Validation Gate: project build/test checks and the semantic completion check.

use std::path::Path;

use tracing::{debug, info, instrument, warn};

use crate::core::heuristics::completion_heuristic;
use crate::core::types::{DeepPlan, TestsSummary, Ticket, ValidationResult};
use crate::io::codebase::Codebase;
use crate::io::config::ValidationConfig;
use crate::io::oracle::Oracle;
use crate::io::process::Shell;

/// Build and test commands for a detected project type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub name: &'static str,
    pub build: Option<String>,
    pub test: Option<String>,
}

impl Toolchain {
    fn new(name: &'static str, build: &str, test: &str) -> Self {
        Self {
            name,
            build: Some(build.to_string()),
            test: Some(test.to_string()),
        }
    }
}

/// Detect the project type from manifests at the workspace root, then apply
/// configured overrides. `None` when nothing is recognized or configured.
pub fn detect_toolchain(root: &Path, overrides: &ValidationConfig) -> Option<Toolchain> {
    let detected = if root.join("Cargo.toml").is_file() {
        Some(Toolchain::new("rust", "cargo check --quiet", "cargo test --quiet"))
    } else if root.join("pyproject.toml").is_file() || root.join("setup.py").is_file() {
        Some(Toolchain::new("python", "python -m compileall -q .", "python -m pytest -q"))
    } else if root.join("package.json").is_file() {
        Some(Toolchain::new("node", "npx tsc --noEmit", "npm test"))
    } else {
        None
    };
    if overrides.build_command.is_none() && overrides.test_command.is_none() {
        return detected;
    }
    let mut toolchain = detected.unwrap_or(Toolchain {
        name: "custom",
        build: None,
        test: None,
    });
    if let Some(build) = &overrides.build_command {
        toolchain.build = Some(build.clone());
    }
    if let Some(test) = &overrides.test_command {
        toolchain.test = Some(test.clone());
    }
    Some(toolchain)
}

/// Run the project's build and test commands.
///
/// An unrecognized project is assumed to pass; a toolchain without a build
/// (or test) command counts that half as passing.
#[instrument(skip_all)]
pub fn validate_project<S: Shell>(shell: &S, toolchain: Option<&Toolchain>) -> ValidationResult {
    let Some(toolchain) = toolchain else {
        debug!("no recognized project manifest, assuming success");
        return ValidationResult {
            compiled: Some(true),
            tests: Some(TestsSummary {
                passed: true,
                summary: "no recognized project type; validation skipped".to_string(),
            }),
        };
    };

    let build = toolchain.build.as_deref().map(|cmd| (cmd, shell.run(cmd)));
    let test = toolchain.test.as_deref().map(|cmd| (cmd, shell.run(cmd)));
    let compiled = build.as_ref().is_none_or(|(_, result)| result.succeeded());
    let tests_passed = test.as_ref().is_none_or(|(_, result)| result.succeeded());

    let mut parts = Vec::new();
    for (cmd, result) in build.iter().chain(test.iter()) {
        parts.push(format!(
            "{cmd}: {}",
            if result.succeeded() { "PASS" } else { "FAIL" }
        ));
    }
    let summary = if parts.is_empty() {
        format!("{}: no commands configured", toolchain.name)
    } else {
        parts.join(", ")
    };
    info!(toolchain = toolchain.name, compiled, tests_passed, "validation finished");
    ValidationResult {
        compiled: Some(compiled),
        tests: Some(TestsSummary {
            passed: tests_passed,
            summary,
        }),
    }
}

/// Outcome of checking the workspace against the deep plan's criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticVerdict {
    pub met: bool,
    pub reason: String,
}

/// Ask the oracle whether the success criteria are met, falling back to the
/// file-name overlap heuristic when it cannot answer.
#[instrument(skip_all, fields(ticket = %ticket.ticket_id))]
pub fn validate_against_success_criteria<O: Oracle, C: Codebase>(
    oracle: &O,
    codebase: &C,
    ticket: &Ticket,
    deep_plan: &DeepPlan,
    workspace_summary: &str,
) -> SemanticVerdict {
    match oracle.evaluate_completion(ticket, deep_plan, workspace_summary) {
        Ok(verdict) => SemanticVerdict {
            met: verdict.completed,
            reason: verdict.reason,
        },
        Err(err) => {
            warn!(err = %format!("{err:#}"), "completion evaluation failed, using heuristic");
            let file_names = codebase.file_names().unwrap_or_else(|err| {
                warn!(err = %format!("{err:#}"), "listing workspace files failed");
                Vec::new()
            });
            let met = completion_heuristic(&deep_plan.requirements, &file_names);
            SemanticVerdict {
                met,
                reason: format!(
                    "heuristic: requirement terms {} in workspace file names",
                    if met { "found" } else { "not found" }
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::core::types::Complexity;
    use crate::io::codebase::WorkspaceIndex;
    use crate::test_support::{ScriptedOracle, ScriptedShell, ticket};

    fn plan(requirements: &[&str]) -> DeepPlan {
        DeepPlan {
            requirements: requirements.iter().map(|s| s.to_string()).collect(),
            success_criteria: Vec::new(),
            risks: Vec::new(),
            strategy: String::new(),
            estimated_complexity: Complexity::Low,
        }
    }

    #[test]
    fn detects_manifests_in_priority_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let none = ValidationConfig::default();
        assert_eq!(detect_toolchain(temp.path(), &none), None);

        fs::write(temp.path().join("package.json"), "{}").expect("write");
        assert_eq!(detect_toolchain(temp.path(), &none).expect("node").name, "node");

        fs::write(temp.path().join("Cargo.toml"), "").expect("write");
        let rust = detect_toolchain(temp.path(), &none).expect("rust");
        assert_eq!(rust.test.as_deref(), Some("cargo test --quiet"));
    }

    #[test]
    fn overrides_apply_without_manifest() {
        let temp = tempfile::tempdir().expect("tempdir");
        let overrides = ValidationConfig {
            build_command: None,
            test_command: Some("make test".to_string()),
        };
        let toolchain = detect_toolchain(temp.path(), &overrides).expect("custom");
        assert_eq!(toolchain.name, "custom");
        assert_eq!(toolchain.build, None);
        assert_eq!(toolchain.test.as_deref(), Some("make test"));
    }

    #[test]
    fn unknown_project_passes_trivially() {
        let shell = ScriptedShell::new();
        let result = validate_project(&shell, None);
        assert!(result.compiled() && result.tests_passed());
        assert!(shell.commands().is_empty());
    }

    #[test]
    fn failing_tests_are_reported() {
        let shell = ScriptedShell::new().fail_matching("cargo test", "1 failed");
        let toolchain = Toolchain::new("rust", "cargo check --quiet", "cargo test --quiet");
        let result = validate_project(&shell, Some(&toolchain));
        assert_eq!(result.compiled, Some(true));
        assert!(!result.tests_passed());
        assert_eq!(
            result.tests.expect("tests").summary,
            "cargo check --quiet: PASS, cargo test --quiet: FAIL"
        );
    }

    #[test]
    fn semantic_check_prefers_oracle() {
        let temp = tempfile::tempdir().expect("tempdir");
        let index = WorkspaceIndex::new(temp.path(), true);
        let oracle = ScriptedOracle::new().with_completion(false, "missing greet");
        let verdict = validate_against_success_criteria(
            &oracle,
            &index,
            &ticket("1", "Greet"),
            &plan(&["greet"]),
            "",
        );
        assert!(!verdict.met);
        assert_eq!(verdict.reason, "missing greet");
    }

    #[test]
    fn semantic_check_falls_back_to_file_names() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("greeter.py"), "").expect("write");
        let index = WorkspaceIndex::new(temp.path(), true);
        let oracle = ScriptedOracle::new();
        let verdict = validate_against_success_criteria(
            &oracle,
            &index,
            &ticket("1", "Greet"),
            &plan(&["Create greeter module", "Document usage"]),
            "",
        );
        assert!(verdict.met);
        assert!(verdict.reason.starts_with("heuristic"));
    }
}
