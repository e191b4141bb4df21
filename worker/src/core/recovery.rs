//! Error recovery engine: classify failure text into structured analyses and
//! derive recovery actions from them.
//!
//! Classification is a declarative table of (family, regex, parser) rules. The
//! invoking command picks the family; rules of that family run over the failure
//! text, and the generic family is consulted when nothing specific matched.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;

/// Minimum confidence at which an action may run without confirmation.
pub const AUTO_EXECUTE_CONFIDENCE: f64 = 0.8;

/// Pattern family selected from the invoking command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Python,
    Script,
    Rust,
    Native,
    Generic,
}

impl Family {
    /// Pick the family from program names and file extensions among the
    /// command's tokens.
    pub fn for_command(command: &str) -> Self {
        let lower = command.to_lowercase();
        let tokens: Vec<&str> = lower
            .split(|c: char| c.is_whitespace() || matches!(c, ';' | '&' | '|' | '(' | ')' | '\'' | '"'))
            .filter(|token| !token.is_empty())
            .collect();
        let program = |token: &str| token.rsplit('/').next().unwrap_or(token).to_string();
        let has_word = |words: &[&str]| tokens.iter().any(|&t| words.contains(&program(t).as_str()));
        let has_ext = |exts: &[&str]| tokens.iter().any(|&t| exts.iter().any(|&ext| t.ends_with(ext)));

        if tokens.iter().any(|&t| program(t).starts_with("python"))
            || has_word(&["pip", "pip3", "pytest"])
            || has_ext(&[".py"])
        {
            Family::Python
        } else if has_word(&["node", "npm", "npx", "yarn", "pnpm", "tsc"])
            || has_ext(&[".js", ".mjs", ".cjs", ".ts", ".tsx"])
        {
            Family::Script
        } else if has_word(&["cargo", "rustc"]) {
            Family::Rust
        } else if has_word(&["gcc", "g++", "clang", "clang++"]) {
            Family::Native
        } else {
            Family::Generic
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    PythonRuntime,
    SyntaxError,
    MissingDependency,
    ImportError,
    AttributeError,
    NameError,
    ScriptError,
    ReferenceError,
    RustCompileError,
    RustLocation,
    RustNotFound,
    CompileError,
    MissingHeader,
    PermissionError,
    FileNotFound,
    CommandNotFound,
}

impl ErrorType {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorType::PythonRuntime => "python_runtime",
            ErrorType::SyntaxError => "syntax_error",
            ErrorType::MissingDependency => "missing_dependency",
            ErrorType::ImportError => "import_error",
            ErrorType::AttributeError => "attribute_error",
            ErrorType::NameError => "name_error",
            ErrorType::ScriptError => "script_error",
            ErrorType::ReferenceError => "reference_error",
            ErrorType::RustCompileError => "rust_compile_error",
            ErrorType::RustLocation => "rust_location",
            ErrorType::RustNotFound => "rust_not_found",
            ErrorType::CompileError => "compile_error",
            ErrorType::MissingHeader => "missing_header",
            ErrorType::PermissionError => "permission_error",
            ErrorType::FileNotFound => "file_not_found",
            ErrorType::CommandNotFound => "command_not_found",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// One classified finding in a block of failure text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorAnalysis {
    pub error_type: ErrorType,
    pub severity: Severity,
    pub file_path: Option<String>,
    pub line_number: Option<u32>,
    pub column: Option<u32>,
    pub message: String,
    pub suggested_fixes: Vec<String>,
    pub context: BTreeMap<String, String>,
}

impl ErrorAnalysis {
    fn new(error_type: ErrorType, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            error_type,
            severity,
            file_path: None,
            line_number: None,
            column: None,
            message: message.into(),
            suggested_fixes: Vec::new(),
            context: BTreeMap::new(),
        }
    }

    fn at(mut self, file: &str, line: Option<u32>, column: Option<u32>) -> Self {
        self.file_path = Some(file.trim().to_string());
        self.line_number = line;
        self.column = column;
        self
    }

    fn fixes<I, S>(mut self, fixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggested_fixes.extend(fixes.into_iter().map(Into::into));
        self
    }

    fn with(mut self, key: &str, value: &str) -> Self {
        self.context.insert(key.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    InstallDependency,
    FixSyntax,
    CreateFile,
    InstallTool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryAction {
    pub action_type: ActionType,
    pub description: String,
    pub commands: Vec<String>,
    pub files_to_modify: Vec<String>,
    pub confidence: f64,
}

impl RecoveryAction {
    /// Only high-confidence dependency installs run unattended.
    pub fn auto_executable(&self) -> bool {
        self.confidence >= AUTO_EXECUTE_CONFIDENCE
            && self.action_type == ActionType::InstallDependency
            && !self.commands.is_empty()
    }
}

/// Analyses and actions for one failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnosis {
    pub family: Family,
    pub analyses: Vec<ErrorAnalysis>,
    pub actions: Vec<RecoveryAction>,
}

impl Diagnosis {
    /// Type of the first finding, or `unknown`.
    pub fn error_type(&self) -> &'static str {
        self.analyses
            .first()
            .map(|a| a.error_type.as_str())
            .unwrap_or("unknown")
    }

    /// Highest action confidence; bare analyses count as weak evidence.
    pub fn confidence(&self) -> f64 {
        let best = self
            .actions
            .iter()
            .map(|a| a.confidence)
            .fold(0.0_f64, f64::max);
        if best > 0.0 {
            best
        } else if self.analyses.is_empty() {
            0.0
        } else {
            0.3
        }
    }

    /// Human-readable fixes across all analyses, deduplicated, in order.
    pub fn suggestions(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for fix in self.analyses.iter().flat_map(|a| &a.suggested_fixes) {
            if !seen.contains(&fix.as_str()) {
                seen.push(fix.as_str());
            }
        }
        seen
    }

    /// Ranked replacement commands for a failed `command`, built only from
    /// auto-executable actions (each fix runs before the original command).
    pub fn replacement_commands(&self, command: &str) -> Vec<String> {
        self.actions
            .iter()
            .filter(|a| a.auto_executable())
            .flat_map(|a| &a.commands)
            .map(|fix| format!("{fix} && {command}"))
            .collect()
    }

    /// One-paragraph annotation attached to failed validation output.
    pub fn annotation(&self) -> String {
        let mut text = format!(
            "Validation failed. Error type: {}, Confidence: {:.2}",
            self.error_type(),
            self.confidence()
        );
        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            let top: Vec<&str> = suggestions.into_iter().take(3).collect();
            text.push_str(&format!("\nSuggestions: {}", top.join("; ")));
        }
        text
    }
}

type Parser = fn(&Captures<'_>, &str) -> Option<ErrorAnalysis>;

struct Rule {
    family: Family,
    pattern: Regex,
    parse: Parser,
}

fn rule(family: Family, pattern: &str, parse: Parser) -> Rule {
    Rule {
        family,
        pattern: Regex::new(pattern).expect("recovery rule regex should compile"),
        parse,
    }
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule(Family::Python, r#"(?m)File "([^"]+)", line (\d+)"#, parse_python_location),
        rule(Family::Python, r"(?m)SyntaxError: (.+)", parse_python_syntax),
        rule(Family::Python, r"(?m)ModuleNotFoundError: No module named '([^']+)'", parse_python_missing_module),
        rule(Family::Python, r"(?m)ImportError: (.+)", parse_python_import),
        rule(Family::Python, r"(?m)AttributeError: (.+)", parse_python_attribute),
        rule(Family::Python, r"(?m)NameError: name '([^']+)' is not defined", parse_python_name),
        rule(Family::Script, r"(?m)^(.+):(\d+):(\d+): (.+)$", parse_script_location),
        rule(Family::Script, r"(?m)Cannot find module '([^']+)'", parse_script_missing_module),
        rule(Family::Script, r"(?m)ReferenceError: (.+)", parse_script_reference),
        rule(Family::Rust, r"(?m)error\[E\d+\]: (.+)", parse_rust_error),
        rule(Family::Rust, r"(?m)--> ([^:\s]+):(\d+):(\d+)", parse_rust_location),
        rule(Family::Rust, r"(?m)cannot find (.+) in (.+)", parse_rust_not_found),
        rule(Family::Rust, r"(?m)can't find crate for `([^`]+)`", parse_rust_missing_crate),
        rule(Family::Native, r"(?m)^(.+):(\d+):(\d+): error: (.+)$", parse_native_error),
        rule(Family::Native, r"(?m)fatal error: (.+): No such file or directory", parse_missing_header),
        rule(Family::Generic, r"(?i)permission denied", parse_permission),
        rule(Family::Generic, r"(?i)no such file or directory", parse_file_not_found),
        rule(Family::Generic, r"(?i)command not found", parse_command_not_found),
    ]
});

/// Classify failure text produced by `command`.
pub fn analyze_error(output: &str, command: &str) -> Vec<ErrorAnalysis> {
    let family = Family::for_command(command);
    let analyses = run_family(family, output);
    if analyses.is_empty() && family != Family::Generic {
        return run_family(Family::Generic, output);
    }
    analyses
}

/// Analyze and derive actions in one call.
pub fn diagnose(output: &str, command: &str) -> Diagnosis {
    let analyses = analyze_error(output, command);
    let actions = suggest_recovery_actions(&analyses);
    Diagnosis {
        family: Family::for_command(command),
        analyses,
        actions,
    }
}

fn run_family(family: Family, output: &str) -> Vec<ErrorAnalysis> {
    let mut analyses = Vec::new();
    for rule in RULES.iter().filter(|r| r.family == family) {
        if family == Family::Generic {
            // Generic rules report a condition once, not per occurrence.
            if let Some(caps) = rule.pattern.captures(output)
                && let Some(analysis) = (rule.parse)(&caps, output)
            {
                analyses.push(analysis);
            }
            continue;
        }
        analyses.extend(
            rule.pattern
                .captures_iter(output)
                .filter_map(|caps| (rule.parse)(&caps, output)),
        );
    }
    analyses
}

/// Map analyses to recovery actions. Confidence values are fixed per action.
pub fn suggest_recovery_actions(analyses: &[ErrorAnalysis]) -> Vec<RecoveryAction> {
    let mut actions = Vec::new();
    for analysis in analyses {
        match analysis.error_type {
            ErrorType::MissingDependency => {
                let module = analysis.context.get("module_name").map(String::as_str);
                let language = analysis.context.get("language").map(String::as_str);
                let Some(module) = module.filter(|m| is_plain_package_name(m)) else {
                    continue;
                };
                match language {
                    Some("python") => actions.push(RecoveryAction {
                        action_type: ActionType::InstallDependency,
                        description: format!("Install Python module {module}"),
                        commands: vec![format!("pip install {module}")],
                        files_to_modify: Vec::new(),
                        confidence: 0.8,
                    }),
                    Some("javascript") if !module.starts_with('.') && !module.starts_with('/') => {
                        actions.push(RecoveryAction {
                            action_type: ActionType::InstallDependency,
                            description: format!("Install Node.js module {module}"),
                            commands: vec![format!("npm install {module}")],
                            files_to_modify: Vec::new(),
                            confidence: 0.8,
                        });
                    }
                    Some("rust") => actions.push(RecoveryAction {
                        action_type: ActionType::InstallDependency,
                        description: format!("Add crate {module}"),
                        commands: vec![format!("cargo add {module}")],
                        files_to_modify: vec!["Cargo.toml".to_string()],
                        confidence: 0.6,
                    }),
                    _ => {}
                }
            }
            ErrorType::SyntaxError => actions.push(RecoveryAction {
                action_type: ActionType::FixSyntax,
                description: "Fix syntax error".to_string(),
                commands: Vec::new(),
                files_to_modify: analysis.file_path.iter().cloned().collect(),
                confidence: 0.6,
            }),
            ErrorType::FileNotFound => actions.push(RecoveryAction {
                action_type: ActionType::CreateFile,
                description: "Create missing file".to_string(),
                commands: Vec::new(),
                files_to_modify: Vec::new(),
                confidence: 0.5,
            }),
            ErrorType::CommandNotFound => actions.push(RecoveryAction {
                action_type: ActionType::InstallTool,
                description: "Install missing command-line tool".to_string(),
                commands: Vec::new(),
                files_to_modify: Vec::new(),
                confidence: 0.7,
            }),
            _ => {}
        }
    }
    actions
}

/// Deterministic rewrite of a failed command when no auto-executable
/// suggestion exists. Returns the command unchanged when no rule applies.
pub fn fallback_command(cmd: &str, stdout: &str, stderr: &str, attempt: usize) -> String {
    let error_text = format!("{stderr} {stdout}").to_lowercase();
    let trimmed = cmd.trim_start();

    if error_text.contains("permission denied") && !trimmed.starts_with("sudo") {
        return format!("sudo -n {cmd}");
    }
    if error_text.contains("no such file or directory")
        && !cmd.contains("mkdir")
        && !cmd.contains("touch")
        && cmd.contains('/')
        && let Some(target) = cmd.split_whitespace().last()
    {
        return format!("mkdir -p $(dirname {target}) && {cmd}");
    }
    if error_text.contains("file exists") && trimmed.starts_with("mkdir") && !cmd.contains("-p") {
        return cmd.replacen("mkdir", "mkdir -p", 1);
    }
    if cmd.contains("cargo")
        && attempt == 1
        && (error_text.contains("error") || error_text.contains("failed"))
        && cmd.contains("cargo check")
        && !cmd.contains("--all-features")
    {
        return cmd.replacen("cargo check", "cargo check --all-features", 1);
    }
    if attempt >= 2
        && ["cargo", "npm", "yarn"].iter().any(|tool| trimmed.starts_with(tool))
        && !cmd.contains("--verbose")
    {
        return format!("{cmd} --verbose");
    }
    cmd.to_string()
}

fn is_plain_package_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '@' | '/'))
}

fn number(caps: &Captures<'_>, idx: usize) -> Option<u32> {
    caps.get(idx).and_then(|m| m.as_str().parse().ok())
}

fn group<'a>(caps: &'a Captures<'_>, idx: usize) -> &'a str {
    caps.get(idx).map(|m| m.as_str().trim()).unwrap_or_default()
}

fn parse_python_location(caps: &Captures<'_>, output: &str) -> Option<ErrorAnalysis> {
    let file = group(caps, 1);
    let line = number(caps, 2);
    // The message is the line following the traceback frame.
    let whole = caps.get(0)?;
    let message = output[whole.end()..]
        .lines()
        .nth(1)
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or("Python runtime error")
        .to_string();
    let lower = message.to_lowercase();
    let mut fixes = Vec::new();
    if lower.contains("indentation") {
        fixes.push("Fix indentation - use consistent spaces or tabs");
    }
    if lower.contains("syntax") {
        fixes.push("Check for missing colons, parentheses, or quotes");
    }
    if lower.contains("import") {
        fixes.push("Check import statements and module names");
    }
    Some(
        ErrorAnalysis::new(ErrorType::PythonRuntime, Severity::Medium, message)
            .at(file, line, None)
            .fixes(fixes)
            .with("language", "python"),
    )
}

fn parse_python_syntax(caps: &Captures<'_>, _: &str) -> Option<ErrorAnalysis> {
    let message = group(caps, 1);
    let fix = if message.contains("invalid syntax") {
        Some("Check for missing colons, parentheses, or quotes")
    } else if message.contains("unexpected EOF") {
        Some("Check for unclosed parentheses, brackets, or quotes")
    } else if message.to_lowercase().contains("indentation") {
        Some("Fix indentation - use consistent spaces or tabs")
    } else {
        None
    };
    Some(
        ErrorAnalysis::new(ErrorType::SyntaxError, Severity::High, message)
            .fixes(fix)
            .with("language", "python"),
    )
}

fn parse_python_missing_module(caps: &Captures<'_>, _: &str) -> Option<ErrorAnalysis> {
    let module = group(caps, 1);
    Some(
        ErrorAnalysis::new(
            ErrorType::MissingDependency,
            Severity::Medium,
            format!("Module '{module}' not found"),
        )
        .fixes([
            format!("Install the module: pip install {module}"),
            format!("Add {module} to requirements.txt"),
            "Check if the module name is correct".to_string(),
        ])
        .with("module_name", module)
        .with("language", "python"),
    )
}

fn parse_python_import(caps: &Captures<'_>, _: &str) -> Option<ErrorAnalysis> {
    Some(
        ErrorAnalysis::new(ErrorType::ImportError, Severity::Medium, group(caps, 1))
            .fixes([
                "Check if the imported module exists",
                "Verify the import path is correct",
                "Ensure the module is installed",
            ])
            .with("language", "python"),
    )
}

fn parse_python_attribute(caps: &Captures<'_>, _: &str) -> Option<ErrorAnalysis> {
    Some(
        ErrorAnalysis::new(ErrorType::AttributeError, Severity::Medium, group(caps, 1))
            .fixes([
                "Check if the attribute name is spelled correctly",
                "Verify the object has the expected attribute",
                "Check the object type and available methods",
            ])
            .with("language", "python"),
    )
}

fn parse_python_name(caps: &Captures<'_>, _: &str) -> Option<ErrorAnalysis> {
    let name = group(caps, 1);
    Some(
        ErrorAnalysis::new(
            ErrorType::NameError,
            Severity::High,
            format!("Name '{name}' is not defined"),
        )
        .fixes([
            format!("Define the variable '{name}' before using it"),
            format!("Check if '{name}' is spelled correctly"),
            format!("Import '{name}' if it's from another module"),
        ])
        .with("undefined_name", name)
        .with("language", "python"),
    )
}

fn parse_script_location(caps: &Captures<'_>, _: &str) -> Option<ErrorAnalysis> {
    let message = group(caps, 4);
    let lower = message.to_lowercase();
    let mut fixes = Vec::new();
    if lower.contains("unexpected token") {
        fixes.push("Check for missing semicolons or brackets");
    }
    if lower.contains("undefined") {
        fixes.push("Declare the variable before using it");
    }
    if lower.contains("cannot read propert") {
        fixes.push("Check if the object exists before accessing properties");
    }
    Some(
        ErrorAnalysis::new(ErrorType::ScriptError, Severity::Medium, message)
            .at(group(caps, 1), number(caps, 2), number(caps, 3))
            .fixes(fixes)
            .with("language", "javascript"),
    )
}

fn parse_script_missing_module(caps: &Captures<'_>, _: &str) -> Option<ErrorAnalysis> {
    let module = group(caps, 1);
    Some(
        ErrorAnalysis::new(
            ErrorType::MissingDependency,
            Severity::Medium,
            format!("Cannot find module '{module}'"),
        )
        .fixes([
            format!("Install the module: npm install {module}"),
            "Check if the module path is correct".to_string(),
            "Verify the module exists in node_modules".to_string(),
        ])
        .with("module_name", module)
        .with("language", "javascript"),
    )
}

fn parse_script_reference(caps: &Captures<'_>, _: &str) -> Option<ErrorAnalysis> {
    Some(
        ErrorAnalysis::new(ErrorType::ReferenceError, Severity::High, group(caps, 1))
            .fixes([
                "Check if the variable is declared",
                "Verify the variable scope",
                "Check for typos in variable names",
            ])
            .with("language", "javascript"),
    )
}

fn parse_rust_error(caps: &Captures<'_>, _: &str) -> Option<ErrorAnalysis> {
    let message = group(caps, 1);
    let lower = message.to_lowercase();
    let mut fixes = Vec::new();
    if lower.contains("borrow") {
        fixes.push("Review ownership and borrowing rules");
    }
    if lower.contains("mismatched types") || lower.contains("type mismatch") {
        fixes.push("Check type annotations and conversions");
    }
    if lower.contains("trait") {
        fixes.push("Implement required traits or import them");
    }
    Some(
        ErrorAnalysis::new(ErrorType::RustCompileError, Severity::High, message)
            .fixes(fixes)
            .with("language", "rust"),
    )
}

fn parse_rust_location(caps: &Captures<'_>, _: &str) -> Option<ErrorAnalysis> {
    Some(
        ErrorAnalysis::new(ErrorType::RustLocation, Severity::Medium, "Rust error at this location")
            .at(group(caps, 1), number(caps, 2), number(caps, 3))
            .with("language", "rust"),
    )
}

fn parse_rust_not_found(caps: &Captures<'_>, _: &str) -> Option<ErrorAnalysis> {
    let item = group(caps, 1);
    let location = group(caps, 2);
    Some(
        ErrorAnalysis::new(
            ErrorType::RustNotFound,
            Severity::High,
            format!("Cannot find {item} in {location}"),
        )
        .fixes([
            format!("Add the missing {item}"),
            format!("Check the spelling of {item}"),
            format!("Import {item} if it's from another module"),
        ])
        .with("missing_item", item)
        .with("location", location)
        .with("language", "rust"),
    )
}

fn parse_rust_missing_crate(caps: &Captures<'_>, _: &str) -> Option<ErrorAnalysis> {
    let name = group(caps, 1);
    Some(
        ErrorAnalysis::new(
            ErrorType::MissingDependency,
            Severity::High,
            format!("Crate '{name}' not found"),
        )
        .fixes([
            format!("Add the dependency: cargo add {name}"),
            "Check the crate name in Cargo.toml".to_string(),
        ])
        .with("module_name", name)
        .with("language", "rust"),
    )
}

fn parse_native_error(caps: &Captures<'_>, _: &str) -> Option<ErrorAnalysis> {
    let message = group(caps, 4);
    let lower = message.to_lowercase();
    let mut fixes = Vec::new();
    if lower.contains("undeclared") {
        fixes.push("Declare the variable or function");
    }
    if lower.contains("type") {
        fixes.push("Check type compatibility");
    }
    if lower.contains("expected ';'") || lower.contains("semicolon") {
        fixes.push("Add missing semicolon");
    }
    Some(
        ErrorAnalysis::new(ErrorType::CompileError, Severity::High, message)
            .at(group(caps, 1), number(caps, 2), number(caps, 3))
            .fixes(fixes)
            .with("language", "c/c++"),
    )
}

fn parse_missing_header(caps: &Captures<'_>, _: &str) -> Option<ErrorAnalysis> {
    let header = group(caps, 1);
    Some(
        ErrorAnalysis::new(
            ErrorType::MissingHeader,
            Severity::High,
            format!("Header file '{header}' not found"),
        )
        .fixes([
            format!("Create the header file {header}"),
            format!("Install the library containing {header}"),
            format!("Check the include path for {header}"),
        ])
        .with("header_file", header)
        .with("language", "c/c++"),
    )
}

fn parse_permission(_: &Captures<'_>, _: &str) -> Option<ErrorAnalysis> {
    Some(
        ErrorAnalysis::new(ErrorType::PermissionError, Severity::Medium, "Permission denied")
            .fixes(["Check file permissions", "Run with appropriate privileges"]),
    )
}

fn parse_file_not_found(_: &Captures<'_>, _: &str) -> Option<ErrorAnalysis> {
    Some(
        ErrorAnalysis::new(
            ErrorType::FileNotFound,
            Severity::Medium,
            "File or directory not found",
        )
        .fixes(["Check if the file exists", "Verify the path is correct"]),
    )
}

fn parse_command_not_found(_: &Captures<'_>, _: &str) -> Option<ErrorAnalysis> {
    Some(
        ErrorAnalysis::new(ErrorType::CommandNotFound, Severity::High, "Command not found")
            .fixes(["Install the required tool", "Check PATH environment variable"]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_follows_command() {
        assert_eq!(Family::for_command("python -m pytest"), Family::Python);
        assert_eq!(Family::for_command("pytest -q"), Family::Python);
        assert_eq!(Family::for_command("npm test"), Family::Script);
        assert_eq!(Family::for_command("cargo test --quiet"), Family::Rust);
        assert_eq!(Family::for_command("gcc main.c"), Family::Native);
        assert_eq!(Family::for_command("ls /missing"), Family::Generic);
        assert_eq!(Family::for_command("/usr/bin/python3 app.py"), Family::Python);
        assert_eq!(Family::for_command("cd web && npx tsc --noEmit"), Family::Script);
        assert_eq!(Family::for_command("node build/index.js"), Family::Script);
    }

    #[test]
    fn family_ignores_lookalike_tokens() {
        assert_eq!(Family::for_command("cat notes.tsv"), Family::Generic);
        assert_eq!(Family::for_command("ls node_modules_backup"), Family::Generic);
        assert_eq!(Family::for_command("cat notes.json"), Family::Generic);
    }

    #[test]
    fn python_missing_module_is_auto_executable() {
        let output = "Traceback (most recent call last):\nModuleNotFoundError: No module named 'requests'\n";
        let diagnosis = diagnose(output, "python app.py");
        assert_eq!(diagnosis.error_type(), "missing_dependency");
        assert!((diagnosis.confidence() - 0.8).abs() < f64::EPSILON);
        assert_eq!(
            diagnosis.replacement_commands("python app.py"),
            vec!["pip install requests && python app.py".to_string()]
        );
    }

    #[test]
    fn python_traceback_reports_location_and_message() {
        let output = "  File \"app.py\", line 3, in <module>\n    print(x)\nNameError: name 'x' is not defined\n";
        let analyses = analyze_error(output, "python app.py");
        let location = analyses
            .iter()
            .find(|a| a.error_type == ErrorType::PythonRuntime)
            .expect("location");
        assert_eq!(location.file_path.as_deref(), Some("app.py"));
        assert_eq!(location.line_number, Some(3));
        assert!(analyses.iter().any(|a| a.error_type == ErrorType::NameError));
    }

    #[test]
    fn relative_script_module_is_not_installed() {
        let output = "Error: Cannot find module './local'\n";
        let diagnosis = diagnose(output, "node index.js");
        assert_eq!(diagnosis.error_type(), "missing_dependency");
        assert!(diagnosis.actions.is_empty());
        assert!(diagnosis.replacement_commands("node index.js").is_empty());
    }

    #[test]
    fn rust_errors_capture_location() {
        let output = "error[E0425]: cannot find value `x` in this scope\n --> src/main.rs:2:5\n";
        let analyses = analyze_error(output, "cargo build");
        let types: Vec<ErrorType> = analyses.iter().map(|a| a.error_type).collect();
        assert!(types.contains(&ErrorType::RustCompileError));
        assert!(types.contains(&ErrorType::RustNotFound));
        let location = analyses
            .iter()
            .find(|a| a.error_type == ErrorType::RustLocation)
            .expect("location");
        assert_eq!(location.file_path.as_deref(), Some("src/main.rs"));
        assert_eq!((location.line_number, location.column), (Some(2), Some(5)));
    }

    #[test]
    fn missing_crate_is_suggested_but_not_auto_applied() {
        let output = "error[E0463]: can't find crate for `serde`\n";
        let diagnosis = diagnose(output, "cargo check");
        let action = diagnosis
            .actions
            .iter()
            .find(|a| a.action_type == ActionType::InstallDependency)
            .expect("action");
        assert_eq!(action.commands, vec!["cargo add serde".to_string()]);
        assert!(!action.auto_executable());
    }

    #[test]
    fn specific_family_falls_back_to_generic() {
        let output = "sh: 1: pytest: command not found\n";
        let diagnosis = diagnose(output, "pytest");
        assert_eq!(diagnosis.error_type(), "command_not_found");
        assert!(diagnosis.replacement_commands("pytest").is_empty());
    }

    #[test]
    fn generic_conditions_are_reported_once() {
        let output = "cat: a: No such file or directory\ncat: b: No such file or directory\n";
        let analyses = analyze_error(output, "cat a b");
        assert_eq!(analyses.len(), 1);
        assert_eq!(analyses[0].error_type, ErrorType::FileNotFound);
    }

    #[test]
    fn annotation_lists_top_three_suggestions() {
        let diagnosis = diagnose("ModuleNotFoundError: No module named 'yaml'", "python x.py");
        let text = diagnosis.annotation();
        assert!(text.starts_with("Validation failed. Error type: missing_dependency, Confidence: 0.80"));
        assert!(text.contains("\nSuggestions: Install the module: pip install yaml; "));
    }

    #[test]
    fn no_findings_means_zero_confidence() {
        let diagnosis = diagnose("something odd", "make");
        assert_eq!(diagnosis.error_type(), "unknown");
        assert_eq!(diagnosis.confidence(), 0.0);
    }

    #[test]
    fn fallback_rewrites_by_error_class() {
        assert_eq!(
            fallback_command("cat /etc/shadow", "", "Permission denied", 0),
            "sudo -n cat /etc/shadow"
        );
        assert_eq!(
            fallback_command("cp a out/dir/b", "", "cp: out/dir/b: No such file or directory", 0),
            "mkdir -p $(dirname out/dir/b) && cp a out/dir/b"
        );
        assert_eq!(fallback_command("mkdir build", "", "File exists", 0), "mkdir -p build");
        assert_eq!(
            fallback_command("cargo check", "", "error: failed", 1),
            "cargo check --all-features"
        );
        assert_eq!(fallback_command("npm test", "", "boom", 2), "npm test --verbose");
        assert_eq!(fallback_command("false", "", "", 3), "false");
    }
}
