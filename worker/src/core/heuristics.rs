//! Local keyword heuristics used when the oracle cannot answer.
//!
//! Each planning stage has its own fallback so one failed call never sinks the
//! whole deep plan.

use crate::core::types::Ticket;

const ACTION_KEYWORDS: [&str; 12] = [
    "create",
    "implement",
    "add",
    "build",
    "fix",
    "update",
    "remove",
    "refactor",
    "write",
    "support",
    "ensure",
    "make",
];

/// Requirements read straight off the ticket text: every sentence or line
/// carrying an action keyword; the description (or title) when none does.
pub fn fallback_requirements(ticket: &Ticket) -> Vec<String> {
    let requirements: Vec<String> = ticket
        .description
        .split(['\n', '.', ';'])
        .map(|s| s.trim().trim_start_matches(['-', '*']).trim())
        .filter(|s| !s.is_empty())
        .filter(|s| {
            let lower = s.to_lowercase();
            lower
                .split(|c: char| !c.is_alphanumeric())
                .any(|word| ACTION_KEYWORDS.contains(&word))
        })
        .map(str::to_string)
        .collect();
    if !requirements.is_empty() {
        return requirements;
    }
    let description = ticket.description.trim();
    if description.is_empty() {
        vec![ticket.title.trim().to_string()]
    } else {
        vec![description.to_string()]
    }
}

/// Generic acceptance checks; always four items.
pub fn fallback_success_criteria(ticket: &Ticket) -> Vec<String> {
    vec![
        "The project compiles without errors".to_string(),
        "All tests pass".to_string(),
        format!("The changes implement: {}", ticket.title.trim()),
        "No existing functionality regresses".to_string(),
    ]
}

/// Risks inferred from keywords in the ticket and requirement text.
pub fn fallback_risks(ticket: &Ticket, requirements: &[String]) -> Vec<String> {
    let text = format!(
        "{} {} {}",
        ticket.title,
        ticket.description,
        requirements.join(" ")
    )
    .to_lowercase();
    let table: [(&[&str], &str); 5] = [
        (
            &["async", "await", "thread", "concurren", "parallel"],
            "Concurrency changes (async/threads) may introduce races or deadlocks",
        ),
        (
            &["macro", "derive", "codegen"],
            "Macro or code generation changes may have wide compile-time impact",
        ),
        (
            &["database", "schema", "migration"],
            "Data schema changes may require migrations",
        ),
        (
            &["api", "endpoint", "interface"],
            "Public interface changes may break existing callers",
        ),
        (
            &["delete", "remove", "rename"],
            "Removing or renaming code may break dependents",
        ),
    ];
    let mut risks: Vec<String> = table
        .iter()
        .filter(|(keywords, _)| keywords.iter().any(|kw| text.contains(kw)))
        .map(|(_, risk)| risk.to_string())
        .collect();
    risks.push("Changes may cause regressions in existing behavior".to_string());
    risks
}

pub fn fallback_strategy(requirements: &[String]) -> String {
    format!(
        "Take an incremental approach: address the {} requirement(s) one at a time, \
         validating the build and tests after each change.",
        requirements.len()
    )
}

/// Completion heuristic: a requirement counts as evidenced when any of its
/// words longer than three characters appears in the workspace file names.
/// Succeeds when at least half of the requirements are evidenced.
pub fn completion_heuristic(requirements: &[String], file_names: &[String]) -> bool {
    if requirements.is_empty() {
        return true;
    }
    let haystack = file_names.join(" ").to_lowercase();
    let met = requirements
        .iter()
        .filter(|req| {
            req.to_lowercase()
                .split_whitespace()
                .filter(|term| term.chars().count() > 3)
                .any(|term| haystack.contains(term))
        })
        .count();
    met * 2 >= requirements.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(title: &str, description: &str) -> Ticket {
        Ticket {
            ticket_id: "1".to_string(),
            title: title.to_string(),
            description: description.to_string(),
            eoi: None,
        }
    }

    #[test]
    fn requirements_pick_action_sentences() {
        let t = ticket(
            "Greeter",
            "Background text here. Add a greet function. It should be nice.\n- Write tests for greet",
        );
        assert_eq!(
            fallback_requirements(&t),
            vec!["Add a greet function".to_string(), "Write tests for greet".to_string()]
        );
    }

    #[test]
    fn requirements_fall_back_to_description_then_title() {
        assert_eq!(fallback_requirements(&ticket("T", "say hello")), vec!["say hello"]);
        assert_eq!(fallback_requirements(&ticket("Title only", "  ")), vec!["Title only"]);
    }

    #[test]
    fn success_criteria_has_four_items() {
        let criteria = fallback_success_criteria(&ticket("Greeter", ""));
        assert_eq!(criteria.len(), 4);
        assert!(criteria[0].contains("compiles"));
        assert!(criteria[1].contains("tests pass"));
    }

    #[test]
    fn risks_follow_keywords_and_always_include_regression() {
        let risks = fallback_risks(&ticket("Async worker", "spawn a thread"), &[]);
        assert_eq!(risks.len(), 2);
        assert!(risks[0].contains("Concurrency"));
        assert!(risks[1].contains("regressions"));
    }

    #[test]
    fn strategy_is_incremental() {
        assert!(fallback_strategy(&["a".to_string()]).contains("incremental"));
    }

    #[test]
    fn completion_needs_half_of_requirements() {
        let files = vec!["src/greeter.rs".to_string(), "README.md".to_string()];
        let reqs = vec!["Create greeter module".to_string(), "Add database layer".to_string()];
        assert!(completion_heuristic(&reqs, &files));
        let reqs = vec![
            "Create greeter module".to_string(),
            "Add database layer".to_string(),
            "Wire metrics export".to_string(),
        ];
        assert!(!completion_heuristic(&reqs, &files));
        assert!(completion_heuristic(&[], &files));
    }
}
