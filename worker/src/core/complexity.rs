//! Complexity classification and the cycle budget it implies.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::Complexity;

/// Concurrency- and metaprogramming-class terms, matched as whole words.
static RISKY_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(async|await|threads?|threading|multi-?thread\w*|concurren\w*|parallel\w*|mutex\w*|deadlocks?|locking|race conditions?|data races?|macros?|proc-macros?|derive macros?|codegen|code generation|metaprogramming|reflection)\b",
    )
    .expect("risky keyword regex should compile")
});

/// Cycle limits for standard and extended complexity classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleBudget {
    pub standard: u32,
    pub extended: u32,
}

impl Default for CycleBudget {
    fn default() -> Self {
        Self {
            standard: 50,
            extended: 100,
        }
    }
}

/// Classify from requirement count, risk count and risky keywords.
///
/// Rules apply in ascending order so the strongest match wins:
/// more than 5 requirements or 3 risks is medium; more than 10 requirements
/// or a concurrency/metaprogramming keyword is high; more than 15
/// requirements is epic.
pub fn classify_complexity(requirements: &[String], risks: &[String]) -> Complexity {
    let mut complexity = Complexity::Low;
    if requirements.len() > 5 || risks.len() > 3 {
        complexity = Complexity::Medium;
    }
    let risky = requirements
        .iter()
        .chain(risks)
        .any(|text| mentions_risky_keyword(text));
    if requirements.len() > 10 || risky {
        complexity = Complexity::High;
    }
    if requirements.len() > 15 {
        complexity = Complexity::Epic;
    }
    complexity
}

/// Maximum number of cycles a run may take for the given class.
pub fn cycle_budget(complexity: Complexity, budget: CycleBudget) -> u32 {
    if complexity.is_extended() {
        budget.extended
    } else {
        budget.standard
    }
}

fn mentions_risky_keyword(text: &str) -> bool {
    RISKY_KEYWORDS.is_match(text)
}
