//! Commit and readiness gates evaluated at the end of every cycle.

use crate::core::types::{NodeStatus, ValidationResult};

/// Commit only on a green build with substantial progress this cycle.
pub fn should_commit(validation: &ValidationResult, executed_steps: usize, min_steps: usize) -> bool {
    validation.compiled() && validation.tests_passed() && executed_steps >= min_steps
}

/// Strict readiness: compiled, tests present and passing, criteria met.
pub fn is_ready(validation: &ValidationResult, semantic_met: bool) -> bool {
    validation.compiled() && validation.tests_passed() && semantic_met
}

/// Task-node status and coverage after a cycle.
pub fn node_progress(validation: &ValidationResult, executed_steps: usize, ready: bool) -> (NodeStatus, u8) {
    if ready {
        return (NodeStatus::Done, 100);
    }
    if executed_steps == 0 {
        return (NodeStatus::Unchanged, 0);
    }
    let mut coverage = 10;
    if validation.compiled() {
        coverage += 40;
        if validation.tests_passed() {
            coverage += 30;
        }
    }
    (NodeStatus::Partial, coverage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TestsSummary;

    fn validation(compiled: Option<bool>, passed: Option<bool>) -> ValidationResult {
        ValidationResult {
            compiled,
            tests: passed.map(|passed| TestsSummary {
                passed,
                summary: String::new(),
            }),
        }
    }

    #[test]
    fn commit_requires_all_three_conditions() {
        let green = validation(Some(true), Some(true));
        assert!(should_commit(&green, 3, 3));
        assert!(!should_commit(&green, 2, 3));
        assert!(!should_commit(&validation(Some(false), Some(true)), 5, 3));
        assert!(!should_commit(&validation(Some(true), Some(false)), 5, 3));
        assert!(!should_commit(&validation(None, Some(true)), 5, 3));
        assert!(!should_commit(&validation(Some(true), None), 5, 3));
    }

    #[test]
    fn readiness_is_strict() {
        let green = validation(Some(true), Some(true));
        assert!(is_ready(&green, true));
        assert!(!is_ready(&green, false));
        assert!(!is_ready(&validation(Some(true), None), true));
        assert!(!is_ready(&validation(None, Some(true)), true));
    }

    #[test]
    fn progress_tracks_validation() {
        let green = validation(Some(true), Some(true));
        assert_eq!(node_progress(&green, 3, true), (NodeStatus::Done, 100));
        assert_eq!(node_progress(&green, 0, false), (NodeStatus::Unchanged, 0));
        assert_eq!(node_progress(&green, 1, false), (NodeStatus::Partial, 80));
        assert_eq!(
            node_progress(&validation(Some(false), None), 2, false),
            (NodeStatus::Partial, 10)
        );
    }
}
