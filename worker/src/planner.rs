//! Deep Planner: one-time upfront analysis of a ticket.
//!
//! Four independent oracle questions, each backed by a local heuristic, so
//! planning always yields a [`DeepPlan`] even when the oracle is unavailable.

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::complexity::classify_complexity;
use crate::core::heuristics::{
    fallback_requirements, fallback_risks, fallback_strategy, fallback_success_criteria,
};
use crate::core::types::{DeepPlan, Ticket};
use crate::io::oracle::Oracle;

/// Build the deep plan for `ticket`. Never fails.
#[instrument(skip_all, fields(ticket = %ticket.ticket_id))]
pub fn deep_plan<O: Oracle>(oracle: &O, ticket: &Ticket, workspace_summary: &str) -> DeepPlan {
    let requirements = or_fallback(
        "requirements",
        oracle.analyze_requirements(ticket),
        || fallback_requirements(ticket),
    );
    let success_criteria = or_fallback(
        "success_criteria",
        oracle.define_success_criteria(ticket, &requirements),
        || fallback_success_criteria(ticket),
    );
    let risks = or_fallback(
        "risks",
        oracle.assess_risks(ticket, &requirements, workspace_summary),
        || fallback_risks(ticket, &requirements),
    );
    let strategy = or_fallback(
        "strategy",
        oracle.create_strategy(ticket, &requirements, &risks, workspace_summary),
        || fallback_strategy(&requirements),
    );
    let estimated_complexity = classify_complexity(&requirements, &risks);

    info!(
        requirements = requirements.len(),
        success_criteria = success_criteria.len(),
        risks = risks.len(),
        complexity = estimated_complexity.as_str(),
        "deep plan ready"
    );
    DeepPlan {
        requirements,
        success_criteria,
        risks,
        strategy,
        estimated_complexity,
    }
}

fn or_fallback<T>(stage: &str, answer: Result<T>, fallback: impl FnOnce() -> T) -> T {
    match answer {
        Ok(value) => value,
        Err(err) => {
            warn!(stage, err = %format!("{err:#}"), "oracle failed, using heuristic");
            fallback()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Complexity;
    use crate::test_support::{ScriptedOracle, ticket};

    #[test]
    fn oracle_answers_are_used_verbatim() {
        let oracle = ScriptedOracle::new()
            .with_requirements(vec!["Add greet".to_string()])
            .with_success_criteria(vec!["greet works".to_string()])
            .with_risks(vec!["none".to_string()])
            .with_strategy("Write it");
        let plan = deep_plan(&oracle, &ticket("1", "Greet"), "summary");
        assert_eq!(plan.requirements, vec!["Add greet"]);
        assert_eq!(plan.success_criteria, vec!["greet works"]);
        assert_eq!(plan.risks, vec!["none"]);
        assert_eq!(plan.strategy, "Write it");
        assert_eq!(plan.estimated_complexity, Complexity::Low);
    }

    /// Every stage falls back independently when the oracle is down.
    #[test]
    fn failing_oracle_falls_back_to_heuristics() {
        let oracle = ScriptedOracle::new();
        let t = ticket("2", "Say hello");
        let plan = deep_plan(&oracle, &t, "");
        assert_eq!(plan.requirements, fallback_requirements(&t));
        assert_eq!(plan.success_criteria.len(), 4);
        assert!(!plan.risks.is_empty());
        assert_eq!(plan.strategy, fallback_strategy(&plan.requirements));
    }

    #[test]
    fn complexity_follows_requirement_count() {
        let requirements: Vec<String> = (0..16).map(|i| format!("item {i}")).collect();
        let oracle = ScriptedOracle::new().with_requirements(requirements);
        let plan = deep_plan(&oracle, &ticket("3", "Big"), "");
        assert_eq!(plan.estimated_complexity, Complexity::Epic);
    }
}
