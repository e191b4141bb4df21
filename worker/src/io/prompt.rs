//! Prompt rendering for the plan generator and the planning oracle.

use anyhow::Result;
use minijinja::{Environment, context};
use tracing::debug;

use crate::core::types::{DeepPlan, Focus, Ticket};

const PLAN_CYCLE_TEMPLATE: &str = include_str!("prompts/plan_cycle.md");
const ORACLE_TEMPLATE: &str = include_str!("prompts/oracle.md");

/// Which question an oracle prompt asks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleStage {
    Requirements,
    SuccessCriteria,
    Risks,
    Strategy,
    Focus,
    Completion,
}

impl OracleStage {
    pub fn as_str(self) -> &'static str {
        match self {
            OracleStage::Requirements => "requirements",
            OracleStage::SuccessCriteria => "success_criteria",
            OracleStage::Risks => "risks",
            OracleStage::Strategy => "strategy",
            OracleStage::Focus => "focus",
            OracleStage::Completion => "completion",
        }
    }
}

/// Everything a per-cycle plan prompt embeds.
#[derive(Debug, Clone, Copy)]
pub struct CyclePromptInputs<'a> {
    pub ticket: &'a Ticket,
    pub focus: Option<&'a Focus>,
    pub task_tree: &'a str,
    pub workspace_summary: &'a str,
    pub deep_plan: &'a DeepPlan,
}

/// Optional context for an oracle prompt; empty fields are omitted.
#[derive(Debug, Clone, Copy, Default)]
pub struct OracleInputs<'a> {
    pub requirements: &'a [String],
    pub risks: &'a [String],
    pub success_criteria: &'a [String],
    pub candidates: &'a [String],
    pub workspace_summary: &'a str,
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("plan_cycle", PLAN_CYCLE_TEMPLATE)
            .expect("plan_cycle template should be valid");
        env.add_template("oracle", ORACLE_TEMPLATE)
            .expect("oracle template should be valid");
        Self { env }
    }
}

/// Render the prompt handed to the plan generator for one cycle.
pub fn render_cycle_prompt(inputs: &CyclePromptInputs<'_>) -> Result<String> {
    let engine = PromptEngine::new();
    let template = engine.env.get_template("plan_cycle")?;
    let rendered = template.render(context! {
        ticket => inputs.ticket,
        focus => inputs.focus,
        task_tree => inputs.task_tree.trim(),
        workspace_summary => inputs.workspace_summary.trim(),
        deep_plan => inputs.deep_plan,
    })?;
    debug!(chars = rendered.len(), "rendered cycle prompt");
    Ok(rendered)
}

/// Render the user prompt for one oracle question.
pub fn render_oracle_prompt(
    stage: OracleStage,
    ticket: &Ticket,
    inputs: &OracleInputs<'_>,
) -> Result<String> {
    let engine = PromptEngine::new();
    let template = engine.env.get_template("oracle")?;
    let summary = inputs.workspace_summary.trim();
    let rendered = template.render(context! {
        stage => stage.as_str(),
        ticket => ticket,
        requirements => inputs.requirements,
        risks => inputs.risks,
        success_criteria => inputs.success_criteria,
        candidates => inputs.candidates,
        workspace_summary => (!summary.is_empty()).then_some(summary),
    })?;
    Ok(rendered)
}
