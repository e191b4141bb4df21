//! Planning oracle: requirement analysis, focus selection, plan generation and
//! completion evaluation, backed by an OpenAI-compatible chat API.

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::core::plan::{PlanStep, parse_plan};
use crate::core::types::{DeepPlan, Focus, Ticket};
use crate::io::config::{ConfigError, OracleConfig};
use crate::io::prompt::{OracleInputs, OracleStage, render_oracle_prompt};

const PLANNER_SYSTEM_PROMPT: &str = "You are the planner for an autonomous ticket worker. \
Produce short, executable plans with steps of kinds: search | edit | shell | git | validate.";

const ANALYST_SYSTEM_PROMPT: &str =
    "You analyze software tickets precisely and answer only in the requested format.";

/// Verdict of the semantic completion check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionVerdict {
    pub completed: bool,
    #[serde(default)]
    pub reason: String,
}

/// External planning collaborator. Every call may fail; callers own fallbacks.
pub trait Oracle {
    fn analyze_requirements(&self, ticket: &Ticket) -> Result<Vec<String>>;
    fn define_success_criteria(&self, ticket: &Ticket, requirements: &[String]) -> Result<Vec<String>>;
    fn assess_risks(
        &self,
        ticket: &Ticket,
        requirements: &[String],
        workspace_summary: &str,
    ) -> Result<Vec<String>>;
    fn create_strategy(
        &self,
        ticket: &Ticket,
        requirements: &[String],
        risks: &[String],
        workspace_summary: &str,
    ) -> Result<String>;
    fn choose_focus(&self, ticket: &Ticket, candidates: &[String]) -> Result<Option<Focus>>;
    fn generate_plan(&self, prompt: &str) -> Result<Vec<PlanStep>>;
    fn evaluate_completion(
        &self,
        ticket: &Ticket,
        deep_plan: &DeepPlan,
        workspace_summary: &str,
    ) -> Result<CompletionVerdict>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Blocking chat-completions client.
#[derive(Debug, Clone)]
pub struct ChatOracle {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f64,
}

impl ChatOracle {
    /// Build a client, reading the API key from the configured variable.
    ///
    /// Fails with [`ConfigError::MissingCredential`] when the variable is unset
    /// or blank.
    pub fn from_env(config: &OracleConfig, model: &str) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingCredential(config.api_key_env.clone()))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: model.to_string(),
            temperature: config.temperature,
        })
    }

    #[instrument(skip_all, fields(model = %self.model))]
    fn chat(&self, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .context("send chat completion request")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("chat completion failed ({status}): {}", body.trim());
        }
        let parsed: ChatResponse = response.json().context("parse chat completion response")?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("chat completion returned no content"))?;
        debug!(chars = content.len(), "chat completion received");
        Ok(content)
    }

    fn ask(&self, stage: OracleStage, ticket: &Ticket, inputs: &OracleInputs<'_>) -> Result<String> {
        let prompt = render_oracle_prompt(stage, ticket, inputs)?;
        self.chat(ANALYST_SYSTEM_PROMPT, &prompt)
            .with_context(|| format!("oracle {}", stage.as_str()))
    }
}

impl Oracle for ChatOracle {
    fn analyze_requirements(&self, ticket: &Ticket) -> Result<Vec<String>> {
        let reply = self.ask(OracleStage::Requirements, ticket, &OracleInputs::default())?;
        parse_string_list(&reply)
    }

    fn define_success_criteria(&self, ticket: &Ticket, requirements: &[String]) -> Result<Vec<String>> {
        let inputs = OracleInputs {
            requirements,
            ..OracleInputs::default()
        };
        parse_string_list(&self.ask(OracleStage::SuccessCriteria, ticket, &inputs)?)
    }

    fn assess_risks(
        &self,
        ticket: &Ticket,
        requirements: &[String],
        workspace_summary: &str,
    ) -> Result<Vec<String>> {
        let inputs = OracleInputs {
            requirements,
            workspace_summary,
            ..OracleInputs::default()
        };
        parse_string_list(&self.ask(OracleStage::Risks, ticket, &inputs)?)
    }

    fn create_strategy(
        &self,
        ticket: &Ticket,
        requirements: &[String],
        risks: &[String],
        workspace_summary: &str,
    ) -> Result<String> {
        let inputs = OracleInputs {
            requirements,
            risks,
            workspace_summary,
            ..OracleInputs::default()
        };
        let reply = self.ask(OracleStage::Strategy, ticket, &inputs)?;
        let strategy = reply.trim();
        if strategy.is_empty() {
            bail!("oracle returned an empty strategy");
        }
        Ok(strategy.to_string())
    }

    fn choose_focus(&self, ticket: &Ticket, candidates: &[String]) -> Result<Option<Focus>> {
        let inputs = OracleInputs {
            candidates,
            ..OracleInputs::default()
        };
        let reply = self.ask(OracleStage::Focus, ticket, &inputs)?;
        parse_focus(&reply)
    }

    fn generate_plan(&self, prompt: &str) -> Result<Vec<PlanStep>> {
        let reply = self.chat(PLANNER_SYSTEM_PROMPT, prompt).context("oracle plan")?;
        match parse_plan(&reply) {
            Ok(steps) => Ok(steps),
            Err(err) => {
                warn!(err = %err, "plan reply was not a step list, using an empty plan");
                Ok(Vec::new())
            }
        }
    }

    fn evaluate_completion(
        &self,
        ticket: &Ticket,
        deep_plan: &DeepPlan,
        workspace_summary: &str,
    ) -> Result<CompletionVerdict> {
        let inputs = OracleInputs {
            requirements: &deep_plan.requirements,
            success_criteria: &deep_plan.success_criteria,
            workspace_summary,
            ..OracleInputs::default()
        };
        let reply = self.ask(OracleStage::Completion, ticket, &inputs)?;
        serde_json::from_str(strip_fence(&reply)).context("parse completion verdict")
    }
}

/// Parse a JSON array of strings, tolerating code fences and non-string items.
pub fn parse_string_list(reply: &str) -> Result<Vec<String>> {
    let value: Value = serde_json::from_str(strip_fence(reply)).context("parse list reply")?;
    let Value::Array(items) = value else {
        bail!("expected a JSON array");
    };
    let list: Vec<String> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Null => None,
            other => Some(other.to_string()),
        })
        .filter(|s| !s.is_empty())
        .collect();
    if list.is_empty() {
        bail!("oracle returned an empty list");
    }
    Ok(list)
}

fn parse_focus(reply: &str) -> Result<Option<Focus>> {
    let value: Value = serde_json::from_str(strip_fence(reply)).context("parse focus reply")?;
    match value {
        Value::Null => Ok(None),
        Value::String(path) if !path.trim().is_empty() => Ok(Some(Focus::from_path(path.trim()))),
        Value::Object(_) => {
            let focus: Focus = serde_json::from_value(value).context("parse focus object")?;
            Ok((!focus.path.trim().is_empty()).then_some(focus))
        }
        _ => Ok(None),
    }
}

fn strip_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_is_a_config_error() {
        let config = OracleConfig {
            api_key_env: "EXEC_WORKER_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..OracleConfig::default()
        };
        let err = ChatOracle::from_env(&config, "gpt-4o-mini").expect_err("should fail");
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::MissingCredential(
                "EXEC_WORKER_TEST_KEY_THAT_IS_NEVER_SET".to_string()
            ))
        );
    }

    #[test]
    fn string_lists_tolerate_fences() {
        let list = parse_string_list("```json\n[\"a\", \" b \", null, 3]\n```").expect("parse");
        assert_eq!(list, vec!["a", "b", "3"]);
        assert!(parse_string_list("[]").is_err());
        assert!(parse_string_list("{\"a\": 1}").is_err());
    }

    #[test]
    fn focus_accepts_object_string_or_null() {
        assert_eq!(
            parse_focus("{\"label\": \"lib\", \"path\": \"src/lib.rs\"}").expect("parse"),
            Some(Focus {
                label: "lib".to_string(),
                path: "src/lib.rs".to_string()
            })
        );
        assert_eq!(
            parse_focus("\"src/main.rs\"").expect("parse"),
            Some(Focus::from_path("src/main.rs"))
        );
        assert_eq!(parse_focus("null").expect("parse"), None);
        assert!(parse_focus("not json").is_err());
    }
}
