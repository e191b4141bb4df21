//! Task-tree bookkeeping in `.worker/task_tree.json`.
//!
//! One tree per workspace; each ticket owns the node `node-<ticket>`. The
//! controller updates that node once per cycle and embeds a snapshot of the
//! tree in every plan prompt.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::{AffectedNode, DeepPlan, Evidence, NodeStatus, Ticket};
use crate::io::config::write_atomic;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub deps: Vec<String>,
    pub status: NodeStatus,
    pub coverage_pct: u8,
    #[serde(default)]
    pub acceptance: Vec<String>,
    #[serde(default)]
    pub evidence: Evidence,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTree {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub nodes: Vec<TaskNode>,
}

/// Progress observed in one cycle for a ticket node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleRecord {
    pub status: NodeStatus,
    pub coverage_pct: u8,
    pub commits: Vec<String>,
    pub files: Vec<String>,
    pub note: String,
}

/// Node id owned by a ticket.
pub fn node_id(ticket_id: &str) -> String {
    format!("node-{ticket_id}")
}

impl TaskTree {
    /// Load the tree, or start a new one rooted at this ticket. Either way the
    /// ticket's node exists afterwards, seeded from the deep plan.
    pub fn load_or_create(path: &Path, ticket: &Ticket, deep_plan: &DeepPlan) -> Result<Self> {
        let mut tree = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("read task tree {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("parse task tree {}", path.display()))?
        } else {
            TaskTree {
                id: ticket.ticket_id.clone(),
                title: ticket.title.clone(),
                nodes: Vec::new(),
            }
        };
        tree.seed_node(ticket, deep_plan);
        Ok(tree)
    }

    fn seed_node(&mut self, ticket: &Ticket, deep_plan: &DeepPlan) {
        let id = node_id(&ticket.ticket_id);
        let notes = format!(
            "Deep planning: {} requirements, {} risks, complexity {}. Strategy: {}",
            deep_plan.requirements.len(),
            deep_plan.risks.len(),
            deep_plan.estimated_complexity.as_str(),
            deep_plan.strategy
        );
        match self.nodes.iter_mut().find(|n| n.id == id) {
            Some(node) => {
                node.acceptance = deep_plan.success_criteria.clone();
                node.notes = notes;
            }
            None => self.nodes.push(TaskNode {
                id,
                title: ticket.title.clone(),
                deps: Vec::new(),
                status: NodeStatus::Unchanged,
                coverage_pct: 0,
                acceptance: deep_plan.success_criteria.clone(),
                evidence: Evidence::default(),
                notes,
            }),
        }
    }

    pub fn node(&self, id: &str) -> Option<&TaskNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Apply one cycle's progress. Evidence accumulates without duplicates;
    /// coverage never decreases.
    pub fn record_cycle(&mut self, id: &str, record: &CycleRecord) -> Option<AffectedNode> {
        let node = self.nodes.iter_mut().find(|n| n.id == id)?;
        if node.status != NodeStatus::Done {
            node.status = record.status;
        }
        node.coverage_pct = node.coverage_pct.max(record.coverage_pct.min(100));
        extend_unique(&mut node.evidence.commits, &record.commits);
        extend_unique(&mut node.evidence.files, &record.files);
        node.notes = record.note.clone();
        Some(AffectedNode {
            id: node.id.clone(),
            status: node.status,
            coverage_pct: node.coverage_pct,
            evidence: node.evidence.clone(),
            note: node.notes.clone(),
        })
    }

    /// Pretty JSON embedded in plan prompts.
    pub fn snapshot(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut buf = serde_json::to_string_pretty(self).context("serialize task tree")?;
        buf.push('\n');
        debug!(path = %path.display(), nodes = self.nodes.len(), "saving task tree");
        write_atomic(path, &buf)
    }
}

fn extend_unique(into: &mut Vec<String>, items: &[String]) {
    for item in items {
        if !into.contains(item) {
            into.push(item.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Complexity;

    fn ticket() -> Ticket {
        Ticket {
            ticket_id: "7".to_string(),
            title: "Say hello".to_string(),
            description: "Print hello".to_string(),
            eoi: None,
        }
    }

    fn deep_plan() -> DeepPlan {
        DeepPlan {
            requirements: vec!["Print hello".to_string()],
            success_criteria: vec!["Code compiles".to_string(), "All tests pass".to_string()],
            risks: Vec::new(),
            strategy: "incremental".to_string(),
            estimated_complexity: Complexity::Low,
        }
    }

    fn record(status: NodeStatus, coverage_pct: u8, commit: &str) -> CycleRecord {
        CycleRecord {
            status,
            coverage_pct,
            commits: vec![commit.to_string()],
            files: vec!["src/lib.rs".to_string()],
            note: format!("{coverage_pct}%"),
        }
    }

    #[test]
    fn new_tree_seeds_ticket_node_from_deep_plan() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tree = TaskTree::load_or_create(&temp.path().join("tree.json"), &ticket(), &deep_plan())
            .expect("create");
        let node = tree.node("node-7").expect("node");
        assert_eq!(node.status, NodeStatus::Unchanged);
        assert_eq!(node.acceptance, deep_plan().success_criteria);
        assert!(node.notes.starts_with("Deep planning"));
    }

    #[test]
    fn cycles_accumulate_evidence_and_persist() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("tree.json");
        let mut tree = TaskTree::load_or_create(&path, &ticket(), &deep_plan()).expect("create");

        tree.record_cycle("node-7", &record(NodeStatus::Partial, 50, "abc"))
            .expect("node");
        let affected = tree
            .record_cycle("node-7", &record(NodeStatus::Partial, 10, "def"))
            .expect("node");
        assert_eq!(affected.coverage_pct, 50);
        assert_eq!(affected.evidence.commits, vec!["abc", "def"]);
        assert_eq!(affected.evidence.files, vec!["src/lib.rs"]);

        tree.save(&path).expect("save");
        let reloaded = TaskTree::load_or_create(&path, &ticket(), &deep_plan()).expect("load");
        assert_eq!(reloaded, tree);
        assert!(reloaded.snapshot().contains("\"node-7\""));
    }

    #[test]
    fn done_is_sticky() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut tree = TaskTree::load_or_create(&temp.path().join("t.json"), &ticket(), &deep_plan())
            .expect("create");
        tree.record_cycle("node-7", &record(NodeStatus::Done, 100, "a"));
        let affected = tree
            .record_cycle("node-7", &record(NodeStatus::Unchanged, 0, "a"))
            .expect("node");
        assert_eq!(affected.status, NodeStatus::Done);
        assert!(tree.record_cycle("node-missing", &record(NodeStatus::Done, 1, "a")).is_none());
    }
}
