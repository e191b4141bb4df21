//! Side-effecting adapters used by the ticket-execution engine.

pub mod codebase;
pub mod config;
pub mod edits;
pub mod git;
pub mod journal;
pub mod layout;
pub mod oracle;
pub mod process;
pub mod prompt;
pub mod task_tree;
