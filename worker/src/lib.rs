//! Autonomous ticket-execution engine.
//!
//! A ticket is planned once up front, then worked in bounded cycles of
//! focus selection, plan generation, step execution, validation and
//! conditional commits until it is ready or the cycle budget runs out.
//!
//! - **[`core`]**: pure, deterministic logic (data model, plan parsing,
//!   complexity, error recovery, gates). No I/O.
//! - **[`io`]**: side-effecting adapters (config, shell, git, journal, edits,
//!   codebase index, oracle client, task tree).
//!
//! Orchestration modules ([`planner`], [`executor`], [`validate`],
//! [`controller`], [`runs`]) combine the two.

pub mod controller;
pub mod core;
pub mod executor;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod planner;
pub mod runs;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;
