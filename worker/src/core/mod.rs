//! Deterministic, pure logic shared by the ticket-execution engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod complexity;
pub mod gates;
pub mod heuristics;
pub mod plan;
pub mod recovery;
pub mod types;
