//! Stable exit codes for the worker CLI.

/// Command succeeded; for `run`, the ticket completed.
pub const OK: i32 = 0;
/// Crash, invalid configuration or any other error.
pub const INVALID: i32 = 1;
/// `run` ended as `failed` or `failed_max_cycles`.
pub const INCOMPLETE: i32 = 2;
