//! Stable exit codes for reasoner CLI commands.

/// Command succeeded; for `run`, the run reached a non-error final state.
pub const OK: i32 = 0;
/// Invalid usage or configuration, or another command failure.
pub const INVALID: i32 = 1;
/// `reasoner run` ended in the error phase.
pub const RUN_ERROR: i32 = 3;
