//! Stable exit codes for factory CLI commands.

/// Command succeeded, or the release manager approved the artifact.
pub const OK: i32 = 0;
/// Invalid input/config or an internal error.
pub const INVALID: i32 = 1;
/// `factory run` ended without approval (budget exhausted or aborted).
pub const NOT_APPROVED: i32 = 2;
