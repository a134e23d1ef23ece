//! Stable exit codes for `authtree` commands.

/// Command succeeded, or the tree reached a `TRUE` decision.
pub const OK: i32 = 0;
/// Invalid workspace, config or tree, or any other error.
pub const INVALID: i32 = 1;
/// `authtree run` reached a `FALSE` decision.
pub const DENIED: i32 = 2;
/// `authtree run` suspended and is waiting for callbacks.
pub const NEED_INPUT: i32 = 3;
