//! Stable exit codes for taskgraph CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Input was rejected (parse or graph errors) or an I/O step failed.
pub const INVALID: i32 = 1;
/// Input was valid but collided with persisted tasks or differing units.
pub const CONFLICT: i32 = 2;
