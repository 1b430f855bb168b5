//! Turn a Markdown task list into a validated dependency graph and a store of
//! per-task Markdown units.
//!
//! The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (line grammar, graph building,
//!   ordering views, conflict classification). No I/O.
//! - **[`io`]**: Side-effecting operations (config file, unit files, the task
//!   store).
//!
//! [`generate`] wires the two together for the CLI commands.

pub mod core;
pub mod exit_codes;
pub mod generate;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
