//! Authentication tree execution engine.
//!
//! A tree is a graph of nodes joined by outcome-labelled edges. Evaluating it
//! walks from the entry node until a terminal decision, or suspends to ask the
//! caller for input and returns a checkpoint to resume from later. The layout
//! keeps a strict separation:
//!
//! - **[`core`]**: the engine itself (tree model, node protocol, driver loop,
//!   page and inner-tree composites, session hooks, validation). No I/O.
//! - **[`nodes`]**: built-in primitive node types.
//! - **[`io`]**: config, tree definitions and checkpoints on disk.
//!
//! Orchestration modules ([`run`], [`validate`]) combine core and I/O to
//! implement the CLI commands.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod nodes;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;
