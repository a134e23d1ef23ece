//! The evaluation engine: tree model, node protocol, driver loop and the
//! composite nodes.
//!
//! Core modules perform no I/O. Trees, checkpoints and callback answers come in
//! as values; results and updated checkpoints go out as values.

pub mod action;
pub mod callback;
pub mod context;
pub mod document;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod inner_tree;
pub mod node;
pub mod page;
pub mod registry;
pub mod state;
pub mod tree;
pub mod validation;
