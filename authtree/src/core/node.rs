//! The node capability: one step of an authentication flow.

use std::fmt;

use crate::core::action::Action;
use crate::core::context::TreeContext;
use crate::core::error::NodeError;

/// Structural kind of a node, used to enforce composition rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Primitive,
    Page,
    InnerTree,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Primitive => "primitive",
            NodeKind::Page => "page",
            NodeKind::InnerTree => "inner-tree",
        }
    }
}

/// A unit of work in a tree.
///
/// A single instance may serve many evaluations at once: fields hold
/// configuration only, and all per-evaluation data flows through the context
/// and the returned [`Action`].
pub trait Node: Send + Sync {
    fn process(&self, context: &TreeContext<'_>) -> Result<Action, NodeError>;

    /// Every outcome label this node can return. Used for validation and
    /// rendering, independent of the path taken at runtime.
    fn outcomes(&self) -> Vec<String>;

    fn kind(&self) -> NodeKind {
        NodeKind::Primitive
    }
}
