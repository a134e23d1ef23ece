//! Error taxonomy for tree configuration and evaluation.
//!
//! Configuration errors describe trees that can never evaluate correctly and
//! should be caught before publication. Node errors are raised by a node's
//! `process`. Engine errors wrap both and add failures of the driver itself.

use thiserror::Error;

/// A tree, node or composite is configured in a way that cannot evaluate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("tree '{name}' not found in realm '{realm}'")]
    TreeNotFound { realm: String, name: String },

    #[error("node '{node_id}' not found in tree '{tree}'")]
    NodeNotFound { tree: String, node_id: String },

    #[error("tree '{tree}' has no entry node")]
    MissingEntry { tree: String },

    #[error("unknown node type '{node_type}' for node '{node_id}'")]
    UnknownNodeType { node_type: String, node_id: String },

    #[error("node '{node_id}' in tree '{tree}' has no edge for outcome '{outcome}'")]
    MissingEdge {
        tree: String,
        node_id: String,
        outcome: String,
    },

    #[error("page '{page_id}' has no child nodes")]
    EmptyPage { page_id: String },

    #[error("page '{page_id}' cannot contain child '{child_id}' of kind {kind}")]
    IllegalPageChild {
        page_id: String,
        child_id: String,
        kind: &'static str,
    },

    #[error(
        "page '{page_id}' child '{child_id}' has {outcomes} outcomes; only the last child may have more than one"
    )]
    MultiOutcomeChildNotLast {
        page_id: String,
        child_id: String,
        outcomes: usize,
    },

    #[error("invalid config for node '{node_id}': {message}")]
    InvalidNodeConfig { node_id: String, message: String },

    #[error("inner tree cycle: {path}")]
    InnerTreeCycle { path: String },
}

impl ConfigError {
    pub fn invalid(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::InvalidNodeConfig {
            node_id: node_id.into(),
            message: message.into(),
        }
    }
}

/// Failure raised while a node processes its context.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("{0}")]
    Message(String),

    #[error("invalid shared state '{key}': {message}")]
    InvalidState { key: String, message: String },

    #[error("inner tree evaluation failed: {0}")]
    InnerTree(#[source] Box<EngineError>),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NodeError {
    pub fn message(message: impl Into<String>) -> Self {
        NodeError::Message(message.into())
    }
}

/// Failure of one evaluation pass. The caller's checkpoint is never advanced.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("node '{node_id}' failed: {source}")]
    Node {
        node_id: String,
        #[source]
        source: NodeError,
    },

    #[error("node '{node_id}' suspended without callbacks")]
    SuspendWithoutCallbacks { node_id: String },

    #[error("callbacks submitted but checkpoint for tree '{tree}' has no current node")]
    NoResumePoint { tree: String },

    #[error("tree '{tree}' exceeded {max} node invocations in one exchange")]
    StepLimitExceeded { tree: String, max: usize },

    #[error("inner tree depth {depth} exceeds maximum {max}")]
    RecursionLimitExceeded { depth: usize, max: usize },

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] serde_json::Error),

    #[error("session hook '{hook_type}' failed: {message}")]
    Hook { hook_type: String, message: String },
}

impl EngineError {
    /// True if this error, or the error of any nested inner tree, is a configuration error.
    pub fn is_config(&self) -> bool {
        match self {
            EngineError::Config(_) => true,
            EngineError::Node {
                source: NodeError::InnerTree(inner),
                ..
            } => inner.is_config(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_config_error_is_detected_through_inner_tree() {
        let inner = EngineError::Config(ConfigError::MissingEntry {
            tree: "sub".to_string(),
        });
        let outer = EngineError::Node {
            node_id: "inner".to_string(),
            source: NodeError::InnerTree(Box::new(inner)),
        };
        assert!(outer.is_config());
        assert!(outer.to_string().contains("node 'inner' failed"));
    }
}
