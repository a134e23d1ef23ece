//! Per-invocation input handed to a node's `process`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::callback::Callback;
use crate::core::document::JsonDocument;
use crate::core::error::EngineError;
use crate::core::executor::AuthTreeExecutor;
use crate::core::state::{TreeResult, TreeState};
use crate::core::tree::AuthTree;

/// Inbound request metadata, read-only to nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestMetadata {
    pub client_ip: Option<String>,
    pub locale: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub parameters: BTreeMap<String, String>,
}

/// View of the evaluation passed to one node invocation.
///
/// `callbacks` holds only the answers addressed to this node. Composite nodes
/// narrow it further with [`TreeContext::child`].
pub struct TreeContext<'a> {
    pub node_id: &'a str,
    pub shared_state: JsonDocument,
    pub transient_state: JsonDocument,
    pub request: &'a RequestMetadata,
    pub callbacks: Vec<Callback>,
    /// The tree is being resumed by an out-of-band event rather than by answers.
    pub resuming_after_suspend: bool,
    pub(crate) executor: &'a AuthTreeExecutor,
    pub(crate) depth: usize,
}

impl<'a> TreeContext<'a> {
    /// Context for a node evaluated directly by `executor` at `depth`.
    pub fn new(
        executor: &'a AuthTreeExecutor,
        request: &'a RequestMetadata,
        node_id: &'a str,
        depth: usize,
    ) -> Self {
        Self {
            node_id,
            shared_state: JsonDocument::new(),
            transient_state: JsonDocument::new(),
            request,
            callbacks: Vec::new(),
            resuming_after_suspend: false,
            executor,
            depth,
        }
    }

    pub fn with_state(mut self, shared_state: JsonDocument, transient_state: JsonDocument) -> Self {
        self.shared_state = shared_state;
        self.transient_state = transient_state;
        self
    }

    pub fn with_callbacks(mut self, callbacks: Vec<Callback>) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Context for a child of a composite node, sharing request and depth.
    pub fn child<'b>(
        &'b self,
        node_id: &'b str,
        shared_state: JsonDocument,
        transient_state: JsonDocument,
        callbacks: Vec<Callback>,
    ) -> TreeContext<'b> {
        TreeContext {
            node_id,
            shared_state,
            transient_state,
            request: self.request,
            callbacks,
            resuming_after_suspend: self.resuming_after_suspend,
            executor: self.executor,
            depth: self.depth,
        }
    }

    /// True if any callback was submitted to this node.
    pub fn has_callbacks(&self) -> bool {
        !self.callbacks.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Evaluate `tree` one nesting level below this node.
    ///
    /// With no callbacks and `resume` unset this is a fresh pass from the entry
    /// node; otherwise it resumes at `state.current_node_id`.
    pub fn evaluate_tree(
        &self,
        tree: &AuthTree,
        state: &TreeState,
        callbacks: Vec<Callback>,
        resume: bool,
    ) -> Result<TreeResult, EngineError> {
        self.executor
            .evaluate(tree, state, callbacks, self.request, self.depth + 1, resume)
    }
}
