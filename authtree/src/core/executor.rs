//! The driver loop: walk a tree, invoke nodes, suspend or decide.

use std::mem;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::core::action::ActionKind;
use crate::core::callback::Callback;
use crate::core::context::{RequestMetadata, TreeContext};
use crate::core::document::JsonDocument;
use crate::core::error::EngineError;
use crate::core::registry::NodeFactory;
use crate::core::state::{Outcome, TreeResult, TreeState};
use crate::core::tree::{AuthTree, EdgeTarget};

/// Guards against runaway evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorLimits {
    /// Maximum node invocations per tree per exchange.
    pub max_steps: usize,
    /// Maximum inner-tree nesting depth.
    pub max_depth: usize,
}

impl Default for ExecutorLimits {
    fn default() -> Self {
        Self {
            max_steps: 256,
            max_depth: 16,
        }
    }
}

/// Evaluates trees one exchange at a time.
///
/// The executor keeps no state between calls: where a suspended evaluation
/// stands is entirely described by the [`TreeState`] it returned.
pub struct AuthTreeExecutor {
    factory: Arc<dyn NodeFactory>,
    limits: ExecutorLimits,
}

impl AuthTreeExecutor {
    pub fn new(factory: Arc<dyn NodeFactory>) -> Self {
        Self {
            factory,
            limits: ExecutorLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: ExecutorLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> ExecutorLimits {
        self.limits
    }

    pub fn factory(&self) -> &dyn NodeFactory {
        self.factory.as_ref()
    }

    /// Run one exchange.
    ///
    /// With no callbacks the tree starts fresh at its entry node; otherwise the
    /// node recorded in `state.current_node_id` receives the callbacks. On error
    /// `state` is untouched and remains the last good checkpoint.
    #[instrument(skip_all, fields(tree = %tree.id(), callbacks = callbacks.len()))]
    pub fn process(
        &self,
        tree: &AuthTree,
        state: &TreeState,
        callbacks: Vec<Callback>,
        request: &RequestMetadata,
    ) -> Result<TreeResult, EngineError> {
        self.evaluate(tree, state, callbacks, request, 0, false)
    }

    /// Resume a tree parked for an out-of-band event, without callbacks.
    #[instrument(skip_all, fields(tree = %tree.id()))]
    pub fn resume_suspended(
        &self,
        tree: &AuthTree,
        state: &TreeState,
        request: &RequestMetadata,
    ) -> Result<TreeResult, EngineError> {
        self.evaluate(tree, state, Vec::new(), request, 0, true)
    }

    pub(crate) fn evaluate(
        &self,
        tree: &AuthTree,
        state: &TreeState,
        callbacks: Vec<Callback>,
        request: &RequestMetadata,
        depth: usize,
        resume: bool,
    ) -> Result<TreeResult, EngineError> {
        if depth > self.limits.max_depth {
            return Err(EngineError::RecursionLimitExceeded {
                depth,
                max: self.limits.max_depth,
            });
        }

        let tree_id = tree.id();
        let mut working = state.clone();
        let mut current = if resume || !callbacks.is_empty() {
            let node_id = working
                .current_node_id
                .clone()
                .ok_or_else(|| EngineError::NoResumePoint {
                    tree: tree.name.clone(),
                })?;
            tree.node(&node_id)?;
            node_id
        } else {
            working.transient_state = JsonDocument::new();
            tree.entry()?.to_string()
        };
        working.current_node_id = None;

        // Submitted answers and the resume flag belong to the first node only.
        let mut pending_callbacks = callbacks;
        let mut resuming_after_suspend = resume;

        for step in 1..=self.limits.max_steps {
            let spec = tree.node_spec(&tree_id, &current)?;
            let node = self.factory.create_node(&spec)?;
            debug!(node_id = %current, node_type = spec.node_type, step, depth, "processing node");

            let context = TreeContext {
                node_id: &current,
                shared_state: working.shared_state.clone(),
                transient_state: working.transient_state.clone(),
                request,
                callbacks: mem::take(&mut pending_callbacks),
                resuming_after_suspend: mem::take(&mut resuming_after_suspend),
                executor: self,
                depth,
            };
            let action = node
                .process(&context)
                .map_err(|source| EngineError::Node {
                    node_id: current.clone(),
                    source,
                })?;
            drop(context);

            working.apply(&action);
            match action.kind {
                ActionKind::Suspend { callbacks } => {
                    if callbacks.is_empty() {
                        return Err(EngineError::SuspendWithoutCallbacks { node_id: current });
                    }
                    info!(node_id = %current, callbacks = callbacks.len(), depth, "tree suspended");
                    working.current_node_id = Some(current);
                    working.transient_state = JsonDocument::new();
                    return Ok(TreeResult {
                        outcome: Outcome::NeedInput,
                        state: working,
                        callbacks,
                        suspend_duration: action.suspend_duration,
                    });
                }
                ActionKind::Goto { outcome } => match tree.next(&current, &outcome)? {
                    EdgeTarget::Decision(decision) => {
                        info!(node_id = %current, %outcome, decision, depth, "tree reached decision");
                        working.transient_state = JsonDocument::new();
                        return Ok(TreeResult {
                            outcome: if decision { Outcome::True } else { Outcome::False },
                            state: working,
                            callbacks: Vec::new(),
                            suspend_duration: None,
                        });
                    }
                    EdgeTarget::Node(next) => {
                        debug!(from = %current, to = next, %outcome, "following edge");
                        current = next.to_string();
                    }
                },
            }
        }

        Err(EngineError::StepLimitExceeded {
            tree: tree.name.clone(),
            max: self.limits.max_steps,
        })
    }
}
