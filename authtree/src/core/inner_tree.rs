//! Inner-tree node: evaluates a whole tree as a single decision node.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::core::action::{
    Action, FALSE_OUTCOME, IdentifiedIdentity, SessionProperties, SessionPropertyChange,
    TRUE_OUTCOME,
};
use crate::core::context::TreeContext;
use crate::core::error::{ConfigError, NodeError};
use crate::core::node::{Node, NodeKind};
use crate::core::registry::BuildContext;
use crate::core::state::{Outcome, TreeState};
use crate::core::tree::{AuthTree, NodeSpec, TreeId};

pub const INNER_TREE_TYPE: &str = "inner-tree";
const STATE_NAMESPACE: &str = "innerTree";

#[derive(Debug, Deserialize)]
struct InnerTreeConfig {
    tree: String,
}

/// What the inner tree needs to resume, parked in the outer shared state.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct InnerCheckpoint {
    current_node_id: Option<String>,
    #[serde(skip_serializing_if = "SessionProperties::is_empty")]
    session_properties: SessionProperties,
    #[serde(skip_serializing_if = "Option::is_none")]
    identity: Option<IdentifiedIdentity>,
}

pub struct InnerTreeEvaluatorNode {
    node_id: String,
    state_key: String,
    tree: Arc<AuthTree>,
}

impl InnerTreeEvaluatorNode {
    /// Node `node_id` of tree `owner`, evaluating `tree`.
    pub fn new(owner: &TreeId, node_id: impl Into<String>, tree: Arc<AuthTree>) -> Self {
        let node_id = node_id.into();
        Self {
            state_key: owner.state_key(STATE_NAMESPACE, &node_id),
            node_id,
            tree,
        }
    }

    /// Resolve the referenced tree in the node's own realm.
    pub fn from_spec(spec: &NodeSpec<'_>, build: &BuildContext<'_>) -> Result<Self, ConfigError> {
        let config: InnerTreeConfig = serde_json::from_value(spec.config.clone())
            .map_err(|err| ConfigError::invalid(spec.node_id, err.to_string()))?;
        let tree = build
            .trees
            .get_tree(spec.realm(), &config.tree)
            .ok_or_else(|| ConfigError::TreeNotFound {
                realm: spec.realm().to_string(),
                name: config.tree.clone(),
            })?;
        Ok(Self::new(spec.tree, spec.node_id, tree))
    }

    pub fn tree(&self) -> &AuthTree {
        &self.tree
    }

    pub fn state_key(&self) -> &str {
        &self.state_key
    }

    fn read_checkpoint(&self, raw: &Value) -> Result<InnerCheckpoint, NodeError> {
        serde_json::from_value(raw.clone()).map_err(|err| NodeError::InvalidState {
            key: self.state_key.clone(),
            message: err.to_string(),
        })
    }
}

impl Node for InnerTreeEvaluatorNode {
    fn process(&self, context: &TreeContext<'_>) -> Result<Action, NodeError> {
        let key = self.state_key.as_str();
        let checkpoint = match context.shared_state.get(key) {
            Some(raw) => Some(self.read_checkpoint(raw)?),
            None => None,
        };
        let resuming = checkpoint.is_some() && (context.has_callbacks() || context.resuming_after_suspend);

        let mut sub_state = TreeState::new(context.shared_state.without(key));
        if let (true, Some(checkpoint)) = (resuming, checkpoint) {
            sub_state.current_node_id = checkpoint.current_node_id;
            sub_state.session_properties = checkpoint.session_properties;
            sub_state.identity = checkpoint.identity;
        }
        debug!(
            node_id = %self.node_id,
            tree = %self.tree.id(),
            resuming,
            "evaluating inner tree"
        );

        let result = context
            .evaluate_tree(&self.tree, &sub_state, context.callbacks.clone(), resuming)
            .map_err(|err| NodeError::InnerTree(Box::new(err)))?;
        let finished = result.state;

        let mut action = match result.outcome {
            Outcome::NeedInput => {
                let parked = InnerCheckpoint {
                    current_node_id: finished.current_node_id,
                    session_properties: finished.session_properties,
                    identity: finished.identity,
                };
                let parked = serde_json::to_value(&parked).map_err(anyhow::Error::from)?;
                let mut action = Action::suspend(result.callbacks)
                    .with_shared_state(finished.shared_state.with(key, parked));
                action.suspend_duration = result.suspend_duration;
                action
            }
            decided => {
                let mut action = Action::goto_bool(decided == Outcome::True)
                    .with_shared_state(finished.shared_state.without(key));
                action.session_properties = finished
                    .session_properties
                    .into_iter()
                    .map(|(key, value)| SessionPropertyChange { key, value })
                    .collect();
                action.identity = finished.identity;
                action
            }
        };
        action.webhooks = finished.webhooks;
        action.session_hooks = finished.session_hooks;
        Ok(action)
    }

    fn outcomes(&self) -> Vec<String> {
        vec![TRUE_OUTCOME.to_string(), FALSE_OUTCOME.to_string()]
    }

    fn kind(&self) -> NodeKind {
        NodeKind::InnerTree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::action::{SINGLE_OUTCOME, Webhook};
    use crate::core::context::RequestMetadata;
    use crate::core::document::JsonDocument;
    use crate::core::error::EngineError;
    use crate::core::tree::{FALSE_DECISION, TRUE_DECISION, TreeRepository};
    use crate::test_support::{FnNode, TestEngine, answer, prompt_node};
    use serde_json::json;

    fn inner_tree() -> AuthTree {
        AuthTree::builder("root", "inner")
            .entry("ask")
            .node("ask", "prompt-otp", Value::Null)
            .node("mark", "mark", Value::Null)
            .edge("ask", SINGLE_OUTCOME, "mark")
            .edge("mark", SINGLE_OUTCOME, TRUE_DECISION)
            .build()
    }

    fn owner() -> TreeId {
        TreeId::new("root", "outer")
    }

    fn engine() -> TestEngine {
        let mark = FnNode::single(|ctx| {
            Ok(Action::goto(SINGLE_OUTCOME)
                .with_shared_state(ctx.shared_state.with("inner-done", true))
                .put_session_property("mfa", "otp")
                .add_webhook(Webhook {
                    name: "audit".to_string(),
                    data: json!({}),
                }))
        });
        TestEngine::builder()
            .node("prompt-otp", prompt_node("otp"))
            .node("mark", mark)
            .tree(inner_tree())
            .build()
    }

    fn run(
        engine: &TestEngine,
        node: &InnerTreeEvaluatorNode,
        shared: JsonDocument,
        callbacks: Vec<crate::core::callback::Callback>,
    ) -> Action {
        let request = RequestMetadata::default();
        let context = TreeContext::new(&engine.executor, &request, "sub", 0)
            .with_state(shared, JsonDocument::new())
            .with_callbacks(callbacks);
        node.process(&context).expect("inner tree")
    }

    #[test]
    fn suspends_then_merges_final_state() {
        let engine = engine();
        let node = InnerTreeEvaluatorNode::new(&owner(), "sub", engine.tree("inner"));
        let outer = JsonDocument::new().with("username", "alice");

        let first = run(&engine, &node, outer, Vec::new());
        assert_eq!(first.callbacks().len(), 1);
        let shared = first.shared_state.clone().expect("shared");
        assert_eq!(node.state_key(), "__authtree.innerTree.root/outer/sub");
        assert_eq!(
            shared.get(node.state_key()).and_then(|cp| cp.get("currentNodeId")),
            Some(&json!("ask"))
        );
        assert_eq!(shared.get_str("username"), Some("alice"));

        let done = run(&engine, &node, shared, vec![answer(&first.callbacks()[0], "123456")]);
        assert_eq!(done.outcome(), Some(TRUE_OUTCOME));
        let shared = done.shared_state.expect("shared");
        let expected = JsonDocument::new()
            .with("username", "alice")
            .with("otp", "123456")
            .with("inner-done", true);
        assert_eq!(shared, expected);
        assert_eq!(done.session_properties.len(), 1);
        assert_eq!(done.webhooks.len(), 1);
    }

    #[test]
    fn failed_inner_tree_maps_to_false() {
        let tree = AuthTree::builder("root", "deny")
            .entry("no")
            .node("no", "no", Value::Null)
            .edge("no", SINGLE_OUTCOME, FALSE_DECISION)
            .build();
        let engine = TestEngine::builder()
            .node("no", FnNode::single(|_| Ok(Action::goto(SINGLE_OUTCOME))))
            .tree(tree)
            .build();
        let node = InnerTreeEvaluatorNode::new(&owner(), "sub", engine.tree("deny"));
        let action = run(&engine, &node, JsonDocument::new(), Vec::new());
        assert_eq!(action.outcome(), Some(FALSE_OUTCOME));
    }

    #[test]
    fn inner_errors_are_wrapped() {
        let tree = AuthTree::builder("root", "broken")
            .entry("missing")
            .build();
        let engine = TestEngine::builder().tree(tree).build();
        let node = InnerTreeEvaluatorNode::new(&owner(), "sub", engine.tree("broken"));
        let request = RequestMetadata::default();
        let context = TreeContext::new(&engine.executor, &request, "sub", 0);
        let err = node.process(&context).err().expect("broken tree");
        assert!(matches!(err, NodeError::InnerTree(ref inner) if matches!(**inner, EngineError::Config(_))));
    }

    #[test]
    fn missing_tree_is_config_error() {
        let engine = TestEngine::builder().build();
        let tree = TreeId::new("root", "outer");
        let config = json!({"tree": "nowhere"});
        let spec = NodeSpec {
            node_id: "sub",
            node_type: INNER_TREE_TYPE,
            display_name: "Sub",
            tree: &tree,
            config: &config,
        };
        let build = BuildContext {
            factory: engine.executor.factory(),
            trees: &TreeRepository::new(),
        };
        let err = InnerTreeEvaluatorNode::from_spec(&spec, &build)
            .err()
            .expect("missing tree");
        assert!(matches!(err, ConfigError::TreeNotFound { ref name, .. } if name == "nowhere"));
    }
}
