//! Built-in primitive nodes.
//!
//! These cover the generic mechanics of a flow (collecting input, branching on
//! state, counting retries, recording side effects, parking the tree). Real
//! credential checks live outside the engine and register their own types.

mod collector;
mod decision;
mod effects;
mod retry;
mod suspend;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::core::error::ConfigError;
use crate::core::node::Node;
use crate::core::registry::NodeRegistry;
use crate::core::tree::NodeSpec;

pub use collector::{COLLECTOR_TYPE, CollectorNode};
pub use decision::{IDENTIFY_TYPE, IdentifyNode, STATE_MATCH_TYPE, StateMatchNode};
pub use effects::{
    REGISTER_SESSION_HOOK_TYPE, REGISTER_WEBHOOK_TYPE, RegisterSessionHookNode, RegisterWebhookNode,
    SET_SESSION_PROPERTIES_TYPE, SetSessionPropertiesNode,
};
pub use retry::{REJECT_OUTCOME, RETRY_LIMIT_TYPE, RETRY_OUTCOME, RetryLimitNode};
pub use suspend::{SUSPEND_TYPE, SuspendNode};

/// Register every built-in primitive node type.
pub fn register_builtins(registry: &mut NodeRegistry) {
    registry
        .register(COLLECTOR_TYPE, |spec, _| shared(CollectorNode::from_spec(spec)))
        .register(STATE_MATCH_TYPE, |spec, _| shared(StateMatchNode::from_spec(spec)))
        .register(IDENTIFY_TYPE, |spec, _| shared(IdentifyNode::from_spec(spec)))
        .register(RETRY_LIMIT_TYPE, |spec, _| shared(RetryLimitNode::from_spec(spec)))
        .register(SET_SESSION_PROPERTIES_TYPE, |spec, _| {
            shared(SetSessionPropertiesNode::from_spec(spec))
        })
        .register(REGISTER_WEBHOOK_TYPE, |spec, _| {
            shared(RegisterWebhookNode::from_spec(spec))
        })
        .register(REGISTER_SESSION_HOOK_TYPE, |spec, _| {
            shared(RegisterSessionHookNode::from_spec(spec))
        })
        .register(SUSPEND_TYPE, |spec, _| shared(SuspendNode::from_spec(spec)));
}

fn shared<N: Node + 'static>(node: Result<N, ConfigError>) -> Result<Arc<dyn Node>, ConfigError> {
    Ok(Arc::new(node?))
}

/// Deserialize a node's config; a missing (`null`) config reads as `{}`.
fn parse_config<T: DeserializeOwned>(spec: &NodeSpec<'_>) -> Result<T, ConfigError> {
    let config = match spec.config {
        Value::Null => Value::Object(Map::new()),
        other => other.clone(),
    };
    serde_json::from_value(config).map_err(|err| ConfigError::invalid(spec.node_id, err.to_string()))
}
