use serde::Deserialize;
use tracing::debug;

use crate::core::action::Action;
use crate::core::context::TreeContext;
use crate::core::error::{ConfigError, NodeError};
use crate::core::node::Node;
use crate::core::tree::NodeSpec;

use super::parse_config;

pub const RETRY_LIMIT_TYPE: &str = "retry-limit";
pub const RETRY_OUTCOME: &str = "retry";
pub const REJECT_OUTCOME: &str = "reject";
const STATE_NAMESPACE: &str = "retry";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetryLimitConfig {
    retry_limit: u64,
}

/// Allows `retryLimit` passes through `retry`, then `reject` and resets.
pub struct RetryLimitNode {
    counter_key: String,
    limit: u64,
}

impl RetryLimitNode {
    pub fn from_spec(spec: &NodeSpec<'_>) -> Result<Self, ConfigError> {
        let config: RetryLimitConfig = parse_config(spec)?;
        Ok(Self {
            counter_key: spec.tree.state_key(STATE_NAMESPACE, spec.node_id),
            limit: config.retry_limit,
        })
    }
}

impl Node for RetryLimitNode {
    fn process(&self, context: &TreeContext<'_>) -> Result<Action, NodeError> {
        let used = match context.shared_state.get(&self.counter_key) {
            None => 0,
            Some(raw) => raw.as_u64().ok_or_else(|| NodeError::InvalidState {
                key: self.counter_key.clone(),
                message: "retry counter must be a non-negative integer".to_string(),
            })?,
        };
        debug!(node_id = context.node_id, used, limit = self.limit, "checking retry budget");
        if used < self.limit {
            return Ok(Action::goto(RETRY_OUTCOME)
                .with_shared_state(context.shared_state.with(&self.counter_key, used + 1)));
        }
        Ok(Action::goto(REJECT_OUTCOME)
            .with_shared_state(context.shared_state.without(&self.counter_key)))
    }

    fn outcomes(&self) -> Vec<String> {
        vec![RETRY_OUTCOME.to_string(), REJECT_OUTCOME.to_string()]
    }
}
