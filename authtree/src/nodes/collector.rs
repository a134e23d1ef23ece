use serde::Deserialize;
use tracing::debug;

use crate::core::action::{Action, SINGLE_OUTCOME};
use crate::core::callback::Callback;
use crate::core::context::TreeContext;
use crate::core::error::{ConfigError, NodeError};
use crate::core::node::Node;
use crate::core::tree::NodeSpec;

use super::parse_config;

pub const COLLECTOR_TYPE: &str = "collector";
const DEFAULT_CALLBACK_TYPE: &str = "NameCallback";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CollectorConfig {
    key: String,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    callback_type: Option<String>,
    /// Store the answer in transient state so it never reaches the checkpoint.
    #[serde(default)]
    transient: bool,
}

/// Asks for one value and stores the answer under `key`.
pub struct CollectorNode {
    key: String,
    prompt: String,
    callback_type: String,
    transient: bool,
}

impl CollectorNode {
    pub fn from_spec(spec: &NodeSpec<'_>) -> Result<Self, ConfigError> {
        let config: CollectorConfig = parse_config(spec)?;
        if config.key.is_empty() {
            return Err(ConfigError::invalid(spec.node_id, "key must not be empty"));
        }
        Ok(Self {
            prompt: config.prompt.unwrap_or_else(|| config.key.clone()),
            callback_type: config
                .callback_type
                .unwrap_or_else(|| DEFAULT_CALLBACK_TYPE.to_string()),
            key: config.key,
            transient: config.transient,
        })
    }

    fn request(&self) -> Callback {
        Callback::new(&self.callback_type).with_output("prompt", self.prompt.as_str())
    }
}

impl Node for CollectorNode {
    fn process(&self, context: &TreeContext<'_>) -> Result<Action, NodeError> {
        let answered = context.callbacks.iter().find(|callback| callback.is_answered());
        let Some(answer) = answered.and_then(Callback::answer) else {
            return Ok(Action::suspend(vec![self.request()]));
        };
        debug!(node_id = context.node_id, key = %self.key, "collected answer");
        let action = Action::goto(SINGLE_OUTCOME);
        Ok(if self.transient {
            action.with_transient_state(context.transient_state.with(&self.key, answer.clone()))
        } else {
            action.with_shared_state(context.shared_state.with(&self.key, answer.clone()))
        })
    }

    fn outcomes(&self) -> Vec<String> {
        vec![SINGLE_OUTCOME.to_string()]
    }
}
