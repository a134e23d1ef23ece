use serde::Deserialize;
use serde_json::Value;

use crate::core::action::{Action, FALSE_OUTCOME, IdentifiedIdentity, TRUE_OUTCOME};
use crate::core::context::TreeContext;
use crate::core::error::{ConfigError, NodeError};
use crate::core::node::Node;
use crate::core::tree::NodeSpec;

use super::parse_config;

pub const STATE_MATCH_TYPE: &str = "state-match";
pub const IDENTIFY_TYPE: &str = "identify";

fn decision_outcomes() -> Vec<String> {
    vec![TRUE_OUTCOME.to_string(), FALSE_OUTCOME.to_string()]
}

#[derive(Debug, Deserialize)]
struct StateMatchConfig {
    key: String,
    expected: Value,
}

/// `true` when `key` (transient state first, then shared) equals `expected`.
pub struct StateMatchNode {
    key: String,
    expected: Value,
}

impl StateMatchNode {
    pub fn from_spec(spec: &NodeSpec<'_>) -> Result<Self, ConfigError> {
        let config: StateMatchConfig = parse_config(spec)?;
        Ok(Self {
            key: config.key,
            expected: config.expected,
        })
    }
}

impl Node for StateMatchNode {
    fn process(&self, context: &TreeContext<'_>) -> Result<Action, NodeError> {
        let actual = context
            .transient_state
            .get(&self.key)
            .or_else(|| context.shared_state.get(&self.key));
        Ok(Action::goto_bool(actual == Some(&self.expected)))
    }

    fn outcomes(&self) -> Vec<String> {
        decision_outcomes()
    }
}

#[derive(Debug, Deserialize)]
struct IdentifyConfig {
    #[serde(default = "default_identify_key")]
    key: String,
}

fn default_identify_key() -> String {
    "username".to_string()
}

/// Resolves the flow's identity from a username held in shared state.
pub struct IdentifyNode {
    key: String,
}

impl IdentifyNode {
    pub fn from_spec(spec: &NodeSpec<'_>) -> Result<Self, ConfigError> {
        let config: IdentifyConfig = parse_config(spec)?;
        Ok(Self { key: config.key })
    }
}

impl Node for IdentifyNode {
    fn process(&self, context: &TreeContext<'_>) -> Result<Action, NodeError> {
        match context.shared_state.get_str(&self.key) {
            Some(username) if !username.is_empty() => {
                Ok(Action::goto_bool(true).with_identity(IdentifiedIdentity::user(username)))
            }
            _ => Ok(Action::goto_bool(false)),
        }
    }

    fn outcomes(&self) -> Vec<String> {
        decision_outcomes()
    }
}
