//! The serializable checkpoint carried between exchanges.

use serde::{Deserialize, Serialize};

use crate::core::action::{
    Action, IdentifiedIdentity, SessionHookDescriptor, SessionProperties, Webhook,
};
use crate::core::callback::Callback;
use crate::core::document::JsonDocument;
use crate::core::error::EngineError;

/// Tree-level result of one evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    True,
    False,
    NeedInput,
}

impl Outcome {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Outcome::NeedInput)
    }
}

/// Checkpoint of an evaluation.
///
/// `transient_state` lives for one exchange only and is never serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TreeState {
    pub shared_state: JsonDocument,
    #[serde(skip)]
    pub transient_state: JsonDocument,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub webhooks: Vec<Webhook>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub session_hooks: Vec<SessionHookDescriptor>,
    #[serde(skip_serializing_if = "SessionProperties::is_empty")]
    pub session_properties: SessionProperties,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentifiedIdentity>,
    /// Node that was active when the tree suspended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_node_id: Option<String>,
}

impl TreeState {
    pub fn new(shared_state: JsonDocument) -> Self {
        Self {
            shared_state,
            ..Self::default()
        }
    }

    /// Merge an action's side effects. Webhooks and hooks append, properties
    /// overwrite per key (removals included), state replacements replace.
    pub fn apply(&mut self, action: &Action) {
        if let Some(shared) = &action.shared_state {
            self.shared_state = shared.clone();
        }
        if let Some(transient) = &action.transient_state {
            self.transient_state = transient.clone();
        }
        for change in &action.session_properties {
            self.session_properties
                .insert(change.key.clone(), change.value.clone());
        }
        self.webhooks.extend(action.webhooks.iter().cloned());
        self.session_hooks
            .extend(action.session_hooks.iter().cloned());
        if let Some(identity) = &action.identity {
            self.identity = Some(identity.clone());
        }
    }

    /// Session properties with removals filtered out.
    pub fn resolved_session_properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.session_properties
            .iter()
            .filter_map(|(key, value)| value.as_deref().map(|value| (key.as_str(), value)))
    }
}

/// Result of `AuthTreeExecutor::process`.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeResult {
    pub outcome: Outcome,
    pub state: TreeState,
    /// Callbacks to present; empty unless `outcome` is `NeedInput`.
    pub callbacks: Vec<Callback>,
    pub suspend_duration: Option<std::time::Duration>,
}

/// Serialize a checkpoint to the JSON document handed to the caller.
pub fn encode_checkpoint(state: &TreeState) -> Result<String, EngineError> {
    Ok(serde_json::to_string(state)?)
}

/// Parse a checkpoint returned by the caller. Transient state starts empty.
pub fn decode_checkpoint(raw: &str) -> Result<TreeState, EngineError> {
    Ok(serde_json::from_str(raw)?)
}
