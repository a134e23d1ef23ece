//! The result contract every node returns, and the side effects it may carry.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::callback::Callback;
use crate::core::document::JsonDocument;

/// Outcome label used by nodes with exactly one way out.
pub const SINGLE_OUTCOME: &str = "outcome";
/// Outcome labels used by boolean decision nodes.
pub const TRUE_OUTCOME: &str = "true";
pub const FALSE_OUTCOME: &str = "false";

/// Session properties to apply once the session exists.
///
/// `None` is a removal marker: the property must be deleted from the session,
/// not set to an empty value.
pub type SessionProperties = BTreeMap<String, Option<String>>;

/// Deferred outbound call, executed by the platform after the flow completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Webhook {
    pub name: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

/// Deferred post-commit action: a hook type plus its opaque configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHookDescriptor {
    pub hook_type: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub config: Value,
}

/// The identity a node resolved for the flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifiedIdentity {
    pub username: String,
    #[serde(default = "default_identity_kind")]
    pub kind: String,
}

fn default_identity_kind() -> String {
    "user".to_string()
}

impl IdentifiedIdentity {
    pub fn user(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            kind: default_identity_kind(),
        }
    }
}

/// Set or remove one session property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPropertyChange {
    pub key: String,
    pub value: Option<String>,
}

/// What the node wants the driver to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    /// Pause and present these callbacks to the caller.
    Suspend { callbacks: Vec<Callback> },
    /// Follow the edge labelled `outcome`.
    Goto { outcome: String },
}

/// A node's output: a control decision plus side effects to merge.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub kind: ActionKind,
    /// Replacement shared state; `None` leaves it unchanged.
    pub shared_state: Option<JsonDocument>,
    /// Replacement transient state; `None` leaves it unchanged.
    pub transient_state: Option<JsonDocument>,
    pub session_properties: Vec<SessionPropertyChange>,
    pub webhooks: Vec<Webhook>,
    pub session_hooks: Vec<SessionHookDescriptor>,
    pub identity: Option<IdentifiedIdentity>,
    /// The whole tree parks for an out-of-band event. Only meaningful when suspending.
    pub suspend_duration: Option<Duration>,
}

impl Action {
    pub fn suspend(callbacks: Vec<Callback>) -> Self {
        Self::with_kind(ActionKind::Suspend { callbacks })
    }

    pub fn goto(outcome: impl Into<String>) -> Self {
        Self::with_kind(ActionKind::Goto {
            outcome: outcome.into(),
        })
    }

    pub fn goto_bool(decision: bool) -> Self {
        Self::goto(if decision { TRUE_OUTCOME } else { FALSE_OUTCOME })
    }

    fn with_kind(kind: ActionKind) -> Self {
        Self {
            kind,
            shared_state: None,
            transient_state: None,
            session_properties: Vec::new(),
            webhooks: Vec::new(),
            session_hooks: Vec::new(),
            identity: None,
            suspend_duration: None,
        }
    }

    pub fn is_suspend(&self) -> bool {
        matches!(self.kind, ActionKind::Suspend { .. })
    }

    pub fn outcome(&self) -> Option<&str> {
        match &self.kind {
            ActionKind::Goto { outcome } => Some(outcome),
            ActionKind::Suspend { .. } => None,
        }
    }

    pub fn callbacks(&self) -> &[Callback] {
        match &self.kind {
            ActionKind::Suspend { callbacks } => callbacks,
            ActionKind::Goto { .. } => &[],
        }
    }

    pub fn with_shared_state(mut self, state: JsonDocument) -> Self {
        self.shared_state = Some(state);
        self
    }

    pub fn with_transient_state(mut self, state: JsonDocument) -> Self {
        self.transient_state = Some(state);
        self
    }

    pub fn put_session_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.session_properties.push(SessionPropertyChange {
            key: key.into(),
            value: Some(value.into()),
        });
        self
    }

    pub fn remove_session_property(mut self, key: impl Into<String>) -> Self {
        self.session_properties.push(SessionPropertyChange {
            key: key.into(),
            value: None,
        });
        self
    }

    pub fn add_webhook(mut self, webhook: Webhook) -> Self {
        self.webhooks.push(webhook);
        self
    }

    pub fn add_session_hook(mut self, hook: SessionHookDescriptor) -> Self {
        self.session_hooks.push(hook);
        self
    }

    pub fn with_identity(mut self, identity: IdentifiedIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_suspend_duration(mut self, duration: Duration) -> Self {
        self.suspend_duration = Some(duration);
        self
    }
}
