//! Nodes whose only job is to record a side effect and move on.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::core::action::{Action, SINGLE_OUTCOME, SessionHookDescriptor, Webhook};
use crate::core::context::TreeContext;
use crate::core::error::{ConfigError, NodeError};
use crate::core::node::Node;
use crate::core::tree::NodeSpec;

use super::parse_config;

pub const SET_SESSION_PROPERTIES_TYPE: &str = "set-session-properties";
pub const REGISTER_WEBHOOK_TYPE: &str = "register-webhook";
pub const REGISTER_SESSION_HOOK_TYPE: &str = "register-session-hook";

fn single_outcome() -> Vec<String> {
    vec![SINGLE_OUTCOME.to_string()]
}

#[derive(Debug, Deserialize)]
struct SetSessionPropertiesConfig {
    properties: BTreeMap<String, Option<String>>,
}

/// Sets session properties; a `null` value removes the property.
pub struct SetSessionPropertiesNode {
    properties: BTreeMap<String, Option<String>>,
}

impl SetSessionPropertiesNode {
    pub fn from_spec(spec: &NodeSpec<'_>) -> Result<Self, ConfigError> {
        let config: SetSessionPropertiesConfig = parse_config(spec)?;
        Ok(Self {
            properties: config.properties,
        })
    }
}

impl Node for SetSessionPropertiesNode {
    fn process(&self, _context: &TreeContext<'_>) -> Result<Action, NodeError> {
        Ok(self
            .properties
            .iter()
            .fold(Action::goto(SINGLE_OUTCOME), |action, (key, value)| match value {
                Some(value) => action.put_session_property(key, value),
                None => action.remove_session_property(key),
            }))
    }

    fn outcomes(&self) -> Vec<String> {
        single_outcome()
    }
}

pub struct RegisterWebhookNode {
    webhook: Webhook,
}

impl RegisterWebhookNode {
    pub fn from_spec(spec: &NodeSpec<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            webhook: parse_config(spec)?,
        })
    }
}

impl Node for RegisterWebhookNode {
    fn process(&self, _context: &TreeContext<'_>) -> Result<Action, NodeError> {
        Ok(Action::goto(SINGLE_OUTCOME).add_webhook(self.webhook.clone()))
    }

    fn outcomes(&self) -> Vec<String> {
        single_outcome()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterSessionHookConfig {
    hook_type: String,
    #[serde(default)]
    config: Value,
}

pub struct RegisterSessionHookNode {
    hook: SessionHookDescriptor,
}

impl RegisterSessionHookNode {
    pub fn from_spec(spec: &NodeSpec<'_>) -> Result<Self, ConfigError> {
        let config: RegisterSessionHookConfig = parse_config(spec)?;
        Ok(Self {
            hook: SessionHookDescriptor {
                hook_type: config.hook_type,
                config: config.config,
            },
        })
    }
}

impl Node for RegisterSessionHookNode {
    fn process(&self, _context: &TreeContext<'_>) -> Result<Action, NodeError> {
        Ok(Action::goto(SINGLE_OUTCOME).add_session_hook(self.hook.clone()))
    }

    fn outcomes(&self) -> Vec<String> {
        single_outcome()
    }
}
