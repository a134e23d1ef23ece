//! Callbacks: typed requests for external input issued when a node suspends.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Conventional input field holding the caller's answer.
pub const VALUE_INPUT: &str = "value";

/// A request for input presented to the caller, and later the caller's answer.
///
/// `output` carries what the caller should render (prompts, default values);
/// `input` carries what the caller submitted. `id` is the routing tag written by
/// page nodes so answers reach the child that asked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Callback {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub output: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub input: Map<String, Value>,
}

impl Callback {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: None,
            output: Map::new(),
            input: Map::new(),
        }
    }

    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.output.insert(key.into(), value.into());
        self
    }

    /// Fill in the caller's answer under [`VALUE_INPUT`].
    pub fn answered(mut self, value: impl Into<Value>) -> Self {
        self.input.insert(VALUE_INPUT.to_string(), value.into());
        self
    }

    pub fn with_id(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }

    pub fn answer(&self) -> Option<&Value> {
        self.input.get(VALUE_INPUT)
    }

    pub fn is_answered(&self) -> bool {
        self.answer().is_some_and(|value| !value.is_null())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unanswered_callback_omits_empty_sections() {
        let callback = Callback::new("NameCallback").with_output("prompt", "User Name");
        let raw = serde_json::to_value(&callback).expect("serialize");
        assert_eq!(raw, json!({"type": "NameCallback", "output": {"prompt": "User Name"}}));
    }

    #[test]
    fn null_answer_is_not_an_answer() {
        let callback = Callback::new("NameCallback").answered(Value::Null);
        assert!(!callback.is_answered());
        assert!(Callback::new("NameCallback").answered("bob").is_answered());
    }
}
