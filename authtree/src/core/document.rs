//! Immutable, ordered JSON documents used for shared and transient state.
//!
//! A [`JsonDocument`] is a snapshot: every "mutation" returns a new document
//! and leaves the receiver untouched. Clones share the underlying map until one
//! side writes, so handing a snapshot to a node or a sub-tree is cheap and never
//! aliases another evaluation's state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ordered key/value document with copy-on-write semantics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonDocument(Arc<Map<String, Value>>);

impl JsonDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Return a snapshot with `key` set to `value`.
    pub fn with(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut next = self.clone();
        Arc::make_mut(&mut next.0).insert(key.into(), value.into());
        next
    }

    /// Return a snapshot without `key`. Returns a cheap clone if the key is absent.
    pub fn without(&self, key: &str) -> Self {
        if !self.0.contains_key(key) {
            return self.clone();
        }
        let mut next = self.clone();
        Arc::make_mut(&mut next.0).shift_remove(key);
        next
    }

    /// Return a snapshot with every entry of `other` written over this one.
    pub fn merged(&self, other: &JsonDocument) -> Self {
        if other.is_empty() {
            return self.clone();
        }
        let mut next = self.clone();
        let map = Arc::make_mut(&mut next.0);
        for (key, value) in other.0.iter() {
            map.insert(key.clone(), value.clone());
        }
        next
    }
}

impl From<Map<String, Value>> for JsonDocument {
    fn from(map: Map<String, Value>) -> Self {
        Self(Arc::new(map))
    }
}

impl FromIterator<(String, Value)> for JsonDocument {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(Arc::new(iter.into_iter().collect()))
    }
}
