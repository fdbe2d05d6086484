//! Algorithm-private key/value store carried by every node.
//!
//! The engine never reads or writes the store. The key `"role"` is
//! reserved for display layers and has no engine semantics.

use crate::types::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Store key read by visualization layers to label a node.
pub const ROLE_KEY: &str = "role";

/// A tagged value held in a node's store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StoreValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Node(NodeId),
    List(Vec<StoreValue>),
}

impl StoreValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StoreValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            StoreValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            StoreValue::Float(x) => Some(*x),
            StoreValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            StoreValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&NodeId> {
        match self {
            StoreValue::Node(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[StoreValue]> {
        match self {
            StoreValue::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<bool> for StoreValue {
    fn from(b: bool) -> Self {
        StoreValue::Bool(b)
    }
}

impl From<i64> for StoreValue {
    fn from(i: i64) -> Self {
        StoreValue::Int(i)
    }
}

impl From<f64> for StoreValue {
    fn from(x: f64) -> Self {
        StoreValue::Float(x)
    }
}

impl From<&str> for StoreValue {
    fn from(s: &str) -> Self {
        StoreValue::Text(s.to_string())
    }
}

impl From<String> for StoreValue {
    fn from(s: String) -> Self {
        StoreValue::Text(s)
    }
}

impl From<NodeId> for StoreValue {
    fn from(id: NodeId) -> Self {
        StoreValue::Node(id)
    }
}

impl From<Vec<StoreValue>> for StoreValue {
    fn from(items: Vec<StoreValue>) -> Self {
        StoreValue::List(items)
    }
}

/// Ordered string-keyed map of [`StoreValue`]s.
///
/// Persists across steps for the lifetime of the node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Store {
    entries: BTreeMap<String, StoreValue>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&StoreValue> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut StoreValue> {
        self.entries.get_mut(key)
    }

    /// Inserts a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<StoreValue>) -> Option<StoreValue> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<StoreValue> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &StoreValue)> {
        self.entries.iter()
    }

    /// Adds `delta` to an integer entry, treating a missing or non-integer entry as zero.
    pub fn increment(&mut self, key: &str, delta: i64) -> i64 {
        let next = self.get(key).and_then(StoreValue::as_int).unwrap_or(0) + delta;
        self.insert(key, next);
        next
    }

    /// Display label under the reserved `"role"` key.
    pub fn role(&self) -> Option<&str> {
        self.get(ROLE_KEY).and_then(StoreValue::as_text)
    }

    pub fn set_role(&mut self, role: impl Into<String>) {
        self.insert(ROLE_KEY, role.into());
    }
}
