use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::KeyValue;

/// Environment variables a task wants inside its job container.
///
/// Stored as an ordered list; later entries override earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Env(Vec<KeyValue>);

impl Env {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyValue> {
        self.0.iter()
    }

    /// Get the value for a key, returning the last matching entry.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|kv| kv.key() == key)
            .map(|kv| kv.value())
    }

    /// Append a variable. Later entries win on lookup.
    pub fn push<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.0.push(KeyValue::new(key, value));
    }

    /// Collapse the list into a key-sorted map with override semantics applied.
    ///
    /// Returns `None` for an empty environment so callers can omit the field entirely.
    pub fn to_map(&self) -> Option<BTreeMap<String, String>> {
        if self.is_empty() {
            return None;
        }
        let mut out = BTreeMap::new();
        for kv in &self.0 {
            out.insert(kv.key().to_string(), kv.value().to_string());
        }
        Some(out)
    }
}

impl<K, V> FromIterator<(K, V)> for Env
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| KeyValue::new(k, v)).collect())
    }
}
