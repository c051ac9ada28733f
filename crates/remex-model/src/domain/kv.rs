use serde::{Deserialize, Serialize};

/// Single environment variable forwarded into a job container.
///
/// Keys and values are passed through to the job document untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    /// Variable name.
    key: String,
    /// Variable value.
    value: String,
}

impl KeyValue {
    /// Create a new variable.
    pub fn new<K, V>(key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl From<(&str, &str)> for KeyValue {
    fn from((key, value): (&str, &str)) -> Self {
        Self::new(key, value)
    }
}
