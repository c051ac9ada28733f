use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::logger::{LoggerError, LoggerResult};

/// Validated `EnvFilter` expression, e.g. `"remex_core=debug,info"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LoggerLevel(String);

impl LoggerLevel {
    pub fn new(s: impl Into<String>) -> LoggerResult<Self> {
        Self::try_from(s.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build the filter for this expression.
    pub fn to_env_filter(&self) -> LoggerResult<EnvFilter> {
        EnvFilter::try_new(self.as_str())
            .map_err(|e| LoggerError::InvalidLevel(format!("{}: {e}", self.0)))
    }
}

impl Default for LoggerLevel {
    fn default() -> Self {
        Self("info".to_string())
    }
}

impl FromStr for LoggerLevel {
    type Err = LoggerError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_owned())
    }
}

impl TryFrom<String> for LoggerLevel {
    type Error = LoggerError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        let level = LoggerLevel(s);
        level.to_env_filter()?;
        Ok(level)
    }
}

impl From<LoggerLevel> for String {
    fn from(l: LoggerLevel) -> Self {
        l.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_directives() {
        for lvl in ["info", "trace", "remex_exec=trace,remex_core=debug,warn"] {
            assert!(lvl.parse::<LoggerLevel>().is_ok(), "rejected {lvl}");
        }
    }

    #[test]
    fn rejects_unknown_levels() {
        for lvl in ["remex_core=loud", "a=trace,b=wat"] {
            let err = LoggerLevel::from_str(lvl).unwrap_err();
            assert!(matches!(err, LoggerError::InvalidLevel(_)));
        }
    }

    #[test]
    fn deserializes_from_plain_string() {
        let lvl: LoggerLevel = serde_json::from_str(r#""debug""#).unwrap();
        assert_eq!(lvl.as_str(), "debug");
        assert!(serde_json::from_str::<LoggerLevel>(r#""x=nope""#).is_err());
    }

    #[test]
    fn default_is_info() {
        let lvl = LoggerLevel::default();
        assert_eq!(lvl.as_str(), "info");
        assert!(lvl.to_env_filter().is_ok());
    }
}
