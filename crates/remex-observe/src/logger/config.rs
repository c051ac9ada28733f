use std::io::IsTerminal;

use serde::{Deserialize, Serialize};

use crate::logger::{
    LoggerError, LoggerResult,
    object::{LoggerFormat, LoggerLevel},
};

/// Overrides the filter expression.
pub const ENV_LOG_LEVEL: &str = "REMEX_LOG";
/// Overrides the output format.
pub const ENV_LOG_FORMAT: &str = "REMEX_LOG_FORMAT";
/// Overrides color output (`true`/`false`, `1`/`0`).
pub const ENV_LOG_COLOR: &str = "REMEX_LOG_COLOR";

/// Logger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Output format.
    pub format: LoggerFormat,
    /// Filter expression (e.g. `"remex_core=debug,info"`).
    pub level: LoggerLevel,
    /// Include module targets in output.
    pub with_targets: bool,
    /// Colored text output; only honoured on a terminal.
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::default(),
            level: LoggerLevel::default(),
            with_targets: true,
            use_color: true,
        }
    }
}

impl LoggerConfig {
    /// Apply `REMEX_LOG*` overrides from the process environment.
    pub fn with_env_overrides(self) -> LoggerResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`; blank values are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> LoggerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v: &String| !v.trim().is_empty());

        if let Some(level) = get(ENV_LOG_LEVEL) {
            self.level = level.parse()?;
        }
        if let Some(format) = get(ENV_LOG_FORMAT) {
            self.format = format.parse()?;
        }
        if let Some(color) = get(ENV_LOG_COLOR) {
            self.use_color = parse_flag(ENV_LOG_COLOR, &color)?;
        }
        Ok(self)
    }

    /// Color is used only when enabled and stdout is a terminal.
    pub fn should_use_color(&self) -> bool {
        self.use_color && std::io::stdout().is_terminal()
    }
}

fn parse_flag(var: &'static str, value: &str) -> LoggerResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(LoggerError::InvalidFlag {
            var,
            value: value.to_string(),
        }),
    }
}
