mod config;
mod error;
mod log;
mod object;

pub use config::{ENV_LOG_COLOR, ENV_LOG_FORMAT, ENV_LOG_LEVEL, LoggerConfig};
pub use error::{LoggerError, LoggerResult};
pub use object::{LoggerFormat, LoggerLevel, UtcRfc3339};

/// Install the global tracing subscriber described by `cfg`.
///
/// Fails with [`LoggerError::AlreadyInitialized`] when a global subscriber
/// is already set.
///
/// # Examples
/// ```no_run
/// use remex_observe::{LoggerConfig, init_logger};
///
/// let config = LoggerConfig::default().with_env_overrides().unwrap();
/// init_logger(&config).unwrap();
/// tracing::info!("logger ready");
/// ```
pub fn init_logger(cfg: &LoggerConfig) -> LoggerResult<()> {
    match cfg.format {
        LoggerFormat::Text => log::logger_text(cfg),
        LoggerFormat::Json => log::logger_json(cfg),
        LoggerFormat::Journald => log::logger_journald(cfg),
    }
}
