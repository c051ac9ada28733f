use tracing::Subscriber;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::logger::{
    config::LoggerConfig,
    error::{LoggerError, LoggerResult},
    object::UtcRfc3339,
};

pub fn logger_text(cfg: &LoggerConfig) -> LoggerResult<()> {
    let fmt_layer = fmt::layer()
        .with_ansi(cfg.should_use_color())
        .with_target(cfg.with_targets)
        .with_timer(UtcRfc3339);

    let subscriber = tracing_subscriber::registry()
        .with(cfg.level.to_env_filter()?)
        .with(fmt_layer);
    init_subscriber(subscriber)
}

pub fn logger_json(cfg: &LoggerConfig) -> LoggerResult<()> {
    let fmt_layer = fmt::layer()
        .json()
        .with_ansi(false)
        .with_current_span(true)
        .with_target(cfg.with_targets)
        .with_timer(UtcRfc3339);

    let subscriber = tracing_subscriber::registry()
        .with(cfg.level.to_env_filter()?)
        .with(fmt_layer);
    init_subscriber(subscriber)
}

#[cfg(target_os = "linux")]
pub fn logger_journald(cfg: &LoggerConfig) -> LoggerResult<()> {
    let journald =
        tracing_journald::layer().map_err(|e| LoggerError::JournaldInitFailed(e.to_string()))?;

    let subscriber = tracing_subscriber::registry()
        .with(cfg.level.to_env_filter()?)
        .with(journald.with_syslog_identifier("remex".to_string()));
    init_subscriber(subscriber)
}

#[cfg(not(target_os = "linux"))]
pub fn logger_journald(_cfg: &LoggerConfig) -> LoggerResult<()> {
    Err(LoggerError::JournaldNotSupported)
}

fn init_subscriber<S>(subscriber: S) -> LoggerResult<()>
where
    S: Subscriber + Send + Sync + 'static,
{
    subscriber
        .try_init()
        .map_err(|_| LoggerError::AlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_initialization_is_rejected() {
        let cfg = LoggerConfig {
            use_color: false,
            ..Default::default()
        };

        let first = logger_text(&cfg);
        let second = logger_json(&cfg);

        assert!(first.is_ok());
        assert!(matches!(second, Err(LoggerError::AlreadyInitialized)));
    }

    #[test]
    #[cfg(not(target_os = "linux"))]
    fn journald_is_unsupported_off_linux() {
        let result = logger_journald(&LoggerConfig::default());
        assert!(matches!(result, Err(LoggerError::JournaldNotSupported)));
    }
}
