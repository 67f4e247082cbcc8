//! Logging configuration for the driver binaries.

use std::env;
use std::fmt;

use tracing_subscriber::EnvFilter;

/// Logging verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn parse(spec: &str) -> Option<Self> {
        match spec.to_ascii_lowercase().as_str() {
            "error" | "err" => Some(Self::Error),
            "warn" | "warning" => Some(Self::Warn),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            "trace" | "verbose" => Some(Self::Trace),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        f.write_str(text)
    }
}

/// Install the global subscriber from the environment.
///
/// `LOUPE_LOG` takes standard filter directives (`debug`,
/// `loupe::facts=trace`, ...); `LOUPE_LOG_LEVEL` is the coarse
/// alternative, a single [`LogLevel`] applied globally.
/// `LOUPE_LOG_STYLE=full` switches from the compact format to one with
/// timestamps and targets. With neither variable set, nothing is
/// installed and engine log events are dropped.
pub fn init_from_env() {
    let filter = match EnvFilter::try_from_env("LOUPE_LOG") {
        Ok(filter) => filter,
        Err(_) => {
            let Some(level) = env::var("LOUPE_LOG_LEVEL")
                .ok()
                .as_deref()
                .and_then(LogLevel::parse)
            else {
                return;
            };
            EnvFilter::new(level.as_tracing_level().to_string())
        }
    };
    let style = env::var("LOUPE_LOG_STYLE").unwrap_or_default();
    if style == "full" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .without_time()
            .with_writer(std::io::stderr)
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_parses_expected_values() {
        assert_eq!(LogLevel::parse("error"), Some(LogLevel::Error));
        assert_eq!(LogLevel::parse("warn"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("INFO"), Some(LogLevel::Info));
        assert_eq!(LogLevel::parse("debug"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("trace"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::parse("verbose"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::parse("noop"), None);
    }

    #[test]
    fn log_level_orders_by_verbosity() {
        assert!(LogLevel::Error < LogLevel::Trace);
        assert!(LogLevel::Warn < LogLevel::Debug);
    }
}
