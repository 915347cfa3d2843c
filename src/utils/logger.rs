//! Logging setup

use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::config::EnvConfig;

/// Log level configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    /// Level from `FIXTURE_HARNESS_LOG`, falling back to info
    pub fn from_env(env: &EnvConfig) -> Self {
        env.log_level
            .as_deref()
            .and_then(Self::from_str)
            .unwrap_or_default()
    }
}

/// Install the global subscriber; later calls are ignored
pub fn init_logger(level: LogLevel) {
    let filter = EnvFilter::new(format!(
        "fixture_harness={}",
        level.to_tracing_level()
    ));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_str() {
        assert_eq!(LogLevel::from_str("info"), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_str(" DEBUG "), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_str("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str("verbose"), None);
    }

    #[test]
    fn test_from_env_falls_back_to_info() {
        let mut env = EnvConfig::default();
        assert_eq!(LogLevel::from_env(&env), LogLevel::Info);

        env.log_level = Some("trace".into());
        assert_eq!(LogLevel::from_env(&env), LogLevel::Trace);

        env.log_level = Some("loud".into());
        assert_eq!(LogLevel::from_env(&env), LogLevel::Info);
    }
}
