//! Subscriber setup for standalone use of the plugin
//!
//! Only available with the `logging` feature. Hosts that already install a
//! tracing subscriber should skip this; the plugin's events carry the
//! `fob_plugin_rewrite_imports` target and are filtered like any other crate.

use tracing_subscriber::{
    filter::Directive, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

const TARGET: &str = "fob_plugin_rewrite_imports";

/// Verbosity of the plugin's own events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Silent,
    Warn,
    /// Build-end line only
    #[default]
    Info,
    /// Every decision plus the per-build summary
    Debug,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Silent => "off",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }

    /// `EnvFilter` directive scoped to this crate
    pub fn directive(&self) -> String {
        format!("{}={}", TARGET, self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "silent" | "off" | "none" => Ok(LogLevel::Silent),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "trace" => Ok(LogLevel::Debug),
            other => Err(format!("Invalid log level: {}", other)),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Install a compact stderr subscriber for the plugin's events.
///
/// `RUST_LOG` directives are added on top of `level`. Returns `false` when a
/// global subscriber was already installed, in which case nothing changes.
///
/// ```rust,no_run
/// use fob_plugin_rewrite_imports::logging::{init_logging, LogLevel};
///
/// init_logging(LogLevel::Debug);
/// ```
pub fn init_logging(level: LogLevel) -> bool {
    let filter = with_env_directives(EnvFilter::builder().parse_lossy(level.directive()));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_target(false).without_time())
        .try_init()
        .is_ok()
}

/// Same as [`init_logging`], reading the level from
/// `FOB_REWRITE_IMPORTS_LOG` (default `info`).
pub fn init_logging_from_env() -> bool {
    let level = std::env::var("FOB_REWRITE_IMPORTS_LOG")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or_default();
    init_logging(level)
}

fn with_env_directives(filter: EnvFilter) -> EnvFilter {
    let Ok(rust_log) = std::env::var(EnvFilter::DEFAULT_ENV) else {
        return filter;
    };

    rust_log
        .split(',')
        .filter_map(|directive| directive.trim().parse::<Directive>().ok())
        .fold(filter, |filter, directive| filter.add_directive(directive))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("info".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!(" DEBUG ".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("trace".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("none".parse::<LogLevel>().unwrap(), LogLevel::Silent);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_directive_is_scoped() {
        assert_eq!(LogLevel::Debug.directive(), "fob_plugin_rewrite_imports=debug");
        assert_eq!(LogLevel::Silent.directive(), "fob_plugin_rewrite_imports=off");
        assert_eq!(LogLevel::default().to_string(), "info");
    }

    #[test]
    fn test_second_init_is_noop() {
        init_logging(LogLevel::Silent);
        assert!(!init_logging(LogLevel::Debug));
    }
}
