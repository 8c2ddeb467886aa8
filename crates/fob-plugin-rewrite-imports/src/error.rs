//! Error types for the rewrite-imports plugin

use std::path::PathBuf;

use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RewriteError>;

/// Errors raised by the plugin itself
///
/// Errors returned by the caller's rewrite callback are not wrapped; they reach
/// the bundler as-is.
#[derive(Error, Debug, Diagnostic)]
pub enum RewriteError {
    /// The rewrite callback answered with an unknown or malformed action
    #[error("Invalid data passed to the rewrite-imports plugin:\n{rendered}")]
    #[diagnostic(
        code(fob::rewrite_imports::invalid_decision),
        help("Return one of: {{ action: \"rewrite\", path }}, {{ action: \"replace\", content }}, {{ action: \"ignore\" }}, {{ action: \"remove\" }}")
    )]
    InvalidDecision { rendered: String },

    /// The import filter is not a valid regular expression
    #[error("Invalid import filter pattern '{pattern}': {source}")]
    #[diagnostic(code(fob::rewrite_imports::invalid_filter))]
    InvalidFilter {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A replaced module was loaded without its replacement content
    #[error("No replacement content registered for import '{specifier}'")]
    #[diagnostic(
        code(fob::rewrite_imports::missing_replacement),
        help("Replacement content only lives for the build that resolved the import")
    )]
    MissingReplacement { specifier: String },

    /// An explicitly requested config file does not exist
    #[error("Config file not found: {0}")]
    #[diagnostic(code(fob::rewrite_imports::config_not_found))]
    ConfigNotFound(PathBuf),

    /// Loading or extracting the plugin configuration failed
    #[error("Failed to load rewrite-imports configuration: {0}")]
    #[diagnostic(code(fob::rewrite_imports::config))]
    Config(#[from] Box<figment::Error>),
}

impl RewriteError {
    pub fn invalid_decision(value: &Value) -> Self {
        let rendered = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
        Self::InvalidDecision { rendered }
    }

    pub fn invalid_filter(pattern: impl Into<String>, source: regex::Error) -> Self {
        Self::InvalidFilter {
            pattern: pattern.into(),
            source,
        }
    }

    pub fn missing_replacement(specifier: impl Into<String>) -> Self {
        Self::MissingReplacement {
            specifier: specifier.into(),
        }
    }
}

impl From<figment::Error> for RewriteError {
    fn from(error: figment::Error) -> Self {
        Self::Config(Box::new(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invalid_decision_is_pretty_printed() {
        let err = RewriteError::invalid_decision(&json!({ "action": "bogus" }));
        assert_eq!(
            err.to_string(),
            "Invalid data passed to the rewrite-imports plugin:\n{\n  \"action\": \"bogus\"\n}"
        );
    }

    #[test]
    fn test_invalid_filter_keeps_source() {
        let source = regex::Regex::new("(").unwrap_err();
        let err = RewriteError::invalid_filter("(", source);
        assert!(err.to_string().starts_with("Invalid import filter pattern '('"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_diagnostic_codes() {
        let err = RewriteError::missing_replacement("lodash");
        let code = err.code().map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some("fob::rewrite_imports::missing_replacement"));
    }
}
