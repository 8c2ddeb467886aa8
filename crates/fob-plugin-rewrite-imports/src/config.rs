//! Rewrite-imports plugin configuration
//!
//! Two layers:
//!
//! - [`RewriteImportsOptions`]: what the plugin is constructed from in code
//!   (a rewrite callback plus an optional filter).
//! - [`RewriteImportsConfig`]: the serializable subset (filter and a static rule
//!   table), loaded with figment from defaults, `rewrite-imports.toml` /
//!   `rewrite-imports.json`, and `FOB_REWRITE_IMPORTS_*` environment variables.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use figment::{
    providers::{Env, Format as _, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::decision::{RewriteCallback, RewriteDecision};
use crate::dispatch::DEFAULT_FILTER;
use crate::error::{Result, RewriteError};
use crate::rules::RewriteRules;

/// Environment variable prefix, e.g. `FOB_REWRITE_IMPORTS_FILTER`
pub const ENV_PREFIX: &str = "FOB_REWRITE_IMPORTS_";

/// Config file names searched in the project root, in merge order
pub const CONFIG_FILES: [&str; 2] = ["rewrite-imports.toml", "rewrite-imports.json"];

/// Options for constructing the plugin in code
#[derive(Clone)]
pub struct RewriteImportsOptions {
    /// Decision policy consulted for every matched import
    pub callback: Arc<dyn RewriteCallback>,

    /// Regex selecting the specifiers the plugin sees
    ///
    /// Defaults to [`DEFAULT_FILTER`] when unset.
    pub filter: Option<String>,
}

impl RewriteImportsOptions {
    /// Create options around a rewrite callback
    ///
    /// # Example
    ///
    /// ```rust
    /// use fob_plugin_rewrite_imports::{ImportDescriptor, RewriteDecision, RewriteImportsOptions};
    ///
    /// let options = RewriteImportsOptions::new(|import: &ImportDescriptor| -> anyhow::Result<RewriteDecision> {
    ///     Ok(match import.name() {
    ///         Some("react") => RewriteDecision::rewrite("https://esm.sh/react"),
    ///         _ => RewriteDecision::Ignore,
    ///     })
    /// })
    /// .with_filter("^react");
    /// ```
    pub fn new(callback: impl RewriteCallback + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
            filter: None,
        }
    }

    /// Use a shared callback
    pub fn from_shared(callback: Arc<dyn RewriteCallback>) -> Self {
        Self {
            callback,
            filter: None,
        }
    }

    /// Set the specifier filter
    pub fn with_filter(mut self, pattern: impl Into<String>) -> Self {
        self.filter = Some(pattern.into());
        self
    }

    /// Build options from a loaded config, using its rules as the callback
    pub fn from_config(config: &RewriteImportsConfig) -> Self {
        Self::new(RewriteRules::from_config(config)).with_filter(config.filter.clone())
    }

    pub fn filter_pattern(&self) -> &str {
        self.filter.as_deref().unwrap_or(DEFAULT_FILTER)
    }
}

impl std::fmt::Debug for RewriteImportsOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewriteImportsOptions")
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

/// Serializable plugin configuration
///
/// ```toml
/// filter = "^(react|lodash)"
///
/// [rules]
/// react = { action = "rewrite", path = "https://esm.sh/react" }
/// "lodash/debounce" = { action = "replace", content = "export default (f) => f;" }
/// lodash = { action = "remove" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteImportsConfig {
    /// Regex selecting the specifiers the plugin sees
    pub filter: String,

    /// Static decisions keyed by full specifier or by package (`@scope/name`)
    pub rules: BTreeMap<String, RewriteDecision>,
}

impl Default for RewriteImportsConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            rules: BTreeMap::new(),
        }
    }
}

impl RewriteImportsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, pattern: impl Into<String>) -> Self {
        self.filter = pattern.into();
        self
    }

    pub fn with_rule(mut self, key: impl Into<String>, decision: RewriteDecision) -> Self {
        self.rules.insert(key.into(), decision);
        self
    }

    /// Figment layering defaults, config files under `root`, then environment
    ///
    /// Later providers win: environment > JSON > TOML > defaults.
    pub fn figment(root: impl AsRef<Path>) -> Figment {
        let root = root.as_ref();
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        let [toml_name, json_name] = CONFIG_FILES;
        figment = figment.merge(Toml::file(root.join(toml_name)));
        figment = figment.merge(Json::file(root.join(json_name)));

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load configuration discovered under `root`
    ///
    /// Missing files are skipped; defaults apply when nothing is found.
    ///
    /// # Errors
    ///
    /// Returns [`RewriteError::Config`] when a source cannot be parsed or does
    /// not match the expected shape.
    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        let config: Self = Self::figment(root).extract()?;
        tracing::debug!(
            filter = %config.filter,
            rules = config.rules.len(),
            "[rewrite-imports] configuration loaded"
        );
        Ok(config)
    }

    /// Load configuration from an explicit file, format chosen by extension
    ///
    /// # Errors
    ///
    /// Returns [`RewriteError::ConfigNotFound`] if the file does not exist and
    /// [`RewriteError::Config`] if it cannot be parsed.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(RewriteError::ConfigNotFound(path.to_path_buf()));
        }

        let figment = Figment::new().merge(Serialized::defaults(Self::default()));
        let figment = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => figment.merge(Json::file(path)),
            _ => figment.merge(Toml::file(path)),
        };

        Ok(figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?)
    }

    /// Create from serde_json::Value (for configuration held by a host program)
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Serialized::globals(value))
            .extract()?)
    }

    /// Paths that [`RewriteImportsConfig::load`] looks at under `root`
    pub fn candidate_files(root: impl AsRef<Path>) -> Vec<PathBuf> {
        CONFIG_FILES.iter().map(|name| root.as_ref().join(name)).collect()
    }
}
