//! Table-driven rewrite callback
//!
//! [`RewriteRules`] answers from a static map instead of code. Lookup order:
//!
//! 1. the full specifier (`lodash/debounce`)
//! 2. the package key, scope included (`lodash`, `@scope/pkg`)
//! 3. the fallback decision (`ignore` unless changed)

use std::collections::BTreeMap;

use crate::config::RewriteImportsConfig;
use crate::decision::{ImportDescriptor, RewriteCallback, RewriteDecision};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRules {
    rules: BTreeMap<String, RewriteDecision>,
    fallback: RewriteDecision,
}

impl Default for RewriteRules {
    fn default() -> Self {
        Self {
            rules: BTreeMap::new(),
            fallback: RewriteDecision::Ignore,
        }
    }
}

impl RewriteRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &RewriteImportsConfig) -> Self {
        Self {
            rules: config.rules.clone(),
            ..Self::default()
        }
    }

    pub fn with_rule(mut self, key: impl Into<String>, decision: RewriteDecision) -> Self {
        self.rules.insert(key.into(), decision);
        self
    }

    /// Decision for imports no rule matches
    pub fn with_fallback(mut self, decision: RewriteDecision) -> Self {
        self.fallback = decision;
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn lookup(&self, import: &ImportDescriptor) -> &RewriteDecision {
        if let Some(decision) = self.rules.get(&import.full_path) {
            return decision;
        }

        import
            .identity
            .package_key()
            .and_then(|key| self.rules.get(&key))
            .unwrap_or(&self.fallback)
    }
}

impl RewriteCallback for RewriteRules {
    fn rewrite(&self, import: &ImportDescriptor) -> anyhow::Result<RewriteDecision> {
        Ok(self.lookup(import).clone())
    }
}
