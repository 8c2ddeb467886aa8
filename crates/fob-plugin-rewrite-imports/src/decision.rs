//! Decision types exchanged with the caller's rewrite callback
//!
//! The callback receives an [`ImportDescriptor`] for every matched import and
//! answers with a [`RewriteDecision`]. Both types serialize to the JSON shapes
//! used by script hosts:
//!
//! ```json
//! { "kind": "import-statement", "scope": "@scope/", "name": "pkg", "fullPath": "@scope/pkg" }
//! { "action": "rewrite", "path": "https://cdn.example/pkg.js" }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classify::PackageIdentity;
use crate::error::RewriteError;

/// How the import was written in the importing module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportKind {
    /// Build entry (no importer)
    EntryPoint,
    /// `import x from "..."` / `export ... from "..."`
    ImportStatement,
    /// `import("...")`
    DynamicImport,
    /// `require("...")`
    RequireCall,
    /// CSS `@import`
    ImportRule,
    /// CSS `url(...)`
    UrlToken,
    /// `new URL("...", import.meta.url)`
    NewUrl,
    /// `import.meta.hot.accept("...")`
    HotAccept,
}

impl ImportKind {
    /// The kebab-case name used in serialized descriptors
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportKind::EntryPoint => "entry-point",
            ImportKind::ImportStatement => "import-statement",
            ImportKind::DynamicImport => "dynamic-import",
            ImportKind::RequireCall => "require-call",
            ImportKind::ImportRule => "import-rule",
            ImportKind::UrlToken => "url-token",
            ImportKind::NewUrl => "new-url",
            ImportKind::HotAccept => "hot-accept",
        }
    }
}

impl std::fmt::Display for ImportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the rewrite callback knows about one import
///
/// `full_path` is always the raw specifier, whether or not it classified as a
/// package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportDescriptor {
    pub kind: ImportKind,

    #[serde(flatten)]
    pub identity: PackageIdentity,

    pub full_path: String,
}

impl ImportDescriptor {
    pub fn new(kind: ImportKind, identity: PackageIdentity, full_path: impl Into<String>) -> Self {
        Self {
            kind,
            identity,
            full_path: full_path.into(),
        }
    }

    pub fn scope(&self) -> Option<&str> {
        self.identity.scope.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.identity.name.as_deref()
    }

    pub fn subpath(&self) -> Option<&str> {
        self.identity.subpath.as_deref()
    }
}

/// What to do with a matched import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum RewriteDecision {
    /// Point the import at `path` and leave it external
    Rewrite { path: String },
    /// Serve `content` as the module body
    Replace { content: String },
    /// Bundle the dependency as usual
    Ignore,
    /// Drop the import, leaving a placeholder comment
    Remove,
}

impl RewriteDecision {
    pub fn rewrite(path: impl Into<String>) -> Self {
        Self::Rewrite { path: path.into() }
    }

    pub fn replace(content: impl Into<String>) -> Self {
        Self::Replace {
            content: content.into(),
        }
    }

    /// Name of the action tag
    pub fn action(&self) -> &'static str {
        match self {
            RewriteDecision::Rewrite { .. } => "rewrite",
            RewriteDecision::Replace { .. } => "replace",
            RewriteDecision::Ignore => "ignore",
            RewriteDecision::Remove => "remove",
        }
    }

    /// Decode a decision produced as loosely-typed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`RewriteError::InvalidDecision`] carrying the pretty-printed
    /// value when the action tag is missing or unknown, or a payload field is
    /// missing.
    pub fn from_value(value: Value) -> Result<Self, RewriteError> {
        serde_json::from_value(value.clone()).map_err(|_| RewriteError::invalid_decision(&value))
    }
}

/// The caller's decision policy
///
/// Implemented for any `Fn(&ImportDescriptor) -> anyhow::Result<RewriteDecision>`,
/// so a closure is usually enough. Errors are passed through to the bundler
/// unchanged and abort the build.
pub trait RewriteCallback: Send + Sync {
    fn rewrite(&self, import: &ImportDescriptor) -> anyhow::Result<RewriteDecision>;
}

impl<F> RewriteCallback for F
where
    F: Fn(&ImportDescriptor) -> anyhow::Result<RewriteDecision> + Send + Sync,
{
    fn rewrite(&self, import: &ImportDescriptor) -> anyhow::Result<RewriteDecision> {
        self(import)
    }
}

/// Adapts a callback that answers in JSON, e.g. one living behind a language
/// binding. The descriptor is handed over as JSON too.
pub struct JsonRewriteCallback<F> {
    inner: F,
}

impl<F> JsonRewriteCallback<F>
where
    F: Fn(Value) -> anyhow::Result<Value> + Send + Sync,
{
    pub fn new(inner: F) -> Self {
        Self { inner }
    }
}

impl<F> RewriteCallback for JsonRewriteCallback<F>
where
    F: Fn(Value) -> anyhow::Result<Value> + Send + Sync,
{
    fn rewrite(&self, import: &ImportDescriptor) -> anyhow::Result<RewriteDecision> {
        let descriptor = serde_json::to_value(import)?;
        let answer = (self.inner)(descriptor)?;
        Ok(RewriteDecision::from_value(answer)?)
    }
}

impl<F> std::fmt::Debug for JsonRewriteCallback<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRewriteCallback").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use serde_json::json;

    #[test]
    fn test_descriptor_serializes_flat_camel_case() {
        let descriptor = ImportDescriptor::new(
            ImportKind::ImportStatement,
            classify("@scope/pkg/lib/x.js"),
            "@scope/pkg/lib/x.js",
        );

        assert_eq!(
            serde_json::to_value(&descriptor).unwrap(),
            json!({
                "kind": "import-statement",
                "scope": "@scope/",
                "name": "pkg",
                "subpath": "/lib/x.js",
                "fullPath": "@scope/pkg/lib/x.js",
            })
        );
    }

    #[test]
    fn test_descriptor_keeps_full_path_for_non_packages() {
        let descriptor =
            ImportDescriptor::new(ImportKind::DynamicImport, classify("./x.js"), "./x.js");
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json, json!({ "kind": "dynamic-import", "fullPath": "./x.js" }));
        assert_eq!(descriptor.name(), None);
    }

    #[test]
    fn test_import_kind_names_match_serde() {
        for kind in [
            ImportKind::EntryPoint,
            ImportKind::ImportStatement,
            ImportKind::DynamicImport,
            ImportKind::RequireCall,
            ImportKind::ImportRule,
            ImportKind::UrlToken,
            ImportKind::NewUrl,
            ImportKind::HotAccept,
        ] {
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(kind.as_str()));
        }
    }

    #[test]
    fn test_decision_from_value() {
        assert_eq!(
            RewriteDecision::from_value(json!({ "action": "rewrite", "path": "https://cdn.example/pkg.js" }))
                .unwrap(),
            RewriteDecision::rewrite("https://cdn.example/pkg.js")
        );
        assert_eq!(
            RewriteDecision::from_value(json!({ "action": "replace", "content": "export default {};" }))
                .unwrap(),
            RewriteDecision::replace("export default {};")
        );
        assert_eq!(
            RewriteDecision::from_value(json!({ "action": "ignore" })).unwrap(),
            RewriteDecision::Ignore
        );
        assert_eq!(
            RewriteDecision::from_value(json!({ "action": "remove" })).unwrap(),
            RewriteDecision::Remove
        );
    }

    #[test]
    fn test_unknown_action_reports_the_value() {
        let err = RewriteDecision::from_value(json!({ "action": "explode", "path": "x" })).unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, RewriteError::InvalidDecision { .. }));
        assert!(message.contains("\"action\": \"explode\""), "{}", message);
        assert!(message.contains("\"path\": \"x\""), "{}", message);
    }

    #[test]
    fn test_missing_payload_is_invalid() {
        let err = RewriteDecision::from_value(json!({ "action": "replace" })).unwrap_err();
        assert!(matches!(err, RewriteError::InvalidDecision { .. }));
    }

    #[test]
    fn test_json_callback_round_trips_descriptor() {
        let callback = JsonRewriteCallback::new(|descriptor: Value| -> anyhow::Result<Value> {
            assert_eq!(descriptor["fullPath"], json!("lodash"));
            Ok(json!({ "action": "replace", "content": "export default {};" }))
        });

        let descriptor = ImportDescriptor::new(ImportKind::RequireCall, classify("lodash"), "lodash");
        let decision = callback.rewrite(&descriptor).unwrap();
        assert_eq!(decision, RewriteDecision::replace("export default {};"));
    }

    #[test]
    fn test_json_callback_rejects_unknown_action() {
        let callback =
            JsonRewriteCallback::new(|_: Value| -> anyhow::Result<Value> { Ok(json!({ "action": "nope" })) });
        let descriptor = ImportDescriptor::new(ImportKind::ImportStatement, classify("a"), "a");

        let err = callback.rewrite(&descriptor).unwrap_err();
        assert!(err.downcast_ref::<RewriteError>().is_some());
    }

    #[test]
    fn test_closure_errors_pass_through() {
        let callback = |_: &ImportDescriptor| -> anyhow::Result<RewriteDecision> {
            anyhow::bail!("policy lookup failed")
        };
        let descriptor = ImportDescriptor::new(ImportKind::ImportStatement, classify("a"), "a");

        let err = callback.rewrite(&descriptor).unwrap_err();
        assert_eq!(err.to_string(), "policy lookup failed");
    }
}
