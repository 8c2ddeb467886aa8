//! Host-independent rewrite dispatch
//!
//! [`RewriteDispatcher`] turns one import reference into a [`ResolveInstruction`]
//! and, later, produces the body of any module it redirected into one of the
//! two [`SyntheticNamespace`]s. It holds configuration only; every call is
//! independent, so it can be shared across the bundler's worker tasks.
//!
//! ```text
//! specifier → filter → classify → ImportDescriptor → callback → ResolveInstruction
//!                                                              ↓ (replace/remove)
//!                                            load(namespace, path, data) → body
//! ```

use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info};

use crate::classify::{PackagePathClassifier, ReferenceClassifier};
use crate::decision::{ImportDescriptor, ImportKind, RewriteCallback, RewriteDecision};
use crate::error::{Result, RewriteError};

/// Specifiers starting like a package name, or containing a scope marker
pub const DEFAULT_FILTER: &str = "^[a-z0-9~-]|@";

/// One import as reported by the host bundler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReference {
    pub specifier: String,
    pub kind: ImportKind,
    /// Importing module id; `None` for entry points
    pub importer: Option<String>,
}

impl ImportReference {
    pub fn new(specifier: impl Into<String>, kind: ImportKind) -> Self {
        Self {
            specifier: specifier.into(),
            kind,
            importer: None,
        }
    }

    pub fn with_importer(mut self, importer: impl Into<String>) -> Self {
        self.importer = Some(importer.into());
        self
    }

    /// Whether the import comes from a regular file rather than a synthetic module.
    ///
    /// Virtual modules are identified by the `\0` id prefix.
    pub fn is_from_file_namespace(&self) -> bool {
        self.importer
            .as_deref()
            .map_or(true, |importer| !importer.starts_with('\0'))
    }
}

/// Categories a redirected import can be placed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntheticNamespace {
    /// Module body is the replacement content carried with the redirect
    Replace,
    /// Module body is a placeholder comment
    Remove,
}

impl SyntheticNamespace {
    pub const ALL: [SyntheticNamespace; 2] = [SyntheticNamespace::Replace, SyntheticNamespace::Remove];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyntheticNamespace::Replace => "rewritable-replace",
            SyntheticNamespace::Remove => "rewritable-remove",
        }
    }
}

impl std::fmt::Display for SyntheticNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the host should do with an import
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveInstruction {
    /// Resolve to `path` and keep it out of the bundle
    External { path: String },
    /// Resolve into a synthetic namespace; `plugin_data` travels with the
    /// module until it is loaded
    Redirect {
        namespace: SyntheticNamespace,
        path: String,
        plugin_data: Option<String>,
    },
    /// Continue with normal resolution
    Unchanged,
}

impl ResolveInstruction {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, ResolveInstruction::Unchanged)
    }
}

/// Per-build tally reported when the build ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildSummary {
    /// Errors reported by the bundler for the whole build
    pub errors: usize,
    pub rewritten: usize,
    pub replaced: usize,
    pub removed: usize,
    pub ignored: usize,
}

impl BuildSummary {
    /// Imports that reached the rewrite callback
    pub fn decisions(&self) -> usize {
        self.rewritten + self.replaced + self.removed + self.ignored
    }
}

/// Placeholder body for removed imports
pub fn removed_placeholder(specifier: &str) -> String {
    format!(
        "/* Import of {} was removed by the rewrite-imports plugin */",
        specifier
    )
}

/// Classifies imports, consults the rewrite callback and translates its answer
pub struct RewriteDispatcher {
    filter: Regex,
    callback: Arc<dyn RewriteCallback>,
    classifier: Arc<dyn ReferenceClassifier>,
}

impl RewriteDispatcher {
    /// Create a dispatcher using [`DEFAULT_FILTER`]
    pub fn new(callback: Arc<dyn RewriteCallback>) -> Self {
        Self {
            filter: Regex::new(DEFAULT_FILTER).expect("default filter is valid"),
            callback,
            classifier: Arc::new(PackagePathClassifier),
        }
    }

    /// Restrict the imports this dispatcher sees
    ///
    /// # Errors
    ///
    /// Returns [`RewriteError::InvalidFilter`] if `pattern` is not a valid regex.
    pub fn with_filter(mut self, pattern: &str) -> Result<Self> {
        self.filter =
            Regex::new(pattern).map_err(|e| RewriteError::invalid_filter(pattern, e))?;
        Ok(self)
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ReferenceClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn filter(&self) -> &Regex {
        &self.filter
    }

    /// Whether an import is observed at all
    pub fn matches(&self, reference: &ImportReference) -> bool {
        reference.is_from_file_namespace() && self.filter.is_match(&reference.specifier)
    }

    /// Build the descriptor handed to the callback
    pub fn describe(&self, reference: &ImportReference) -> ImportDescriptor {
        ImportDescriptor::new(
            reference.kind,
            self.classifier.classify(&reference.specifier),
            reference.specifier.clone(),
        )
    }

    /// Ask the callback about an import and translate the answer.
    ///
    /// Returns `None` for imports outside the filter or coming from synthetic
    /// modules; those never reach the callback.
    ///
    /// # Errors
    ///
    /// Errors from the callback are returned untouched.
    pub fn dispatch(
        &self,
        reference: &ImportReference,
    ) -> anyhow::Result<Option<ResolveInstruction>> {
        if !self.matches(reference) {
            return Ok(None);
        }

        let descriptor = self.describe(reference);
        let decision = self.callback.rewrite(&descriptor)?;

        debug!(
            specifier = %reference.specifier,
            kind = %reference.kind,
            action = decision.action(),
            "[rewrite-imports] decision"
        );

        Ok(Some(translate(&reference.specifier, decision)))
    }

    /// Like [`dispatch`](Self::dispatch), with filtered imports as `Unchanged`
    pub fn resolve(&self, reference: &ImportReference) -> anyhow::Result<ResolveInstruction> {
        Ok(self
            .dispatch(reference)?
            .unwrap_or(ResolveInstruction::Unchanged))
    }

    /// Produce the body of a module previously redirected into `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`RewriteError::MissingReplacement`] if a replaced module arrives
    /// without its content.
    pub fn load(
        &self,
        namespace: SyntheticNamespace,
        path: &str,
        plugin_data: Option<&str>,
    ) -> Result<String> {
        match namespace {
            SyntheticNamespace::Replace => plugin_data
                .map(str::to_string)
                .ok_or_else(|| RewriteError::missing_replacement(path)),
            SyntheticNamespace::Remove => Ok(removed_placeholder(path)),
        }
    }

    /// Report the end of a build
    pub fn finish(&self, summary: &BuildSummary) {
        info!("build ended with {} errors", summary.errors);
        debug!(
            rewritten = summary.rewritten,
            replaced = summary.replaced,
            removed = summary.removed,
            ignored = summary.ignored,
            "[rewrite-imports] build summary"
        );
    }
}

impl std::fmt::Debug for RewriteDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewriteDispatcher")
            .field("filter", &self.filter.as_str())
            .finish_non_exhaustive()
    }
}

fn translate(specifier: &str, decision: RewriteDecision) -> ResolveInstruction {
    match decision {
        RewriteDecision::Rewrite { path } => ResolveInstruction::External { path },
        RewriteDecision::Replace { content } => ResolveInstruction::Redirect {
            namespace: SyntheticNamespace::Replace,
            path: specifier.to_string(),
            plugin_data: Some(content),
        },
        RewriteDecision::Remove => ResolveInstruction::Redirect {
            namespace: SyntheticNamespace::Remove,
            path: specifier.to_string(),
            plugin_data: None,
        },
        RewriteDecision::Ignore => ResolveInstruction::Unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::PackageIdentity;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dispatcher_with(decision: RewriteDecision) -> RewriteDispatcher {
        RewriteDispatcher::new(Arc::new(
            move |_: &ImportDescriptor| -> anyhow::Result<RewriteDecision> { Ok(decision.clone()) },
        ))
    }

    fn import(specifier: &str) -> ImportReference {
        ImportReference::new(specifier, ImportKind::ImportStatement).with_importer("/src/index.js")
    }

    #[test]
    fn test_default_filter() {
        let filter = Regex::new(DEFAULT_FILTER).unwrap();
        for specifier in ["lodash", "left-pad", "~alias", "9to5", "-x", "@scope/pkg", "./with@sign"] {
            assert!(filter.is_match(specifier), "{}", specifier);
        }
        for specifier in ["./local/file.js", "../up", "/abs", "React", "", "#internal"] {
            assert!(!filter.is_match(specifier), "{}", specifier);
        }
    }

    #[test]
    fn test_rewrite_becomes_external() {
        let dispatcher = dispatcher_with(RewriteDecision::rewrite("https://cdn.example/pkg.js"));
        let instruction = dispatcher.resolve(&import("@scope/pkg/lib/x.js")).unwrap();
        assert_eq!(
            instruction,
            ResolveInstruction::External {
                path: "https://cdn.example/pkg.js".to_string()
            }
        );
    }

    #[test]
    fn test_replace_carries_content() {
        let dispatcher = dispatcher_with(RewriteDecision::replace("export default {};"));
        let instruction = dispatcher.resolve(&import("lodash")).unwrap();
        assert_eq!(
            instruction,
            ResolveInstruction::Redirect {
                namespace: SyntheticNamespace::Replace,
                path: "lodash".to_string(),
                plugin_data: Some("export default {};".to_string()),
            }
        );

        let body = dispatcher
            .load(SyntheticNamespace::Replace, "lodash", Some("export default {};"))
            .unwrap();
        assert_eq!(body, "export default {};");
    }

    #[test]
    fn test_remove_leaves_placeholder() {
        let dispatcher = dispatcher_with(RewriteDecision::Remove);
        let instruction = dispatcher.resolve(&import("left-pad")).unwrap();
        assert_eq!(
            instruction,
            ResolveInstruction::Redirect {
                namespace: SyntheticNamespace::Remove,
                path: "left-pad".to_string(),
                plugin_data: None,
            }
        );

        let body = dispatcher.load(SyntheticNamespace::Remove, "left-pad", None).unwrap();
        assert_eq!(
            body,
            "/* Import of left-pad was removed by the rewrite-imports plugin */"
        );
    }

    #[test]
    fn test_ignore_is_unchanged() {
        let dispatcher = dispatcher_with(RewriteDecision::Ignore);
        assert!(dispatcher.resolve(&import("react")).unwrap().is_unchanged());
    }

    #[test]
    fn test_replace_without_content_errors() {
        let dispatcher = dispatcher_with(RewriteDecision::Ignore);
        let err = dispatcher
            .load(SyntheticNamespace::Replace, "lodash", None)
            .unwrap_err();
        assert!(matches!(err, RewriteError::MissingReplacement { .. }));
    }

    #[test]
    fn test_filtered_imports_skip_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let dispatcher = RewriteDispatcher::new(Arc::new(move |_: &ImportDescriptor| -> anyhow::Result<RewriteDecision> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(RewriteDecision::Remove)
        }));

        for specifier in ["./local/file.js", "react", "/abs.js", "@scope/pkg", "../x"] {
            dispatcher.resolve(&import(specifier)).unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dispatch_tells_filtered_from_ignored() {
        let dispatcher = dispatcher_with(RewriteDecision::Ignore);
        assert_eq!(dispatcher.dispatch(&import("./local.js")).unwrap(), None);
        assert_eq!(
            dispatcher.dispatch(&import("react")).unwrap(),
            Some(ResolveInstruction::Unchanged)
        );
    }

    #[test]
    fn test_synthetic_importers_are_skipped() {
        let dispatcher = dispatcher_with(RewriteDecision::Remove);
        let reference = ImportReference::new("react", ImportKind::ImportStatement)
            .with_importer("\0rewritable-replace:0:lodash");
        assert!(!dispatcher.matches(&reference));
        assert!(dispatcher.resolve(&reference).unwrap().is_unchanged());
    }

    #[test]
    fn test_entry_points_are_file_namespace() {
        let reference = ImportReference::new("src/index.js", ImportKind::EntryPoint);
        assert!(reference.is_from_file_namespace());
    }

    #[test]
    fn test_custom_filter() {
        let dispatcher = dispatcher_with(RewriteDecision::Remove)
            .with_filter("^react")
            .unwrap();
        assert!(!dispatcher.resolve(&import("react")).unwrap().is_unchanged());
        assert!(dispatcher.resolve(&import("lodash")).unwrap().is_unchanged());
    }

    #[test]
    fn test_invalid_filter() {
        let err = dispatcher_with(RewriteDecision::Ignore)
            .with_filter("[unclosed")
            .unwrap_err();
        assert!(matches!(err, RewriteError::InvalidFilter { .. }));
    }

    #[test]
    fn test_callback_sees_descriptor() {
        let dispatcher = RewriteDispatcher::new(Arc::new(|import: &ImportDescriptor| -> anyhow::Result<RewriteDecision> {
            assert_eq!(import.kind, ImportKind::DynamicImport);
            assert_eq!(import.full_path, "@scope/pkg/sub");
            assert_eq!(import.scope(), Some("@scope/"));
            assert_eq!(import.name(), Some("pkg"));
            assert_eq!(import.subpath(), Some("/sub"));
            Ok(RewriteDecision::Ignore)
        }));

        let reference = ImportReference::new("@scope/pkg/sub", ImportKind::DynamicImport)
            .with_importer("/src/a.js");
        dispatcher.resolve(&reference).unwrap();
    }

    #[test]
    fn test_callback_errors_propagate() {
        let dispatcher = RewriteDispatcher::new(Arc::new(|_: &ImportDescriptor| -> anyhow::Result<RewriteDecision> {
            Err(anyhow::anyhow!("no policy for this import"))
        }));
        let err = dispatcher.resolve(&import("react")).unwrap_err();
        assert_eq!(err.to_string(), "no policy for this import");
    }

    struct FixedClassifier;

    impl ReferenceClassifier for FixedClassifier {
        fn classify(&self, _specifier: &str) -> PackageIdentity {
            PackageIdentity {
                scope: None,
                name: Some("fixed".to_string()),
                subpath: None,
            }
        }
    }

    #[test]
    fn test_custom_classifier() {
        let dispatcher = dispatcher_with(RewriteDecision::Ignore)
            .with_classifier(Arc::new(FixedClassifier));
        let descriptor = dispatcher.describe(&import("anything/at/all"));
        assert_eq!(descriptor.name(), Some("fixed"));
        assert_eq!(descriptor.full_path, "anything/at/all");
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_finish_reports_error_count() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .without_time()
            .finish();

        let summary = BuildSummary {
            errors: 3,
            removed: 1,
            ..Default::default()
        };
        tracing::subscriber::with_default(subscriber, || {
            dispatcher_with(RewriteDecision::Ignore).finish(&summary);
        });

        let output = String::from_utf8(captured.0.lock().clone()).unwrap();
        assert!(output.contains("build ended with 3 errors"), "{}", output);
        assert!(!output.contains("build summary"), "{}", output);
    }
}
