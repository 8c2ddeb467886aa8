//! Rolldown plugin for rewriting package imports
//!
//! Every import whose specifier matches a filter is classified into
//! scope / name / subpath and handed to a caller-supplied policy, which decides
//! what happens to it:
//!
//! - **rewrite**: resolve to another path and keep it external
//! - **replace**: serve the given source text as the module body
//! - **ignore**: resolve and bundle normally
//! - **remove**: serve a placeholder comment instead of the dependency
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use fob_plugin_rewrite_imports::{
//!     FobRewriteImportsPlugin, ImportDescriptor, RewriteDecision, RewriteImportsOptions,
//! };
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = RewriteImportsOptions::new(|import: &ImportDescriptor| -> anyhow::Result<RewriteDecision> {
//!     Ok(match (import.scope(), import.name()) {
//!         (None, Some("react")) => RewriteDecision::rewrite("https://esm.sh/react@19"),
//!         (None, Some("fs")) => RewriteDecision::Remove,
//!         _ => RewriteDecision::Ignore,
//!     })
//! });
//!
//! // Use with your Rolldown bundler configuration
//! let plugin = Arc::new(FobRewriteImportsPlugin::new(options)?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Synthetic modules
//!
//! Replaced and removed imports resolve to virtual ids (`\0` prefix) that only
//! this plugin loads:
//!
//! ```text
//! \0rewritable-replace:<n>:<specifier>   body = replacement content
//! \0rewritable-remove:<specifier>.cjs    body = placeholder comment
//! ```
//!
//! Replacement content is held per occurrence until it is loaded, so two
//! imports of the same specifier can be given different bodies. Removed modules
//! are CommonJS with no exports, so any import binding from them is
//! `undefined`.

use std::borrow::Cow;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rolldown_common::{ModuleType, ResolvedExternal};
use rolldown_plugin::{
    HookBuildEndArgs, HookLoadArgs, HookLoadOutput, HookLoadReturn, HookNoopReturn,
    HookResolveIdArgs, HookResolveIdOutput, HookResolveIdReturn, HookUsage, Plugin, PluginContext,
};
use rustc_hash::FxHashMap;

pub mod classify;
pub mod config;
pub mod decision;
pub mod dispatch;
pub mod error;
pub mod rules;

#[cfg(feature = "logging")]
pub mod logging;

pub use classify::{classify, PackageIdentity, PackagePathClassifier, ReferenceClassifier};
pub use config::{RewriteImportsConfig, RewriteImportsOptions};
pub use decision::{
    ImportDescriptor, ImportKind, JsonRewriteCallback, RewriteCallback, RewriteDecision,
};
pub use dispatch::{
    removed_placeholder, BuildSummary, ImportReference, ResolveInstruction, RewriteDispatcher,
    SyntheticNamespace, DEFAULT_FILTER,
};
pub use error::{Result, RewriteError};
pub use rules::RewriteRules;

#[cfg(feature = "logging")]
pub use logging::{init_logging, init_logging_from_env, LogLevel};

/// Plugin name reported to Rolldown
pub const PLUGIN_NAME: &str = "rewrite-imports";

/// Rolldown plugin driving a [`RewriteDispatcher`]
///
/// # Architecture
///
/// ```text
/// import → resolve_id() → dispatcher → external id | \0 virtual id | None
/// \0 virtual id → load() → replacement content | placeholder
/// build_end() → "build ended with N errors", per-build state cleared
/// ```
#[derive(Debug)]
pub struct FobRewriteImportsPlugin {
    dispatcher: Arc<RewriteDispatcher>,
    state: Arc<BuildState>,
}

/// Per-build bookkeeping, reset when the build ends
#[derive(Debug, Default)]
struct BuildState {
    /// Replacement content keyed by virtual id
    pending: Mutex<FxHashMap<String, String>>,
    sequence: AtomicU64,
    rewritten: AtomicUsize,
    replaced: AtomicUsize,
    removed: AtomicUsize,
    ignored: AtomicUsize,
}

impl BuildState {
    fn record(&self, instruction: &ResolveInstruction) {
        let counter = match instruction {
            ResolveInstruction::External { .. } => &self.rewritten,
            ResolveInstruction::Redirect {
                namespace: SyntheticNamespace::Replace,
                ..
            } => &self.replaced,
            ResolveInstruction::Redirect {
                namespace: SyntheticNamespace::Remove,
                ..
            } => &self.removed,
            ResolveInstruction::Unchanged => &self.ignored,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Rolldown loads each id once per build, so the entry is dropped here
    fn take_pending(&self, id: &str) -> Option<String> {
        self.pending.lock().remove(id)
    }

    fn summary(&self, errors: usize) -> BuildSummary {
        BuildSummary {
            errors,
            rewritten: self.rewritten.load(Ordering::Relaxed),
            replaced: self.replaced.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.pending.lock().clear();
        self.sequence.store(0, Ordering::Relaxed);
        for counter in [&self.rewritten, &self.replaced, &self.removed, &self.ignored] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl FobRewriteImportsPlugin {
    /// Create the plugin from code-level options
    ///
    /// # Errors
    ///
    /// Returns [`RewriteError::InvalidFilter`] if the filter is not a valid regex.
    pub fn new(options: RewriteImportsOptions) -> Result<Self> {
        let dispatcher =
            RewriteDispatcher::new(options.callback.clone()).with_filter(options.filter_pattern())?;
        Ok(Self::with_dispatcher(dispatcher))
    }

    /// Create the plugin from a serializable config, answering from its rules
    pub fn from_config(config: &RewriteImportsConfig) -> Result<Self> {
        Self::new(RewriteImportsOptions::from_config(config))
    }

    /// Load `rewrite-imports.{toml,json}` and `FOB_REWRITE_IMPORTS_*` under `root`
    pub fn from_project(root: impl AsRef<Path>) -> Result<Self> {
        Self::from_config(&RewriteImportsConfig::load(root)?)
    }

    pub fn with_dispatcher(dispatcher: RewriteDispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            state: Arc::new(BuildState::default()),
        }
    }

    pub fn dispatcher(&self) -> &RewriteDispatcher {
        &self.dispatcher
    }

    /// Decisions taken so far in the current build
    pub fn summary(&self) -> BuildSummary {
        self.state.summary(0)
    }
}

impl Plugin for FobRewriteImportsPlugin {
    fn name(&self) -> Cow<'static, str> {
        PLUGIN_NAME.into()
    }

    fn register_hook_usage(&self) -> HookUsage {
        HookUsage::ResolveId | HookUsage::Load | HookUsage::BuildEnd
    }

    fn resolve_id(
        &self,
        _ctx: &PluginContext,
        args: &HookResolveIdArgs<'_>,
    ) -> impl std::future::Future<Output = HookResolveIdReturn> + Send {
        let mut reference = ImportReference::new(
            args.specifier,
            import_kind(args.kind, args.importer.is_none()),
        );
        if let Some(importer) = args.importer {
            reference = reference.with_importer(importer);
        }
        let dispatcher = Arc::clone(&self.dispatcher);
        let state = Arc::clone(&self.state);

        async move {
            let Some(instruction) = dispatcher.dispatch(&reference)? else {
                return Ok(None);
            };
            state.record(&instruction);

            let output = match instruction {
                ResolveInstruction::External { path } => HookResolveIdOutput {
                    id: path.into(),
                    external: Some(ResolvedExternal::Bool(true)),
                    ..Default::default()
                },
                ResolveInstruction::Redirect {
                    namespace: SyntheticNamespace::Replace,
                    path,
                    plugin_data,
                } => {
                    let sequence = state.sequence.fetch_add(1, Ordering::Relaxed);
                    let id = replace_id(sequence, &path);
                    if let Some(content) = plugin_data {
                        state.pending.lock().insert(id.clone(), content);
                    }
                    HookResolveIdOutput {
                        id: id.into(),
                        ..Default::default()
                    }
                }
                ResolveInstruction::Redirect {
                    namespace: SyntheticNamespace::Remove,
                    path,
                    ..
                } => HookResolveIdOutput {
                    id: remove_id(&path).into(),
                    ..Default::default()
                },
                ResolveInstruction::Unchanged => return Ok(None),
            };

            Ok(Some(output))
        }
    }

    fn load(
        &self,
        _ctx: &PluginContext,
        args: &HookLoadArgs<'_>,
    ) -> impl std::future::Future<Output = HookLoadReturn> + Send {
        let id = args.id.to_string();
        let dispatcher = Arc::clone(&self.dispatcher);
        let state = Arc::clone(&self.state);

        async move {
            let Some((namespace, path)) = parse_virtual_id(&id) else {
                return Ok(None);
            };

            let content = state.take_pending(&id);
            let code = dispatcher.load(namespace, path, content.as_deref())?;

            Ok(Some(HookLoadOutput {
                code: code.into(),
                module_type: Some(ModuleType::Js),
                ..Default::default()
            }))
        }
    }

    fn build_end(
        &self,
        _ctx: &PluginContext,
        args: Option<&HookBuildEndArgs<'_>>,
    ) -> impl std::future::Future<Output = HookNoopReturn> + Send {
        let errors = args.map_or(0, |args| args.errors.len());
        let dispatcher = Arc::clone(&self.dispatcher);
        let state = Arc::clone(&self.state);

        async move {
            dispatcher.finish(&state.summary(errors));
            state.reset();
            Ok(())
        }
    }
}

fn import_kind(kind: rolldown_common::ImportKind, is_entry: bool) -> ImportKind {
    use rolldown_common::ImportKind as Host;

    if is_entry {
        return ImportKind::EntryPoint;
    }

    match kind {
        Host::Import => ImportKind::ImportStatement,
        Host::DynamicImport => ImportKind::DynamicImport,
        Host::Require => ImportKind::RequireCall,
        Host::AtImport => ImportKind::ImportRule,
        Host::UrlImport => ImportKind::UrlToken,
        Host::NewUrl => ImportKind::NewUrl,
        Host::HotAccept => ImportKind::HotAccept,
    }
}

fn replace_id(sequence: u64, specifier: &str) -> String {
    format!("\0{}:{}:{}", SyntheticNamespace::Replace, sequence, specifier)
}

/// The `.cjs` suffix makes Rolldown treat the empty module as CommonJS, so
/// default and named imports of it evaluate to `undefined` instead of failing
/// to link.
fn remove_id(specifier: &str) -> String {
    format!("\0{}:{}{}", SyntheticNamespace::Remove, specifier, REMOVED_SUFFIX)
}

const REMOVED_SUFFIX: &str = ".cjs";

/// Split a virtual id into its namespace and the raw specifier
fn parse_virtual_id(id: &str) -> Option<(SyntheticNamespace, &str)> {
    let rest = id.strip_prefix('\0')?;

    SyntheticNamespace::ALL.into_iter().find_map(|namespace| {
        let body = rest.strip_prefix(namespace.as_str())?.strip_prefix(':')?;
        match namespace {
            SyntheticNamespace::Replace => {
                let (sequence, specifier) = body.split_once(':')?;
                sequence.parse::<u64>().ok()?;
                Some((namespace, specifier))
            }
            SyntheticNamespace::Remove => {
                Some((namespace, body.strip_suffix(REMOVED_SUFFIX)?))
            }
        }
    })
}
