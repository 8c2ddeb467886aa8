//! Package identity classification for import specifiers
//!
//! Splits a bare or scoped specifier such as `@scope/pkg/lib/x.js` into its
//! scope (`@scope/`), package name (`pkg`) and subpath (`/lib/x.js`).
//! Specifiers that do not name a package (relative or absolute paths, empty
//! strings) classify with every component absent. That is not an error:
//! callers use the absence to recognise non-package references.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Optional scope segment, a name without `/` or `@`, then an optional subpath.
static PACKAGE_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(@[^/]+/)?([^/@]+)(/.+)?$").expect("package path pattern is valid")
});

/// Package components of an import specifier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageIdentity {
    /// Scope segment including its trailing slash, e.g. `@scope/`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Bare package name, e.g. `pkg`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Everything after the package name including the leading slash
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subpath: Option<String>,
}

impl PackageIdentity {
    /// Whether the specifier named a package at all
    pub fn is_package(&self) -> bool {
        self.name.is_some()
    }

    /// Scope and name joined, e.g. `@scope/pkg` or `lodash`
    pub fn package_key(&self) -> Option<String> {
        let name = self.name.as_deref()?;
        Some(match &self.scope {
            Some(scope) => format!("{}{}", scope, name),
            None => name.to_string(),
        })
    }
}

/// Classify an import specifier into its package components.
///
/// # Example
///
/// ```rust
/// use fob_plugin_rewrite_imports::classify;
///
/// let identity = classify("@scope/pkg/lib/x.js");
/// assert_eq!(identity.scope.as_deref(), Some("@scope/"));
/// assert_eq!(identity.name.as_deref(), Some("pkg"));
/// assert_eq!(identity.subpath.as_deref(), Some("/lib/x.js"));
/// ```
pub fn classify(specifier: &str) -> PackageIdentity {
    let Some(captures) = PACKAGE_PATH.captures(specifier) else {
        return PackageIdentity::default();
    };

    let name = captures.get(2).map(|m| m.as_str());

    // `./x` and `../x` satisfy the pattern with `.` or `..` as the name
    if matches!(name, Some(".") | Some("..")) {
        return PackageIdentity::default();
    }

    PackageIdentity {
        scope: captures.get(1).map(|m| m.as_str().to_string()),
        name: name.map(str::to_string),
        subpath: captures.get(3).map(|m| m.as_str().to_string()),
    }
}

/// Turns a raw specifier into a [`PackageIdentity`]
///
/// Hosts that need a different notion of package identity can supply their own
/// implementation to [`RewriteDispatcher::with_classifier`](crate::RewriteDispatcher::with_classifier).
pub trait ReferenceClassifier: Send + Sync {
    fn classify(&self, specifier: &str) -> PackageIdentity;
}

/// Default classifier backed by [`classify`]
#[derive(Debug, Clone, Copy, Default)]
pub struct PackagePathClassifier;

impl ReferenceClassifier for PackagePathClassifier {
    fn classify(&self, specifier: &str) -> PackageIdentity {
        classify(specifier)
    }
}
