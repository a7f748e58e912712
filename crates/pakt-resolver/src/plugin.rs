//! The contract between the resolver core and source-specific backends.
//!
//! Registry-backed, git-backed, tarball-backed, and local-path-backed
//! resolution are all implementations of [`ResolverPlugin`]; the core
//! never knows which one it is talking to.

use std::collections::HashMap;

use futures_util::future::BoxFuture;

use pakt_core::manifest::Manifest;
use pakt_core::registry::RegistryName;
use pakt_util::errors::{PaktError, PaktResult};

/// Everything a plugin gets to know about one resolution request.
#[derive(Debug, Clone)]
pub struct ResolveContext {
    pub pattern: String,
    pub name: String,
    pub range: String,
    pub registry: RegistryName,
    /// Requesting ancestry, outermost first. For log and error output only.
    pub parent_chain: Vec<String>,
}

/// Resolve a dependency pattern to a concrete manifest.
///
/// Implementations must populate `name`, `version`, `uid`, both dependency
/// maps, and `remote`; the returned manifest is treated as immutable once
/// a reference is attached to it.
pub trait ResolverPlugin: Send + Sync {
    fn resolve<'a>(&'a self, ctx: &'a ResolveContext) -> BoxFuture<'a, PaktResult<Manifest>>;

    /// Drop any per-session caches (memoized registry responses). Called
    /// once at the end of a resolution run.
    fn clear_session_cache(&self) {}
}

/// A plugin serving manifests from a preloaded pattern map.
///
/// Backs fully-offline resolution (a warmed mirror) and doubles as the
/// test fixture vehicle across the workspace.
#[derive(Debug, Default)]
pub struct StaticResolver {
    manifests: HashMap<String, Manifest>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pattern: impl Into<String>, manifest: Manifest) {
        self.manifests.insert(pattern.into(), manifest);
    }

    /// Builder-style insert for fixture setup.
    pub fn with(mut self, pattern: impl Into<String>, manifest: Manifest) -> Self {
        self.insert(pattern, manifest);
        self
    }
}

impl ResolverPlugin for StaticResolver {
    fn resolve<'a>(&'a self, ctx: &'a ResolveContext) -> BoxFuture<'a, PaktResult<Manifest>> {
        let result = self.manifests.get(&ctx.pattern).cloned().ok_or_else(|| {
            PaktError::Resolution {
                message: format!("Couldn't find package {}", ctx.pattern),
            }
            .into()
        });
        Box::pin(std::future::ready(result))
    }
}
