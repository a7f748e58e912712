//! The resolution orchestrator.
//!
//! Owns the global pattern and reference indices, dedupes in-flight
//! resolutions by `registry:pattern` key, and fans out the top-level
//! resolution pass.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::{join_all, BoxFuture};
use indexmap::IndexMap;

use pakt_core::config::Config;
use pakt_core::lockfile::{LockedEntry, Lockfile};
use pakt_core::manifest::Manifest;
use pakt_core::registry::RegistryName;
use pakt_util::errors::{PaktError, PaktResult};
use pakt_util::queue::ConcurrencyQueue;

use crate::plugin::{ResolveContext, ResolverPlugin};
use crate::reference::PackageReference;
use crate::request::PackageRequest;
use crate::version;

/// One seed resolution request, typically a project manifest entry.
#[derive(Debug, Clone)]
pub struct DependencyRequest {
    pub pattern: String,
    pub registry: RegistryName,
    pub optional: bool,
}

/// A pattern's resolved manifest together with its package reference.
///
/// The `Arc<Manifest>` pointer doubles as the resolution identity:
/// patterns that share it resolved to the exact same package.
#[derive(Clone)]
pub struct Resolution {
    pub manifest: Arc<Manifest>,
    pub reference: Arc<PackageReference>,
}

pub struct PackageResolver {
    config: Config,
    lockfile: Lockfile,
    plugin: Arc<dyn ResolverPlugin>,
    fetching_queue: ConcurrencyQueue<Manifest>,
    /// All mutable indices live behind one mutex. The mutex is never held
    /// across an await point; that discipline is what keeps the indices
    /// coherent under the multithreaded runtime.
    state: Mutex<ResolverState>,
}

#[derive(Default)]
struct ResolverState {
    /// pattern -> resolution, in completion order.
    patterns: IndexMap<String, Resolution>,
    /// package name -> patterns that resolved to it. Kept in lockstep
    /// with `patterns`.
    patterns_by_package: HashMap<String, Vec<String>>,
    references_by_name: HashMap<String, Vec<Arc<PackageReference>>>,
    /// `registry:pattern` keys that are being (or have been) resolved.
    fetching_patterns: HashSet<String>,
    /// Patterns with no lockfile entry.
    new_patterns: Vec<String>,
}

impl PackageResolver {
    pub fn new(config: Config, lockfile: Lockfile, plugin: Arc<dyn ResolverPlugin>) -> Arc<Self> {
        let fetching_queue =
            ConcurrencyQueue::new("resolver fetching", config.network_concurrency);
        Arc::new(Self {
            config,
            lockfile,
            plugin,
            fetching_queue,
            state: Mutex::new(ResolverState::default()),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, ResolverState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn lockfile(&self) -> &Lockfile {
        &self.lockfile
    }

    /// Resolve every seed pattern concurrently, then drop transient
    /// plugin caches.
    ///
    /// Any failure on a non-optional chain aborts the whole pass.
    pub async fn init(&self, deps: Vec<DependencyRequest>) -> PaktResult<()> {
        let futures: Vec<_> = deps
            .into_iter()
            .map(|dep| self.find(dep.pattern, dep.registry, dep.optional, None))
            .collect();
        for result in join_all(futures).await {
            result?;
        }
        self.plugin.clear_session_cache();
        Ok(())
    }

    /// Resolve a single pattern, recursing through its dependencies.
    ///
    /// A `registry:pattern` key already marked in-flight returns
    /// immediately: that is both the dedup of concurrent identical work
    /// and the cycle breaker (a dependency cycle degenerates into
    /// already-in-flight no-ops).
    pub fn find(
        &self,
        pattern: String,
        registry: RegistryName,
        optional: bool,
        parent_request: Option<Arc<PackageRequest>>,
    ) -> BoxFuture<'_, PaktResult<()>> {
        Box::pin(async move {
            let fetch_key = format!("{registry}:{pattern}");
            {
                let mut state = self.lock_state();
                if !state.fetching_patterns.insert(fetch_key) {
                    return Ok(());
                }
                if self.lockfile.get_locked(&pattern).is_none() {
                    state.new_patterns.push(pattern.clone());
                }
            }

            // `ignore` follows the parent chain down
            let ignore = parent_request.as_ref().map(|p| p.ignore).unwrap_or(false);
            let request = PackageRequest::new(pattern, registry, optional, ignore, parent_request);

            match Arc::clone(&request).find(self).await {
                Err(err) if request.optional => {
                    tracing::warn!(
                        "optional dependency {} failed to resolve: {err}",
                        request.human_chain()
                    );
                    Ok(())
                }
                result => result,
            }
        })
    }

    /// Fetch a manifest through the plugin, serialized per package so the
    /// same unit of work is never in flight twice.
    pub(crate) fn fetch_manifest(
        &self,
        ctx: ResolveContext,
    ) -> impl Future<Output = PaktResult<Manifest>> {
        let plugin = Arc::clone(&self.plugin);
        let key = format!("{}:{}", ctx.registry, ctx.name);
        self.fetching_queue
            .push(&key, move || async move { plugin.resolve(&ctx).await })
    }

    /// Record a resolved pattern, keeping both indices in sync.
    pub fn add_pattern(&self, pattern: &str, resolution: Resolution) {
        let mut state = self.lock_state();
        state
            .patterns_by_package
            .entry(resolution.manifest.name.clone())
            .or_default()
            .push(pattern.to_string());
        state.patterns.insert(pattern.to_string(), resolution);
    }

    /// Forget a pattern, keeping both indices in sync.
    pub fn remove_pattern(&self, pattern: &str) {
        let mut state = self.lock_state();
        let Some(resolution) = state.patterns.shift_remove(pattern) else {
            return;
        };
        if let Some(patterns) = state
            .patterns_by_package
            .get_mut(&resolution.manifest.name)
        {
            patterns.retain(|p| p != pattern);
        }
    }

    pub fn get_resolved_pattern(&self, pattern: &str) -> Option<Resolution> {
        self.lock_state().patterns.get(pattern).cloned()
    }

    /// Like [`get_resolved_pattern`](Self::get_resolved_pattern) but a
    /// missing entry is an internal invariant failure.
    pub fn get_strict_resolved_pattern(&self, pattern: &str) -> PaktResult<Resolution> {
        self.get_resolved_pattern(pattern).ok_or_else(|| {
            PaktError::Invariant {
                message: format!("expected pattern {pattern} to be resolved"),
            }
            .into()
        })
    }

    /// Find the resolution of `name` at exactly `version`, if any.
    pub fn get_exact_version_match(&self, name: &str, version: &str) -> Option<Resolution> {
        let state = self.lock_state();
        let patterns = state.patterns_by_package.get(name)?;
        patterns.iter().find_map(|pattern| {
            let resolution = state.patterns.get(pattern)?;
            (resolution.manifest.version == version).then(|| resolution.clone())
        })
    }

    /// Find the highest already-resolved version of `name` satisfying
    /// `range`. Reusing it instead of resolving anew is what keeps the
    /// install minimal.
    pub fn highest_satisfying_resolution(&self, name: &str, range: &str) -> Option<Resolution> {
        let state = self.lock_state();
        let patterns = state.patterns_by_package.get(name)?;

        let mut seen = HashSet::new();
        let mut best: Option<(semver::Version, Resolution)> = None;
        for pattern in patterns {
            let Some(resolution) = state.patterns.get(pattern) else {
                continue;
            };
            if !seen.insert(Arc::as_ptr(&resolution.manifest)) {
                continue;
            }
            let Ok(parsed) = version::parse_version(&resolution.manifest.version) else {
                continue;
            };
            if !version::satisfies(&parsed, range) {
                continue;
            }
            match &best {
                Some((existing, _)) if *existing >= parsed => {}
                _ => best = Some((parsed, resolution.clone())),
            }
        }
        best.map(|(_, resolution)| resolution)
    }

    /// Reduce a pattern list to one pattern per distinct resolution.
    pub fn dedupe_patterns<I, S>(&self, patterns: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let state = self.lock_state();
        let mut seen = HashSet::new();
        let mut deduped = Vec::new();
        for pattern in patterns {
            let Some(resolution) = state.patterns.get(pattern.as_ref()) else {
                continue;
            };
            if seen.insert(Arc::as_ptr(&resolution.manifest)) {
                deduped.push(pattern.as_ref().to_string());
            }
        }
        deduped
    }

    pub fn register_reference(&self, reference: Arc<PackageReference>) {
        self.lock_state()
            .references_by_name
            .entry(reference.name.clone())
            .or_default()
            .push(reference);
    }

    /// All package names seen during resolution.
    pub fn get_all_dependency_names(&self) -> Vec<String> {
        let state = self.lock_state();
        let mut names: Vec<String> = state.patterns_by_package.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// One manifest per distinct resolution, in completion order.
    pub fn get_manifests(&self) -> Vec<Arc<Manifest>> {
        let state = self.lock_state();
        let mut seen = HashSet::new();
        state
            .patterns
            .values()
            .filter(|r| seen.insert(Arc::as_ptr(&r.manifest)))
            .map(|r| Arc::clone(&r.manifest))
            .collect()
    }

    /// Flat list of every registered package reference.
    pub fn get_package_references(&self) -> Vec<Arc<PackageReference>> {
        let state = self.lock_state();
        state
            .references_by_name
            .values()
            .flat_map(|refs| refs.iter().cloned())
            .collect()
    }

    /// Patterns that had no lockfile entry at the start of this run.
    pub fn new_patterns(&self) -> Vec<String> {
        self.lock_state().new_patterns.clone()
    }

    pub fn is_new_pattern(&self, pattern: &str) -> bool {
        self.lock_state().new_patterns.iter().any(|p| p == pattern)
    }

    /// Produce the serializable lockfile map for everything resolved in
    /// this run.
    pub fn to_lockfile(&self) -> Lockfile {
        let state = self.lock_state();
        let mut lockfile = Lockfile::default();
        for (pattern, resolution) in &state.patterns {
            let manifest = &resolution.manifest;
            lockfile.entries.insert(
                pattern.clone(),
                LockedEntry {
                    name: manifest.name.clone(),
                    version: manifest.version.clone(),
                    uid: if manifest.uid == manifest.version {
                        String::new()
                    } else {
                        manifest.uid.clone()
                    },
                    resolved: manifest.remote.resolved.clone(),
                    registry: manifest.remote.registry,
                    dependencies: manifest.dependencies.clone(),
                    optional_dependencies: manifest.optional_dependencies.clone(),
                    permissions: resolution.reference.permissions().into_iter().collect(),
                },
            );
        }
        lockfile
    }
}
