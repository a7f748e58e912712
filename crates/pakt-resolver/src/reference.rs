//! The unique node representing one concrete resolved package.
//!
//! Many patterns and requests can attach to a single reference; its
//! `optional` and `ignore` flags only ever move toward "required" /
//! "not ignored" once set.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use pakt_core::lockfile::Lockfile;
use pakt_core::manifest::{Manifest, Remote};
use pakt_core::registry::RegistryName;
use pakt_util::errors::{PaktError, PaktResult};

use crate::request::PackageRequest;
use crate::resolver::PackageResolver;

static NEXT_REFERENCE_ID: AtomicUsize = AtomicUsize::new(0);

pub struct PackageReference {
    /// Process-unique id, used as the visited-set key when walking
    /// possibly-cyclic reference graphs.
    id: usize,
    pub name: String,
    pub version: String,
    pub uid: String,
    pub registry: RegistryName,
    pub remote: Remote,
    state: Mutex<ReferenceState>,
}

#[derive(Default)]
struct ReferenceState {
    /// Child patterns, set once the reference's own dependencies resolve.
    dependencies: Vec<String>,
    /// Every pattern that resolved to this reference.
    patterns: Vec<String>,
    /// Every request that attached to this reference.
    requests: Vec<Arc<PackageRequest>>,
    optional: Option<bool>,
    ignore: Option<bool>,
    /// Whether this resolution was absent from the lockfile.
    fresh: bool,
    permissions: HashMap<String, bool>,
}

impl PackageReference {
    pub fn new(manifest: &Manifest) -> Self {
        Self {
            id: NEXT_REFERENCE_ID.fetch_add(1, Ordering::Relaxed),
            name: manifest.name.clone(),
            version: manifest.version.clone(),
            uid: manifest.uid.clone(),
            registry: manifest.remote.registry,
            remote: manifest.remote.clone(),
            state: Mutex::new(ReferenceState::default()),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    fn lock_state(&self) -> MutexGuard<'_, ReferenceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_request(&self, request: &Arc<PackageRequest>) {
        self.lock_state().requests.push(Arc::clone(request));
    }

    pub fn request_count(&self) -> usize {
        self.lock_state().requests.len()
    }

    pub fn set_dependencies(&self, dependencies: Vec<String>) {
        self.lock_state().dependencies = dependencies;
    }

    pub fn dependencies(&self) -> Vec<String> {
        self.lock_state().dependencies.clone()
    }

    pub fn patterns(&self) -> Vec<String> {
        self.lock_state().patterns.clone()
    }

    pub fn set_fresh(&self, fresh: bool) {
        self.lock_state().fresh = fresh;
    }

    pub fn is_fresh(&self) -> bool {
        self.lock_state().fresh
    }

    pub fn optional(&self) -> Option<bool> {
        self.lock_state().optional
    }

    pub fn ignore(&self) -> Option<bool> {
        self.lock_state().ignore
    }

    pub fn is_ignored(&self) -> bool {
        self.lock_state().ignore == Some(true)
    }

    pub fn set_permission(&self, key: &str, value: bool) {
        self.lock_state().permissions.insert(key.to_string(), value);
    }

    pub fn permissions(&self) -> HashMap<String, bool> {
        self.lock_state().permissions.clone()
    }

    /// Look up a permission recorded for this package. Unknown keys are an
    /// error under a strict lockfile and default to denied otherwise.
    pub fn has_permission(&self, key: &str, lockfile: &Lockfile) -> PaktResult<bool> {
        if let Some(&value) = self.lock_state().permissions.get(key) {
            return Ok(value);
        }
        if lockfile.strict {
            return Err(PaktError::Resolution {
                message: format!(
                    "Permission {key} not found in permissions for {}@{}",
                    self.name, self.version
                ),
            }
            .into());
        }
        Ok(false)
    }

    /// Record a pattern as resolving here and pull any permission
    /// overrides the lockfile holds for it.
    pub fn add_pattern(&self, pattern: &str, lockfile: &Lockfile) {
        self.lock_state().patterns.push(pattern.to_string());

        if let Some(entry) = lockfile.get_locked(pattern) {
            for (key, &value) in &entry.permissions {
                self.set_permission(key, value);
            }
        }
    }

    /// Merge an optionality observation. Once any requester needs this
    /// package non-optionally it stays non-optional.
    pub fn add_optional(&self, optional: bool) {
        let mut state = self.lock_state();
        match state.optional {
            None => state.optional = Some(optional),
            Some(_) if !optional => state.optional = Some(false),
            Some(_) => {}
        }
    }

    /// Merge an ignore observation and propagate the same decision to
    /// every transitive dependency reference.
    ///
    /// `ancestry` carries the visited set so cyclic graphs terminate;
    /// callers start with an empty set.
    pub fn add_ignore(
        &self,
        ignore: bool,
        resolver: &PackageResolver,
        ancestry: &mut HashSet<usize>,
    ) {
        let dependencies = {
            let mut state = self.lock_state();
            match state.ignore {
                None => state.ignore = Some(ignore),
                Some(_) if !ignore => state.ignore = Some(false),
                // already decided; nothing changed, so leave the
                // dependencies alone
                Some(_) => return,
            }
            state.dependencies.clone()
        };

        if !ancestry.insert(self.id) {
            return;
        }

        for pattern in dependencies {
            if let Some(resolution) = resolver.get_resolved_pattern(&pattern) {
                resolution.reference.add_ignore(ignore, resolver, ancestry);
            }
        }
    }
}

impl std::fmt::Debug for PackageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageReference")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("uid", &self.uid)
            .finish()
    }
}
