use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::manifest::{DependencyMap, Manifest, Remote, RemoteKind};
use crate::registry::RegistryName;

/// Deterministic lockfile pinning exact resolved versions per pattern.
///
/// Entries are keyed by pattern and kept sorted so serialization is
/// stable across runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lockfile {
    #[serde(default)]
    pub entries: BTreeMap<String, LockedEntry>,
    /// Strict (frozen) mode: resolution must not deviate from the pinned
    /// versions, and a missing entry is an error.
    #[serde(skip)]
    pub strict: bool,
}

/// A single locked resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockedEntry {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub uid: String,
    /// Resolved location, possibly suffixed with `#<hash>`.
    pub resolved: String,
    #[serde(default)]
    pub registry: RegistryName,
    #[serde(default)]
    pub dependencies: DependencyMap,
    #[serde(default)]
    pub optional_dependencies: DependencyMap,
    #[serde(default)]
    pub permissions: BTreeMap<String, bool>,
}

impl Lockfile {
    /// Load and parse a lockfile from the given path.
    pub fn from_path(path: &Path, strict: bool) -> miette::Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| pakt_util::errors::PaktError::Generic {
                message: format!("Failed to read lockfile: {e}"),
            })?;
        let mut lockfile: Lockfile = toml::from_str(&content).map_err(|e| {
            pakt_util::errors::PaktError::Generic {
                message: format!("Failed to parse lockfile: {e}"),
            }
        })?;
        lockfile.strict = strict;
        Ok(lockfile)
    }

    /// Serialize the lockfile to a pretty-printed TOML string.
    pub fn to_string_pretty(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Look up the pinned resolution for a pattern.
    pub fn get_locked(&self, pattern: &str) -> Option<&LockedEntry> {
        self.entries.get(pattern)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl LockedEntry {
    /// Rebuild a manifest from this entry, short-circuiting the resolver
    /// plugin for patterns the lockfile already pins.
    pub fn to_manifest(&self, remote_kind: RemoteKind) -> Manifest {
        let (reference, hash) = explode_hashed_url(&self.resolved);
        Manifest {
            name: self.name.clone(),
            version: self.version.clone(),
            uid: if self.uid.is_empty() {
                self.version.clone()
            } else {
                self.uid.clone()
            },
            dependencies: self.dependencies.clone(),
            optional_dependencies: self.optional_dependencies.clone(),
            remote: Remote {
                kind: remote_kind,
                resolved: self.resolved.clone(),
                reference: reference.to_string(),
                hash: hash.to_string(),
                registry: self.registry,
            },
            extra: serde_json::Map::new(),
        }
    }
}

/// Split a `url#hash` location into its parts.
pub fn explode_hashed_url(resolved: &str) -> (&str, &str) {
    match resolved.split_once('#') {
        Some((url, hash)) => (url, hash),
        None => (resolved, ""),
    }
}
