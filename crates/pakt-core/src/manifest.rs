use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::registry::RegistryName;

/// Mapping from dependency name to requested range, in declaration order.
pub type DependencyMap = IndexMap<String, String>;

/// A resolved package description.
///
/// Only the fields the resolver and hoister actually interpret are typed;
/// anything else a registry returns is carried opaquely in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    /// Resolution identity. Equals `version` for registry packages and a
    /// content hash for exotic sources, where the version alone does not
    /// identify the content.
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub dependencies: DependencyMap,
    #[serde(default, rename = "optionalDependencies")]
    pub optional_dependencies: DependencyMap,
    #[serde(default)]
    pub remote: Remote,
    /// Registry passthrough metadata the core never interprets.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Manifest {
    /// Human-readable `name@version` identifier.
    pub fn human_id(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

/// Where a resolved package's content comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remote {
    #[serde(rename = "type")]
    pub kind: RemoteKind,
    /// Resolved location, possibly suffixed with `#<hash>`.
    pub resolved: String,
    /// The raw source reference (tarball URL, git URL, or local path).
    #[serde(default)]
    pub reference: String,
    /// Content hash, when known.
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub registry: RegistryName,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteKind {
    #[default]
    Tarball,
    Git,
    File,
}
