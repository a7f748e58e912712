//! npm registry response types.

use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::HashMap;

use pakt_core::manifest::DependencyMap;

/// The registry's full document for one package name.
#[derive(Debug, Clone, Deserialize)]
pub struct Packument {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "dist-tags")]
    pub dist_tags: HashMap<String, String>,
    #[serde(default)]
    pub versions: IndexMap<String, VersionMetadata>,
}

/// One published version within a packument.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionMetadata {
    #[serde(default)]
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub dependencies: DependencyMap,
    #[serde(default, rename = "optionalDependencies")]
    pub optional_dependencies: DependencyMap,
    #[serde(default)]
    pub dist: Dist,
}

/// Content location and integrity for one published version.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Dist {
    #[serde(default)]
    pub tarball: String,
    #[serde(default)]
    pub shasum: String,
}
