use std::path::{Path, PathBuf};

use crate::registry::RegistryName;

/// Default registry endpoint for npm-namespace packages.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";

/// Global cap on concurrent network fetches.
pub const DEFAULT_NETWORK_CONCURRENCY: usize = 8;

/// Bounded retry count for transient network failures.
pub const DEFAULT_NETWORK_RETRIES: u32 = 3;

/// Configuration for a single install run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Project root the flattened layout is joined against.
    pub cwd: PathBuf,
    /// Where resolved package content lives on disk; module locations
    /// under it act as the content identity during hoisting.
    pub cache_dir: PathBuf,
    /// Flat-mode override: when set, every module installs into this one
    /// shared folder instead of per-registry container folders.
    pub modules_folder: Option<PathBuf>,
    pub registry_url: String,
    pub network_concurrency: usize,
    pub network_retries: u32,
    /// Frozen mode: the lockfile is authoritative and resolution must not
    /// deviate from it.
    pub frozen: bool,
    /// Allow prompting the user to pick a version on resolution conflicts.
    pub interactive: bool,
}

impl Config {
    pub fn new(cwd: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            cache_dir: cache_dir.into(),
            modules_folder: None,
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            network_concurrency: DEFAULT_NETWORK_CONCURRENCY,
            network_retries: DEFAULT_NETWORK_RETRIES,
            frozen: false,
            interactive: false,
        }
    }

    /// The container folder name used for a registry's modules, honoring
    /// the flat-mode override.
    pub fn module_folder(&self, registry: RegistryName) -> &str {
        match &self.modules_folder {
            Some(folder) => folder.to_str().unwrap_or(registry.folder()),
            None => registry.folder(),
        }
    }

    /// Canonical on-disk location for one resolved package's content.
    ///
    /// Two patterns that resolve to the same content map to the same path,
    /// which is what makes this the identity comparator during hoisting.
    pub fn generate_module_path(&self, name: &str, version: &str, uid: &str) -> PathBuf {
        let slug = name.replace('/', "-");
        if uid.is_empty() || uid == version {
            self.cache_dir.join(format!("{slug}-{version}"))
        } else {
            self.cache_dir.join(format!("{slug}-{version}-{uid}"))
        }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_path_is_stable_identity() {
        let config = Config::new("/project", "/cache");
        let a = config.generate_module_path("left-pad", "1.3.0", "1.3.0");
        let b = config.generate_module_path("left-pad", "1.3.0", "1.3.0");
        assert_eq!(a, b);
        assert_eq!(a, PathBuf::from("/cache/left-pad-1.3.0"));
    }

    #[test]
    fn scoped_names_are_slugged() {
        let config = Config::new("/project", "/cache");
        let path = config.generate_module_path("@types/node", "20.1.0", "deadbeef");
        assert_eq!(path, PathBuf::from("/cache/@types-node-20.1.0-deadbeef"));
    }

    #[test]
    fn flat_mode_overrides_folder() {
        let mut config = Config::new("/project", "/cache");
        assert_eq!(config.module_folder(RegistryName::Npm), "node_modules");
        config.modules_folder = Some(PathBuf::from("packages"));
        assert_eq!(config.module_folder(RegistryName::Npm), "packages");
    }
}
