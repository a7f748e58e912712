//! Command dispatch and handler modules.

mod install;
mod tree;
mod why;

use std::path::Path;
use std::sync::Arc;

use miette::Result;

use pakt_core::config::Config;
use pakt_core::lockfile::Lockfile;
use pakt_core::manifest::Manifest;
use pakt_core::pattern::make_pattern;
use pakt_core::registry::RegistryName;
use pakt_registry::dispatch::DispatchingResolver;
use pakt_resolver::resolver::{DependencyRequest, PackageResolver};
use pakt_util::errors::PaktError;

use crate::cli::{Cli, Command};

pub const LOCKFILE_NAME: &str = "pakt.lock";

/// Route a parsed CLI invocation to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Install {
            frozen,
            modules_folder,
            interactive,
            dry_run,
        } => install::exec(frozen, modules_folder, interactive, dry_run).await,
        Command::Tree { depth } => tree::exec(depth).await,
        Command::Why { package } => why::exec(&package).await,
    }
}

/// Read the project manifest from the current directory.
pub fn load_project(cwd: &Path) -> Result<Manifest> {
    let path = cwd.join("package.json");
    let raw = std::fs::read_to_string(&path).map_err(|e| PaktError::Manifest {
        message: format!("Couldn't read {}: {e}", path.display()),
    })?;
    let manifest = serde_json::from_str(&raw).map_err(|e| PaktError::Manifest {
        message: format!("Invalid manifest at {}: {e}", path.display()),
    })?;
    Ok(manifest)
}

/// Load the lockfile next to the project manifest, empty when absent.
pub fn load_lockfile(cwd: &Path, strict: bool) -> Result<Lockfile> {
    let path = cwd.join(LOCKFILE_NAME);
    if path.exists() {
        Lockfile::from_path(&path, strict)
    } else {
        Ok(Lockfile {
            strict,
            ..Default::default()
        })
    }
}

pub fn build_config(frozen: bool, interactive: bool) -> Result<Config> {
    let cwd = std::env::current_dir().map_err(PaktError::Io)?;
    let cache_dir = cwd.join(".pakt").join("cache");
    let mut config = Config::new(cwd, cache_dir);
    config.frozen = frozen;
    config.interactive = interactive;
    Ok(config)
}

/// Seed requests for every declared top-level dependency.
pub fn seed_requests(project: &Manifest) -> Vec<DependencyRequest> {
    let mut seeds = Vec::new();
    for (name, range) in &project.dependencies {
        seeds.push(DependencyRequest {
            pattern: make_pattern(name, range),
            registry: RegistryName::Npm,
            optional: false,
        });
    }
    for (name, range) in &project.optional_dependencies {
        seeds.push(DependencyRequest {
            pattern: make_pattern(name, range),
            registry: RegistryName::Npm,
            optional: true,
        });
    }
    seeds
}

/// Resolve the whole project. Returns the resolver and the seed patterns.
pub async fn resolve_project(
    config: &Config,
    project: &Manifest,
) -> Result<(Arc<PackageResolver>, Vec<String>)> {
    let lockfile = load_lockfile(&config.cwd, config.frozen)?;
    let plugin = Arc::new(DispatchingResolver::new(config)?);
    let resolver = PackageResolver::new(config.clone(), lockfile, plugin);

    let seeds = seed_requests(project);
    let patterns: Vec<String> = seeds.iter().map(|s| s.pattern.clone()).collect();
    resolver.init(seeds).await?;
    Ok((resolver, patterns))
}
