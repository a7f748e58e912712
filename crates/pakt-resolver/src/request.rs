//! One attempt to resolve a dependency pattern within a parent chain.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::join_all;
use miette::WrapErr;

use pakt_core::manifest::{Manifest, RemoteKind};
use pakt_core::pattern::{make_pattern, normalize_pattern};
use pakt_core::registry::RegistryName;
use pakt_util::errors::{PaktError, PaktResult};

use crate::plugin::ResolveContext;
use crate::reference::PackageReference;
use crate::resolver::{PackageResolver, Resolution};
use crate::version;

pub struct PackageRequest {
    pub pattern: String,
    pub registry: RegistryName,
    pub optional: bool,
    /// Propagated down from the parent chain; merged into the reference.
    pub ignore: bool,
    pub parent_request: Option<Arc<PackageRequest>>,
}

impl PackageRequest {
    pub fn new(
        pattern: String,
        registry: RegistryName,
        optional: bool,
        ignore: bool,
        parent_request: Option<Arc<PackageRequest>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            pattern,
            registry,
            optional,
            ignore,
            parent_request,
        })
    }

    /// Names of the requesting ancestry, outermost first.
    pub fn parent_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut current = self.parent_request.clone();
        while let Some(request) = current {
            names.push(normalize_pattern(&request.pattern).name);
            current = request.parent_request.clone();
        }
        names.reverse();
        names
    }

    /// The full request chain as `root-dep > child > grandchild`.
    pub fn human_chain(&self) -> String {
        let mut chain = vec![self.pattern.clone()];
        let mut current = self.parent_request.clone();
        while let Some(request) = current {
            chain.push(request.pattern.clone());
            current = request.parent_request.clone();
        }
        chain.reverse();
        chain.join(" > ")
    }

    /// Rebuild a manifest from the lockfile, skipping the plugin entirely.
    fn locked_manifest(&self, resolver: &PackageResolver) -> Option<Manifest> {
        let entry = resolver.lockfile().get_locked(&self.pattern)?;
        Some(entry.to_manifest(RemoteKind::Tarball))
    }

    /// Get this pattern's manifest: lockfile-pinned data when present,
    /// otherwise the external resolver plugin.
    async fn find_version_info(&self, resolver: &PackageResolver) -> PaktResult<Manifest> {
        if let Some(manifest) = self.locked_manifest(resolver) {
            return Ok(manifest);
        }
        if resolver.config().frozen {
            return Err(PaktError::Resolution {
                message: format!(
                    "The pattern {} is not in the lockfile and the lockfile is frozen",
                    self.pattern
                ),
            }
            .into());
        }

        let parts = normalize_pattern(&self.pattern);
        let ctx = ResolveContext {
            pattern: self.pattern.clone(),
            name: parts.name,
            range: parts.range,
            registry: self.registry,
            parent_chain: self.parent_names(),
        };
        resolver.fetch_manifest(ctx).await
    }

    /// Check the manifest carries the identity fields everything
    /// downstream depends on.
    fn validate(manifest: &Manifest, pattern: &str) -> PaktResult<()> {
        if manifest.name.is_empty() {
            return Err(PaktError::Manifest {
                message: format!("Package {pattern} doesn't have a name"),
            }
            .into());
        }
        let human = manifest.human_id();
        if manifest.version.is_empty() {
            return Err(PaktError::Manifest {
                message: format!("Package {human} doesn't have a version"),
            }
            .into());
        }
        version::parse_version(&manifest.version)?;
        if manifest.uid.is_empty() {
            return Err(PaktError::Manifest {
                message: format!("Package {human} doesn't have a uid"),
            }
            .into());
        }
        Ok(())
    }

    /// Resolve this request: fetch the manifest, reuse a compatible
    /// already-resolved version when one exists, otherwise create a new
    /// reference and recurse into its dependencies.
    pub(crate) async fn find(self: Arc<Self>, resolver: &PackageResolver) -> PaktResult<()> {
        let manifest = self
            .find_version_info(resolver)
            .await
            .wrap_err_with(|| format!("Couldn't resolve {}", self.human_chain()))?;

        let parts = normalize_pattern(&self.pattern);

        // while this pattern was resolving, another request may have
        // already produced a version that satisfies the same range; reuse
        // it instead of installing a duplicate. In frozen mode only the
        // lockfile-pinned version may be reused.
        let existing = if resolver.config().frozen {
            resolver
                .lockfile()
                .get_locked(&self.pattern)
                .and_then(|locked| {
                    resolver.get_exact_version_match(&manifest.name, &locked.version)
                })
        } else {
            let ranged = (!version::is_wildcard(&parts.range))
                .then(|| resolver.highest_satisfying_resolution(&manifest.name, &parts.range))
                .flatten();
            ranged
                .or_else(|| resolver.get_exact_version_match(&manifest.name, &manifest.version))
        };
        if let Some(resolution) = existing {
            let reference = &resolution.reference;
            reference.add_request(&self);
            reference.add_pattern(&self.pattern, resolver.lockfile());
            reference.add_optional(self.optional);
            if self.ignore {
                reference.add_ignore(true, resolver, &mut HashSet::new());
            }
            resolver.add_pattern(&self.pattern, resolution.clone());
            return Ok(());
        }

        Self::validate(&manifest, &self.pattern)?;

        let reference = Arc::new(PackageReference::new(&manifest));
        reference.set_fresh(resolver.lockfile().get_locked(&self.pattern).is_none());
        reference.add_request(&self);

        // recurse into dependencies; optional dependencies are always
        // optional, and children of an optional request inherit it
        let mut child_patterns = Vec::new();
        let mut child_futures = Vec::new();
        for (name, range) in &manifest.dependencies {
            let dep_pattern = make_pattern(name, range);
            child_patterns.push(dep_pattern.clone());
            child_futures.push(resolver.find(
                dep_pattern,
                manifest.remote.registry,
                self.optional,
                Some(Arc::clone(&self)),
            ));
        }
        for (name, range) in &manifest.optional_dependencies {
            let dep_pattern = make_pattern(name, range);
            child_patterns.push(dep_pattern.clone());
            child_futures.push(resolver.find(
                dep_pattern,
                manifest.remote.registry,
                true,
                Some(Arc::clone(&self)),
            ));
        }
        for result in join_all(child_futures).await {
            result?;
        }

        reference.set_dependencies(child_patterns);
        reference.add_pattern(&self.pattern, resolver.lockfile());
        reference.add_optional(self.optional);
        if self.ignore {
            reference.add_ignore(true, resolver, &mut HashSet::new());
        }
        resolver.add_pattern(
            &self.pattern,
            Resolution {
                manifest: Arc::new(manifest),
                reference: Arc::clone(&reference),
            },
        );
        resolver.register_reference(reference);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_chain_walks_parents() {
        let root = PackageRequest::new(
            "a@^1.0.0".to_string(),
            RegistryName::Npm,
            false,
            false,
            None,
        );
        let child = PackageRequest::new(
            "b@~2.0.0".to_string(),
            RegistryName::Npm,
            false,
            false,
            Some(root),
        );
        assert_eq!(child.human_chain(), "a@^1.0.0 > b@~2.0.0");
        assert_eq!(child.parent_names(), vec!["a".to_string()]);
    }

    #[test]
    fn validation_requires_identity_fields() {
        let mut manifest = Manifest {
            name: "a".to_string(),
            version: "1.0.0".to_string(),
            uid: "1.0.0".to_string(),
            ..Default::default()
        };
        assert!(PackageRequest::validate(&manifest, "a@^1.0.0").is_ok());

        manifest.version = "not-semver".to_string();
        assert!(PackageRequest::validate(&manifest, "a@^1.0.0").is_err());

        manifest.version.clear();
        assert!(PackageRequest::validate(&manifest, "a@^1.0.0").is_err());

        manifest.version = "1.0.0".to_string();
        manifest.uid.clear();
        assert!(PackageRequest::validate(&manifest, "a@^1.0.0").is_err());
    }
}
