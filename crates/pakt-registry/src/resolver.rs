//! The registry-backed resolver plugin.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use semver::Version;

use pakt_core::config::Config;
use pakt_core::manifest::{Manifest, Remote, RemoteKind};
use pakt_resolver::plugin::{ResolveContext, ResolverPlugin};
use pakt_resolver::version;
use pakt_util::errors::{PaktError, PaktResult};

use crate::client::RegistryClient;
use crate::metadata::{Packument, VersionMetadata};

pub struct RegistryResolver {
    client: Arc<RegistryClient>,
}

impl RegistryResolver {
    pub fn new(config: &Config) -> PaktResult<Self> {
        Ok(Self {
            client: Arc::new(RegistryClient::new(config)?),
        })
    }

    pub fn with_client(client: Arc<RegistryClient>) -> Self {
        Self { client }
    }

    /// Pick the version of a packument that answers `range`: a dist-tag
    /// when the range names one, otherwise the highest satisfying
    /// published version.
    fn select_version<'p>(
        packument: &'p Packument,
        name: &str,
        range: &str,
    ) -> PaktResult<&'p VersionMetadata> {
        let tag = if version::is_wildcard(range) {
            Some("latest")
        } else if packument.dist_tags.contains_key(range) {
            Some(range)
        } else {
            None
        };
        if let Some(tag) = tag {
            if let Some(pinned) = packument.dist_tags.get(tag) {
                return packument.versions.get(pinned).ok_or_else(|| {
                    PaktError::Resolution {
                        message: format!(
                            "Registry lists {name}@{pinned} under the {tag} tag but has no such version"
                        ),
                    }
                    .into()
                });
            }
        }

        let mut candidates: Vec<(Version, &String)> = packument
            .versions
            .keys()
            .filter_map(|v| Some((version::parse_version(v).ok()?, v)))
            .collect();
        candidates.sort_by(|a, b| a.0.cmp(&b.0));

        candidates
            .iter()
            .rev()
            .find(|(parsed, _)| version::satisfies(parsed, range))
            .and_then(|(_, key)| packument.versions.get(*key))
            .ok_or_else(|| {
                PaktError::Conflict {
                    name: name.to_string(),
                    range: range.to_string(),
                    available: candidates.iter().map(|(_, key)| (*key).clone()).collect(),
                }
                .into()
            })
    }
}

impl ResolverPlugin for RegistryResolver {
    fn resolve<'a>(&'a self, ctx: &'a ResolveContext) -> BoxFuture<'a, PaktResult<Manifest>> {
        Box::pin(async move {
            let packument = self.client.packument(&ctx.name).await?;
            let selected = Self::select_version(&packument, &ctx.name, &ctx.range)?;

            let resolved = if selected.dist.shasum.is_empty() {
                selected.dist.tarball.clone()
            } else {
                format!("{}#{}", selected.dist.tarball, selected.dist.shasum)
            };

            Ok(Manifest {
                // keep the requested name: an aliased pattern installs
                // under the alias, whatever the tarball calls itself
                name: ctx.name.clone(),
                version: selected.version.clone(),
                uid: selected.version.clone(),
                dependencies: selected.dependencies.clone(),
                optional_dependencies: selected.optional_dependencies.clone(),
                remote: Remote {
                    kind: RemoteKind::Tarball,
                    resolved,
                    reference: selected.dist.tarball.clone(),
                    hash: selected.dist.shasum.clone(),
                    registry: ctx.registry,
                },
                extra: serde_json::Map::new(),
            })
        })
    }

    fn clear_session_cache(&self) {
        self.client.clear_cache();
    }
}
