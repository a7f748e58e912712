//! Local-path resolver plugin for `file:` patterns.

use std::path::PathBuf;

use futures_util::future::BoxFuture;

use pakt_core::manifest::{Manifest, Remote, RemoteKind};
use pakt_resolver::plugin::{ResolveContext, ResolverPlugin};
use pakt_util::errors::{PaktError, PaktResult};
use pakt_util::hash::sha256_bytes;

pub const FILE_PREFIX: &str = "file:";

/// Resolves `name@file:<path>` patterns against manifests on disk.
///
/// The uid is the content hash of the manifest, since a path (unlike a
/// registry version) doesn't identify its content.
pub struct LocalResolver {
    root: PathBuf,
}

impl LocalResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ResolverPlugin for LocalResolver {
    fn resolve<'a>(&'a self, ctx: &'a ResolveContext) -> BoxFuture<'a, PaktResult<Manifest>> {
        Box::pin(async move {
            let Some(relative) = ctx.range.strip_prefix(FILE_PREFIX) else {
                return Err(PaktError::Resolution {
                    message: format!("{} is not a local pattern", ctx.pattern),
                }
                .into());
            };
            let dir = self.root.join(relative);
            let manifest_path = dir.join("package.json");

            let bytes = tokio::fs::read(&manifest_path).await.map_err(|e| {
                PaktError::Resolution {
                    message: format!(
                        "Couldn't read {} for {}: {e}",
                        manifest_path.display(),
                        ctx.pattern
                    ),
                }
            })?;
            let mut manifest: Manifest = serde_json::from_slice(&bytes).map_err(|e| {
                PaktError::Manifest {
                    message: format!("Invalid manifest at {}: {e}", manifest_path.display()),
                }
            })?;

            let hash = sha256_bytes(&bytes);
            // the pattern's name wins over whatever the folder calls itself
            manifest.name = ctx.name.clone();
            manifest.uid = hash.clone();
            manifest.remote = Remote {
                kind: RemoteKind::File,
                resolved: format!("{}#{hash}", dir.display()),
                reference: dir.display().to_string(),
                hash,
                registry: ctx.registry,
            };
            Ok(manifest)
        })
    }
}
