//! Routes each pattern to the backend that can resolve it.

use futures_util::future::BoxFuture;

use pakt_core::config::Config;
use pakt_core::manifest::Manifest;
use pakt_resolver::plugin::{ResolveContext, ResolverPlugin};
use pakt_util::errors::PaktResult;

use crate::local::{LocalResolver, FILE_PREFIX};
use crate::resolver::RegistryResolver;

/// The standard production plugin: `file:` ranges go to the local
/// resolver, everything else to the registry.
pub struct DispatchingResolver {
    registry: RegistryResolver,
    local: LocalResolver,
}

impl DispatchingResolver {
    pub fn new(config: &Config) -> PaktResult<Self> {
        Ok(Self {
            registry: RegistryResolver::new(config)?,
            local: LocalResolver::new(config.cwd.clone()),
        })
    }
}

impl ResolverPlugin for DispatchingResolver {
    fn resolve<'a>(&'a self, ctx: &'a ResolveContext) -> BoxFuture<'a, PaktResult<Manifest>> {
        if ctx.range.starts_with(FILE_PREFIX) {
            self.local.resolve(ctx)
        } else {
            self.registry.resolve(ctx)
        }
    }

    fn clear_session_cache(&self) {
        self.registry.clear_session_cache();
    }
}
