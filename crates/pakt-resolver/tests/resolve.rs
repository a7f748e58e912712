use std::collections::HashSet;
use std::sync::Arc;

use pakt_core::config::Config;
use pakt_core::lockfile::{LockedEntry, Lockfile};
use pakt_core::manifest::Manifest;
use pakt_core::registry::RegistryName;
use pakt_resolver::plugin::StaticResolver;
use pakt_resolver::resolver::{DependencyRequest, PackageResolver};

fn manifest(name: &str, version: &str, deps: &[(&str, &str)], optional: &[(&str, &str)]) -> Manifest {
    Manifest {
        name: name.to_string(),
        version: version.to_string(),
        uid: version.to_string(),
        dependencies: deps
            .iter()
            .map(|(n, r)| (n.to_string(), r.to_string()))
            .collect(),
        optional_dependencies: optional
            .iter()
            .map(|(n, r)| (n.to_string(), r.to_string()))
            .collect(),
        ..Default::default()
    }
}

fn seed(pattern: &str) -> DependencyRequest {
    DependencyRequest {
        pattern: pattern.to_string(),
        registry: RegistryName::Npm,
        optional: false,
    }
}

fn resolver_with(plugin: StaticResolver) -> Arc<PackageResolver> {
    PackageResolver::new(
        Config::new("/project", "/cache"),
        Lockfile::default(),
        Arc::new(plugin),
    )
}

#[tokio::test]
async fn resolves_transitive_graph() {
    let plugin = StaticResolver::new()
        .with("a@^1.0.0", manifest("a", "1.2.0", &[("b", "^2.0.0")], &[]))
        .with("b@^2.0.0", manifest("b", "2.3.0", &[], &[]));
    let resolver = resolver_with(plugin);

    resolver.init(vec![seed("a@^1.0.0")]).await.unwrap();

    let a = resolver.get_resolved_pattern("a@^1.0.0").unwrap();
    assert_eq!(a.manifest.version, "1.2.0");
    assert_eq!(a.reference.dependencies(), vec!["b@^2.0.0".to_string()]);

    let b = resolver.get_resolved_pattern("b@^2.0.0").unwrap();
    assert_eq!(b.manifest.version, "2.3.0");
    assert_eq!(
        resolver.get_all_dependency_names(),
        vec!["a".to_string(), "b".to_string()]
    );
}

#[tokio::test]
async fn repeated_lookups_return_identical_manifest() {
    let plugin = StaticResolver::new().with("a@^1.0.0", manifest("a", "1.0.0", &[], &[]));
    let resolver = resolver_with(plugin);
    resolver.init(vec![seed("a@^1.0.0")]).await.unwrap();

    let first = resolver.get_resolved_pattern("a@^1.0.0").unwrap();
    let second = resolver.get_resolved_pattern("a@^1.0.0").unwrap();
    assert!(Arc::ptr_eq(&first.manifest, &second.manifest));
}

#[tokio::test]
async fn compatible_range_reuses_existing_reference() {
    let plugin = StaticResolver::new()
        .with("c@^1.0.0", manifest("c", "1.5.0", &[], &[]))
        .with("c@1.x", manifest("c", "1.5.0", &[], &[]));
    let resolver = resolver_with(plugin);

    resolver.init(vec![seed("c@^1.0.0")]).await.unwrap();
    resolver
        .find("c@1.x".to_string(), RegistryName::Npm, false, None)
        .await
        .unwrap();

    let first = resolver.get_resolved_pattern("c@^1.0.0").unwrap();
    let second = resolver.get_resolved_pattern("c@1.x").unwrap();
    assert!(Arc::ptr_eq(&first.reference, &second.reference));
    assert_eq!(first.reference.request_count(), 2);

    let mut patterns = first.reference.patterns();
    patterns.sort();
    assert_eq!(patterns, vec!["c@1.x".to_string(), "c@^1.0.0".to_string()]);

    // the dedupe step collapses both patterns to one
    let deduped = resolver.dedupe_patterns(["c@^1.0.0", "c@1.x"]);
    assert_eq!(deduped, vec!["c@^1.0.0".to_string()]);
}

#[tokio::test]
async fn reuses_highest_already_resolved_version() {
    let plugin = StaticResolver::new()
        .with("d@1.1.0", manifest("d", "1.1.0", &[], &[]))
        .with("d@1.4.0", manifest("d", "1.4.0", &[], &[]))
        .with("d@^1.0.0", manifest("d", "1.1.0", &[], &[]));
    let resolver = resolver_with(plugin);

    resolver
        .init(vec![seed("d@1.1.0"), seed("d@1.4.0")])
        .await
        .unwrap();
    // the plugin would answer 1.1.0, but 1.4.0 is already resolved and
    // satisfies the range, so the range binds to it
    resolver
        .find("d@^1.0.0".to_string(), RegistryName::Npm, false, None)
        .await
        .unwrap();

    let ranged = resolver.get_resolved_pattern("d@^1.0.0").unwrap();
    assert_eq!(ranged.manifest.version, "1.4.0");
}

#[tokio::test]
async fn same_pattern_is_never_reentered() {
    // diamond: both a and b depend on the same c pattern
    let plugin = StaticResolver::new()
        .with("a@*", manifest("a", "1.0.0", &[("c", "^1.0.0")], &[]))
        .with("b@*", manifest("b", "1.0.0", &[("c", "^1.0.0")], &[]))
        .with("c@^1.0.0", manifest("c", "1.0.0", &[], &[]));
    let resolver = resolver_with(plugin);

    resolver.init(vec![seed("a@*"), seed("b@*")]).await.unwrap();

    let c = resolver.get_resolved_pattern("c@^1.0.0").unwrap();
    assert_eq!(c.manifest.version, "1.0.0");
    // only one request ever ran for the shared pattern
    assert_eq!(c.reference.request_count(), 1);
}

#[tokio::test]
async fn dependency_cycles_terminate() {
    let plugin = StaticResolver::new()
        .with("a@^1.0.0", manifest("a", "1.0.0", &[("b", "^1.0.0")], &[]))
        .with("b@^1.0.0", manifest("b", "1.0.0", &[("a", "^1.0.0")], &[]));
    let resolver = resolver_with(plugin);

    resolver.init(vec![seed("a@^1.0.0")]).await.unwrap();
    assert!(resolver.get_resolved_pattern("a@^1.0.0").is_some());
    assert!(resolver.get_resolved_pattern("b@^1.0.0").is_some());
}

#[tokio::test]
async fn ignore_propagates_across_cycles_once() {
    let plugin = StaticResolver::new()
        .with("a@^1.0.0", manifest("a", "1.0.0", &[("b", "^1.0.0")], &[]))
        .with("b@^1.0.0", manifest("b", "1.0.0", &[("a", "^1.0.0")], &[]));
    let resolver = resolver_with(plugin);
    resolver.init(vec![seed("a@^1.0.0")]).await.unwrap();

    let a = resolver.get_resolved_pattern("a@^1.0.0").unwrap();
    let b = resolver.get_resolved_pattern("b@^1.0.0").unwrap();
    assert_eq!(a.reference.ignore(), None);

    a.reference
        .add_ignore(true, &resolver, &mut HashSet::new());
    assert_eq!(a.reference.ignore(), Some(true));
    assert_eq!(b.reference.ignore(), Some(true));

    // forcing not-ignored wins and sticks
    a.reference
        .add_ignore(false, &resolver, &mut HashSet::new());
    assert_eq!(a.reference.ignore(), Some(false));
    assert_eq!(b.reference.ignore(), Some(false));

    a.reference
        .add_ignore(true, &resolver, &mut HashSet::new());
    assert_eq!(a.reference.ignore(), Some(false));
    assert_eq!(b.reference.ignore(), Some(false));
}

#[tokio::test]
async fn optional_failures_are_swallowed() {
    let plugin = StaticResolver::new().with(
        "a@^1.0.0",
        manifest("a", "1.0.0", &[], &[("missing", "^1.0.0")]),
    );
    let resolver = resolver_with(plugin);

    resolver.init(vec![seed("a@^1.0.0")]).await.unwrap();
    let a = resolver.get_resolved_pattern("a@^1.0.0").unwrap();
    // the optional child is still recorded as a dependency edge even
    // though it silently failed to install
    assert_eq!(a.reference.dependencies(), vec!["missing@^1.0.0".to_string()]);
    assert!(resolver.get_resolved_pattern("missing@^1.0.0").is_none());
}

#[tokio::test]
async fn required_failures_abort_the_run() {
    let plugin = StaticResolver::new().with(
        "a@^1.0.0",
        manifest("a", "1.0.0", &[("missing", "^1.0.0")], &[]),
    );
    let resolver = resolver_with(plugin);

    assert!(resolver.init(vec![seed("a@^1.0.0")]).await.is_err());
}

#[tokio::test]
async fn optional_children_inherit_the_flag() {
    let plugin = StaticResolver::new()
        .with("a@^1.0.0", manifest("a", "1.0.0", &[], &[("b", "^1.0.0")]))
        .with("b@^1.0.0", manifest("b", "1.0.0", &[("c", "^1.0.0")], &[]))
        .with("c@^1.0.0", manifest("c", "1.0.0", &[], &[]));
    let resolver = resolver_with(plugin);

    resolver.init(vec![seed("a@^1.0.0")]).await.unwrap();

    let a = resolver.get_resolved_pattern("a@^1.0.0").unwrap();
    let b = resolver.get_resolved_pattern("b@^1.0.0").unwrap();
    let c = resolver.get_resolved_pattern("c@^1.0.0").unwrap();
    assert_eq!(a.reference.optional(), Some(false));
    assert_eq!(b.reference.optional(), Some(true));
    // c is required by b, but the whole chain hangs off an optional edge
    assert_eq!(c.reference.optional(), Some(true));
}

#[tokio::test]
async fn lockfile_pins_short_circuit_the_plugin() {
    // the plugin knows nothing; everything must come from the lockfile
    let mut lockfile = Lockfile::default();
    lockfile.entries.insert(
        "a@^1.0.0".to_string(),
        LockedEntry {
            name: "a".to_string(),
            version: "1.2.0".to_string(),
            uid: String::new(),
            resolved: "https://registry.npmjs.org/a/-/a-1.2.0.tgz#cafe01".to_string(),
            registry: RegistryName::Npm,
            dependencies: [("b".to_string(), "^2.0.0".to_string())]
                .into_iter()
                .collect(),
            optional_dependencies: Default::default(),
            permissions: Default::default(),
        },
    );
    lockfile.entries.insert(
        "b@^2.0.0".to_string(),
        LockedEntry {
            name: "b".to_string(),
            version: "2.0.3".to_string(),
            uid: String::new(),
            resolved: "https://registry.npmjs.org/b/-/b-2.0.3.tgz#cafe02".to_string(),
            registry: RegistryName::Npm,
            dependencies: Default::default(),
            optional_dependencies: Default::default(),
            permissions: Default::default(),
        },
    );

    let resolver = PackageResolver::new(
        Config::new("/project", "/cache"),
        lockfile,
        Arc::new(StaticResolver::new()),
    );
    resolver.init(vec![seed("a@^1.0.0")]).await.unwrap();

    let a = resolver.get_resolved_pattern("a@^1.0.0").unwrap();
    assert_eq!(a.manifest.version, "1.2.0");
    assert_eq!(a.manifest.remote.hash, "cafe01");
    let b = resolver.get_resolved_pattern("b@^2.0.0").unwrap();
    assert_eq!(b.manifest.version, "2.0.3");
    assert!(resolver.new_patterns().is_empty());
}

#[tokio::test]
async fn frozen_mode_rejects_unlocked_patterns() {
    let mut config = Config::new("/project", "/cache");
    config.frozen = true;
    let resolver = PackageResolver::new(
        config,
        Lockfile {
            strict: true,
            ..Default::default()
        },
        Arc::new(StaticResolver::new().with("a@^1.0.0", manifest("a", "1.0.0", &[], &[]))),
    );

    assert!(resolver.init(vec![seed("a@^1.0.0")]).await.is_err());
}

#[tokio::test]
async fn lockfile_round_trips_through_resolution() {
    let plugin = StaticResolver::new()
        .with("a@^1.0.0", {
            let mut m = manifest("a", "1.2.0", &[("b", "^2.0.0")], &[]);
            m.remote.resolved = "https://registry.npmjs.org/a/-/a-1.2.0.tgz#cafe01".to_string();
            m
        })
        .with("b@^2.0.0", {
            let mut m = manifest("b", "2.0.3", &[], &[]);
            m.remote.resolved = "https://registry.npmjs.org/b/-/b-2.0.3.tgz#cafe02".to_string();
            m
        });
    let resolver = resolver_with(plugin);
    resolver.init(vec![seed("a@^1.0.0")]).await.unwrap();

    // everything was new in this run
    let mut fresh = resolver.new_patterns();
    fresh.sort();
    assert_eq!(fresh, vec!["a@^1.0.0".to_string(), "b@^2.0.0".to_string()]);

    let lockfile = resolver.to_lockfile();
    let text = lockfile.to_string_pretty().unwrap();
    let reloaded: Lockfile = toml::from_str(&text).unwrap();

    let a = reloaded.get_locked("a@^1.0.0").unwrap();
    assert_eq!(a.version, "1.2.0");
    assert_eq!(a.dependencies.get("b").unwrap(), "^2.0.0");

    // resolving again against the produced lockfile needs no plugin
    let offline = PackageResolver::new(
        Config::new("/project", "/cache"),
        reloaded,
        Arc::new(StaticResolver::new()),
    );
    offline.init(vec![seed("a@^1.0.0")]).await.unwrap();
    assert_eq!(
        offline
            .get_resolved_pattern("b@^2.0.0")
            .unwrap()
            .manifest
            .version,
        "2.0.3"
    );
}

#[tokio::test]
async fn remove_pattern_keeps_indices_in_sync() {
    let plugin = StaticResolver::new().with("a@^1.0.0", manifest("a", "1.0.0", &[], &[]));
    let resolver = resolver_with(plugin);
    resolver.init(vec![seed("a@^1.0.0")]).await.unwrap();

    resolver.remove_pattern("a@^1.0.0");
    assert!(resolver.get_resolved_pattern("a@^1.0.0").is_none());
    assert!(resolver.get_all_dependency_names().is_empty());
}
