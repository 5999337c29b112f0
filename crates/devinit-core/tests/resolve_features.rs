//! End-to-end tests for feature dependency resolution.
//!
//! Local tests build feature directories on disk and resolve through the
//! same lookup chain the CLI uses. The registry test requires network access.

use devinit_config::GlobalConfig;
use devinit_core::features::{
    build_lookup, FeatureReference, LookupSources, OciLookup, ResolutionWarning, Resolver,
    MANIFEST_FILE,
};
use devinit_core::test_support::{reference, MockLookup};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Helper to create a local feature directory with metadata JSON
fn create_local_feature(base: &Path, name: &str, metadata_json: &str) {
    let dir = base.join(name);
    std::fs::create_dir_all(&dir).expect("failed to create feature dir");
    std::fs::write(dir.join("install.sh"), "#!/bin/bash\necho ok")
        .expect("failed to write install.sh");
    std::fs::write(dir.join(MANIFEST_FILE), metadata_json).expect("failed to write manifest");
}

/// Project with `.devcontainer/features/*` local features
fn create_project() -> TempDir {
    let temp = TempDir::new().expect("failed to create temp dir");
    let features = temp.path().join(".devcontainer/features");
    create_local_feature(
        &features,
        "aws-cli",
        r#"{
            "id": "aws-cli",
            "description": "AWS CLI v2",
            "dependsOn": {"./features/docker": {}, "./features/common": {}}
        }"#,
    );
    create_local_feature(
        &features,
        "docker",
        r#"{"id": "docker", "dependsOn": {"./features/common": {}}}"#,
    );
    create_local_feature(&features, "common", r#"{"id": "common"}"#);
    create_local_feature(
        &features,
        "terraform",
        r#"{"id": "terraform", "dependsOn": {"./features/aws-cli": {}, "./features/missing": {}}}"#,
    );
    temp
}

fn offline_resolver(project: &Path) -> Resolver {
    let config = GlobalConfig::default();
    let mut sources = LookupSources::from_config(&config, Some(project));
    sources.offline = true;
    let lookup = build_lookup(&config, &sources).expect("lookup should build");
    Resolver::from_config(lookup, &config.resolver)
}

#[tokio::test]
async fn test_resolve_project_local_features() {
    let project = create_project();
    let resolver = offline_resolver(project.path());

    let result = resolver
        .resolve_strs(&["aws-cli"], "ghcr.io/acme/features")
        .await
        .expect("resolution should succeed");

    let all: Vec<String> = result.all.iter().map(|r| r.to_string()).collect();
    assert_eq!(
        all,
        vec![
            "ghcr.io/acme/features/aws-cli:latest",
            "ghcr.io/acme/features/common:latest",
            "ghcr.io/acme/features/docker:latest",
        ]
    );
    assert_eq!(result.implicit.len(), 2);
    assert!(result.warnings.is_empty());
    assert_eq!(
        result.manifests[&reference("ghcr.io/acme/features/aws-cli")]
            .description
            .as_deref(),
        Some("AWS CLI v2")
    );
}

#[tokio::test]
async fn test_resolve_project_with_missing_dependency() {
    let project = create_project();
    let resolver = offline_resolver(project.path());

    let result = resolver
        .resolve_strs(&["terraform"], "ghcr.io/acme/features")
        .await
        .expect("missing dependency must not be fatal");

    assert_eq!(result.all.len(), 5);
    assert!(result.is_implicit(&reference("ghcr.io/acme/features/missing")));
    assert!(matches!(
        result.warnings.as_slice(),
        [ResolutionWarning::ManifestUnavailable { reference, .. }]
            if reference.name() == "missing"
    ));
}

#[tokio::test]
async fn test_shared_lookup_across_runs_has_no_carry_over() {
    let mock = MockLookup::new()
        .with_feature("acme/a", &["./b"])
        .with_feature("acme/b", &[]);
    let resolver = Resolver::new(Arc::new(mock.clone()));

    let first = resolver.resolve([reference("acme/a")]).await.unwrap();
    let second = resolver.resolve([reference("acme/a")]).await.unwrap();

    assert_eq!(first, second);
    // Each run builds its own visited set, so each run looks everything up again
    assert_eq!(mock.call_count(&reference("acme/b")), 2);
}

#[tokio::test]
async fn test_wide_graph_resolves_each_node_once() {
    // Layered chain: every node at depth n depends on every node at depth n + 1
    let width = 5;
    let depth = 4;
    let mut mock = MockLookup::new();
    for level in 0..depth {
        for i in 0..width {
            let deps: Vec<String> = if level + 1 < depth {
                (0..width).map(|j| format!("./n{}-{}", level + 1, j)).collect()
            } else {
                Vec::new()
            };
            let deps: Vec<&str> = deps.iter().map(|s| s.as_str()).collect();
            mock = mock
                .with_feature(&format!("acme/n{}-{}", level, i), &deps)
                .with_delay(&format!("acme/n{}-{}", level, i), Duration::from_millis(1));
        }
    }

    let resolver = Resolver::new(Arc::new(mock.clone())).with_concurrency(3);
    let explicit: Vec<FeatureReference> = (0..width)
        .map(|i| reference(&format!("acme/n0-{}", i)))
        .collect();
    let result = resolver.resolve(explicit).await.unwrap();

    assert_eq!(result.all.len(), width * depth);
    assert_eq!(result.implicit.len(), width * (depth - 1));
    assert_eq!(mock.calls().len(), width * depth);
}

// ==========================================================================
// Integration test: OCI lookup (network only)
// ==========================================================================

#[tokio::test]
#[ignore] // Requires network access
async fn test_integration_oci_dependency_resolution() {
    let cache_dir = tempfile::tempdir().unwrap();
    let resolver = Resolver::new(Arc::new(OciLookup::new(cache_dir.path())))
        .with_timeout(Duration::from_secs(60));

    // common-utils declares no dependsOn, so the closure is just itself
    let result = resolver
        .resolve_strs(
            &["ghcr.io/devcontainers/features/common-utils:2"],
            "ghcr.io/devcontainers/features",
        )
        .await
        .expect("resolution should succeed");

    assert!(result.all.contains(&reference("ghcr.io/devcontainers/features/common-utils:2")));
    assert!(result.warnings.is_empty(), "warnings: {:?}", result.warning_messages());

    // Second run is served from the disk cache
    let cached = cache_dir
        .path()
        .join("ghcr.io/devcontainers/features/common-utils/2")
        .join(MANIFEST_FILE);
    assert!(cached.exists(), "manifest should be cached");
}
