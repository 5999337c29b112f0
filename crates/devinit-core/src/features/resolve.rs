//! Feature dependency resolution
//!
//! Computes the transitive closure of `dependsOn` over a set of explicitly
//! selected features. The traversal runs level by level over an explicit
//! worklist:
//!
//! - every reference in a level is checked against the visited set before
//!   its manifest is requested, so each reference is looked up at most once
//!   (diamonds and cycles included)
//! - lookups within a level may run concurrently, but their results are
//!   merged back in frontier order by the single owner of the visited set,
//!   which keeps warnings and results deterministic
//! - missing manifests, lookup failures, timeouts and malformed `dependsOn`
//!   keys are collected as warnings and never abort the run

use super::lookup::{LookupError, ManifestLookup};
use super::manifest::FeatureManifest;
use super::reference::{normalize_dependency_key, FeatureReference};
use crate::{CoreError, Result};
use devinit_config::ResolverConfig;
use futures::StreamExt;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default upper bound for a single manifest lookup
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of lookups in flight per level
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Why a manifest could not be obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnavailableReason {
    NotFound,
    TimedOut(Duration),
    Failed(String),
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::NotFound => write!(f, "manifest not found"),
            UnavailableReason::TimedOut(after) => {
                write!(f, "lookup timed out after {:.1}s", after.as_secs_f64())
            }
            UnavailableReason::Failed(reason) => write!(f, "{}", reason),
        }
    }
}

/// Recoverable problem recorded during resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionWarning {
    /// The reference stays in the result but its dependencies are unknown
    ManifestUnavailable {
        reference: FeatureReference,
        reason: UnavailableReason,
    },
    /// A `dependsOn` key could not be turned into a reference; the edge is dropped
    MalformedReference {
        referrer: FeatureReference,
        key: String,
        reason: String,
    },
}

impl fmt::Display for ResolutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionWarning::ManifestUnavailable { reference, reason } => {
                write!(f, "{}: {}", reference, reason)
            }
            ResolutionWarning::MalformedReference {
                referrer,
                key,
                reason,
            } => write!(f, "{}: ignoring dependency '{}': {}", referrer, key, reason),
        }
    }
}

/// Outcome of one resolution run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolutionResult {
    /// Explicit selections plus everything they pull in, sorted by string form
    pub all: Vec<FeatureReference>,
    /// Entries of `all` that were not explicitly selected
    pub implicit: BTreeSet<FeatureReference>,
    /// Recoverable problems, in the order they were found
    pub warnings: Vec<ResolutionWarning>,
    /// Manifests that were found, for rendering
    pub manifests: BTreeMap<FeatureReference, FeatureManifest>,
}

impl ResolutionResult {
    pub fn is_implicit(&self, reference: &FeatureReference) -> bool {
        self.implicit.contains(reference)
    }

    /// Entries of `all` the user chose directly
    pub fn explicit(&self) -> impl Iterator<Item = &FeatureReference> {
        self.all.iter().filter(|r| !self.implicit.contains(*r))
    }

    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings.iter().map(|w| w.to_string()).collect()
    }

    /// Features reachable under more than one tag, keyed by `<origin>/<name>`.
    ///
    /// Both tags stay in `all`; this only reports the ambiguity.
    pub fn tag_conflicts(&self) -> BTreeMap<String, Vec<String>> {
        let mut by_feature: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for reference in &self.all {
            by_feature
                .entry(format!("{}/{}", reference.origin(), reference.name()))
                .or_default()
                .push(reference.tag().to_string());
        }
        by_feature.retain(|_, tags| tags.len() > 1);
        by_feature
    }
}

/// Working set for a single run; never outlives `resolve`
struct ResolutionState {
    visited: HashSet<FeatureReference>,
    explicit: BTreeSet<FeatureReference>,
    warnings: Vec<ResolutionWarning>,
    manifests: BTreeMap<FeatureReference, FeatureManifest>,
}

impl ResolutionState {
    fn new(explicit: BTreeSet<FeatureReference>) -> Self {
        Self {
            visited: HashSet::new(),
            explicit,
            warnings: Vec::new(),
            manifests: BTreeMap::new(),
        }
    }

    /// Mark as visited; false if it already was
    fn visit(&mut self, reference: &FeatureReference) -> bool {
        if self.visited.contains(reference) {
            return false;
        }
        self.visited.insert(reference.clone())
    }

    fn warn(&mut self, warning: ResolutionWarning) {
        tracing::warn!("{}", warning);
        self.warnings.push(warning);
    }

    fn finish(self) -> ResolutionResult {
        let mut all: Vec<FeatureReference> = self.visited.into_iter().collect();
        all.sort();
        let implicit = all
            .iter()
            .filter(|r| !self.explicit.contains(*r))
            .cloned()
            .collect();
        ResolutionResult {
            all,
            implicit,
            warnings: self.warnings,
            manifests: self.manifests,
        }
    }
}

/// Parse user selections, qualifying short ids such as `docker` with `default_origin`.
///
/// The first malformed selection fails the call with [`CoreError::InvalidInput`].
pub fn parse_selections<S: AsRef<str>>(
    selections: &[S],
    default_origin: &str,
) -> Result<Vec<FeatureReference>> {
    selections
        .iter()
        .map(|s| {
            let s = s.as_ref();
            FeatureReference::parse_with_default_origin(s, default_origin).map_err(|e| {
                CoreError::InvalidInput(format!("invalid feature selection '{}': {}", s, e))
            })
        })
        .collect()
}

/// Resolves explicit feature selections to their full dependency closure
#[derive(Clone)]
pub struct Resolver {
    lookup: Arc<dyn ManifestLookup>,
    timeout: Duration,
    concurrency: usize,
    local_dirs: Vec<String>,
}

impl Resolver {
    pub fn new(lookup: Arc<dyn ManifestLookup>) -> Self {
        Self {
            lookup,
            timeout: DEFAULT_LOOKUP_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
            local_dirs: ResolverConfig::default().local_dirs,
        }
    }

    /// Resolver tuned by the `[resolver]` section of the global config
    pub fn from_config(lookup: Arc<dyn ManifestLookup>, config: &ResolverConfig) -> Self {
        Self::new(lookup)
            .with_timeout(config.timeout())
            .with_concurrency(config.concurrency)
            .with_local_dirs(config.local_dirs.clone())
    }

    /// Upper bound for each manifest lookup; a timeout counts as unavailable
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Lookups in flight per level; `1` makes the traversal strictly sequential
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Directory prefixes stripped from local `dependsOn` keys
    pub fn with_local_dirs(mut self, local_dirs: Vec<String>) -> Self {
        self.local_dirs = local_dirs;
        self
    }

    /// Resolve already-normalized selections
    pub async fn resolve<I>(&self, explicit: I) -> Result<ResolutionResult>
    where
        I: IntoIterator<Item = FeatureReference>,
    {
        self.resolve_with_cancel(explicit, &CancellationToken::new())
            .await
    }

    /// Resolve user input, qualifying short ids with `default_origin`.
    ///
    /// Any malformed selection fails the whole call before traversal starts.
    pub async fn resolve_strs<S: AsRef<str>>(
        &self,
        selections: &[S],
        default_origin: &str,
    ) -> Result<ResolutionResult> {
        self.resolve_strs_with_cancel(selections, default_origin, &CancellationToken::new())
            .await
    }

    /// [`Resolver::resolve_strs`] that gives up once `cancel` fires
    pub async fn resolve_strs_with_cancel<S: AsRef<str>>(
        &self,
        selections: &[S],
        default_origin: &str,
        cancel: &CancellationToken,
    ) -> Result<ResolutionResult> {
        let explicit = parse_selections(selections, default_origin)?;
        self.resolve_with_cancel(explicit, cancel).await
    }

    /// Resolve, giving up with [`CoreError::Cancelled`] once `cancel` fires.
    ///
    /// Cancellation is observed between levels and while lookups are in flight.
    pub async fn resolve_with_cancel<I>(
        &self,
        explicit: I,
        cancel: &CancellationToken,
    ) -> Result<ResolutionResult>
    where
        I: IntoIterator<Item = FeatureReference>,
    {
        let explicit: BTreeSet<FeatureReference> = explicit.into_iter().collect();
        tracing::debug!("Resolving {} explicit feature(s)", explicit.len());

        let mut frontier: Vec<FeatureReference> = explicit.iter().cloned().collect();
        let mut state = ResolutionState::new(explicit);
        let mut depth = 0usize;

        while !frontier.is_empty() {
            if cancel.is_cancelled() {
                return Err(CoreError::Cancelled);
            }

            let level: Vec<FeatureReference> = frontier
                .drain(..)
                .filter(|r| state.visit(r))
                .collect();
            if level.is_empty() {
                break;
            }
            tracing::debug!("Level {}: looking up {} manifest(s)", depth, level.len());

            let lookups = futures::stream::iter(level.into_iter().map(|reference| async move {
                let outcome = self.lookup_bounded(&reference).await;
                (reference, outcome)
            }))
            .buffered(self.concurrency)
            .collect::<Vec<_>>();

            let outcomes = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CoreError::Cancelled),
                outcomes = lookups => outcomes,
            };

            for (reference, outcome) in outcomes {
                let manifest = match outcome {
                    Ok(manifest) => manifest,
                    Err(reason) => {
                        state.warn(ResolutionWarning::ManifestUnavailable { reference, reason });
                        continue;
                    }
                };

                for key in manifest.dependency_keys() {
                    match normalize_dependency_key(key, &reference, &self.local_dirs) {
                        Ok(dependency) => {
                            if !state.visited.contains(&dependency) {
                                tracing::debug!("{} depends on {}", reference, dependency);
                                frontier.push(dependency);
                            }
                        }
                        Err(e) => state.warn(ResolutionWarning::MalformedReference {
                            referrer: reference.clone(),
                            key: key.to_string(),
                            reason: e.to_string(),
                        }),
                    }
                }
                state.manifests.insert(reference, manifest);
            }
            depth += 1;
        }

        let result = state.finish();
        tracing::info!(
            "Resolved {} feature(s): {} implicit, {} warning(s)",
            result.all.len(),
            result.implicit.len(),
            result.warnings.len()
        );
        Ok(result)
    }

    async fn lookup_bounded(
        &self,
        reference: &FeatureReference,
    ) -> std::result::Result<FeatureManifest, UnavailableReason> {
        tracing::debug!("Looking up manifest for {}", reference);
        match tokio::time::timeout(self.timeout, self.lookup.lookup(reference)).await {
            Ok(Ok(manifest)) => Ok(manifest),
            Ok(Err(LookupError::NotFound)) => Err(UnavailableReason::NotFound),
            Ok(Err(LookupError::Failed(reason))) => Err(UnavailableReason::Failed(reason)),
            Err(_) => Err(UnavailableReason::TimedOut(self.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::lookup::{DirectoryLookup, InMemoryLookup};
    use crate::test_support::{manifest, reference, MockLookup};

    fn r(s: &str) -> FeatureReference {
        reference(s)
    }

    fn set(refs: &[&str]) -> BTreeSet<FeatureReference> {
        refs.iter().map(|s| r(s)).collect()
    }

    fn strings(refs: &[FeatureReference]) -> Vec<String> {
        refs.iter().map(|r| r.to_string()).collect()
    }

    #[tokio::test]
    async fn test_aws_cli_pulls_in_docker() {
        let lookup: InMemoryLookup = [
            (
                r("ghcr.io/acme/features/aws-cli:latest"),
                manifest("aws-cli", &["./features/docker"]),
            ),
            (
                r("ghcr.io/acme/features/docker:latest"),
                manifest("docker", &[]),
            ),
        ]
        .into_iter()
        .collect();

        let resolver = Resolver::new(Arc::new(lookup));
        let result = resolver
            .resolve([r("ghcr.io/acme/features/aws-cli:latest")])
            .await
            .unwrap();

        assert_eq!(
            strings(&result.all),
            vec![
                "ghcr.io/acme/features/aws-cli:latest",
                "ghcr.io/acme/features/docker:latest"
            ]
        );
        assert_eq!(result.implicit, set(&["ghcr.io/acme/features/docker:latest"]));
        assert!(result.warnings.is_empty());
        assert_eq!(result.manifests.len(), 2);
        assert_eq!(
            result.explicit().collect::<Vec<_>>(),
            vec![&r("ghcr.io/acme/features/aws-cli:latest")]
        );
    }

    #[tokio::test]
    async fn test_cycle_terminates() {
        let mock = MockLookup::new()
            .with_feature("acme/x", &["./y"])
            .with_feature("acme/y", &["./x"]);
        let resolver = Resolver::new(Arc::new(mock.clone()));

        let result = resolver.resolve([r("acme/x")]).await.unwrap();

        assert_eq!(result.all, vec![r("acme/x"), r("acme/y")]);
        assert_eq!(result.implicit, set(&["acme/y"]));
        assert_eq!(mock.call_count(&r("acme/x")), 1);
        assert_eq!(mock.call_count(&r("acme/y")), 1);
    }

    #[tokio::test]
    async fn test_self_dependency() {
        let mock = MockLookup::new().with_feature("acme/a", &["./a"]);
        let resolver = Resolver::new(Arc::new(mock.clone()));

        let result = resolver.resolve([r("acme/a")]).await.unwrap();
        assert_eq!(result.all, vec![r("acme/a")]);
        assert!(result.implicit.is_empty());
        assert_eq!(mock.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_diamond_looks_up_shared_dependency_once() {
        let mock = MockLookup::new()
            .with_feature("acme/a", &["./b", "./c"])
            .with_feature("acme/b", &["./d"])
            .with_feature("acme/c", &["./d"])
            .with_feature("acme/d", &[]);

        for concurrency in [1, 4] {
            mock.reset_calls();
            let resolver = Resolver::new(Arc::new(mock.clone())).with_concurrency(concurrency);
            let result = resolver.resolve([r("acme/a")]).await.unwrap();

            assert_eq!(mock.call_count(&r("acme/d")), 1, "concurrency {}", concurrency);
            assert_eq!(mock.calls().len(), 4);
            assert_eq!(result.all.len(), 4);
            assert_eq!(result.implicit, set(&["acme/b", "acme/c", "acme/d"]));
        }
    }

    #[tokio::test]
    async fn test_diamond_across_levels_looks_up_once() {
        // a -> b -> d and a -> d: d is discovered at two different depths
        let mock = MockLookup::new()
            .with_feature("acme/a", &["./b", "./d"])
            .with_feature("acme/b", &["./d"])
            .with_feature("acme/d", &[]);
        let resolver = Resolver::new(Arc::new(mock.clone()));

        let result = resolver.resolve([r("acme/a")]).await.unwrap();
        assert_eq!(result.all.len(), 3);
        assert_eq!(mock.call_count(&r("acme/d")), 1);
    }

    #[tokio::test]
    async fn test_missing_dependency_is_tolerated() {
        let mock = MockLookup::new().with_feature("acme/a", &["./b"]);
        let resolver = Resolver::new(Arc::new(mock));

        let result = resolver.resolve([r("acme/a")]).await.unwrap();

        assert_eq!(result.all, vec![r("acme/a"), r("acme/b")]);
        assert_eq!(result.implicit, set(&["acme/b"]));
        assert_eq!(
            result.warnings,
            vec![ResolutionWarning::ManifestUnavailable {
                reference: r("acme/b"),
                reason: UnavailableReason::NotFound,
            }]
        );
        assert_eq!(
            result.warning_messages(),
            vec!["acme/b:latest: manifest not found"]
        );
        assert!(!result.manifests.contains_key(&r("acme/b")));
    }

    #[tokio::test]
    async fn test_failed_lookup_does_not_abort() {
        let mock = MockLookup::new()
            .with_feature("acme/a", &["./b", "./c"])
            .with_feature("acme/c", &["./d"])
            .with_feature("acme/d", &[])
            .with_failure("acme/b", LookupError::Failed("registry unreachable".into()));
        let resolver = Resolver::new(Arc::new(mock));

        let result = resolver.resolve([r("acme/a")]).await.unwrap();

        assert_eq!(result.all.len(), 4);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warning_messages()[0].contains("registry unreachable"));
    }

    #[tokio::test]
    async fn test_lookup_timeout_counts_as_unavailable() {
        let mock = MockLookup::new()
            .with_feature("acme/a", &["./slow"])
            .with_feature("acme/slow", &["./never-reached"])
            .with_delay("acme/slow", Duration::from_secs(5));
        let resolver = Resolver::new(Arc::new(mock)).with_timeout(Duration::from_millis(50));

        let result = resolver.resolve([r("acme/a")]).await.unwrap();

        assert_eq!(result.all, vec![r("acme/a"), r("acme/slow")]);
        assert!(matches!(
            result.warnings.as_slice(),
            [ResolutionWarning::ManifestUnavailable {
                reason: UnavailableReason::TimedOut(_),
                ..
            }]
        ));
    }

    #[tokio::test]
    async fn test_malformed_dependency_key_drops_edge() {
        let mock = MockLookup::new()
            .with_feature("acme/a", &["../escape", "./b"])
            .with_feature("acme/b", &[]);
        let resolver = Resolver::new(Arc::new(mock));

        let result = resolver.resolve([r("acme/a")]).await.unwrap();

        assert_eq!(result.all, vec![r("acme/a"), r("acme/b")]);
        match result.warnings.as_slice() {
            [ResolutionWarning::MalformedReference { referrer, key, .. }] => {
                assert_eq!(referrer, &r("acme/a"));
                assert_eq!(key, "../escape");
            }
            other => panic!("unexpected warnings: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_conflicting_tags_are_both_kept() {
        let mock = MockLookup::new()
            .with_feature("acme/a", &["./node:1.0"])
            .with_feature("acme/b", &["./node:2.0"])
            .with_feature("acme/node:1.0", &[])
            .with_feature("acme/node:2.0", &[]);
        let resolver = Resolver::new(Arc::new(mock));

        let result = resolver.resolve([r("acme/a"), r("acme/b")]).await.unwrap();

        assert!(result.all.contains(&r("acme/node:1.0")));
        assert!(result.all.contains(&r("acme/node:2.0")));
        let conflicts = result.tag_conflicts();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts["acme/node"], vec!["1.0", "2.0"]);
    }

    #[tokio::test]
    async fn test_dependency_inherits_referrer_origin() {
        let mock = MockLookup::new()
            .with_feature("ghcr.io/acme/features/a", &["b"])
            .with_feature("ghcr.io/acme/features/b", &["ghcr.io/other/features/c:3"])
            .with_feature("ghcr.io/other/features/c:3", &["./d"])
            .with_feature("ghcr.io/other/features/d", &[]);
        let resolver = Resolver::new(Arc::new(mock));

        let result = resolver
            .resolve([r("ghcr.io/acme/features/a")])
            .await
            .unwrap();

        assert_eq!(
            strings(&result.all),
            vec![
                "ghcr.io/acme/features/a:latest",
                "ghcr.io/acme/features/b:latest",
                "ghcr.io/other/features/c:3",
                "ghcr.io/other/features/d:latest",
            ]
        );
        assert!(result.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_explicit_dependency_is_not_implicit() {
        let mock = MockLookup::new()
            .with_feature("acme/a", &["./b"])
            .with_feature("acme/b", &[]);
        let resolver = Resolver::new(Arc::new(mock.clone()));

        let result = resolver.resolve([r("acme/a"), r("acme/b")]).await.unwrap();
        assert!(result.implicit.is_empty());
        assert_eq!(mock.call_count(&r("acme/b")), 1);
    }

    #[tokio::test]
    async fn test_empty_selection() {
        let mock = MockLookup::new();
        let resolver = Resolver::new(Arc::new(mock.clone()));

        let result = resolver.resolve(Vec::new()).await.unwrap();
        assert_eq!(result, ResolutionResult::default());
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_selections_collapse() {
        let mock = MockLookup::new().with_feature("acme/a", &[]);
        let resolver = Resolver::new(Arc::new(mock.clone()));

        let result = resolver
            .resolve([r("acme/a"), r("acme/a:latest")])
            .await
            .unwrap();
        assert_eq!(result.all, vec![r("acme/a")]);
        assert_eq!(mock.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_determinism_across_concurrency() {
        let mock = MockLookup::new()
            .with_feature("acme/root", &["./m1", "./m2", "./m3"])
            .with_feature("acme/m1", &["./leaf", "./gone"])
            .with_feature("acme/m2", &["./leaf", "../bad"])
            .with_feature("acme/m3", &["./m1"])
            .with_feature("acme/leaf", &["./root"])
            .with_delay("acme/m1", Duration::from_millis(30))
            .with_delay("acme/m3", Duration::from_millis(5));

        let sequential = Resolver::new(Arc::new(mock.clone()))
            .with_concurrency(1)
            .resolve([r("acme/root")])
            .await
            .unwrap();
        let parallel = Resolver::new(Arc::new(mock.clone()))
            .with_concurrency(8)
            .resolve([r("acme/root")])
            .await
            .unwrap();

        assert_eq!(sequential.all, parallel.all);
        assert_eq!(sequential.implicit, parallel.implicit);
        assert_eq!(sequential.warnings, parallel.warnings);
        assert_eq!(strings(&sequential.all), {
            let mut s = strings(&sequential.all);
            s.sort();
            s
        });
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let mut mock = MockLookup::new().with_feature(
            "acme/root",
            &["./d0", "./d1", "./d2", "./d3", "./d4", "./d5"],
        );
        for i in 0..6 {
            let name = format!("acme/d{}", i);
            mock = mock
                .with_feature(&name, &[])
                .with_delay(&name, Duration::from_millis(20));
        }
        let resolver = Resolver::new(Arc::new(mock.clone())).with_concurrency(2);

        let result = resolver.resolve([r("acme/root")]).await.unwrap();
        assert_eq!(result.all.len(), 7);
        assert!(mock.max_in_flight() <= 2, "got {}", mock.max_in_flight());
    }

    #[tokio::test]
    async fn test_superset_and_classification_properties() {
        let mock = MockLookup::new()
            .with_feature("acme/a", &["./b", "./c"])
            .with_feature("acme/b", &["./e"])
            .with_feature("acme/d", &["./a"]);
        let resolver = Resolver::new(Arc::new(mock));
        let explicit = set(&["acme/a", "acme/d", "acme/z"]);

        let result = resolver.resolve(explicit.clone()).await.unwrap();

        let all: BTreeSet<FeatureReference> = result.all.iter().cloned().collect();
        assert!(all.is_superset(&explicit));
        let expected_implicit: BTreeSet<FeatureReference> =
            all.difference(&explicit).cloned().collect();
        assert_eq!(result.implicit, expected_implicit);
        assert_eq!(result.implicit, set(&["acme/b", "acme/c", "acme/e"]));
    }

    #[tokio::test]
    async fn test_resolve_strs_qualifies_short_ids() {
        let mock = MockLookup::new()
            .with_feature("ghcr.io/acme/features/aws-cli", &["./features/docker"])
            .with_feature("ghcr.io/acme/features/docker", &[]);
        let resolver = Resolver::new(Arc::new(mock));

        let result = resolver
            .resolve_strs(&["aws-cli"], "ghcr.io/acme/features")
            .await
            .unwrap();
        assert_eq!(result.all.len(), 2);
        assert!(result.is_implicit(&r("ghcr.io/acme/features/docker")));
    }

    #[tokio::test]
    async fn test_resolve_strs_rejects_malformed_selection() {
        let mock = MockLookup::new();
        let resolver = Resolver::new(Arc::new(mock.clone()));

        let err = resolver
            .resolve_strs(&["docker", "bad name"], "ghcr.io/acme/features")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
        assert!(mock.calls().is_empty(), "no traversal on invalid input");
    }

    #[test]
    fn test_parse_selections() {
        let refs = parse_selections(&["docker", "ghcr.io/other/git:1"], "ghcr.io/acme/features")
            .unwrap();
        assert_eq!(
            strings(&refs),
            vec!["ghcr.io/acme/features/docker:latest", "ghcr.io/other/git:1"]
        );

        let err = parse_selections(&["docker", "a/b:"], "ghcr.io/acme/features").unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
        assert!(err.to_string().contains("invalid feature selection 'a/b:'"));
    }

    #[tokio::test]
    async fn test_resolve_strs_with_cancel() {
        let mock = MockLookup::new().with_feature("ghcr.io/acme/features/docker", &[]);
        let resolver = Resolver::new(Arc::new(mock.clone()));

        let err = resolver
            .resolve_strs_with_cancel(
                &["bad name"],
                "ghcr.io/acme/features",
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = resolver
            .resolve_strs_with_cancel(&["docker"], "ghcr.io/acme/features", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Cancelled));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let mock = MockLookup::new().with_feature("acme/a", &[]);
        let resolver = Resolver::new(Arc::new(mock.clone()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = resolver
            .resolve_with_cancel([r("acme/a")], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Cancelled));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_interrupts_inflight_lookup() {
        let mock = MockLookup::new()
            .with_feature("acme/a", &[])
            .with_delay("acme/a", Duration::from_secs(10));
        let resolver = Resolver::new(Arc::new(mock));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = resolver
            .resolve_with_cancel([r("acme/a")], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Cancelled));
    }

    #[tokio::test]
    async fn test_resolve_from_local_directory() {
        let tmp = tempfile::tempdir().unwrap();
        for (name, json) in [
            ("feature-a", r#"{"id": "feature-a", "dependsOn": {"./feature-b": {}}}"#),
            ("feature-b", r#"{"id": "feature-b", "dependsOn": {"./feature-c": {}}}"#),
            ("feature-c", r#"{"id": "feature-c"}"#),
        ] {
            let dir = tmp.path().join(name);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("devcontainer-feature.json"), json).unwrap();
        }

        let resolver = Resolver::new(Arc::new(DirectoryLookup::new(tmp.path())));
        let result = resolver
            .resolve_strs(&["feature-a"], "local")
            .await
            .unwrap();

        assert_eq!(
            strings(&result.all),
            vec![
                "local/feature-a:latest",
                "local/feature-b:latest",
                "local/feature-c:latest"
            ]
        );
        assert_eq!(result.implicit.len(), 2);
    }

    #[test]
    fn test_from_config() {
        let config = ResolverConfig {
            timeout_secs: 3,
            concurrency: 0,
            local_dirs: vec!["src".to_string()],
            features_dir: None,
        };
        let resolver = Resolver::from_config(Arc::new(InMemoryLookup::new()), &config);
        assert_eq!(resolver.timeout, Duration::from_secs(3));
        assert_eq!(resolver.concurrency, 1);
        assert_eq!(resolver.local_dirs, vec!["src"]);
    }
}
