//! Test support utilities for devinit-core
//!
//! Provides MockLookup and small constructors for exercising the resolver
//! without a registry or a features directory.

use crate::features::{FeatureManifest, FeatureReference, LookupError, ManifestLookup};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Parse a reference, panicking on bad input
pub fn reference(s: &str) -> FeatureReference {
    FeatureReference::parse(s).unwrap_or_else(|e| panic!("bad test reference '{}': {}", s, e))
}

/// Manifest with the given `dependsOn` keys
pub fn manifest(id: &str, depends_on: &[&str]) -> FeatureManifest {
    depends_on
        .iter()
        .fold(FeatureManifest::new(id), |m, key| m.depends_on(*key))
}

/// Configurable manifest lookup that records every call.
///
/// Clones share the call log and in-flight counters.
#[derive(Clone, Default)]
pub struct MockLookup {
    manifests: HashMap<FeatureReference, FeatureManifest>,
    failures: HashMap<FeatureReference, LookupError>,
    delays: HashMap<FeatureReference, Duration>,
    calls: Arc<Mutex<Vec<FeatureReference>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve a manifest for `reference` declaring `depends_on`
    pub fn with_feature(mut self, reference: &str, depends_on: &[&str]) -> Self {
        let reference = self::reference(reference);
        let manifest = manifest(reference.name(), depends_on);
        self.manifests.insert(reference, manifest);
        self
    }

    /// Fail lookups of `reference` with `error`
    pub fn with_failure(mut self, reference: &str, error: LookupError) -> Self {
        self.failures.insert(self::reference(reference), error);
        self
    }

    /// Delay lookups of `reference` before answering
    pub fn with_delay(mut self, reference: &str, delay: Duration) -> Self {
        self.delays.insert(self::reference(reference), delay);
        self
    }

    /// Every reference looked up, in call order
    pub fn calls(&self) -> Vec<FeatureReference> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, reference: &FeatureReference) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| *r == reference)
            .count()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
        self.max_in_flight.store(0, Ordering::SeqCst);
    }

    /// Highest number of lookups observed running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Tracks concurrent lookups; decrements on drop so timed-out calls count too
struct InFlight<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ManifestLookup for MockLookup {
    async fn lookup(&self, reference: &FeatureReference) -> Result<FeatureManifest, LookupError> {
        self.calls.lock().unwrap().push(reference.clone());
        let _guard = InFlight::enter(&self.in_flight, &self.max_in_flight);

        if let Some(delay) = self.delays.get(reference) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(error) = self.failures.get(reference) {
            return Err(error.clone());
        }
        self.manifests
            .get(reference)
            .cloned()
            .ok_or(LookupError::NotFound)
    }
}
