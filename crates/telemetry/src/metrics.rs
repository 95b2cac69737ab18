//! Metrics primitives and registry.
//!
//! Lightweight in-memory counters and histograms backed by atomics.
//! Enough for the engine's own accounting and for tests; an exporter
//! can read the registry periodically if one is wired up.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// An incrementing counter.
#[derive(Debug, Clone, Default)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    /// Create a counter starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment by one.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment by `n`.
    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A histogram tracking count, sum, and max of observations.
#[derive(Debug, Clone, Default)]
pub struct Histogram {
    count: Arc<AtomicU64>,
    /// Sum of observations in microseconds-as-integer fixed point.
    sum_micros: Arc<AtomicU64>,
    max_micros: Arc<AtomicU64>,
}

impl Histogram {
    /// Create an empty histogram.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation, in seconds.
    pub fn observe(&self, seconds: f64) {
        let micros = (seconds * 1_000_000.0).max(0.0) as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_micros.fetch_add(micros, Ordering::Relaxed);
        self.max_micros.fetch_max(micros, Ordering::Relaxed);
    }

    /// Number of observations.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Sum of observations, in seconds.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }

    /// Largest observation, in seconds.
    #[must_use]
    pub fn max(&self) -> f64 {
        self.max_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }
}

/// Registry creating and retrieving metrics by name.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: RwLock<HashMap<String, Counter>>,
    histograms: RwLock<HashMap<String, Histogram>>,
}

impl MetricsRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create a counter.
    pub fn counter(&self, name: &str) -> Counter {
        if let Some(counter) = self.counters.read().expect("metrics lock").get(name) {
            return counter.clone();
        }
        self.counters
            .write()
            .expect("metrics lock")
            .entry(name.to_owned())
            .or_default()
            .clone()
    }

    /// Get or create a histogram.
    pub fn histogram(&self, name: &str) -> Histogram {
        if let Some(histogram) = self.histograms.read().expect("metrics lock").get(name) {
            return histogram.clone();
        }
        self.histograms
            .write()
            .expect("metrics lock")
            .entry(name.to_owned())
            .or_default()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn counter_increments() {
        let registry = MetricsRegistry::new();
        registry.counter("nodes_executed_total").inc();
        registry.counter("nodes_executed_total").inc_by(2);
        assert_eq!(registry.counter("nodes_executed_total").get(), 3);
    }

    #[test]
    fn counters_are_independent_by_name() {
        let registry = MetricsRegistry::new();
        registry.counter("a").inc();
        assert_eq!(registry.counter("b").get(), 0);
    }

    #[test]
    fn histogram_tracks_count_sum_max() {
        let registry = MetricsRegistry::new();
        let h = registry.histogram("node_duration_seconds");
        h.observe(0.5);
        h.observe(1.5);
        assert_eq!(h.count(), 2);
        assert!((h.sum() - 2.0).abs() < 1e-6);
        assert!((h.max() - 1.5).abs() < 1e-6);
    }

    #[test]
    fn registry_returns_shared_handles() {
        let registry = MetricsRegistry::new();
        let a = registry.counter("shared");
        let b = registry.counter("shared");
        a.inc();
        assert_eq!(b.get(), 1);
    }
}
