//! Metrics helpers and cache telemetry bookkeeping.
//!
//! Counters are always kept in-process; with the `metrics` feature they are also emitted through
//! the `metrics` facade, labelled by resource id.

// std
#[cfg(feature = "prometheus")] use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
#[cfg(feature = "metrics")] use metrics::Label;
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::{Deserialize, Serialize};
#[cfg(feature = "metrics")] use smallvec::SmallVec;
// self
use crate::_prelude::*;

#[cfg(feature = "metrics")]
type LabelSet = SmallVec<[Label; 2]>;

#[cfg(feature = "metrics")]
const METRIC_REQUESTS_TOTAL: &str = "resource_cache_requests_total";
#[cfg(feature = "metrics")]
const METRIC_HITS_TOTAL: &str = "resource_cache_hits_total";
#[cfg(feature = "metrics")]
const METRIC_STALE_TOTAL: &str = "resource_cache_stale_total";
#[cfg(feature = "metrics")]
const METRIC_MISSES_TOTAL: &str = "resource_cache_misses_total";
#[cfg(feature = "metrics")]
const METRIC_FETCH_TOTAL: &str = "resource_cache_fetch_total";
#[cfg(feature = "metrics")]
const METRIC_FETCH_DURATION: &str = "resource_cache_fetch_duration_seconds";
#[cfg(feature = "metrics")]
const METRIC_FETCH_ERRORS: &str = "resource_cache_fetch_errors_total";
#[cfg(feature = "metrics")]
const METRIC_EVICTIONS_TOTAL: &str = "resource_cache_evictions_total";
#[cfg(feature = "metrics")]
const METRIC_INVALIDATIONS_TOTAL: &str = "resource_cache_invalidations_total";
#[cfg(feature = "metrics")]
const METRIC_WEIGHT: &str = "resource_cache_weight";

/// Shared Prometheus handle installed by [`install_default_exporter`].
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Thread-safe metrics accumulator for one cache instance.
#[derive(Debug, Default)]
pub struct CacheMetrics {
	total_requests: AtomicU64,
	cache_hits: AtomicU64,
	stale_serves: AtomicU64,
	misses: AtomicU64,
	fetch_successes: AtomicU64,
	fetch_errors: AtomicU64,
	evictions: AtomicU64,
	invalidations: AtomicU64,
	last_fetch_micros: AtomicU64,
}
#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
impl CacheMetrics {
	/// Create a new metrics accumulator.
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Record a lookup served from a fresh entry.
	pub fn record_hit(&self, resource: &str) {
		self.total_requests.fetch_add(1, Ordering::Relaxed);
		self.cache_hits.fetch_add(1, Ordering::Relaxed);

		#[cfg(feature = "metrics")]
		{
			let labels = base_labels(resource);

			metrics::counter!(METRIC_REQUESTS_TOTAL, labels.iter()).increment(1);
			metrics::counter!(METRIC_HITS_TOTAL, labels.iter()).increment(1);
		}
	}

	/// Record a failed refresh answered with the previous, expired value.
	pub fn record_stale_serve(&self, resource: &str) {
		self.stale_serves.fetch_add(1, Ordering::Relaxed);

		#[cfg(feature = "metrics")]
		metrics::counter!(METRIC_STALE_TOTAL, base_labels(resource).iter()).increment(1);
	}

	/// Record a lookup that had to wait for a fetch.
	pub fn record_miss(&self, resource: &str) {
		self.total_requests.fetch_add(1, Ordering::Relaxed);
		self.misses.fetch_add(1, Ordering::Relaxed);

		#[cfg(feature = "metrics")]
		{
			let labels = base_labels(resource);

			metrics::counter!(METRIC_REQUESTS_TOTAL, labels.iter()).increment(1);
			metrics::counter!(METRIC_MISSES_TOTAL, labels.iter()).increment(1);
		}
	}

	/// Record a successful fetch and its latency.
	pub fn record_fetch_success(&self, resource: &str, duration: Duration) {
		self.fetch_successes.fetch_add(1, Ordering::Relaxed);

		let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);

		// Stored off by one so zero keeps meaning "no fetch recorded".
		self.last_fetch_micros.store(micros.saturating_add(1), Ordering::Relaxed);

		#[cfg(feature = "metrics")]
		{
			metrics::counter!(METRIC_FETCH_TOTAL, status_labels(resource, "success").iter())
				.increment(1);
			metrics::histogram!(METRIC_FETCH_DURATION, base_labels(resource).iter())
				.record(duration.as_secs_f64());
		}
	}

	/// Record a failed fetch.
	pub fn record_fetch_error(&self, resource: &str) {
		self.fetch_errors.fetch_add(1, Ordering::Relaxed);

		#[cfg(feature = "metrics")]
		{
			metrics::counter!(METRIC_FETCH_TOTAL, status_labels(resource, "error").iter())
				.increment(1);
			metrics::counter!(METRIC_FETCH_ERRORS, base_labels(resource).iter()).increment(1);
		}
	}

	/// Record the outcome of a prune pass.
	pub fn record_prune(&self, evicted: usize, remaining_weight: u64) {
		self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);

		#[cfg(feature = "metrics")]
		{
			metrics::counter!(METRIC_EVICTIONS_TOTAL).increment(evicted as u64);
			metrics::gauge!(METRIC_WEIGHT).set(remaining_weight as f64);
		}
	}

	/// Record keys purged by credential invalidation.
	pub fn record_invalidations(&self, removed: usize) {
		self.invalidations.fetch_add(removed as u64, Ordering::Relaxed);

		#[cfg(feature = "metrics")]
		metrics::counter!(METRIC_INVALIDATIONS_TOTAL).increment(removed as u64);
	}

	/// Take a point-in-time snapshot for status reporting.
	pub fn snapshot(&self) -> CacheMetricsSnapshot {
		CacheMetricsSnapshot {
			total_requests: self.total_requests.load(Ordering::Relaxed),
			cache_hits: self.cache_hits.load(Ordering::Relaxed),
			stale_serves: self.stale_serves.load(Ordering::Relaxed),
			misses: self.misses.load(Ordering::Relaxed),
			fetch_successes: self.fetch_successes.load(Ordering::Relaxed),
			fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
			evictions: self.evictions.load(Ordering::Relaxed),
			invalidations: self.invalidations.load(Ordering::Relaxed),
			last_fetch_micros: match self.last_fetch_micros.load(Ordering::Relaxed) {
				0 => None,
				value => Some(value - 1),
			},
		}
	}
}

/// Read-only snapshot of cache telemetry counters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheMetricsSnapshot {
	/// Total number of lookups observed.
	pub total_requests: u64,
	/// Lookups served from a fresh entry.
	pub cache_hits: u64,
	/// Misses answered with an expired entry after the refresh failed.
	pub stale_serves: u64,
	/// Lookups that waited for a fetch.
	pub misses: u64,
	/// Fetches that produced a value.
	pub fetch_successes: u64,
	/// Fetches that failed.
	pub fetch_errors: u64,
	/// Entries removed by the pruner.
	pub evictions: u64,
	/// Keys removed by credential invalidation.
	pub invalidations: u64,
	/// Microsecond latency of the most recent successful fetch.
	pub last_fetch_micros: Option<u64>,
}
impl CacheMetricsSnapshot {
	/// Ratio of lookups served from the cache.
	pub fn hit_rate(&self) -> f64 {
		if self.total_requests == 0 {
			0.0
		} else {
			self.cache_hits as f64 / self.total_requests as f64
		}
	}

	/// Ratio of lookups answered with an expired entry.
	pub fn stale_ratio(&self) -> f64 {
		if self.total_requests == 0 {
			0.0
		} else {
			self.stale_serves as f64 / self.total_requests as f64
		}
	}
}

/// Install the default Prometheus recorder backed by `metrics`.
///
/// Multiple invocations are safe; subsequent calls become no-ops once the recorder is installed.
#[cfg(feature = "prometheus")]
pub fn install_default_exporter() -> Result<()> {
	if PROMETHEUS_HANDLE.get().is_some() {
		return Ok(());
	}

	let handle = PrometheusBuilder::new()
		.install_recorder()
		.map_err(|err| Error::Metrics(err.to_string()))?;
	let _ = PROMETHEUS_HANDLE.set(handle);

	Ok(())
}

/// Access the global Prometheus exporter handle when installed.
#[cfg(feature = "prometheus")]
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
	PROMETHEUS_HANDLE.get()
}

#[cfg(feature = "metrics")]
fn base_labels(resource: &str) -> LabelSet {
	let mut labels = LabelSet::with_capacity(2);

	labels.push(Label::new("resource", resource.to_owned()));

	labels
}

#[cfg(feature = "metrics")]
fn status_labels(resource: &str, status: &'static str) -> LabelSet {
	let mut labels = base_labels(resource);

	labels.push(Label::new("status", status));

	labels
}
