//! Size-bounded eviction.

// std
use std::sync::Weak;
// crates.io
use serde::Serialize;
use tokio::time::{self, MissedTickBehavior};
// self
use crate::{_prelude::*, cache::store::CacheStore, metrics::CacheMetrics};

/// Outcome of one prune pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
	/// Entries removed.
	pub evicted: usize,
	/// Combined weight of the removed entries.
	pub evicted_weight: u64,
	/// Weight left in the store after the pass.
	pub remaining_weight: u64,
}

/// Evict the oldest entries until the store's weight is within `max_weight`.
///
/// Entries are ordered by fetch time, ties broken by insertion order. In-flight fetches are never
/// candidates, and an entry replaced between the snapshot and its removal survives.
pub fn prune(store: &CacheStore, max_weight: u64) -> PruneReport {
	let mut entries = store.snapshot();
	let total = entries.iter().map(|(_, entry)| entry.weight()).fold(0, u64::saturating_add);
	let mut report = PruneReport { remaining_weight: total, ..Default::default() };

	if total <= max_weight {
		return report;
	}

	entries.sort_by_key(|(_, entry)| (entry.fetched_at(), entry.sequence()));

	for (key, entry) in entries {
		if report.remaining_weight <= max_weight {
			break;
		}
		if store.remove_entry(&key, &entry) {
			tracing::trace!(%key, weight = entry.weight(), "evicted entry");

			report.evicted += 1;
			report.evicted_weight = report.evicted_weight.saturating_add(entry.weight());
			report.remaining_weight = report.remaining_weight.saturating_sub(entry.weight());
		}
	}

	tracing::debug!(
		evicted = report.evicted,
		evicted_weight = report.evicted_weight,
		remaining_weight = report.remaining_weight,
		max_weight,
		"pruned cache"
	);

	report
}

/// Prune on a fixed cadence until the store is dropped.
pub(crate) async fn run(
	store: Weak<CacheStore>,
	metrics: Arc<CacheMetrics>,
	max_weight: u64,
	interval: Duration,
) {
	let mut ticker = time::interval(interval);

	ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
	// The first tick completes immediately.
	ticker.tick().await;

	loop {
		ticker.tick().await;

		let Some(store) = store.upgrade() else {
			tracing::debug!("cache dropped; stopping pruner");

			break;
		};
		let report = prune(&store, max_weight);

		metrics.record_prune(report.evicted, report.remaining_weight);
	}
}
