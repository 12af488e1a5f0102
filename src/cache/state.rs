//! Slot states stored in the cache table and the lookup outcomes derived from them.

// std
use std::fmt::{self, Debug, Formatter};
// crates.io
use futures::future::{BoxFuture, Shared};
// self
use crate::{_prelude::*, cache::entry::CacheEntry, error::FetchResult};

/// Result every waiter on one fetch receives.
pub(crate) type FetchOutcome = FetchResult<Arc<CacheEntry>>;
/// Handle to an in-flight fetch that any number of callers may await.
pub(crate) type PendingFetch = Shared<BoxFuture<'static, FetchOutcome>>;

/// Occupant of one key in the cache table.
#[derive(Debug)]
pub(crate) enum Slot {
	/// Materialized entry.
	Ready(Arc<CacheEntry>),
	/// Fetch underway.
	Loading(InFlight),
}

/// Fetch occupying a slot until it completes.
pub(crate) struct InFlight {
	/// Distinguishes this fetch from later ones installed at the same key.
	pub generation: u64,
	/// Entry the slot held before the fetch started; restored if the fetch fails.
	pub previous: Option<Arc<CacheEntry>>,
	pub pending: PendingFetch,
}
impl Debug for InFlight {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("InFlight")
			.field("generation", &self.generation)
			.field("previous", &self.previous)
			.finish_non_exhaustive()
	}
}

/// Expiry-aware view of a key at a given instant.
#[derive(Clone, Debug)]
pub enum Lookup {
	/// Entry within its time-to-live.
	Fresh(Arc<CacheEntry>),
	/// Entry past its time-to-live but not yet evicted.
	Stale(Arc<CacheEntry>),
	/// No entry yet, first fetch underway.
	Pending,
	/// Nothing stored and nothing in flight.
	Absent,
}
impl Lookup {
	/// Classify an entry at `now`.
	pub fn of(entry: &Arc<CacheEntry>, now: Instant) -> Self {
		if entry.is_fresh(now) { Lookup::Fresh(entry.clone()) } else { Lookup::Stale(entry.clone()) }
	}

	/// Entry carried by this outcome, fresh or stale.
	pub fn entry(&self) -> Option<&Arc<CacheEntry>> {
		match self {
			Lookup::Fresh(entry) | Lookup::Stale(entry) => Some(entry),
			Lookup::Pending | Lookup::Absent => None,
		}
	}
}

/// How a caller was routed by the coalescing step.
pub(crate) enum Claim {
	/// Fresh entry served without fetching.
	Hit(Arc<CacheEntry>),
	/// Caller must await a fetch.
	Wait {
		pending: PendingFetch,
		/// Entry present when the fetch was installed, used for stale fallback.
		previous: Option<Arc<CacheEntry>>,
		/// Whether this caller installed the fetch rather than joining one.
		started: bool,
	},
	/// Store was closed; nothing was served or installed.
	Closed,
}
