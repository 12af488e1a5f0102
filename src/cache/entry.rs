//! Immutable cache entries.

// std
use std::any::Any;
// self
use crate::_prelude::*;

/// Value materialized by a successful fetch, together with its lifetime and cost.
///
/// Entries are never mutated: a refresh installs a new entry, so readers never observe a
/// partially updated value.
#[derive(Debug)]
pub struct CacheEntry {
	value: Arc<dyn Any + Send + Sync>,
	fetched_at: Instant,
	expires_at: Option<Instant>,
	weight: u64,
	sequence: u64,
}
impl CacheEntry {
	/// Build an entry fetched at `fetched_at` that stays fresh for `expiry`.
	///
	/// An expiry too large to represent never goes stale.
	pub fn new<T>(value: T, fetched_at: Instant, expiry: Duration, weight: u64, sequence: u64) -> Self
	where
		T: Any + Send + Sync,
	{
		Self {
			value: Arc::new(value),
			fetched_at,
			expires_at: fetched_at.checked_add(expiry),
			weight,
			sequence,
		}
	}

	/// Borrow the cached value when it has type `T`.
	pub fn value<T>(&self) -> Option<&T>
	where
		T: Any,
	{
		self.value.downcast_ref::<T>()
	}

	/// Instant the value was fetched.
	pub fn fetched_at(&self) -> Instant {
		self.fetched_at
	}

	/// Instant the value stops being fresh, if it ever does.
	pub fn expires_at(&self) -> Option<Instant> {
		self.expires_at
	}

	/// Units this entry contributes to the weight budget.
	pub fn weight(&self) -> u64 {
		self.weight
	}

	/// Store-wide insertion order, used to break eviction ties.
	pub fn sequence(&self) -> u64 {
		self.sequence
	}

	/// Whether the value is still within its time-to-live.
	pub fn is_fresh(&self, now: Instant) -> bool {
		self.expires_at.is_none_or(|deadline| now < deadline)
	}

	/// Whether the value has reached its expiry.
	pub fn is_expired(&self, now: Instant) -> bool {
		!self.is_fresh(now)
	}
}
