//! Concurrent key to entry table.
//!
//! Every operation holds the table lock for a bounded critical section only; no lock is held
//! while a fetch runs.

// std
use std::{
	collections::HashMap,
	sync::{
		PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
		atomic::{AtomicBool, AtomicU64, Ordering},
	},
};
// self
use crate::{
	_prelude::*,
	cache::{
		entry::CacheEntry,
		key::CacheKey,
		state::{Claim, FetchOutcome, InFlight, Lookup, PendingFetch, Slot},
	},
};

/// Authoritative table of cache entries and in-flight fetches.
#[derive(Debug, Default)]
pub struct CacheStore {
	// TODO: Shard the table if lock contention shows up with many concurrent callers.
	slots: RwLock<HashMap<CacheKey, Slot>>,
	next_generation: AtomicU64,
	next_sequence: AtomicU64,
	closed: AtomicBool,
}
impl CacheStore {
	/// Create an empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Inspect a key at `now`.
	///
	/// While a refresh is in flight the entry it will replace is still reported.
	pub fn lookup(&self, key: &CacheKey, now: Instant) -> Lookup {
		match self.read().get(key) {
			Some(Slot::Ready(entry)) | Some(Slot::Loading(InFlight { previous: Some(entry), .. })) =>
				Lookup::of(entry, now),
			Some(Slot::Loading(_)) => Lookup::Pending,
			None => Lookup::Absent,
		}
	}

	/// Atomically replace whatever `key` holds with `entry`.
	///
	/// A fetch in flight for the key is superseded and its result discarded.
	pub fn put(&self, key: CacheKey, entry: Arc<CacheEntry>) {
		self.write().insert(key, Slot::Ready(entry));
	}

	/// Remove a key, returning whether anything was stored under it.
	pub fn remove(&self, key: &CacheKey) -> bool {
		self.write().remove(key).is_some()
	}

	/// Remove the entry at `key` only if it is still `entry`.
	pub fn remove_entry(&self, key: &CacheKey, entry: &Arc<CacheEntry>) -> bool {
		let mut slots = self.write();

		match slots.get(key) {
			Some(Slot::Ready(current)) if Arc::ptr_eq(current, entry) => {
				slots.remove(key);

				true
			},
			_ => false,
		}
	}

	/// Remove every key matching `predicate`, returning how many were removed.
	pub fn remove_all<P>(&self, mut predicate: P) -> usize
	where
		P: FnMut(&CacheKey) -> bool,
	{
		let mut slots = self.write();
		let before = slots.len();

		slots.retain(|key, _| !predicate(key));

		before - slots.len()
	}

	/// Remove everything, returning how many keys were removed.
	pub fn clear(&self) -> usize {
		let mut slots = self.write();
		let removed = slots.len();

		slots.clear();

		removed
	}

	/// Materialized entries at this instant; in-flight fetches are left out.
	pub fn snapshot(&self) -> Vec<(CacheKey, Arc<CacheEntry>)> {
		self.read()
			.iter()
			.filter_map(|(key, slot)| match slot {
				Slot::Ready(entry) => Some((key.clone(), entry.clone())),
				Slot::Loading(_) => None,
			})
			.collect()
	}

	/// Number of keys holding an entry or an in-flight fetch.
	pub fn len(&self) -> usize {
		self.read().len()
	}

	/// Whether the store holds nothing.
	pub fn is_empty(&self) -> bool {
		self.read().is_empty()
	}

	/// Number of materialized entries.
	pub fn entries(&self) -> usize {
		self.read().values().filter(|slot| matches!(slot, Slot::Ready(_))).count()
	}

	/// Number of fetches currently in flight.
	pub fn in_flight(&self) -> usize {
		self.read().values().filter(|slot| matches!(slot, Slot::Loading(_))).count()
	}

	/// Combined weight of all materialized entries.
	pub fn total_weight(&self) -> u64 {
		self.read()
			.values()
			.map(|slot| match slot {
				Slot::Ready(entry) => entry.weight(),
				Slot::Loading(_) => 0,
			})
			.fold(0, u64::saturating_add)
	}

	/// Remove everything and refuse to install fetches from now on.
	pub fn close(&self) -> usize {
		let mut slots = self.write();
		let removed = slots.len();

		self.closed.store(true, Ordering::Relaxed);
		slots.clear();

		removed
	}

	/// Whether [`close`](Self::close) has been called.
	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Relaxed)
	}

	/// Allocate the next insertion sequence number.
	pub fn next_sequence(&self) -> u64 {
		self.next_sequence.fetch_add(1, Ordering::Relaxed)
	}

	/// Serve a fresh entry, join the fetch in flight, or install a new one via `start`.
	///
	/// Once the store is closed nothing is served or installed.
	///
	/// Runs under the write lock so exactly one caller per miss installs a fetch.
	pub(crate) fn claim<F>(&self, key: &CacheKey, now: Instant, force: bool, start: F) -> Claim
	where
		F: FnOnce(u64) -> PendingFetch,
	{
		let mut slots = self.write();

		// Checked under the write lock so no fetch is installed after `close` has cleared.
		if self.closed.load(Ordering::Relaxed) {
			return Claim::Closed;
		}

		match slots.get(key) {
			Some(Slot::Ready(entry)) if !force && entry.is_fresh(now) =>
				return Claim::Hit(entry.clone()),
			Some(Slot::Loading(in_flight)) =>
				return Claim::Wait {
					pending: in_flight.pending.clone(),
					previous: in_flight.previous.clone(),
					started: false,
				},
			_ => {},
		}

		let previous = match slots.remove(key) {
			Some(Slot::Ready(entry)) => Some(entry),
			_ => None,
		};
		let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
		let pending = start(generation);

		slots.insert(
			key.clone(),
			Slot::Loading(InFlight {
				generation,
				previous: previous.clone(),
				pending: pending.clone(),
			}),
		);

		Claim::Wait { pending, previous, started: true }
	}

	/// Settle the fetch installed as `generation` at `key`.
	///
	/// Success installs the new entry; failure restores the previous entry or empties the slot.
	/// Returns false when the slot no longer belongs to this fetch, in which case nothing changes.
	pub(crate) fn complete(&self, key: &CacheKey, generation: u64, outcome: &FetchOutcome) -> bool {
		let mut slots = self.write();
		let restored = match slots.get_mut(key) {
			Some(Slot::Loading(in_flight)) if in_flight.generation == generation => match outcome {
				Ok(entry) => Some(entry.clone()),
				Err(_) => in_flight.previous.take(),
			},
			_ => return false,
		};

		match restored {
			Some(entry) => {
				slots.insert(key.clone(), Slot::Ready(entry));
			},
			None => {
				slots.remove(key);
			},
		}

		true
	}

	fn read(&self) -> RwLockReadGuard<'_, HashMap<CacheKey, Slot>> {
		self.slots.read().unwrap_or_else(PoisonError::into_inner)
	}

	fn write(&self) -> RwLockWriteGuard<'_, HashMap<CacheKey, Slot>> {
		self.slots.write().unwrap_or_else(PoisonError::into_inner)
	}
}
