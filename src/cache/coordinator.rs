//! Request coalescing: at most one fetch per key runs at a time.

// std
use std::panic::AssertUnwindSafe;
// crates.io
use futures::FutureExt;
use tokio::runtime::Handle;
// self
use crate::{
	_prelude::*,
	cache::{
		entry::CacheEntry,
		key::CacheKey,
		state::{Claim, FetchOutcome, PendingFetch},
		store::CacheStore,
	},
	clock::Clock,
	connection::ConnectionSettings,
	error::FetchError,
	metrics::CacheMetrics,
	resource::descriptor::CachedResource,
};

/// Spawns fetches on the runtime and routes concurrent callers onto them.
#[derive(Clone, Debug)]
pub(crate) struct Coordinator {
	runtime: Handle,
	store: Arc<CacheStore>,
	clock: Arc<dyn Clock>,
	metrics: Arc<CacheMetrics>,
}
impl Coordinator {
	pub(crate) fn new(
		runtime: Handle,
		store: Arc<CacheStore>,
		clock: Arc<dyn Clock>,
		metrics: Arc<CacheMetrics>,
	) -> Self {
		Self { runtime, store, clock, metrics }
	}

	/// Route a caller for `resource`: serve a fresh entry or attach it to a fetch.
	pub(crate) fn acquire<C>(
		&self,
		key: &CacheKey,
		resource: &C,
		settings: &ConnectionSettings,
		force_fetch: bool,
	) -> Claim
	where
		C: CachedResource,
	{
		let now = self.clock.now();

		self.store.claim(key, now, force_fetch, |generation| {
			self.spawn_fetch(key.clone(), generation, resource.clone(), settings.clone())
		})
	}

	/// Run the fetch on the runtime; the task settles the store slot itself, so the result lands
	/// even when every waiter has gone away.
	fn spawn_fetch<C>(
		&self,
		key: CacheKey,
		generation: u64,
		resource: C,
		settings: ConnectionSettings,
	) -> PendingFetch
	where
		C: CachedResource,
	{
		let store = self.store.clone();
		let clock = self.clock.clone();
		let metrics = self.metrics.clone();
		let task_key = key.clone();
		let task = self.runtime.spawn(async move {
			tracing::debug!(key = %task_key, generation, "fetching resource");

			let started = Instant::now();
			let fetched = AssertUnwindSafe(resource.fetch(&settings.region, &settings.credentials))
				.catch_unwind()
				.await
				.unwrap_or_else(|_| {
					Err(FetchError::msg(format!(
						"Fetch for resource '{}' panicked.",
						task_key.resource_id()
					)))
				});
			let outcome: FetchOutcome = match fetched {
				Ok(value) => {
					let weight = resource.weight(&value);
					let entry = CacheEntry::new(
						value,
						clock.now(),
						resource.expiry(),
						weight,
						store.next_sequence(),
					);

					metrics.record_fetch_success(task_key.resource_id(), started.elapsed());

					Ok(Arc::new(entry))
				},
				Err(err) => {
					tracing::debug!(key = %task_key, error = %err, "fetch failed");

					metrics.record_fetch_error(task_key.resource_id());

					Err(err)
				},
			};

			if !store.complete(&task_key, generation, &outcome) {
				tracing::debug!(key = %task_key, generation, "discarding result of superseded fetch");
			}

			outcome
		});
		let store = self.store.clone();

		task.map(move |joined| {
			joined.unwrap_or_else(|err| {
				let outcome = Err(FetchError::msg(format!(
					"Fetch task for resource '{}' did not complete: {err}.",
					key.resource_id()
				)));

				store.complete(&key, generation, &outcome);

				outcome
			})
		})
		.boxed()
		.shared()
	}
}
