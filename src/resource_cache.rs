//! Public cache façade: async, blocking, and local-only lookups plus administration.

// std
use std::{
	mem,
	sync::{
		Mutex, MutexGuard, PoisonError,
		atomic::{AtomicBool, Ordering},
		mpsc::{self, RecvTimeoutError},
	},
};
// crates.io
use serde::{Deserialize, Serialize};
use tokio::{runtime::Handle, sync::broadcast, task::JoinHandle};
// self
use crate::{
	_prelude::*,
	cache::{
		coordinator::Coordinator,
		entry::CacheEntry,
		invalidation::Invalidator,
		key::CacheKey,
		pruner::{self, PruneReport},
		state::{Claim, FetchOutcome, Lookup},
		store::CacheStore,
	},
	clock::{Clock, SystemClock},
	config::CacheConfig,
	connection::ConnectionSettings,
	events::{CredentialEvent, CredentialEventBus, Subscription},
	metrics::{CacheMetrics, CacheMetricsSnapshot},
	resource::descriptor::{CachedResource, Resource},
};

/// Per-call staleness policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOptions {
	/// Answer with the expired value when a refresh fails.
	pub use_stale: bool,
	/// Refetch even when the stored value is still fresh.
	pub force_fetch: bool,
}
impl FetchOptions {
	/// Override [`use_stale`](Self::use_stale).
	pub fn with_use_stale(mut self, use_stale: bool) -> Self {
		self.use_stale = use_stale;

		self
	}

	/// Override [`force_fetch`](Self::force_fetch).
	pub fn with_force_fetch(mut self, force_fetch: bool) -> Self {
		self.force_fetch = force_fetch;

		self
	}
}
impl Default for FetchOptions {
	fn default() -> Self {
		Self { use_stale: true, force_fetch: false }
	}
}

/// Point-in-time view of the cache for status reporting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheStatus {
	/// Materialized entries.
	pub entries: usize,
	/// Keys with a fetch underway.
	pub in_flight: usize,
	/// Sum of entry weights.
	pub total_weight: u64,
	/// Weight budget enforced by the pruner.
	pub max_weight: u64,
	/// Share of lookups served from a fresh entry.
	pub hit_rate: f64,
	/// Share of lookups answered with an expired entry.
	pub stale_serve_ratio: f64,
	/// Raw counters.
	pub metrics: CacheMetricsSnapshot,
}

/// Builder for [`ResourceCache`].
#[derive(Debug, Default)]
pub struct ResourceCacheBuilder {
	config: CacheConfig,
	clock: Option<Arc<dyn Clock>>,
	runtime: Option<Handle>,
	buses: Vec<CredentialEventBus>,
	receivers: Vec<broadcast::Receiver<CredentialEvent>>,
}
impl ResourceCacheBuilder {
	/// Create a builder with default configuration.
	pub fn new() -> Self {
		Self::default()
	}

	/// Replace the whole configuration.
	pub fn config(mut self, config: CacheConfig) -> Self {
		self.config = config;

		self
	}

	/// Override the weight budget.
	pub fn max_weight(mut self, max_weight: u64) -> Self {
		self.config.max_weight = max_weight;

		self
	}

	/// Override the delay between background prune passes.
	pub fn prune_interval(mut self, interval: Duration) -> Self {
		self.config.prune_interval = interval;

		self
	}

	/// Override the default wait bound of the blocking entry points.
	pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
		self.config.fetch_timeout = timeout;

		self
	}

	/// Use `clock` for expiry decisions instead of the system clock.
	pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = Some(clock);

		self
	}

	/// Run fetches and background tasks on `runtime`.
	///
	/// Defaults to the runtime `build` is called from.
	pub fn runtime(mut self, runtime: Handle) -> Self {
		self.runtime = Some(runtime);

		self
	}

	/// Purge entries on events published to `bus`.
	pub fn subscribe_to(mut self, bus: &CredentialEventBus) -> Self {
		self.buses.push(bus.clone());

		self
	}

	/// Purge entries on events received from a broadcast channel.
	pub fn follow(mut self, receiver: broadcast::Receiver<CredentialEvent>) -> Self {
		self.receivers.push(receiver);

		self
	}

	/// Validate the configuration, start the pruner, and construct the cache.
	pub fn build(self) -> Result<ResourceCache> {
		self.config.validate()?;

		let runtime =
			self.runtime.or_else(|| Handle::try_current().ok()).ok_or_else(|| Error::Validation {
				field: "runtime",
				reason: "No Tokio runtime was supplied and none is running.".into(),
			})?;
		let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
		let store = Arc::new(CacheStore::new());
		let metrics = CacheMetrics::new();
		let coordinator =
			Coordinator::new(runtime.clone(), store.clone(), clock.clone(), metrics.clone());
		let invalidator = Invalidator::new(&store, metrics.clone());
		let pruner = runtime.spawn(pruner::run(
			Arc::downgrade(&store),
			metrics.clone(),
			self.config.max_weight,
			self.config.prune_interval,
		));

		tracing::debug!(
			max_weight = self.config.max_weight,
			prune_interval = ?self.config.prune_interval,
			"resource cache started"
		);

		let cache = ResourceCache {
			inner: Arc::new(CacheInner {
				config: self.config,
				store,
				clock,
				runtime,
				coordinator,
				metrics,
				invalidator,
				closed: AtomicBool::new(false),
				tasks: Mutex::new(vec![pruner]),
				subscriptions: Mutex::new(Vec::new()),
			}),
		};

		for bus in &self.buses {
			cache.subscribe(bus);
		}
		for receiver in self.receivers {
			cache.follow(receiver);
		}

		Ok(cache)
	}
}

/// Credential- and region-scoped cache of fetched resources.
///
/// Cloning is cheap and every clone shares the same store.
#[derive(Clone, Debug)]
pub struct ResourceCache {
	inner: Arc<CacheInner>,
}
impl ResourceCache {
	/// Create a cache with `config` on the current Tokio runtime.
	pub fn new(config: CacheConfig) -> Result<Self> {
		Self::builder().config(config).build()
	}

	/// Create a [`ResourceCacheBuilder`] for advanced configuration.
	pub fn builder() -> ResourceCacheBuilder {
		ResourceCacheBuilder::new()
	}

	/// Configuration the cache was built with.
	pub fn config(&self) -> &CacheConfig {
		&self.inner.config
	}

	/// Resolve `resource` with the default [`FetchOptions`].
	pub async fn get_resource<R>(
		&self,
		resource: &R,
		settings: &ConnectionSettings,
	) -> Result<R::Output>
	where
		R: Resource,
	{
		self.get_resource_with(resource, settings, FetchOptions::default()).await
	}

	/// Resolve `resource`, fetching it when the stored value is missing, expired, or forced.
	///
	/// Concurrent callers for the same key share one fetch. When the fetch fails and an older
	/// value exists, that value is returned if `options.use_stale` is set.
	#[tracing::instrument(
		skip_all,
		fields(
			resource = resource.source().id(),
			region = settings.region_id(),
			credential = settings.credential_id()
		)
	)]
	pub async fn get_resource_with<R>(
		&self,
		resource: &R,
		settings: &ConnectionSettings,
		options: FetchOptions,
	) -> Result<R::Output>
	where
		R: Resource,
	{
		self.ensure_open()?;

		let source = resource.source();
		let key = CacheKey::for_resource(source, settings);
		let entry = match self.inner.coordinator.acquire(&key, source, settings, options.force_fetch)
		{
			Claim::Hit(entry) => {
				self.inner.metrics.record_hit(key.resource_id());

				entry
			},
			Claim::Wait { pending, previous, started } => {
				tracing::debug!(started, "cache miss; awaiting fetch");

				self.inner.metrics.record_miss(key.resource_id());
				self.settle(&key, pending.await, previous, options.use_stale)?
			},
			Claim::Closed => return Err(Error::Closed),
		};

		self.project(resource, &key, &entry)
	}

	/// Blocking [`get_resource`](Self::get_resource) bounded by the configured fetch timeout.
	pub fn get_resource_now<R>(&self, resource: &R, settings: &ConnectionSettings) -> Result<R::Output>
	where
		R: Resource,
	{
		self.get_resource_now_with(
			resource,
			settings,
			FetchOptions::default(),
			self.inner.config.fetch_timeout,
		)
	}

	/// Block the calling thread for at most `timeout` waiting for `resource`.
	///
	/// A timeout leaves the fetch running; its result still lands in the cache. Fetch failures
	/// surface as the [`FetchError`](crate::FetchError) the descriptor raised.
	///
	/// Must not be called from within an async context: it parks the current thread.
	pub fn get_resource_now_with<R>(
		&self,
		resource: &R,
		settings: &ConnectionSettings,
		options: FetchOptions,
		timeout: Duration,
	) -> Result<R::Output>
	where
		R: Resource,
	{
		self.ensure_open()?;

		let source = resource.source();
		let key = CacheKey::for_resource(source, settings);
		let entry = match self.inner.coordinator.acquire(&key, source, settings, options.force_fetch)
		{
			Claim::Hit(entry) => {
				self.inner.metrics.record_hit(key.resource_id());

				entry
			},
			Claim::Wait { pending, previous, .. } => {
				self.inner.metrics.record_miss(key.resource_id());

				let (sender, receiver) = mpsc::sync_channel(1);

				self.inner.runtime.spawn(async move {
					let _ = sender.send(pending.await);
				});

				let outcome = match receiver.recv_timeout(timeout) {
					Ok(outcome) => outcome,
					Err(RecvTimeoutError::Timeout) => {
						tracing::debug!(key = %key, ?timeout, "timed out waiting for fetch");

						return Err(Error::Timeout {
							resource: key.resource_id().to_owned(),
							timeout,
						});
					},
					Err(RecvTimeoutError::Disconnected) => return Err(Error::Closed),
				};

				self.settle(&key, outcome, previous, options.use_stale)?
			},
			Claim::Closed => return Err(Error::Closed),
		};

		self.project(resource, &key, &entry)
	}

	/// Stored value for `resource`, fresh or expired, without fetching.
	pub fn get_resource_if_present<R>(
		&self,
		resource: &R,
		settings: &ConnectionSettings,
	) -> Option<R::Output>
	where
		R: Resource,
	{
		self.get_resource_if_present_with(resource, settings, true)
	}

	/// Stored value for `resource` without fetching; expired values only when `use_stale`.
	pub fn get_resource_if_present_with<R>(
		&self,
		resource: &R,
		settings: &ConnectionSettings,
		use_stale: bool,
	) -> Option<R::Output>
	where
		R: Resource,
	{
		if self.is_closed() {
			return None;
		}

		let key = CacheKey::for_resource(resource.source(), settings);
		let lookup = self.inner.store.lookup(&key, self.inner.clock.now());
		let entry = match lookup {
			Lookup::Stale(_) if !use_stale => return None,
			_ => lookup.entry()?,
		};

		match self.project(resource, &key, entry) {
			Ok(value) => Some(value),
			Err(err) => {
				tracing::warn!(key = %key, error = %err, "ignoring cached value of unexpected type");

				None
			},
		}
	}

	/// Drop every stored value. Fetches in flight finish but their results are discarded.
	pub fn clear(&self) {
		let removed = self.inner.store.clear();

		tracing::debug!(removed, "cleared resource cache");
	}

	/// Drop the value stored for one key; a view clears the key of the resource it reads.
	pub fn clear_resource<R>(&self, resource: &R, settings: &ConnectionSettings) -> bool
	where
		R: Resource,
	{
		let key = CacheKey::for_resource(resource.source(), settings);
		let removed = self.inner.store.remove(&key);

		tracing::debug!(key = %key, removed, "cleared resource");

		removed
	}

	/// Drop every value fetched with `credential_id`, returning how many keys were removed.
	pub fn invalidate_credential(&self, credential_id: &str) -> usize {
		self.inner.invalidator.invalidate(credential_id)
	}

	/// Run one eviction pass now.
	pub fn prune(&self) -> PruneReport {
		let report = pruner::prune(&self.inner.store, self.inner.config.max_weight);

		self.inner.metrics.record_prune(report.evicted, report.remaining_weight);

		report
	}

	/// Snapshot of entry counts, weight, and counters.
	pub fn status(&self) -> CacheStatus {
		let metrics = self.inner.metrics.snapshot();

		CacheStatus {
			entries: self.inner.store.entries(),
			in_flight: self.inner.store.in_flight(),
			total_weight: self.inner.store.total_weight(),
			max_weight: self.inner.config.max_weight,
			hit_rate: metrics.hit_rate(),
			stale_serve_ratio: metrics.stale_ratio(),
			metrics,
		}
	}

	/// Purge entries on events published to `bus` until the cache is closed.
	pub fn subscribe(&self, bus: &CredentialEventBus) {
		if self.is_closed() {
			return;
		}

		let subscription = bus.subscribe(self.inner.invalidator.clone());

		self.inner.subscriptions().push(subscription);
	}

	/// Purge entries on events received from `receiver` until the cache is closed.
	pub fn follow(&self, receiver: broadcast::Receiver<CredentialEvent>) {
		if self.is_closed() {
			return;
		}

		let task = self.inner.runtime.spawn(self.inner.invalidator.clone().follow(receiver));

		self.inner.tasks().push(task);
	}

	/// Stop background work, detach from event sources, and drop every stored value.
	///
	/// Later lookups fail with [`Error::Closed`].
	pub fn close(&self) {
		if self.inner.closed.swap(true, Ordering::AcqRel) {
			return;
		}

		self.inner.shutdown();
		self.inner.store.close();

		tracing::debug!("resource cache closed");
	}

	/// Whether [`close`](Self::close) has been called.
	pub fn is_closed(&self) -> bool {
		self.inner.closed.load(Ordering::Acquire)
	}

	fn ensure_open(&self) -> Result<()> {
		if self.is_closed() { Err(Error::Closed) } else { Ok(()) }
	}

	/// Apply the stale-fallback policy to a finished fetch.
	fn settle(
		&self,
		key: &CacheKey,
		outcome: FetchOutcome,
		previous: Option<Arc<CacheEntry>>,
		use_stale: bool,
	) -> Result<Arc<CacheEntry>> {
		match outcome {
			Ok(entry) => Ok(entry),
			Err(err) => match previous {
				Some(stale) if use_stale => {
					tracing::warn!(key = %key, error = %err, "fetch failed; serving stale value");

					self.inner.metrics.record_stale_serve(key.resource_id());

					Ok(stale)
				},
				_ => Err(err.into()),
			},
		}
	}

	fn project<R>(&self, resource: &R, key: &CacheKey, entry: &CacheEntry) -> Result<R::Output>
	where
		R: Resource,
	{
		let value = entry
			.value::<<R::Source as CachedResource>::Value>()
			.cloned()
			.ok_or_else(|| Error::TypeMismatch { resource: key.resource_id().to_owned() })?;

		Ok(resource.project(value))
	}
}

#[derive(Debug)]
struct CacheInner {
	config: CacheConfig,
	store: Arc<CacheStore>,
	clock: Arc<dyn Clock>,
	runtime: Handle,
	coordinator: Coordinator,
	metrics: Arc<CacheMetrics>,
	invalidator: Arc<Invalidator>,
	closed: AtomicBool,
	tasks: Mutex<Vec<JoinHandle<()>>>,
	subscriptions: Mutex<Vec<Subscription>>,
}
impl CacheInner {
	fn tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
		self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn subscriptions(&self) -> MutexGuard<'_, Vec<Subscription>> {
		self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn shutdown(&self) {
		for task in mem::take(&mut *self.tasks()) {
			task.abort();
		}

		self.subscriptions().clear();
	}
}
impl Drop for CacheInner {
	fn drop(&mut self) {
		self.shutdown();
	}
}
