//! Resource descriptors: how a cached value is identified, fetched, expired, and weighed.

// std
use std::{
	fmt::{self, Debug, Formatter},
	future::Future,
};
// crates.io
use futures::{FutureExt, future::BoxFuture};
// self
use crate::{
	_prelude::*,
	connection::{Credentials, Region},
	error::{FetchError, FetchResult},
	resource::weigh::Weigh,
};

/// Time-to-live applied when a descriptor does not override [`CachedResource::expiry`].
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(10 * 60);

type FetchFn<T> = dyn Fn(Region, Credentials) -> BoxFuture<'static, FetchResult<T>> + Send + Sync;
type WeighFn<T> = dyn Fn(&T) -> u64 + Send + Sync;

/// Description of a value the cache fetches and stores under its own key.
///
/// Two descriptors reporting the same [`id`](CachedResource::id) share one cache line per region
/// and credential, regardless of object identity.
pub trait CachedResource: Clone + Send + Sync + 'static {
	/// Value produced by the fetch.
	type Value: Weigh + Clone + Send + Sync + 'static;

	/// Stable identity of the resource.
	fn id(&self) -> &str;

	/// Time-to-live measured from a successful fetch.
	///
	/// Read once per completed fetch, so implementations may vary it between fetches.
	fn expiry(&self) -> Duration {
		DEFAULT_EXPIRY
	}

	/// Produce the value for a region and credential.
	fn fetch(
		&self,
		region: &Region,
		credentials: &Credentials,
	) -> impl Future<Output = FetchResult<Self::Value>> + Send;

	/// Weight of a fetched value toward the eviction budget.
	fn weight(&self, value: &Self::Value) -> u64 {
		value.weight()
	}
}

/// Anything that can be read through the cache.
///
/// Every [`CachedResource`] reads its own value. A [`View`](crate::View) reads the value of the
/// cached resource beneath it and projects it, without a cache line of its own.
pub trait Resource: Clone + Send + Sync + 'static {
	/// Value handed to the caller.
	type Output;
	/// Descriptor owning the cache line this resource reads.
	type Source: CachedResource;

	/// The descriptor whose key backs this resource.
	fn source(&self) -> &Self::Source;

	/// Derive the caller-facing value from the cached one.
	fn project(&self, value: <Self::Source as CachedResource>::Value) -> Self::Output;
}
impl<C> Resource for C
where
	C: CachedResource,
{
	type Output = C::Value;
	type Source = C;

	fn source(&self) -> &Self::Source {
		self
	}

	fn project(&self, value: C::Value) -> Self::Output {
		value
	}
}

/// Descriptor assembled from a closure.
pub struct FnResource<T> {
	id: Arc<str>,
	expiry: Duration,
	fetch: Arc<FetchFn<T>>,
	weigher: Option<Arc<WeighFn<T>>>,
}
impl<T> FnResource<T>
where
	T: Send + 'static,
{
	/// Descriptor backed by an async fetch closure.
	pub fn new<F, Fut>(id: impl Into<Arc<str>>, fetch: F) -> Self
	where
		F: Fn(Region, Credentials) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = FetchResult<T>> + Send + 'static,
	{
		Self {
			id: id.into(),
			expiry: DEFAULT_EXPIRY,
			fetch: Arc::new(move |region, credentials| fetch(region, credentials).boxed()),
			weigher: None,
		}
	}

	/// Descriptor backed by a synchronous fetch closure, executed on Tokio's blocking pool.
	pub fn blocking<F>(id: impl Into<Arc<str>>, fetch: F) -> Self
	where
		F: Fn(&Region, &Credentials) -> FetchResult<T> + Send + Sync + 'static,
	{
		let id = id.into();
		let fetch = Arc::new(fetch);
		let resource = id.clone();

		Self::new(id, move |region, credentials| {
			let fetch = fetch.clone();
			let resource = resource.clone();

			tokio::task::spawn_blocking(move || fetch(&region, &credentials)).map(move |joined| {
				joined.unwrap_or_else(|err| {
					Err(FetchError::msg(format!("Blocking fetch for '{resource}' failed: {err}.")))
				})
			})
		})
	}

	/// Override the time-to-live.
	pub fn with_expiry(mut self, expiry: Duration) -> Self {
		self.expiry = expiry;

		self
	}

	/// Override how fetched values are weighed.
	pub fn with_weigher<W>(mut self, weigher: W) -> Self
	where
		W: Fn(&T) -> u64 + Send + Sync + 'static,
	{
		self.weigher = Some(Arc::new(weigher));

		self
	}
}
impl<T> Clone for FnResource<T> {
	fn clone(&self) -> Self {
		Self {
			id: self.id.clone(),
			expiry: self.expiry,
			fetch: self.fetch.clone(),
			weigher: self.weigher.clone(),
		}
	}
}
impl<T> Debug for FnResource<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("FnResource")
			.field("id", &self.id)
			.field("expiry", &self.expiry)
			.field("custom_weigher", &self.weigher.is_some())
			.finish()
	}
}
impl<T> CachedResource for FnResource<T>
where
	T: Weigh + Clone + Send + Sync + 'static,
{
	type Value = T;

	fn id(&self) -> &str {
		&self.id
	}

	fn expiry(&self) -> Duration {
		self.expiry
	}

	fn fetch(
		&self,
		region: &Region,
		credentials: &Credentials,
	) -> impl Future<Output = FetchResult<T>> + Send {
		(self.fetch)(region.clone(), credentials.clone())
	}

	fn weight(&self, value: &T) -> u64 {
		match &self.weigher {
			Some(weigher) => weigher(value),
			None => value.weight(),
		}
	}
}
