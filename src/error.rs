//! Crate-wide error types and `Result` alias.

// std
use std::error::Error as StdError;
// self
use crate::_prelude::*;

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of a single resource fetch.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Unified error type for the resource cache crate.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Fetch(#[from] FetchError),

	#[error("Resource cache has been closed.")]
	Closed,
	#[cfg(feature = "prometheus")]
	#[error("Metrics error: {0}")]
	Metrics(String),
	#[error("Timed out after {timeout:?} waiting for resource '{resource}'.")]
	Timeout { resource: String, timeout: Duration },
	#[error("Cached value for resource '{resource}' does not have the requested type.")]
	TypeMismatch { resource: String },
	#[error("Validation failed for {field}: {reason}")]
	Validation { field: &'static str, reason: String },
}
impl Error {
	/// The underlying fetch failure, when this error came from a resource fetch.
	pub fn as_fetch(&self) -> Option<&FetchError> {
		match self {
			Error::Fetch(err) => Some(err),
			_ => None,
		}
	}
}

/// Failure raised by a resource fetch function.
///
/// The original error is shared behind an [`Arc`] so every caller coalesced onto the same fetch
/// observes the identical failure.
#[derive(Clone, Debug, thiserror::Error)]
#[error(transparent)]
pub struct FetchError(Arc<dyn StdError + Send + Sync + 'static>);
impl FetchError {
	/// Wrap an arbitrary error raised by a fetch function.
	pub fn new<E>(err: E) -> Self
	where
		E: StdError + Send + Sync + 'static,
	{
		Self(Arc::new(err))
	}

	/// Build a fetch error from a plain message.
	pub fn msg(message: impl Into<String>) -> Self {
		Self(Arc::new(Message(message.into())))
	}

	/// Attempt to view the original error as a concrete type.
	pub fn downcast_ref<E>(&self) -> Option<&E>
	where
		E: StdError + 'static,
	{
		self.0.downcast_ref::<E>()
	}

	/// Access the original error.
	pub fn inner(&self) -> &(dyn StdError + Send + Sync + 'static) {
		&*self.0
	}

	/// Whether two handles point at the same underlying failure.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Message(String);
