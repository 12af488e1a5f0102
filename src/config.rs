//! Cache-wide configuration and validation.

// crates.io
use serde::{Deserialize, Serialize};
// self
use crate::_prelude::*;

/// Default total weight budget enforced by the pruner.
pub const DEFAULT_MAX_WEIGHT: u64 = 5_000;
/// Default delay between background prune passes.
pub const DEFAULT_PRUNE_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Default bound on how long the blocking entry points wait for a value.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables for a [`ResourceCache`](crate::ResourceCache).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
	/// Total weight the pruner trims the cache down to.
	pub max_weight: u64,
	/// Delay between background prune passes.
	pub prune_interval: Duration,
	/// Wait bound for the blocking entry points.
	pub fetch_timeout: Duration,
}
impl CacheConfig {
	/// Override the weight budget.
	pub fn with_max_weight(mut self, max_weight: u64) -> Self {
		self.max_weight = max_weight;

		self
	}

	/// Override the prune interval.
	pub fn with_prune_interval(mut self, interval: Duration) -> Self {
		self.prune_interval = interval;

		self
	}

	/// Override the blocking fetch timeout.
	pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
		self.fetch_timeout = timeout;

		self
	}

	/// Validate invariants for cache configuration.
	pub fn validate(&self) -> Result<()> {
		if self.max_weight == 0 {
			return Err(Error::Validation {
				field: "max_weight",
				reason: "Must be greater than zero.".into(),
			});
		}
		if self.prune_interval.is_zero() {
			return Err(Error::Validation {
				field: "prune_interval",
				reason: "Must be greater than zero.".into(),
			});
		}
		if self.fetch_timeout.is_zero() {
			return Err(Error::Validation {
				field: "fetch_timeout",
				reason: "Must be greater than zero.".into(),
			});
		}

		Ok(())
	}
}
impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			max_weight: DEFAULT_MAX_WEIGHT,
			prune_interval: DEFAULT_PRUNE_INTERVAL,
			fetch_timeout: DEFAULT_FETCH_TIMEOUT,
		}
	}
}
