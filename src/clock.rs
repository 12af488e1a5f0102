//! Time sources used to stamp and expire cache entries.

// std
use std::{
	fmt::Debug,
	sync::{Mutex, PoisonError},
};
// self
use crate::_prelude::*;

/// Source of the current instant.
pub trait Clock: Debug + Send + Sync {
	/// Current monotonic instant.
	fn now(&self) -> Instant;
}

/// Clock backed by the Tokio time driver.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> Instant {
		Instant::now()
	}
}

/// Clock that only moves when told to, for deterministic expiry tests.
#[derive(Debug)]
pub struct ManualClock {
	now: Mutex<Instant>,
}
impl ManualClock {
	/// Create a clock frozen at the current instant.
	pub fn new() -> Arc<Self> {
		Self::starting_at(Instant::now())
	}

	/// Create a clock frozen at the given instant.
	pub fn starting_at(now: Instant) -> Arc<Self> {
		Arc::new(Self { now: Mutex::new(now) })
	}

	/// Move the clock to an absolute instant.
	pub fn set(&self, now: Instant) {
		*self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
	}

	/// Move the clock forward by `delta`.
	pub fn advance(&self, delta: Duration) {
		let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);

		*now += delta;
	}
}
impl Clock for ManualClock {
	fn now(&self) -> Instant {
		*self.now.lock().unwrap_or_else(PoisonError::into_inner)
	}
}
