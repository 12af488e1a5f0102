//! Purging entries when credentials change.

// std
use std::sync::Weak;
// crates.io
use tokio::sync::broadcast::{self, error::RecvError};
// self
use crate::{
	_prelude::*,
	cache::store::CacheStore,
	events::{CredentialEvent, CredentialListener},
	metrics::CacheMetrics,
};

/// Remove every key fetched with `credential_id`, across all regions and resources.
pub fn purge_credential(store: &CacheStore, credential_id: &str) -> usize {
	store.remove_all(|key| key.credential_id() == credential_id)
}

/// Listener that purges a store in response to credential events.
#[derive(Debug)]
pub(crate) struct Invalidator {
	store: Weak<CacheStore>,
	metrics: Arc<CacheMetrics>,
}
impl Invalidator {
	pub(crate) fn new(store: &Arc<CacheStore>, metrics: Arc<CacheMetrics>) -> Arc<Self> {
		Arc::new(Self { store: Arc::downgrade(store), metrics })
	}

	/// Purge keys for a credential, returning how many were removed.
	pub(crate) fn invalidate(&self, credential_id: &str) -> usize {
		let Some(store) = self.store.upgrade() else {
			return 0;
		};
		let removed = purge_credential(&store, credential_id);

		tracing::debug!(credential = credential_id, removed, "invalidated credential");

		self.metrics.record_invalidations(removed);

		removed
	}

	fn flush(&self) {
		if let Some(store) = self.store.upgrade() {
			let removed = store.clear();

			self.metrics.record_invalidations(removed);
		}
	}

	/// Apply events from a broadcast channel until it closes.
	///
	/// A lagging receiver has lost events it cannot recover, so the whole store is flushed.
	pub(crate) async fn follow(self: Arc<Self>, mut receiver: broadcast::Receiver<CredentialEvent>) {
		loop {
			match receiver.recv().await {
				Ok(event) => self.on_event(&event),
				Err(RecvError::Lagged(skipped)) => {
					tracing::warn!(skipped, "credential event receiver lagged; flushing cache");

					self.flush();
				},
				Err(RecvError::Closed) => {
					tracing::debug!("credential event channel closed");

					break;
				},
			}
		}
	}
}
impl CredentialListener for Invalidator {
	fn on_event(&self, event: &CredentialEvent) {
		if event.invalidates_cache() {
			self.invalidate(event.credential_id());
		}
	}
}
