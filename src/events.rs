//! Typed credential lifecycle events and a synchronous publish/subscribe bus.

// std
use std::{
	fmt::{self, Debug, Formatter},
	sync::{
		PoisonError, RwLock, Weak,
		atomic::{AtomicU64, Ordering},
	},
};
// crates.io
use serde::{Deserialize, Serialize};
// self
use crate::_prelude::*;

/// Change reported by the credential subsystem.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "credential_id", rename_all = "snake_case")]
pub enum CredentialEvent {
	/// A credential became available.
	ProviderAdded(String),
	/// A credential's backing configuration changed.
	ProviderModified(String),
	/// A credential went away.
	ProviderRemoved(String),
}
impl CredentialEvent {
	/// Credential the event refers to.
	pub fn credential_id(&self) -> &str {
		match self {
			CredentialEvent::ProviderAdded(id)
			| CredentialEvent::ProviderModified(id)
			| CredentialEvent::ProviderRemoved(id) => id,
		}
	}

	/// Whether values fetched with this credential must be dropped.
	pub fn invalidates_cache(&self) -> bool {
		matches!(self, CredentialEvent::ProviderModified(_) | CredentialEvent::ProviderRemoved(_))
	}
}

/// Receiver of credential events.
///
/// Listeners run on the publishing thread and must not block.
pub trait CredentialListener: Send + Sync {
	/// Handle one event.
	fn on_event(&self, event: &CredentialEvent);
}
impl<F> CredentialListener for F
where
	F: Fn(&CredentialEvent) + Send + Sync,
{
	fn on_event(&self, event: &CredentialEvent) {
		self(event)
	}
}

/// Synchronous fan-out of [`CredentialEvent`]s to registered listeners.
///
/// [`publish`](Self::publish) returns only after every listener has handled the event.
#[derive(Clone, Debug, Default)]
pub struct CredentialEventBus {
	inner: Arc<BusInner>,
}
impl CredentialEventBus {
	/// Create a bus with no listeners.
	pub fn new() -> Self {
		Self::default()
	}

	/// Register a listener until the returned [`Subscription`] is dropped.
	pub fn subscribe(&self, listener: Arc<dyn CredentialListener>) -> Subscription {
		let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

		self.inner.listeners.write().unwrap_or_else(PoisonError::into_inner).push((id, listener));

		Subscription { bus: Arc::downgrade(&self.inner), id }
	}

	/// Deliver an event to every listener on the calling thread.
	pub fn publish(&self, event: CredentialEvent) {
		let listeners = self
			.inner
			.listeners
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.iter()
			.map(|(_, listener)| listener.clone())
			.collect::<Vec<_>>();

		tracing::debug!(?event, listeners = listeners.len(), "publishing credential event");

		for listener in listeners {
			listener.on_event(&event);
		}
	}

	/// Publish [`CredentialEvent::ProviderAdded`].
	pub fn provider_added(&self, credential_id: impl Into<String>) {
		self.publish(CredentialEvent::ProviderAdded(credential_id.into()));
	}

	/// Publish [`CredentialEvent::ProviderModified`].
	pub fn provider_modified(&self, credential_id: impl Into<String>) {
		self.publish(CredentialEvent::ProviderModified(credential_id.into()));
	}

	/// Publish [`CredentialEvent::ProviderRemoved`].
	pub fn provider_removed(&self, credential_id: impl Into<String>) {
		self.publish(CredentialEvent::ProviderRemoved(credential_id.into()));
	}

	/// Number of registered listeners.
	pub fn listener_count(&self) -> usize {
		self.inner.listeners.read().unwrap_or_else(PoisonError::into_inner).len()
	}
}

/// Registration on a [`CredentialEventBus`]; unsubscribes when dropped.
#[must_use = "dropping a subscription unsubscribes the listener"]
#[derive(Debug)]
pub struct Subscription {
	bus: Weak<BusInner>,
	id: u64,
}
impl Subscription {
	/// Unsubscribe now.
	pub fn unsubscribe(self) {}
}
impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(bus) = self.bus.upgrade() {
			bus.listeners
				.write()
				.unwrap_or_else(PoisonError::into_inner)
				.retain(|(id, _)| *id != self.id);
		}
	}
}

#[derive(Default)]
struct BusInner {
	listeners: RwLock<Vec<(u64, Arc<dyn CredentialListener>)>>,
	next_id: AtomicU64,
}
impl Debug for BusInner {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let listeners = self.listeners.read().map(|listeners| listeners.len()).unwrap_or_default();

		f.debug_struct("BusInner").field("listeners", &listeners).finish()
	}
}
