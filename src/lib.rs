//! Credential- and region-scoped async resource cache with request coalescing, stale fallback,
//! and weighted eviction.
//!
//! A [`ResourceCache`] memoizes the results of expensive remote describe/list calls. Values are
//! keyed by resource id, region, and credential; concurrent lookups for the same key share a
//! single fetch, expired values are served when a refresh fails, a background pruner keeps the
//! total weight under budget, and credential lifecycle events purge affected entries.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod cache;
pub mod clock;
pub mod config;
pub mod connection;
pub mod events;
pub mod metrics;
pub mod resource;

mod error;
mod resource_cache;
mod _prelude {
	pub use std::{sync::Arc, time::Duration};

	pub use tokio::time::Instant;

	pub use crate::{Error, Result};
}

#[cfg(feature = "prometheus")] pub use crate::metrics::install_default_exporter;
pub use crate::{
	cache::{key::CacheKey, pruner::PruneReport},
	clock::{Clock, ManualClock, SystemClock},
	config::CacheConfig,
	connection::{ConnectionSettings, CredentialIdentifier, CredentialProvider, Credentials, Region},
	error::{Error, FetchError, FetchResult, Result},
	events::{CredentialEvent, CredentialEventBus, CredentialListener, Subscription},
	resource::{
		descriptor::{CachedResource, DEFAULT_EXPIRY, FnResource, Resource},
		view::{ResourceExt, View},
		weigh::Weigh,
	},
	resource_cache::{CacheStatus, FetchOptions, ResourceCache, ResourceCacheBuilder},
};
