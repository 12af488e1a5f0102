//! Composite identity of a cache line.

// std
use std::fmt::{self, Display, Formatter};
// crates.io
use serde::Serialize;
// self
use crate::{_prelude::*, connection::ConnectionSettings, resource::descriptor::CachedResource};

/// Resource, region, and credential identity of one cache line.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct CacheKey {
	resource_id: Arc<str>,
	region_id: Arc<str>,
	credential_id: Arc<str>,
}
impl CacheKey {
	/// Build a key from its raw parts.
	pub fn new(
		resource_id: impl Into<Arc<str>>,
		region_id: impl Into<Arc<str>>,
		credential_id: impl Into<Arc<str>>,
	) -> Self {
		Self {
			resource_id: resource_id.into(),
			region_id: region_id.into(),
			credential_id: credential_id.into(),
		}
	}

	/// Key under which `resource` is cached for `settings`.
	pub fn for_resource<C>(resource: &C, settings: &ConnectionSettings) -> Self
	where
		C: CachedResource,
	{
		Self::new(resource.id(), settings.region_id(), settings.credential_id())
	}

	/// Resource identifier.
	pub fn resource_id(&self) -> &str {
		&self.resource_id
	}

	/// Region identifier.
	pub fn region_id(&self) -> &str {
		&self.region_id
	}

	/// Credential identifier.
	pub fn credential_id(&self) -> &str {
		&self.credential_id
	}
}
impl Display for CacheKey {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "{}@{}/{}", self.resource_id, self.region_id, self.credential_id)
	}
}
