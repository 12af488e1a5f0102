//! Region and credential identities that scope every cache line.

// std
use std::fmt::{self, Debug, Display, Formatter};
// crates.io
use serde::{Deserialize, Serialize};
// self
use crate::_prelude::*;

/// Shared handle to a credential provider.
pub type Credentials = Arc<dyn CredentialProvider>;

/// Credential source handed to fetch functions.
///
/// The cache only looks at [`CredentialProvider::id`]; everything else is for the fetch function.
pub trait CredentialProvider: Debug + Send + Sync {
	/// Stable identifier used in cache keys and invalidation events.
	fn id(&self) -> &str;

	/// Human readable name.
	fn display_name(&self) -> &str {
		self.id()
	}
}

/// Plain credential identity with no secret material attached.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialIdentifier {
	/// Stable identifier.
	pub id: String,
	/// Human readable name.
	pub display_name: String,
}
impl CredentialIdentifier {
	/// Create an identifier whose display name equals its id.
	pub fn new(id: impl Into<String>) -> Self {
		let id = id.into();

		Self { display_name: id.clone(), id }
	}

	/// Override the display name.
	pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
		self.display_name = display_name.into();

		self
	}

	/// Wrap into a shared [`Credentials`] handle.
	pub fn into_credentials(self) -> Credentials {
		Arc::new(self)
	}
}
impl CredentialProvider for CredentialIdentifier {
	fn id(&self) -> &str {
		&self.id
	}

	fn display_name(&self) -> &str {
		&self.display_name
	}
}

/// Cloud region a resource is fetched from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
	/// Region identifier, e.g. `us-west-2`.
	pub id: String,
	/// Human readable name.
	pub name: String,
	/// Partition the region belongs to.
	pub partition: String,
}
impl Region {
	/// Create a region.
	pub fn new(
		id: impl Into<String>,
		name: impl Into<String>,
		partition: impl Into<String>,
	) -> Self {
		Self { id: id.into(), name: name.into(), partition: partition.into() }
	}
}
impl Display for Region {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str(&self.id)
	}
}

/// Credential and region pair a resource is resolved against.
#[derive(Clone, Debug)]
pub struct ConnectionSettings {
	/// Credentials handed to the fetch function.
	pub credentials: Credentials,
	/// Region handed to the fetch function.
	pub region: Region,
}
impl ConnectionSettings {
	/// Pair credentials with a region.
	pub fn new(credentials: Credentials, region: Region) -> Self {
		Self { credentials, region }
	}

	/// Identifier of the credentials.
	pub fn credential_id(&self) -> &str {
		self.credentials.id()
	}

	/// Identifier of the region.
	pub fn region_id(&self) -> &str {
		&self.region.id
	}
}
