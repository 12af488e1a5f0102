//! Credential events purge every key fetched with the affected credential.

// crates.io
use resource_cache::{CredentialEvent, CredentialEventBus, ResourceCache, Result};
use tokio::sync::broadcast;
// self
use crate::*;

async fn populate(cache: &ResourceCache, resource: &Counting) -> Result<()> {
	for (region, credential) in
		[("us-west-2", "Cred1"), ("us-east-1", "Cred1"), ("us-west-2", "Cred2")]
	{
		cache.get_resource(resource, &settings(region, credential)).await?;
	}

	Ok(())
}

#[tokio::test]
async fn bus_events_purge_matching_credentials() -> Result<()> {
	init_tracing();

	let bus = CredentialEventBus::new();
	let cache = ResourceCache::builder().subscribe_to(&bus).build()?;
	let resource = Counting::new("ecs.clusters");

	populate(&cache, &resource).await?;
	bus.provider_added("Cred1");

	assert_eq!(cache.status().entries, 3);

	bus.provider_removed("Cred1");

	assert!(cache.get_resource_if_present(&resource, &settings("us-west-2", "Cred1")).is_none());
	assert!(cache.get_resource_if_present(&resource, &settings("us-east-1", "Cred1")).is_none());
	assert!(cache.get_resource_if_present(&resource, &settings("us-west-2", "Cred2")).is_some());

	cache.get_resource(&resource, &settings("us-west-2", "Cred1")).await?;

	assert_eq!(resource.calls(), 4);

	bus.provider_modified("Cred2");

	assert!(cache.get_resource_if_present(&resource, &settings("us-west-2", "Cred2")).is_none());
	assert_eq!(cache.status().metrics.invalidations, 3);

	Ok(())
}

#[tokio::test]
async fn invalidate_credential_reports_removed_keys() -> Result<()> {
	init_tracing();

	let cache = ResourceCache::builder().build()?;
	let resource = Counting::new("lambda.functions");

	populate(&cache, &resource).await?;

	assert_eq!(cache.invalidate_credential("Cred1"), 2);
	assert_eq!(cache.invalidate_credential("Cred1"), 0);
	assert_eq!(cache.status().entries, 1);

	Ok(())
}

#[tokio::test]
async fn broadcast_events_are_followed() -> Result<()> {
	init_tracing();

	let (sender, receiver) = broadcast::channel(16);
	let cache = ResourceCache::builder().follow(receiver).build()?;
	let resource = Counting::new("s3.buckets");

	populate(&cache, &resource).await?;
	sender.send(CredentialEvent::ProviderModified("Cred2".into())).expect("receiver is alive");

	assert!(
		eventually(|| cache
			.get_resource_if_present(&resource, &settings("us-west-2", "Cred2"))
			.is_none())
		.await
	);
	assert_eq!(cache.status().entries, 2);

	Ok(())
}

#[tokio::test]
async fn close_detaches_from_the_bus() -> Result<()> {
	init_tracing();

	let bus = CredentialEventBus::new();
	let cache = ResourceCache::builder().subscribe_to(&bus).build()?;

	assert_eq!(bus.listener_count(), 1);

	cache.close();

	assert_eq!(bus.listener_count(), 0);

	Ok(())
}

#[tokio::test]
async fn invalidation_during_fetch_discards_its_result() -> Result<()> {
	init_tracing();

	let bus = CredentialEventBus::new();
	let cache = ResourceCache::builder().subscribe_to(&bus).build()?;
	let resource = Counting::new("ecs.clusters").with_delay(Duration::from_millis(50));
	let settings = settings("us-west-2", "Cred1");
	let waiter = {
		let cache = cache.clone();
		let resource = resource.clone();
		let settings = settings.clone();

		tokio::spawn(async move { cache.get_resource(&resource, &settings).await })
	};

	assert!(eventually(|| cache.status().in_flight == 1).await);

	bus.provider_removed("Cred1");

	// The caller still receives the value it was waiting for.
	assert_eq!(waiter.await.expect("waiter panicked")?.len(), 1);
	assert!(cache.get_resource_if_present(&resource, &settings).is_none());
	assert_eq!(cache.status().entries, 0);
	assert_eq!(cache.status().metrics.invalidations, 1);
	assert_eq!(resource.calls(), 1);

	Ok(())
}
