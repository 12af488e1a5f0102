//! Expiry, stale fallback, error propagation, keying, clearing, and views.

// std
use std::{io, time::Duration};
// crates.io
use resource_cache::{
	Error, FetchOptions, FnResource, ManualClock, ResourceCache, ResourceExt, Result,
};
// self
use crate::*;

fn cache_with(clock: &Arc<ManualClock>) -> ResourceCache {
	ResourceCache::builder().clock(clock.clone()).build().expect("cache should build")
}

#[tokio::test]
async fn serves_cached_value_until_expiry() -> Result<()> {
	init_tracing();

	let clock = ManualClock::new();
	let cache = cache_with(&clock);
	let resource = Counting::new("ecs.clusters").with_expiry(Duration::from_secs(10));
	let settings = settings("us-west-2", "Cred1");
	let first = cache.get_resource(&resource, &settings).await?;

	assert_eq!(first, vec!["us-west-2:Cred1:1:0".to_string()]);

	clock.advance(Duration::from_millis(9_999));

	assert_eq!(cache.get_resource(&resource, &settings).await?, first);
	assert_eq!(resource.calls(), 1);

	clock.advance(Duration::from_millis(1));

	assert_eq!(cache.get_resource(&resource, &settings).await?, vec![
		"us-west-2:Cred1:2:0".to_string()
	]);
	assert_eq!(resource.calls(), 2);

	Ok(())
}

#[tokio::test]
async fn failed_refresh_serves_stale_value_without_extending_it() -> Result<()> {
	init_tracing();

	let clock = ManualClock::new();
	let cache = cache_with(&clock);
	let resource = Counting::new("lambda.functions").with_expiry(Duration::from_secs(10));
	let settings = settings("us-west-2", "Cred1");
	let first = cache.get_resource(&resource, &settings).await?;

	clock.advance(Duration::from_secs(11));
	resource.fail(true);

	assert_eq!(cache.get_resource(&resource, &settings).await?, first);
	assert_eq!(cache.get_resource(&resource, &settings).await?, first);
	// Each lookup retried because the stale entry kept its original expiry.
	assert_eq!(resource.calls(), 3);

	let err = cache
		.get_resource_with(&resource, &settings, FetchOptions::default().with_use_stale(false))
		.await
		.unwrap_err();

	assert_eq!(err.to_string(), "fetch 4 failed");
	assert_eq!(cache.status().metrics.stale_serves, 2);

	Ok(())
}

#[tokio::test]
async fn first_fetch_error_propagates_and_stores_nothing() -> Result<()> {
	init_tracing();

	let cache = ResourceCache::builder().build()?;
	let resource = Counting::new("s3.buckets");
	let settings = settings("us-east-1", "Cred1");

	resource.fail(true);

	let err = cache.get_resource(&resource, &settings).await.unwrap_err();
	let fetch = err.as_fetch().expect("fetch failure");

	assert_eq!(
		fetch.downcast_ref::<io::Error>().map(|err| err.to_string()),
		Some("fetch 1 failed".to_string())
	);
	assert!(cache.get_resource_if_present(&resource, &settings).is_none());
	assert_eq!(cache.status().entries, 0);

	resource.fail(false);

	assert_eq!(cache.get_resource(&resource, &settings).await?, vec![
		"us-east-1:Cred1:2:0".to_string()
	]);

	Ok(())
}

#[tokio::test]
async fn panicking_fetch_fails_without_wedging_the_key() -> Result<()> {
	init_tracing();

	let cache = ResourceCache::builder().build()?;
	let attempts = Arc::new(AtomicUsize::new(0));
	let counter = attempts.clone();
	let resource = FnResource::new("flaky.panics", move |_, _| {
		let attempt = counter.fetch_add(1, Ordering::SeqCst);

		async move {
			assert!(attempt > 0, "first fetch panics");

			Ok(attempt as u32)
		}
	});
	let settings = settings("us-west-2", "Cred1");

	assert!(matches!(cache.get_resource(&resource, &settings).await, Err(Error::Fetch(_))));
	assert_eq!(cache.status().in_flight, 0);
	assert_eq!(cache.get_resource(&resource, &settings).await?, 1);

	Ok(())
}

#[tokio::test]
async fn keys_separate_resource_region_and_credential() -> Result<()> {
	init_tracing();

	let cache = ResourceCache::builder().build()?;
	let clusters = Counting::new("ecs.clusters");
	let functions = Counting::new("lambda.functions");
	let west = settings("us-west-2", "Cred1");
	let east = settings("us-east-1", "Cred1");
	let other = settings("us-west-2", "Cred2");

	for _ in 0..2 {
		cache.get_resource(&clusters, &west).await?;
		cache.get_resource(&clusters, &east).await?;
		cache.get_resource(&clusters, &other).await?;
		cache.get_resource(&functions, &west).await?;
	}

	assert_eq!(clusters.calls(), 3);
	assert_eq!(functions.calls(), 1);

	// Identity is the id string, not the descriptor instance.
	let twin = Counting::new("ecs.clusters");

	assert_eq!(cache.get_resource(&twin, &west).await?, vec!["us-west-2:Cred1:1:0".to_string()]);
	assert_eq!(twin.calls(), 0);
	assert_eq!(cache.status().entries, 4);

	Ok(())
}

#[tokio::test]
async fn force_fetch_bypasses_fresh_entries() -> Result<()> {
	init_tracing();

	let cache = ResourceCache::builder().build()?;
	let resource = Counting::new("ec2.instances");
	let settings = settings("us-west-2", "Cred1");
	let forced = FetchOptions::default().with_force_fetch(true);

	cache.get_resource(&resource, &settings).await?;

	let refreshed = cache.get_resource_with(&resource, &settings, forced).await?;

	assert_eq!(refreshed, vec!["us-west-2:Cred1:2:0".to_string()]);

	resource.fail(true);

	assert_eq!(cache.get_resource_with(&resource, &settings, forced).await?, refreshed);
	assert!(matches!(
		cache.get_resource_with(&resource, &settings, forced.with_use_stale(false)).await,
		Err(Error::Fetch(_))
	));
	assert_eq!(resource.calls(), 4);
	assert_eq!(cache.get_resource(&resource, &settings).await?, refreshed);

	Ok(())
}

#[tokio::test]
async fn clear_drops_one_key_or_everything() -> Result<()> {
	init_tracing();

	let cache = ResourceCache::builder().build()?;
	let clusters = Counting::new("ecs.clusters");
	let functions = Counting::new("lambda.functions");
	let settings = settings("us-west-2", "Cred1");

	cache.get_resource(&clusters, &settings).await?;
	cache.get_resource(&functions, &settings).await?;

	assert!(cache.clear_resource(&clusters, &settings));
	assert!(!cache.clear_resource(&clusters, &settings));

	cache.get_resource(&clusters, &settings).await?;
	cache.get_resource(&functions, &settings).await?;

	assert_eq!((clusters.calls(), functions.calls()), (2, 1));

	cache.clear();
	cache.clear();

	assert_eq!(cache.status().entries, 0);

	cache.get_resource(&clusters, &settings).await?;
	cache.get_resource(&functions, &settings).await?;

	assert_eq!((clusters.calls(), functions.calls()), (3, 2));

	Ok(())
}

#[tokio::test]
async fn views_share_and_clear_the_underlying_entry() -> Result<()> {
	init_tracing();

	let cache = ResourceCache::builder().build()?;
	let base = Counting::new("ecs.services").with_items(3);
	let odd = base.clone().filter(|item: &String| !item.ends_with(":1"));
	let lengths = base.clone().map(|item: String| item.len());
	let second = base.clone().find(|item: &String| item.ends_with(":1"));
	let settings = settings("us-west-2", "Cred1");

	assert_eq!(cache.get_resource(&odd, &settings).await?, vec![
		"us-west-2:Cred1:1:0".to_string(),
		"us-west-2:Cred1:1:2".to_string(),
	]);
	assert_eq!(cache.get_resource(&lengths, &settings).await?, vec![19, 19, 19]);
	assert_eq!(cache.get_resource(&second, &settings).await?, Some("us-west-2:Cred1:1:1".into()));
	assert_eq!(base.calls(), 1);
	assert_eq!(cache.status().entries, 1);

	assert!(cache.clear_resource(&lengths.clone().view(|lengths| lengths.len()), &settings));
	assert_eq!(cache.get_resource(&lengths, &settings).await?.len(), 3);
	assert_eq!(cache.get_resource(&odd, &settings).await?.len(), 2);
	assert_eq!(base.calls(), 2);

	Ok(())
}

#[tokio::test]
async fn if_present_never_fetches() -> Result<()> {
	init_tracing();

	let clock = ManualClock::new();
	let cache = cache_with(&clock);
	let resource = Counting::new("iam.roles").with_expiry(Duration::from_secs(10));
	let settings = settings("us-west-2", "Cred1");

	assert!(cache.get_resource_if_present(&resource, &settings).is_none());
	assert_eq!(resource.calls(), 0);

	let value = cache.get_resource(&resource, &settings).await?;

	assert_eq!(cache.get_resource_if_present(&resource, &settings), Some(value.clone()));

	clock.advance(Duration::from_secs(10));

	assert_eq!(cache.get_resource_if_present(&resource, &settings), Some(value));
	assert!(cache.get_resource_if_present_with(&resource, &settings, false).is_none());
	assert_eq!(resource.calls(), 1);

	Ok(())
}

#[tokio::test]
async fn closed_cache_rejects_callers() -> Result<()> {
	init_tracing();

	let cache = ResourceCache::builder().build()?;
	let resource = Counting::new("ecs.clusters");
	let settings = settings("us-west-2", "Cred1");

	cache.get_resource(&resource, &settings).await?;
	cache.close();
	cache.close();

	assert!(matches!(cache.get_resource(&resource, &settings).await, Err(Error::Closed)));
	assert!(cache.get_resource_if_present(&resource, &settings).is_none());
	assert_eq!(resource.calls(), 1);

	Ok(())
}
