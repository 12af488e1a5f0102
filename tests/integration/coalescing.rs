//! Concurrent callers share a single fetch per key.

// crates.io
use futures::future;
use resource_cache::{Error, FetchOptions, ManualClock, ResourceCache, Result};
// self
use crate::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_fetch() -> Result<()> {
	init_tracing();

	let cache = ResourceCache::builder().build()?;
	let resource = Counting::new("ecs.clusters").with_items(5).with_delay(Duration::from_millis(50));
	let settings = settings("us-west-2", "Cred1");
	let callers = (0..200).map(|_| {
		let cache = cache.clone();
		let resource = resource.clone();
		let settings = settings.clone();

		tokio::spawn(async move { cache.get_resource(&resource, &settings).await })
	});
	let results = future::join_all(callers).await;

	assert_eq!(resource.calls(), 1);

	for result in results {
		let value = result.expect("caller task panicked")?;

		assert_eq!(value.len(), 5);
		assert_eq!(value[0], "us-west-2:Cred1:1:0");
	}

	let status = cache.status();

	assert_eq!(status.metrics.total_requests, 200);
	assert_eq!(status.in_flight, 0);

	Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn coalesced_callers_observe_the_same_error() -> Result<()> {
	init_tracing();

	let cache = ResourceCache::builder().build()?;
	let resource = Counting::new("lambda.functions").with_delay(Duration::from_millis(50));
	let settings = settings("us-west-2", "Cred1");

	resource.fail(true);

	let results = future::join_all((0..50).map(|_| cache.get_resource(&resource, &settings))).await;
	let errors = results
		.into_iter()
		.map(|result| match result {
			Err(Error::Fetch(err)) => err,
			other => panic!("expected a fetch error, got {other:?}"),
		})
		.collect::<Vec<_>>();

	assert_eq!(resource.calls(), 1);
	assert!(errors.iter().all(|err| err.ptr_eq(&errors[0])));
	assert_eq!(cache.status().entries, 0);

	Ok(())
}

#[tokio::test]
async fn joined_callers_apply_their_own_stale_policy() -> Result<()> {
	init_tracing();

	let clock = ManualClock::new();
	let cache = ResourceCache::builder().clock(clock.clone()).build()?;
	let resource = Counting::new("s3.buckets")
		.with_expiry(Duration::from_secs(10))
		.with_delay(Duration::from_millis(20));
	let settings = settings("us-west-2", "Cred1");
	let first = cache.get_resource(&resource, &settings).await?;

	clock.advance(Duration::from_secs(30));
	resource.fail(true);

	let (lenient, strict) = tokio::join!(
		cache.get_resource(&resource, &settings),
		cache.get_resource_with(&resource, &settings, FetchOptions::default().with_use_stale(false)),
	);

	assert_eq!(lenient?, first);
	assert!(matches!(strict, Err(Error::Fetch(_))));
	assert_eq!(resource.calls(), 2);

	Ok(())
}

#[tokio::test]
async fn clear_during_fetch_discards_its_result() -> Result<()> {
	init_tracing();

	let cache = ResourceCache::builder().build()?;
	let resource = Counting::new("ec2.instances").with_delay(Duration::from_millis(50));
	let settings = settings("us-west-2", "Cred1");
	let waiter = {
		let cache = cache.clone();
		let resource = resource.clone();
		let settings = settings.clone();

		tokio::spawn(async move { cache.get_resource(&resource, &settings).await })
	};

	assert!(eventually(|| cache.status().in_flight == 1).await);

	cache.clear();

	// The caller still receives the value it was waiting for.
	assert_eq!(waiter.await.expect("waiter panicked")?.len(), 1);
	assert!(cache.get_resource_if_present(&resource, &settings).is_none());
	assert_eq!(cache.status().in_flight, 0);

	Ok(())
}
