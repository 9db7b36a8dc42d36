//! Initialization: eager and lazy warm-up, descriptor loading.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use sluice_pool::{ConnectionDescriptor, Pool, PoolError, RetryPolicy, SlotCounts, Warmup};

#[tokio::test]
async fn eager_warmup_fills_every_slot() {
    let (connector, state) = common::connector();
    let descriptor = common::descriptor(3).with_warmup(Warmup::Eager);
    let pool = Pool::connect(connector, descriptor).await.unwrap();

    assert_eq!(state.opened(), 3);
    assert_eq!(pool.stats().idle(), 3);

    pool.initialize().await.unwrap();
    assert_eq!(state.opened(), 3, "initialize is idempotent");
}

#[tokio::test]
async fn eager_warmup_failure_closes_partial_connections() {
    let (connector, state) = common::connector();
    let descriptor = common::descriptor(3).with_warmup(Warmup::Eager);
    let pool = Pool::new(connector, descriptor).unwrap();
    state.fail_after(Some(2));

    let err = pool.initialize().await.unwrap_err();
    assert!(
        matches!(err, PoolError::Connection { attempts: 1, .. }),
        "got: {err:?}"
    );
    assert_eq!(state.opened(), 2);
    assert_eq!(state.closed(), 2);
    assert_eq!(
        pool.stats().slots,
        SlotCounts {
            vacant: 3,
            ..SlotCounts::default()
        }
    );

    state.fail_after(None);
    pool.initialize().await.expect("a later initialize may retry");
    assert_eq!(pool.stats().idle(), 3);
}

#[tokio::test(start_paused = true)]
async fn eager_warmup_retries_with_backoff() {
    let (connector, state) = common::connector();
    let descriptor = common::descriptor(1)
        .with_warmup(Warmup::Eager)
        .with_connect_retry(RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(100),
        });
    state.fail_next.store(2, Ordering::SeqCst);

    let started = tokio::time::Instant::now();
    let pool = Pool::connect(connector, descriptor).await.unwrap();
    // 100ms after the first failure, 200ms after the second.
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(pool.stats().idle(), 1);
}

#[tokio::test]
async fn lazy_warmup_opens_nothing_up_front() {
    let (connector, state) = common::connector();
    let pool = Pool::connect(connector, common::descriptor(4)).await.unwrap();
    assert_eq!(state.opened(), 0);
    assert_eq!(pool.stats().slots.vacant, 4);
}

#[tokio::test]
async fn invalid_descriptor_is_rejected_at_construction() {
    let (connector, _state) = common::connector();
    let err = Pool::new(connector, common::descriptor(0)).unwrap_err();
    assert!(matches!(err, PoolError::Configuration { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn pool_from_json_descriptor() {
    let descriptor = ConnectionDescriptor::from_json(
        r#"{
            "endpoint": "mem://replica",
            "credentials": { "username": "reader", "password": "s3cret" },
            "capacity": 2,
            "acquire_timeout_ms": 250,
            "warmup": "eager"
        }"#,
    )
    .unwrap();
    assert_eq!(descriptor.acquire_timeout, Duration::from_millis(250));

    let (connector, state) = common::connector();
    let pool = Pool::connect(connector, descriptor).await.unwrap();
    assert_eq!(state.opened(), 2);
    assert_eq!(pool.descriptor().endpoint, "mem://replica");
    assert_eq!(pool.descriptor().credentials.password(), "s3cret");
}
