//! Shutdown: rejection, drain and force-close.

mod common;

use std::time::Duration;

use sluice_pool::{Pool, PoolError, PoolEvent, RetireReason, ShutdownReport};

#[tokio::test]
async fn acquire_after_shutdown_fails_immediately() {
    let (connector, _state) = common::connector();
    let pool = Pool::new(connector, common::descriptor(2)).unwrap();
    pool.shutdown(Duration::from_secs(1)).await.unwrap();

    for _ in 0..3 {
        let err = pool.acquire(Duration::from_secs(30)).await.unwrap_err();
        assert!(matches!(err, PoolError::PoolClosed), "got: {err:?}");
    }
    assert!(matches!(
        pool.initialize().await.unwrap_err(),
        PoolError::PoolClosed
    ));
}

#[tokio::test]
async fn shutdown_is_idempotent() {
    let (connector, _state) = common::connector();
    let pool = Pool::new(connector, common::descriptor(1)).unwrap();

    let first = pool.shutdown(Duration::ZERO).await.unwrap();
    assert!(!first.already_closed);
    let second = pool.shutdown(Duration::ZERO).await.unwrap();
    assert_eq!(
        second,
        ShutdownReport {
            already_closed: true,
            ..ShutdownReport::default()
        }
    );
}

#[tokio::test]
async fn idle_connections_are_closed_immediately() {
    let (connector, state) = common::connector();
    let pool = Pool::new(connector, common::descriptor(2)).unwrap();
    let a = pool.acquire_default().await.unwrap();
    let b = pool.acquire_default().await.unwrap();
    pool.release(a).await.unwrap();
    pool.release(b).await.unwrap();

    let report = pool.shutdown(Duration::from_secs(1)).await.unwrap();
    assert_eq!(report.closed_idle, 2);
    assert_eq!(report.force_closed, 0);
    assert_eq!(state.closed(), 2);

    let stats = pool.stats();
    assert!(stats.closed);
    assert_eq!(stats.slots.vacant, 2);
    assert_eq!(stats.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn queued_callers_are_woken_with_pool_closed() {
    let (connector, _state) = common::connector();
    let pool = Pool::new(connector, common::descriptor(1)).unwrap();
    let held = pool.acquire_default().await.unwrap();

    let waiter = tokio::spawn({
        let pool = pool.clone();
        async move { pool.acquire(Duration::from_secs(60)).await.map(|_| ()) }
    });
    while pool.stats().waiters == 0 {
        tokio::task::yield_now().await;
    }

    let shutdown = tokio::spawn({
        let pool = pool.clone();
        async move { pool.shutdown(Duration::from_secs(1)).await }
    });

    let err = waiter.await.unwrap().unwrap_err();
    assert!(matches!(err, PoolError::PoolClosed));

    pool.release(held).await.unwrap();
    let report = shutdown.await.unwrap().unwrap();
    assert_eq!(report.woken_waiters, 1);
    assert_eq!(report.drained, 1);
    assert_eq!(report.force_closed, 0);
}

#[tokio::test(start_paused = true)]
async fn outstanding_leases_drain_before_the_deadline() {
    let (connector, state) = common::connector();
    let pool = Pool::new(connector, common::descriptor(2)).unwrap();
    let conn = pool.acquire_default().await.unwrap();

    let worker = tokio::spawn({
        let pool = pool.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            pool.release(conn).await
        }
    });

    let report = pool.shutdown(Duration::from_secs(1)).await.unwrap();
    assert_eq!(report.drained, 1);
    assert_eq!(report.force_closed, 0);
    worker.await.unwrap().expect("release during drain succeeds");

    assert_eq!(state.closed(), 1);
    assert_eq!(pool.stats().in_use(), 0);
}

#[tokio::test(start_paused = true)]
async fn leases_outstanding_at_the_deadline_are_force_closed() {
    let (connector, state) = common::connector();
    let pool = Pool::new(connector, common::descriptor(2)).unwrap();
    let mut events = pool.subscribe();
    let straggler = pool.acquire_default().await.unwrap();

    let report = pool.shutdown(Duration::from_millis(100)).await.unwrap();
    assert_eq!(report.drained, 0);
    assert_eq!(report.force_closed, 1);
    assert_eq!(state.closed(), 0, "closed once it comes back");

    pool.release(straggler).await.expect("revoked lease may still be returned");
    assert_eq!(state.closed(), 1);
    assert_eq!(pool.stats().in_use(), 0);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            PoolEvent::ShutdownStarted => seen.push("started"),
            PoolEvent::ShutdownFinished { force_closed: 1 } => seen.push("finished"),
            PoolEvent::Retired {
                reason: RetireReason::Revoked,
                ..
            } => seen.push("revoked"),
            _ => {}
        }
    }
    assert_eq!(seen, vec!["started", "finished", "revoked"]);
}

#[tokio::test]
async fn detached_connection_returned_after_shutdown_is_closed() {
    let (connector, state) = common::connector();
    let pool = Pool::new(connector, common::descriptor(1)).unwrap();
    let (lease, conn) = pool.acquire_default().await.unwrap().detach();

    let report = pool.shutdown(Duration::ZERO).await.unwrap();
    assert_eq!(report.force_closed, 1);

    pool.check_in(lease, conn).await.unwrap();
    assert_eq!(state.closed(), 1);
    assert!(matches!(
        pool.check_in(lease, common::MemConn { id: 0 }).await,
        Err(PoolError::InvalidRelease { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn revoked_connection_that_never_returns_is_counted_but_not_closed() {
    let (connector, state) = common::connector();
    let pool = Pool::new(connector, common::descriptor(2)).unwrap();
    let (_lease, kept) = pool.acquire_default().await.unwrap().detach();

    let report = pool.shutdown(Duration::from_millis(50)).await.unwrap();
    assert_eq!(report.force_closed, 1);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(state.closed(), 0, "the connector never saw the connection");
    assert_eq!(pool.stats().in_use(), 1);
    drop(kept);
}
