//! Maintenance tests
//!
//! The background resizer (idle reaping, steady top-up, leak detection) and
//! in-place shrinking, all on paused time.

use std::sync::Arc;
use std::time::Duration;

use poolmux_core::{EventBus, PoolConfiguration, PoolEvent, PoolIdentity};
use poolmux_runtime::PhysicalPool;
use tests::{settle, MockConnectionFactory};

const RESIZER_PERIOD: Duration = Duration::from_secs(1);

fn pool_with_resizer(
    config: PoolConfiguration,
) -> (Arc<PhysicalPool>, Arc<MockConnectionFactory>, EventBus) {
    tests::init_test_tracing();
    let factory = Arc::new(MockConnectionFactory::new());
    let bus = EventBus::new();
    let pool = PhysicalPool::new(
        PoolIdentity::new("orders"),
        config,
        factory.clone(),
        bus.sender(),
        Some(RESIZER_PERIOD),
    );
    (pool, factory, bus)
}

#[tokio::test(start_paused = true)]
async fn test_resizer_reaps_idle_connections_down_to_steady() {
    let config = PoolConfiguration {
        idle_timeout: Duration::from_secs(2),
        ..PoolConfiguration::sized(1, 4)
    };
    let (pool, factory, _bus) = pool_with_resizer(config);

    let mut leases = vec![
        pool.acquire(Duration::from_secs(1)).await.unwrap(),
        pool.acquire(Duration::from_secs(1)).await.unwrap(),
    ];
    settle(|| pool.snapshot().free == 1).await;
    leases.push(pool.acquire(Duration::from_secs(1)).await.unwrap());
    assert_eq!(pool.snapshot().size, 3);
    drop(leases);

    tokio::time::sleep(Duration::from_secs(10)).await;

    let snapshot = pool.snapshot();
    assert_eq!(snapshot.size, 1);
    assert_eq!(snapshot.free, 1);
    assert_eq!(factory.destroyed(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_resizer_tops_up_to_steady_after_flush() {
    let (pool, factory, _bus) = pool_with_resizer(PoolConfiguration::sized(2, 4));

    pool.acquire(Duration::from_secs(1)).await.unwrap().release();
    settle(|| pool.snapshot().free == 2).await;

    assert_eq!(pool.flush(), 2);
    assert_eq!(pool.snapshot().size, 0);

    tokio::time::sleep(RESIZER_PERIOD + Duration::from_millis(500)).await;

    let snapshot = pool.snapshot();
    assert_eq!(snapshot.size, 2);
    assert_eq!(snapshot.free, 2);
    assert_eq!(factory.created(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_resizer_reports_each_leak_once() {
    let config = PoolConfiguration {
        leak_timeout: Duration::from_secs(3),
        ..PoolConfiguration::sized(0, 2)
    };
    let (pool, _factory, bus) = pool_with_resizer(config);
    let mut events = bus.subscribe();

    let held = pool.acquire(Duration::from_secs(1)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    let leaks: Vec<_> = events
        .drain()
        .into_iter()
        .filter(|event| matches!(event, PoolEvent::ConnectionLeakSuspected { .. }))
        .collect();
    assert_eq!(leaks.len(), 1);
    match &leaks[0] {
        PoolEvent::ConnectionLeakSuspected {
            connection_id,
            held_ms,
            ..
        } => {
            assert_eq!(*connection_id, held.id());
            assert!(*held_ms >= 3_000);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_lower_maximum_destroys_surplus_free_connections() {
    let config = PoolConfiguration {
        resize_quantity: 1,
        ..PoolConfiguration::sized(0, 4)
    };
    let (pool, factory, _bus) = pool_with_resizer(config.clone());

    let leases = vec![
        pool.acquire(Duration::from_secs(1)).await.unwrap(),
        pool.acquire(Duration::from_secs(1)).await.unwrap(),
        pool.acquire(Duration::from_secs(1)).await.unwrap(),
    ];
    drop(leases);
    assert_eq!(pool.snapshot().free, 3);

    let destroyed = pool.reconfigure_in_place(PoolConfiguration {
        max_pool_size: 1,
        ..config
    });

    assert_eq!(destroyed, 2);
    assert_eq!(factory.destroyed(), 2);
    let snapshot = pool.snapshot();
    assert_eq!(snapshot.size, 1);
    assert_eq!(snapshot.max_pool_size, 1);
}
