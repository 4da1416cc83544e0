//! Drain-and-swap tests
//!
//! A structural redeploy with a reconfiguration timeout blocks the old
//! generation, waits for it to go quiet (bounded by the timeout) and then
//! publishes the new one. Parked callers end up on the new generation.

use std::time::Duration;

use poolmux_core::{LifecycleState, PoolError, PoolEvent, PoolIdentity};
use poolmux_runtime::RedeployOutcome;
use tests::events::type_names;
use tests::fixtures::{draining_pool, small_pool};
use tests::{settle, CoordinatorTestHarness};
use tokio::time::Instant;

const WAIT: Duration = Duration::from_secs(5);

fn orders() -> PoolIdentity {
    PoolIdentity::new("orders")
}

// ============================================================================
// Saturated drain
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_saturated_drain_swaps_at_timeout_and_serves_parked_callers() {
    let harness = CoordinatorTestHarness::new();
    let proxy = harness.deploy("orders", draining_pool(2, WAIT)).await;
    let held = vec![
        proxy.acquire(Duration::from_secs(1)).await.unwrap(),
        proxy.acquire(Duration::from_secs(1)).await.unwrap(),
    ];

    let old = harness.coordinator.registry().current(&orders()).unwrap();
    let old_factory = harness.factory("orders");

    let started = Instant::now();
    let handle = match harness.redeploy("orders", draining_pool(4, WAIT)).await.unwrap() {
        RedeployOutcome::Draining(handle) => handle,
        other => panic!("expected a drain, got {other:?}"),
    };
    assert_eq!(harness.coordinator.state(&orders()), LifecycleState::Draining);

    let callers: Vec<_> = (0..3)
        .map(|_| {
            let proxy = proxy.clone();
            tokio::spawn(async move { proxy.acquire(Duration::from_secs(30)).await })
        })
        .collect();
    settle(|| {
        harness
            .coordinator
            .status(&orders())
            .map(|status| status.reconfig_wait_queue_length == 3)
            .unwrap_or(false)
    })
    .await;
    assert!(harness.coordinator.status(&orders()).unwrap().blocked);

    let report = handle.completed().await.expect("drain report");
    let waited = started.elapsed();
    assert!(!report.drained_cleanly);
    assert_eq!(report.version, 1);
    assert!(waited >= WAIT);
    assert!(waited <= WAIT + Duration::from_millis(100));

    let fresh = harness.coordinator.registry().current(&orders()).unwrap();
    let mut served = Vec::new();
    for caller in callers {
        served.push(caller.await.unwrap().expect("served by the new generation"));
    }
    assert!(served.iter().all(|connection| connection.pool_id() == fresh.id()));
    assert_eq!(fresh.snapshot().used, 3);
    assert_eq!(harness.coordinator.state(&orders()), LifecycleState::Deployed);

    // Leases of the retired generation are destroyed on return.
    drop(held);
    assert_eq!(old_factory.destroyed(), 2);
    assert_eq!(old.snapshot().size, 0);
}

#[tokio::test(start_paused = true)]
async fn test_drain_completes_early_once_leases_return() {
    let harness = CoordinatorTestHarness::new();
    let mut events = harness.subscribe();
    let proxy = harness.deploy("orders", draining_pool(1, WAIT)).await;
    let held = proxy.acquire(Duration::from_secs(1)).await.unwrap();

    let started = Instant::now();
    let outcome = harness.redeploy("orders", draining_pool(2, WAIT)).await.unwrap();
    let RedeployOutcome::Draining(handle) = outcome else {
        panic!("expected a drain");
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    drop(held);

    let report = handle.completed().await.expect("drain report");
    assert!(report.drained_cleanly);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(harness.version("orders"), Some(1));

    assert_eq!(
        type_names(&events.drain()),
        vec!["pool_deployed", "drain_started", "pool_swapped"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_idle_pool_swaps_without_draining() {
    let harness = CoordinatorTestHarness::new();
    let mut events = harness.subscribe();
    harness.deploy("orders", draining_pool(2, WAIT)).await;

    let outcome = harness.redeploy("orders", draining_pool(4, WAIT)).await.unwrap();
    assert!(matches!(outcome, RedeployOutcome::Recreated { version: 1 }));

    let swapped = events
        .drain()
        .into_iter()
        .find(|event| matches!(event, PoolEvent::PoolSwapped { .. }));
    assert!(matches!(
        swapped,
        Some(PoolEvent::PoolSwapped {
            version: 1,
            drained_cleanly: true,
            drain_id: None,
            ..
        })
    ));
}

// ============================================================================
// Serialization with other administrative operations
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_undeploy_waits_for_running_drain() {
    let harness = CoordinatorTestHarness::new();
    let proxy = harness.deploy("orders", draining_pool(1, WAIT)).await;
    let _held = proxy.acquire(Duration::from_secs(1)).await.unwrap();
    let mut events = harness.subscribe();

    let started = Instant::now();
    let outcome = harness.redeploy("orders", draining_pool(2, WAIT)).await.unwrap();
    assert!(matches!(outcome, RedeployOutcome::Draining(_)));

    let report = harness.coordinator.undeploy(&orders()).await.unwrap();
    assert!(started.elapsed() >= WAIT);
    assert_eq!(report.version, 1);

    assert_eq!(
        type_names(&events.drain()),
        vec!["drain_started", "pool_swapped", "pool_undeployed"]
    );
    assert!(matches!(
        proxy.get_connection().await,
        Err(PoolError::PoolUndeployed(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_drain_on_one_identity_does_not_block_another() {
    let harness = CoordinatorTestHarness::new();
    let orders = harness.deploy("orders", draining_pool(1, Duration::from_secs(60))).await;
    harness.deploy("billing", small_pool(1)).await;
    let _held = orders.acquire(Duration::from_secs(1)).await.unwrap();

    let outcome = harness
        .redeploy("orders", draining_pool(2, Duration::from_secs(60)))
        .await
        .unwrap();
    assert!(matches!(outcome, RedeployOutcome::Draining(_)));

    let started = Instant::now();
    let outcome = harness.redeploy("billing", small_pool(3)).await.unwrap();
    assert!(matches!(outcome, RedeployOutcome::Recreated { version: 1 }));
    assert_eq!(started.elapsed(), Duration::ZERO);

    let billing = harness.lookup("billing").unwrap();
    assert!(billing.acquire(Duration::from_secs(1)).await.is_ok());
    assert_eq!(
        harness.coordinator.state(&PoolIdentity::new("orders")),
        LifecycleState::Draining
    );
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_acquire_does_not_hold_up_the_swap() {
    let harness = CoordinatorTestHarness::new();
    let proxy = harness.deploy("orders", draining_pool(1, WAIT)).await;
    harness
        .factory("orders")
        .set_create_delay(Duration::from_secs(10));

    let abandoned =
        tokio::time::timeout(Duration::from_secs(1), proxy.acquire(Duration::from_secs(60))).await;
    assert!(abandoned.is_err());
    assert!(harness.coordinator.registry().current(&orders()).unwrap().is_quiescent());

    let started = Instant::now();
    let outcome = harness.redeploy("orders", draining_pool(2, WAIT)).await.unwrap();
    assert!(matches!(outcome, RedeployOutcome::Recreated { version: 1 }));
    assert_eq!(started.elapsed(), Duration::ZERO);
}
