//! Deploy / undeploy lifecycle tests

use std::time::Duration;

use poolmux_core::{LifecycleState, PoolError, PoolEvent, PoolIdentity};
use poolmux_runtime::NamingService;
use tests::fixtures::small_pool;
use tests::{settle, CoordinatorTestHarness};

fn orders() -> PoolIdentity {
    PoolIdentity::new("orders")
}

// ============================================================================
// Deploy
// ============================================================================

#[tokio::test]
async fn test_deploy_binds_scoped_proxy_at_version_zero() {
    let harness = CoordinatorTestHarness::new();
    let mut events = harness.subscribe();
    let identity = PoolIdentity::new("orders").with_application("shop");

    harness
        .coordinator
        .deploy(identity.clone(), small_pool(4), harness.provider.as_ref())
        .await
        .unwrap();

    let proxy = harness.naming.lookup("shop/orders").expect("bound under scoped name");
    assert_eq!(proxy.identity(), &identity);
    assert_eq!(proxy.version().unwrap(), 0);
    assert_eq!(harness.coordinator.state(&identity), LifecycleState::Deployed);
    assert_eq!(
        events.try_recv(),
        Some(PoolEvent::PoolDeployed {
            identity,
            version: 0,
            dynamic_reconfiguration: false,
        })
    );
}

#[tokio::test]
async fn test_failed_deploy_publishes_nothing() {
    let harness = CoordinatorTestHarness::new();
    harness.provider.fail_builds(true);

    let err = harness
        .coordinator
        .deploy(orders(), small_pool(4), harness.provider.as_ref())
        .await
        .unwrap_err();

    assert!(matches!(err, PoolError::DeployFailed { .. }));
    assert!(!harness.coordinator.registry().contains(&orders()));
    assert!(harness.lookup("orders").is_none());
    assert_eq!(harness.coordinator.state(&orders()), LifecycleState::Undeployed);
}

#[tokio::test]
async fn test_status_reflects_current_generation() {
    let harness = CoordinatorTestHarness::new();
    let proxy = harness.deploy("orders", small_pool(4)).await;
    let _lease = proxy.acquire(Duration::from_secs(1)).await.unwrap();

    let status = harness.coordinator.status(&orders()).unwrap();
    assert_eq!(status.version, 0);
    assert_eq!(status.used, 1);
    assert_eq!(status.size, 2);
    assert_eq!(status.max_pool_size, 4);
    assert!(!status.dynamic_reconfiguration);

    settle(|| harness.coordinator.status(&orders()).unwrap().free == 1).await;
    assert_eq!(harness.coordinator.flush(&orders()).unwrap(), 1);
    assert_eq!(harness.coordinator.status(&orders()).unwrap().free, 0);
}

// ============================================================================
// Undeploy
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_undeploy_rejects_parked_callers() {
    let harness = CoordinatorTestHarness::new();
    let proxy = harness.deploy("orders", small_pool(1)).await;
    let _held = proxy.acquire(Duration::from_secs(1)).await.unwrap();

    let waiters: Vec<_> = (0..2)
        .map(|_| {
            let proxy = proxy.clone();
            tokio::spawn(async move { proxy.acquire(Duration::from_secs(30)).await })
        })
        .collect();
    settle(|| {
        harness
            .coordinator
            .status(&orders())
            .map(|status| status.wait_queue_length == 2)
            .unwrap_or(false)
    })
    .await;

    let report = harness.coordinator.undeploy(&orders()).await.unwrap();
    assert_eq!(report.rejected_waiters, 2);
    assert_eq!(report.version, 0);

    for waiter in waiters {
        assert!(matches!(
            waiter.await.unwrap(),
            Err(PoolError::PoolUndeployed(_))
        ));
    }
    assert!(harness.lookup("orders").is_none());
    assert_eq!(harness.coordinator.state(&orders()), LifecycleState::Undeployed);
}

#[tokio::test]
async fn test_operations_on_unknown_identity_fail() {
    let harness = CoordinatorTestHarness::new();

    assert!(matches!(
        harness.coordinator.undeploy(&orders()).await,
        Err(PoolError::NotDeployed(_))
    ));
    assert!(matches!(
        harness.redeploy("orders", small_pool(2)).await,
        Err(PoolError::NotDeployed(_))
    ));
    assert!(matches!(
        harness.coordinator.status(&orders()),
        Err(PoolError::NotDeployed(_))
    ));
}

#[tokio::test]
async fn test_redeploy_after_undeploy_is_rejected_but_deploy_works() {
    let harness = CoordinatorTestHarness::new();
    harness.deploy("orders", small_pool(2)).await;
    harness.coordinator.undeploy(&orders()).await.unwrap();

    assert!(matches!(
        harness.redeploy("orders", small_pool(4)).await,
        Err(PoolError::NotDeployed(_))
    ));

    let proxy = harness.deploy("orders", small_pool(4)).await;
    assert_eq!(proxy.version().unwrap(), 0);
}

#[tokio::test]
async fn test_shutdown_undeploys_every_identity() {
    let harness = CoordinatorTestHarness::new();
    harness.deploy("orders", small_pool(2)).await;
    harness.deploy("billing", small_pool(2)).await;
    harness.deploy("audit", small_pool(2)).await;

    assert_eq!(harness.coordinator.shutdown().await, 3);
    assert!(harness.coordinator.registry().is_empty());
    assert!(harness.naming.names().is_empty());
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_observe_a_missing_pool_during_swaps() {
    let harness = CoordinatorTestHarness::new();
    let proxy = harness.deploy("orders", small_pool(4)).await;

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let proxy = proxy.clone();
            tokio::spawn(async move {
                let mut last_version = 0;
                for _ in 0..200 {
                    let version = proxy.version().expect("always deployed");
                    assert!(version >= last_version);
                    last_version = version;

                    let connection = proxy
                        .acquire(Duration::from_secs(5))
                        .await
                        .expect("acquire during swaps");
                    drop(connection);
                    tokio::task::yield_now().await;
                }
                last_version
            })
        })
        .collect();

    for max in [6, 3, 8, 2, 5] {
        harness.redeploy("orders", small_pool(max)).await.unwrap();
        tokio::task::yield_now().await;
    }

    for last_version in futures::future::join_all(readers).await {
        assert!(last_version.unwrap() <= 5);
    }
    assert_eq!(harness.version("orders"), Some(5));
}
