//! PoolHost tests
//!
//! Per-kind soft attribute policy, deployer overrides and reconciliation.

use std::sync::Arc;
use std::time::Duration;

use poolmux_core::{AttributeSet, PoolAttribute, PoolIdentity, ResourceRecord};
use poolmux_runtime::{PoolHost, PoolResourceDeployer, RedeployOutcome, ResourceDeployer};
use pretty_assertions::assert_eq;
use tests::events::type_names;
use tests::fixtures::runtime_config;
use tests::MockFactoryProvider;

fn host() -> (PoolHost, Arc<MockFactoryProvider>) {
    tests::init_test_tracing();
    let provider = Arc::new(MockFactoryProvider::new());
    (PoolHost::new(runtime_config(), provider.clone()), provider)
}

// ============================================================================
// Soft attribute policy per kind
// ============================================================================

#[tokio::test]
async fn test_statement_cache_is_soft_for_jdbc_but_structural_for_connectors() {
    let (host, _provider) = host();
    let jdbc = ResourceRecord::jdbc("orders")
        .sized(0, 4)
        .with_property("statement-cache-size", "8");
    let connector = ResourceRecord::connector("billing")
        .sized(0, 4)
        .with_property("statement-cache-size", "8");
    host.deploy(&jdbc).await.unwrap();
    host.deploy(&connector).await.unwrap();

    let jdbc_outcome = host
        .redeploy(&jdbc.with_property("statement-cache-size", "32"))
        .await
        .unwrap();
    let connector_outcome = host
        .redeploy(&connector.with_property("statement-cache-size", "32"))
        .await
        .unwrap();

    match jdbc_outcome {
        RedeployOutcome::SoftUpdated { changed } => {
            assert_eq!(changed, vec![PoolAttribute::StatementCacheSize])
        }
        other => panic!("expected a soft update, got {other:?}"),
    }
    assert!(matches!(
        connector_outcome,
        RedeployOutcome::Recreated { version: 1 }
    ));
}

#[tokio::test]
async fn test_registered_deployer_overrides_soft_set() {
    let (mut host, provider) = host();
    let soft = AttributeSet::soft_defaults().with(PoolAttribute::MaxPoolSize);
    let deployer = PoolResourceDeployer::jdbc(host.coordinator().clone(), provider.clone())
        .with_soft_attributes(soft.clone());
    assert_eq!(deployer.soft_attributes(), &soft);
    host.register_deployer(Arc::new(deployer));

    let record = ResourceRecord::jdbc("orders").sized(0, 2);
    host.deploy(&record).await.unwrap();
    let outcome = host.redeploy(&record.clone().sized(0, 6)).await.unwrap();

    assert!(matches!(outcome, RedeployOutcome::SoftUpdated { .. }));
    assert_eq!(provider.build_count(), 1);
    assert_eq!(host.status(&record.identity()).unwrap().max_pool_size, 6);
}

// ============================================================================
// Reconciliation
// ============================================================================

#[tokio::test]
async fn test_reconcile_converges_on_listed_records() {
    let (host, _provider) = host();
    let mut events = host.subscribe();
    let orders = ResourceRecord::jdbc("orders").sized(0, 4);
    let billing = ResourceRecord::connector("billing").sized(0, 2);
    let audit = ResourceRecord::jdbc("audit").sized(0, 2);

    let first = host
        .reconcile(&[orders.clone(), billing.clone(), audit.clone()])
        .await;
    assert!(first.is_clean());
    assert_eq!(first.deployed.len(), 3);

    let second = host
        .reconcile(&[orders.clone().sized(0, 8), billing.clone()])
        .await;
    assert!(second.is_clean());
    assert_eq!(second.redeployed, vec![PoolIdentity::new("orders")]);
    assert_eq!(second.unchanged, vec![PoolIdentity::new("billing")]);
    assert_eq!(second.undeployed, vec![PoolIdentity::new("audit")]);

    let statuses = host.statuses();
    assert_eq!(statuses.len(), 2);
    assert_eq!(host.status(&orders.identity()).unwrap().version, 1);

    let names = type_names(&events.drain());
    assert_eq!(names.iter().filter(|n| **n == "pool_deployed").count(), 3);
    assert_eq!(names.iter().filter(|n| **n == "pool_swapped").count(), 1);
    assert_eq!(names.iter().filter(|n| **n == "pool_undeployed").count(), 1);
}

#[tokio::test]
async fn test_reconcile_reports_failures_and_continues() {
    let (host, provider) = host();
    let orders = ResourceRecord::jdbc("orders").sized(0, 4);
    host.deploy(&orders).await.unwrap();
    provider.fail_builds(true);

    let report = host
        .reconcile(&[
            orders.clone().sized(0, 8),
            ResourceRecord::jdbc("broken").sized(4, 2),
        ])
        .await;

    assert!(!report.is_clean());
    assert_eq!(report.failed.len(), 2);
    assert_eq!(host.status(&orders.identity()).unwrap().version, 0);
    assert!(host.lookup("broken").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_reconcile_does_not_wait_for_drains() {
    let (host, _provider) = host();
    let record = ResourceRecord::jdbc("orders")
        .sized(0, 1)
        .with_property("dynamic-reconfiguration-wait-timeout-in-seconds", "30");
    let proxy = host.deploy(&record).await.unwrap();
    let _held = proxy.acquire(Duration::from_secs(1)).await.unwrap();

    let started = tokio::time::Instant::now();
    let report = host.reconcile(&[record.clone().sized(0, 2)]).await;

    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(report.redeployed, vec![record.identity()]);
    assert_eq!(host.status(&record.identity()).unwrap().version, 0);
    assert!(host.status(&record.identity()).unwrap().blocked);
}

#[tokio::test]
async fn test_shutdown_leaves_nothing_bound() {
    let (host, _provider) = host();
    host.deploy(&ResourceRecord::jdbc("orders").sized(0, 2))
        .await
        .unwrap();
    host.deploy(&ResourceRecord::connector("billing").sized(0, 2))
        .await
        .unwrap();

    assert_eq!(host.shutdown().await, 2);
    assert!(host.lookup("orders").is_none());
    assert!(host.lookup("billing").is_none());
    assert!(host.statuses().is_empty());
}
