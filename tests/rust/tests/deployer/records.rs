//! Resource record tests
//!
//! Records parsed from the pools file, validated and routed to the deployer
//! for their kind.

use std::sync::Arc;
use std::time::Duration;

use poolmux_core::{
    PoolError, PoolIdentity, PoolsFile, ResourceKind, ResourceRecord, DYNAMIC_RECONFIG_PROPERTY,
};
use poolmux_runtime::{DeployerRegistry, PoolHost};
use pretty_assertions::assert_eq;
use tests::fixtures::{pools_json, runtime_config};
use tests::MockFactoryProvider;

fn host() -> (PoolHost, Arc<MockFactoryProvider>) {
    tests::init_test_tracing();
    let provider = Arc::new(MockFactoryProvider::new());
    (PoolHost::new(runtime_config(), provider.clone()), provider)
}

#[test]
fn test_pools_file_parses_kinds_scopes_and_properties() {
    let file = PoolsFile::from_json(pools_json()).unwrap();
    assert_eq!(file.pools.len(), 2);

    let orders = &file.pools[0];
    assert_eq!(orders.kind, ResourceKind::JdbcConnectionPool);
    assert_eq!(
        orders.identity(),
        PoolIdentity::new("orders").with_application("shop")
    );
    let config = orders.to_configuration().unwrap();
    assert_eq!(config.max_wait, Duration::from_millis(2000));
    assert_eq!(config.statements.cache_size, 16);
    assert_eq!(
        config.factory_properties.get("address").map(String::as_str),
        Some("db.internal:5432")
    );
    assert!(!config.dynamic_reconfig_enabled());

    let billing = file.pools[1].to_configuration().unwrap();
    assert_eq!(file.pools[1].kind, ResourceKind::ConnectorConnectionPool);
    assert_eq!(billing.reconfig.wait_timeout, Duration::from_secs(30));
}

#[test]
fn test_pools_file_loads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pools.json");
    std::fs::write(&path, pools_json()).unwrap();

    let file = PoolsFile::load(&path).unwrap();
    assert_eq!(file.pools.len(), 2);

    assert!(PoolsFile::load(dir.path().join("missing.json")).is_err());
}

#[test]
fn test_empty_registry_supports_no_kind() {
    let registry = DeployerRegistry::new();
    let err = registry
        .for_record(&ResourceRecord::jdbc("orders"))
        .err()
        .expect("no deployer registered");
    assert_eq!(
        err,
        PoolError::UnsupportedResource("jdbc-connection-pool".to_string())
    );
}

#[tokio::test]
async fn test_host_deploys_and_binds_scoped_name() {
    let (host, provider) = host();
    let file = PoolsFile::from_json(pools_json()).unwrap();

    for record in &file.pools {
        host.deploy(record).await.unwrap();
    }

    let proxy = host.lookup("shop/orders").expect("bound under application scope");
    assert!(proxy.acquire(Duration::from_secs(1)).await.is_ok());
    assert!(host.lookup("billing").is_some());
    assert_eq!(provider.build_count(), 2);

    let billing = host.status(&PoolIdentity::new("billing")).unwrap();
    assert!(billing.dynamic_reconfiguration);
    assert_eq!(billing.max_pool_size, 2);
}

#[tokio::test]
async fn test_unparseable_reconfig_timeout_leaves_dynamic_reconfig_off() {
    let (host, _provider) = host();
    let record = ResourceRecord::jdbc("orders")
        .sized(0, 4)
        .with_property(DYNAMIC_RECONFIG_PROPERTY, "soon");

    host.deploy(&record).await.unwrap();

    let status = host.status(&record.identity()).unwrap();
    assert!(!status.dynamic_reconfiguration);
}

#[tokio::test]
async fn test_invalid_record_is_rejected_before_building() {
    let (host, provider) = host();

    let oversized = ResourceRecord::jdbc("orders").sized(10, 2);
    assert!(matches!(
        host.deploy(&oversized).await,
        Err(PoolError::InvalidConfiguration { .. })
    ));

    let bad_flag = ResourceRecord::jdbc("orders")
        .sized(0, 2)
        .with_property("statement-wrapping", "sometimes");
    assert!(matches!(
        host.deploy(&bad_flag).await,
        Err(PoolError::InvalidConfiguration { .. })
    ));

    let unnamed = ResourceRecord::jdbc("  ");
    assert!(matches!(
        host.deploy(&unnamed).await,
        Err(PoolError::InvalidConfiguration { .. })
    ));

    assert_eq!(provider.build_count(), 0);
    assert!(host.statuses().is_empty());
}

#[tokio::test]
async fn test_provider_failure_fails_the_deploy() {
    let (host, provider) = host();
    provider.fail_builds(true);

    let err = host
        .deploy(&ResourceRecord::connector("billing").sized(0, 2))
        .await
        .unwrap_err();

    assert!(matches!(err, PoolError::DeployFailed { .. }));
    assert!(err.to_string().contains("mock driver unavailable"));
    assert!(host.lookup("billing").is_none());
}
