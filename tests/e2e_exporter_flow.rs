use marginfi_exporter::application::system::Exporter;
use marginfi_exporter::config::Config;
use marginfi_exporter::domain::account::{AccountSnapshot, MarginRequirements, VenueSubPosition};
use marginfi_exporter::infrastructure::mock::MockAccountSource;
use marginfi_exporter::infrastructure::observability::MetricSample;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_test::assert_ok;

fn scenario_account() -> AccountSnapshot {
    AccountSnapshot {
        address: "X".to_string(),
        authority: "AuthorityX".to_string(),
        assets: Some(json!(100)),
        liabilities: Some(json!(40)),
        deposits: Some(json!(50)),
        borrows: Some(json!(10)),
        margin_requirement: MarginRequirements {
            initial: Some(json!(25)),
            maintenance: Some(json!(15)),
            partial_liquidation: Some(json!(10)),
        },
        mango: Some(VenueSubPosition {
            address: "MangoX".to_string(),
            equity: Some(json!(20)),
            free_collateral: Some(json!(8)),
            liquidation_value: Some(json!(4)),
        }),
        zo: None,
    }
}

fn test_config() -> Config {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("RPC_ENDPOINT", "http://127.0.0.1:1"),
        ("ENV", "test"),
        ("METRICS_PORT", "0"),
        ("METRICS_BIND_ADDRESS", "127.0.0.1"),
        ("POLL_INTERVAL_SECS", "1"),
        ("POLL_JITTER_MS", "0"),
    ]);
    Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).expect("valid config")
}

fn value(samples: &[MetricSample], name: &str) -> Option<f64> {
    samples
        .iter()
        .find(|s| s.name == name)
        .map(|s| s.value)
}

#[tokio::test]
async fn test_single_account_cycle_end_to_end() {
    let source = Arc::new(MockAccountSource::with_accounts(vec![scenario_account()]));
    let exporter = Exporter::with_source(test_config(), source).expect("exporter");
    let registry = exporter.registry.clone();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = assert_ok!(exporter.start(shutdown_rx).await);

    // First cycle runs immediately
    let mut samples: Vec<MetricSample> = Vec::new();
    for _ in 0..50 {
        samples = registry.snapshot();
        if samples.len() > 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(value(&samples, "marginfi_total_accounts"), Some(1.0));
    assert_eq!(value(&samples, "marginfi_account_equity"), Some(60.0));
    assert_eq!(value(&samples, "marginfi_account_borrows"), Some(10.0));
    assert_eq!(value(&samples, "mango_account_equity"), Some(20.0));
    assert_eq!(value(&samples, "zo_account_equity"), Some(0.0));

    let equity = samples
        .iter()
        .find(|s| s.name == "marginfi_account_equity")
        .expect("equity sample");
    assert_eq!(equity.label("marginfi_address"), Some("X"));
    assert_eq!(equity.label("mango_address"), Some("MangoX"));
    assert_eq!(equity.label("zo_address"), Some(""));
    assert!(equity.cycle_timestamp.is_some());

    // Scrape the live endpoint
    let url = format!("http://{}/metrics", handle.metrics_addr);
    let body = reqwest::get(&url)
        .await
        .expect("scrape")
        .text()
        .await
        .expect("body");
    assert!(body.contains("marginfi_total_accounts 1"));
    assert!(body.lines().any(|line| line.starts_with("marginfi_account_equity{")
        && line.contains("marginfi_address=\"X\"")
        && line.ends_with(" 60")));
    assert!(body.contains("marginfi_exporter_build_info{env=\"test\""));

    let health = reqwest::get(format!("http://{}/health", handle.metrics_addr))
        .await
        .expect("health")
        .text()
        .await
        .expect("body");
    assert_eq!(health, "ok");

    shutdown_tx.send(true).expect("exporter alive");
    let stopped = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("exporter stops");
    assert_ok!(stopped);
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = occupied.local_addr().expect("addr").port().to_string();

    let vars: HashMap<&str, String> = HashMap::from([
        ("RPC_ENDPOINT", "http://127.0.0.1:1".to_string()),
        ("METRICS_PORT", port),
        ("METRICS_BIND_ADDRESS", "127.0.0.1".to_string()),
    ]);
    let config = Config::from_lookup(|key| vars.get(key).cloned()).expect("valid config");

    let exporter =
        Exporter::with_source(config, Arc::new(MockAccountSource::new())).expect("exporter");
    let (_tx, rx) = watch::channel(false);
    assert!(exporter.start(rx).await.is_err());
}
