//! The poll-compute-publish loop.
//!
//! Each cycle lists every account, drops samples of accounts that left the
//! ledger, publishes the account count, then loads, maps and publishes each
//! account with bounded parallelism under one overall deadline. A failing
//! account is logged and counted; it never aborts the cycle. A failing
//! listing skips the cycle; it never stops the loop.

use crate::application::mapper::{FlatMetrics, map_account};
use crate::config::PollerEnvConfig;
use crate::domain::errors::{AccountError, CycleError, PublishError, SourceError};
use crate::domain::ports::AccountSource;
use crate::infrastructure::core::{CircuitBreaker, CircuitBreakerError};
use crate::infrastructure::observability::MetricRegistry;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, error, info, warn};

/// A single account that could not be published this cycle
#[derive(Debug)]
pub struct AccountFailure {
    pub address: String,
    pub error: AccountError,
}

/// Outcome of one completed cycle
#[derive(Debug, Default)]
pub struct CycleReport {
    pub total_accounts: usize,
    pub published: usize,
    pub failures: Vec<AccountFailure>,
    pub stale_removed: usize,
    /// Accounts written with some samples missing
    pub partially_published: usize,
    pub publish_errors: usize,
    pub duration: Duration,
}

impl CycleReport {
    /// Count one account's publish. Only a write with no failed sample is `published`.
    pub fn record_publish(&mut self, errors: &[PublishError]) {
        if errors.is_empty() {
            self.published += 1;
        } else {
            self.partially_published += 1;
            self.publish_errors += errors.len();
        }
    }
}

pub struct Poller {
    source: Arc<dyn AccountSource>,
    registry: Arc<MetricRegistry>,
    config: PollerEnvConfig,
    account_filter: Option<String>,
    breaker: CircuitBreaker,
}

impl Poller {
    pub fn new(
        source: Arc<dyn AccountSource>,
        registry: Arc<MetricRegistry>,
        config: PollerEnvConfig,
    ) -> Self {
        let breaker = CircuitBreaker::new(
            "account-listing",
            config.breaker_failure_threshold,
            config.breaker_cooldown,
        );
        Self {
            source,
            registry,
            config,
            account_filter: None,
            breaker,
        }
    }

    /// Only poll this account address
    pub fn with_account_filter(mut self, address: Option<String>) -> Self {
        self.account_filter = address;
        self
    }

    /// Run cycles until `shutdown` becomes `true`.
    ///
    /// The flag is only checked between cycles, so a cycle in progress
    /// always completes.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Poller: starting (interval: {:?}, jitter: {:?}, deadline: {:?}, concurrency: {})",
            self.config.interval,
            self.config.jitter,
            self.config.cycle_deadline,
            self.config.fetch_concurrency
        );

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            match self.run_cycle().await {
                Ok(report) => info!(
                    "Poller: cycle done in {:?} | accounts: {} | published: {} | partial: {} | failed: {} | stale removed: {}",
                    report.duration,
                    report.total_accounts,
                    report.published,
                    report.partially_published,
                    report.failures.len(),
                    report.stale_removed
                ),
                Err(e) => warn!("Poller: cycle skipped: {}", e),
            }

            let delay = self.config.next_delay();
            debug!("Poller: next cycle in {:?}", delay);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        warn!("Poller: shutdown channel closed");
                    }
                    break;
                }
            }
        }

        info!("Poller: stopped");
    }

    /// Execute one full cycle.
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let started = Instant::now();
        let deadline = started + self.config.cycle_deadline;

        let addresses = match self.list_addresses().await {
            Ok(addresses) => addresses,
            Err(e) => {
                self.registry.record_cycle("skipped", started.elapsed());
                return Err(e);
            }
        };

        let current: HashSet<String> = addresses.iter().cloned().collect();
        let stale_removed = self.registry.begin_cycle(&current, Utc::now());
        if stale_removed > 0 {
            info!("Poller: removed samples of {} vanished accounts", stale_removed);
        }
        self.registry.set_total_accounts(addresses.len());

        let mut seen = HashSet::with_capacity(addresses.len());
        let unique: Vec<String> = addresses
            .iter()
            .filter(|address| seen.insert(address.as_str()))
            .cloned()
            .collect();

        let mut report = CycleReport {
            total_accounts: addresses.len(),
            stale_removed,
            ..Default::default()
        };

        let mut results = stream::iter(unique)
            .map(|address| async move {
                let result = self.load_and_map(&address, deadline).await;
                (address, result)
            })
            .buffer_unordered(self.config.fetch_concurrency.max(1));

        while let Some((address, result)) = results.next().await {
            match result {
                Ok(metrics) => {
                    let errors = self.registry.publish_account(&metrics.labels, &metrics.samples());
                    for e in &errors {
                        error!("Poller: failed to publish sample for {}: {}", address, e);
                    }
                    report.record_publish(&errors);
                }
                Err(e) => {
                    warn!("Poller: account {} failed ({}): {}", address, e.kind(), e);
                    self.registry.record_account_failure(e.kind());
                    report.failures.push(AccountFailure { address, error: e });
                }
            }
        }

        report.duration = started.elapsed();
        self.registry.record_cycle("ok", report.duration);
        Ok(report)
    }

    async fn list_addresses(&self) -> Result<Vec<String>, CycleError> {
        let listing = async {
            match timeout(self.config.cycle_deadline, self.source.list_account_addresses()).await {
                Ok(result) => result,
                Err(_) => Err(SourceError::Timeout {
                    duration_ms: self.config.cycle_deadline.as_millis() as u64,
                }),
            }
        };

        let mut addresses = match self.breaker.call(listing).await {
            Ok(addresses) => addresses,
            Err(CircuitBreakerError::Open { name, retry_in }) => {
                return Err(CycleError::CircuitOpen(format!(
                    "circuit [{}] open, retry in {:?}",
                    name, retry_in
                )));
            }
            Err(CircuitBreakerError::Inner(e)) => return Err(CycleError::Source(e)),
        };

        if let Some(filter) = &self.account_filter {
            addresses.retain(|address| address == filter);
        }
        Ok(addresses)
    }

    async fn load_and_map(
        &self,
        address: &str,
        deadline: Instant,
    ) -> Result<FlatMetrics, AccountError> {
        let snapshot = timeout_at(deadline, self.source.load_account(address))
            .await
            .map_err(|_| AccountError::DeadlineExceeded)??;

        if snapshot.address != address {
            return Err(AccountError::AddressMismatch {
                requested: address.to_string(),
                returned: snapshot.address,
            });
        }

        debug!("Poller: loaded {} (authority {})", address, snapshot.authority);
        Ok(map_account(&snapshot)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::{AccountSnapshot, MarginRequirements};
    use crate::infrastructure::mock::MockAccountSource;
    use serde_json::json;

    fn account(address: &str, assets: f64) -> AccountSnapshot {
        AccountSnapshot {
            address: address.to_string(),
            authority: format!("{}-authority", address),
            assets: Some(json!(assets)),
            liabilities: Some(json!(0)),
            deposits: Some(json!(assets)),
            borrows: Some(json!(0)),
            margin_requirement: MarginRequirements {
                initial: Some(json!(0)),
                maintenance: Some(json!(0)),
                partial_liquidation: Some(json!(0)),
            },
            mango: None,
            zo: None,
        }
    }

    fn fast_config() -> PollerEnvConfig {
        PollerEnvConfig {
            interval: Duration::from_millis(10),
            jitter: Duration::ZERO,
            cycle_deadline: Duration::from_secs(5),
            fetch_concurrency: 4,
            breaker_failure_threshold: 2,
            breaker_cooldown: Duration::from_secs(60),
        }
    }

    fn poller(source: Arc<MockAccountSource>) -> (Poller, Arc<MetricRegistry>) {
        let registry = Arc::new(MetricRegistry::new().expect("registry"));
        let poller = Poller::new(source, registry.clone(), fast_config());
        (poller, registry)
    }

    #[test]
    fn test_account_with_failed_samples_is_not_counted_as_published() {
        let mut report = CycleReport::default();
        report.record_publish(&[]);
        report.record_publish(&[
            PublishError::UnknownMetric {
                name: "marginfi_account_nope".to_string(),
            },
            PublishError::UnknownMetric {
                name: "zo_account_nope".to_string(),
            },
        ]);

        assert_eq!(report.published, 1);
        assert_eq!(report.partially_published, 1);
        assert_eq!(report.publish_errors, 2);
    }

    #[tokio::test]
    async fn test_duplicate_addresses_are_loaded_once() {
        let source = Arc::new(MockAccountSource::with_accounts(vec![account("A", 1.0)]));
        source.set_addresses(vec!["A".to_string(), "A".to_string()]);
        let (poller, _registry) = poller(source.clone());

        let report = poller.run_cycle().await.expect("cycle");
        assert_eq!(report.total_accounts, 2);
        assert_eq!(report.published, 1);
        assert_eq!(source.load_calls(), 1);
    }

    #[tokio::test]
    async fn test_account_filter_limits_polling() {
        let source = Arc::new(MockAccountSource::with_accounts(vec![
            account("A", 1.0),
            account("B", 2.0),
        ]));
        let (poller, registry) = poller(source.clone());
        let poller = poller.with_account_filter(Some("B".to_string()));

        let report = poller.run_cycle().await.expect("cycle");
        assert_eq!(report.total_accounts, 1);
        assert_eq!(source.load_calls(), 1);
        assert_eq!(
            registry.published_addresses(),
            HashSet::from(["B".to_string()])
        );
    }

    #[tokio::test]
    async fn test_address_mismatch_is_not_published() {
        let source = Arc::new(MockAccountSource::new());
        source.set_addresses(vec!["A".to_string()]);
        source.set_snapshot_for("A", account("Z", 1.0));
        let (poller, registry) = poller(source.clone());

        let report = poller.run_cycle().await.expect("cycle");
        assert_eq!(report.published, 0);
        assert!(matches!(
            &report.failures[0].error,
            AccountError::AddressMismatch { returned, .. } if returned == "Z"
        ));
        assert!(registry.published_addresses().is_empty());
    }

    #[tokio::test]
    async fn test_breaker_skips_listing_after_repeated_failures() {
        let source = Arc::new(MockAccountSource::new());
        source.set_list_failure(true);
        let (poller, _registry) = poller(source.clone());

        for _ in 0..2 {
            assert!(matches!(poller.run_cycle().await, Err(CycleError::Source(_))));
        }
        assert!(matches!(
            poller.run_cycle().await,
            Err(CycleError::CircuitOpen(_))
        ));
        assert_eq!(source.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_deadline_abandons_slow_accounts() {
        let source = Arc::new(MockAccountSource::with_accounts(vec![
            account("fast", 1.0),
            account("slow", 2.0),
        ]));
        source.slow_address("slow", Duration::from_secs(30));
        let registry = Arc::new(MetricRegistry::new().expect("registry"));
        let config = PollerEnvConfig {
            cycle_deadline: Duration::from_millis(200),
            ..fast_config()
        };
        let poller = Poller::new(source, registry.clone(), config);

        let report = poller.run_cycle().await.expect("cycle");
        assert_eq!(report.published, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].address, "slow");
        assert!(matches!(report.failures[0].error, AccountError::DeadlineExceeded));
        assert!(report.duration < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_signal() {
        let source = Arc::new(MockAccountSource::with_accounts(vec![account("A", 1.0)]));
        let (poller, _registry) = poller(source.clone());
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { poller.run(rx).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).expect("poller alive");

        timeout(Duration::from_secs(2), handle)
            .await
            .expect("poller stops promptly")
            .expect("poller task ok");
        assert!(source.list_calls() >= 1);
    }
}
