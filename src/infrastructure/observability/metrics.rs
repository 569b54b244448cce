//! Prometheus registry holding every published account gauge.
//!
//! The registry is built once at startup and shared (`Arc`) between the
//! poller, which writes, and the exposition server, which renders. All
//! samples of one account are written under a single write lock, and
//! rendering takes the read lock, so a scrape never sees half an account.

use crate::domain::account::{ACCOUNT_LABEL_NAMES, AccountLabels};
use crate::domain::errors::PublishError;
use crate::domain::gauges::AccountGauge;
use chrono::{DateTime, TimeZone, Utc};
use prometheus::{
    Counter, CounterVec, Gauge, GaugeVec, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, warn};

pub const TOTAL_ACCOUNTS: &str = "marginfi_total_accounts";

/// One published value, as seen by a reader of the registry
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: &'static str,
    pub labels: Vec<(&'static str, String)>,
    pub value: f64,
    /// Start of the cycle that wrote the value
    pub cycle_timestamp: Option<DateTime<Utc>>,
}

impl MetricSample {
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(label, _)| *label == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Label tuple of one account and the gauge families written under it
struct PublishedAccount {
    labels: AccountLabels,
    gauges: BTreeSet<&'static str>,
}

/// Accounts currently published, keyed by primary account address
#[derive(Default)]
struct PublishedAccounts {
    accounts: HashMap<String, PublishedAccount>,
    cycle_timestamp: Option<DateTime<Utc>>,
}

pub struct MetricRegistry {
    registry: Registry,
    total_accounts: Gauge,
    account_gauges: BTreeMap<&'static str, GaugeVec>,
    published: RwLock<PublishedAccounts>,

    cycles_total: CounterVec,
    account_failures_total: CounterVec,
    stale_accounts_removed_total: Counter,
    cycle_duration_seconds: Histogram,
    last_cycle_timestamp_seconds: Gauge,
    build_info: GaugeVec,
}

impl MetricRegistry {
    /// Create a registry with every account gauge registered
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let total_accounts = Gauge::with_opts(Opts::new(
            TOTAL_ACCOUNTS,
            "Marginfi Total Accounts Created",
        ))?;
        registry.register(Box::new(total_accounts.clone()))?;

        let mut account_gauges = BTreeMap::new();
        for gauge in AccountGauge::ALL {
            let vec = GaugeVec::new(Opts::new(gauge.name(), gauge.help()), &ACCOUNT_LABEL_NAMES)?;
            registry.register(Box::new(vec.clone()))?;
            account_gauges.insert(gauge.name(), vec);
        }

        let cycles_total = CounterVec::new(
            Opts::new("marginfi_exporter_cycles_total", "Poll cycles by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(cycles_total.clone()))?;

        let account_failures_total = CounterVec::new(
            Opts::new(
                "marginfi_exporter_account_failures_total",
                "Accounts that could not be published, by failure kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(account_failures_total.clone()))?;

        let stale_accounts_removed_total = Counter::with_opts(Opts::new(
            "marginfi_exporter_stale_accounts_removed_total",
            "Accounts whose samples were removed after leaving the ledger",
        ))?;
        registry.register(Box::new(stale_accounts_removed_total.clone()))?;

        let cycle_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "marginfi_exporter_cycle_duration_seconds",
                "Wall time of one poll cycle in seconds",
            )
            .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
        )?;
        registry.register(Box::new(cycle_duration_seconds.clone()))?;

        let last_cycle_timestamp_seconds = Gauge::with_opts(Opts::new(
            "marginfi_exporter_last_cycle_timestamp_seconds",
            "Unix time at which the last poll cycle started",
        ))?;
        registry.register(Box::new(last_cycle_timestamp_seconds.clone()))?;

        let build_info = GaugeVec::new(
            Opts::new("marginfi_exporter_build_info", "Exporter version and environment"),
            &["env", "version"],
        )?;
        registry.register(Box::new(build_info.clone()))?;

        Ok(Self {
            registry,
            total_accounts,
            account_gauges,
            published: RwLock::new(PublishedAccounts::default()),
            cycles_total,
            account_failures_total,
            stale_accounts_removed_total,
            cycle_duration_seconds,
            last_cycle_timestamp_seconds,
            build_info,
        })
    }

    /// Set one per-account sample.
    ///
    /// `labels` are the values of [`ACCOUNT_LABEL_NAMES`], in order. The
    /// sample is tracked under its `marginfi_address` like any published
    /// account, so it shows up in [`snapshot`](Self::snapshot) and is pruned
    /// by [`begin_cycle`](Self::begin_cycle).
    /// Fails when `name` is not a per-account gauge or the label arity is wrong.
    pub fn set_value(&self, name: &str, labels: &[&str], value: f64) -> Result<(), PublishError> {
        let mut published = self.write_published();
        let name = self.set_unlocked(name, labels, value)?;

        if let [marginfi_address, mango_address, zo_address] = labels {
            let labels = AccountLabels {
                marginfi_address: marginfi_address.to_string(),
                mango_address: mango_address.to_string(),
                zo_address: zo_address.to_string(),
            };
            self.account_entry(&mut published, &labels).gauges.insert(name);
        }
        Ok(())
    }

    fn set_unlocked(
        &self,
        name: &str,
        labels: &[&str],
        value: f64,
    ) -> Result<&'static str, PublishError> {
        let (name, gauge) = self
            .account_gauges
            .get_key_value(name)
            .ok_or_else(|| PublishError::UnknownMetric {
                name: name.to_string(),
            })?;

        gauge
            .get_metric_with_label_values(labels)
            .map_err(|source| PublishError::Labels {
                name: name.to_string(),
                source,
            })?
            .set(value);
        Ok(*name)
    }

    /// Tracking entry for `labels`, dropping the samples of an older tuple
    /// recorded for the same account.
    fn account_entry<'a>(
        &self,
        published: &'a mut PublishedAccounts,
        labels: &AccountLabels,
    ) -> &'a mut PublishedAccount {
        let account = published
            .accounts
            .entry(labels.marginfi_address.clone())
            .or_insert_with(|| PublishedAccount {
                labels: labels.clone(),
                gauges: BTreeSet::new(),
            });

        if account.labels != *labels {
            debug!(
                "Account {} moved label tuple {:?} -> {:?}",
                labels.marginfi_address,
                account.labels.values(),
                labels.values()
            );
            self.remove_unlocked(account);
            account.labels = labels.clone();
            account.gauges.clear();
        }
        account
    }

    /// Write every sample of one account as a single group.
    ///
    /// If the account was previously published under a different label
    /// tuple (venue address changed), the old tuple is dropped first.
    /// Samples that fail are skipped and returned; the rest are written.
    pub fn publish_account(
        &self,
        labels: &AccountLabels,
        samples: &[(AccountGauge, f64)],
    ) -> Vec<PublishError> {
        let mut published = self.write_published();
        let values = labels.values();
        let account = self.account_entry(&mut published, labels);

        let mut errors = Vec::new();
        for (gauge, value) in samples {
            match self.set_unlocked(gauge.name(), &values, *value) {
                Ok(name) => {
                    account.gauges.insert(name);
                }
                Err(e) => errors.push(e),
            }
        }
        errors
    }

    /// Start a cycle: remove every account not in `current`, stamp the cycle time.
    ///
    /// Returns the number of accounts whose samples were removed.
    pub fn begin_cycle(&self, current: &HashSet<String>, started_at: DateTime<Utc>) -> usize {
        let mut published = self.write_published();

        let stale: Vec<String> = published
            .accounts
            .keys()
            .filter(|address| !current.contains(*address))
            .cloned()
            .collect();

        for address in &stale {
            if let Some(account) = published.accounts.remove(address) {
                self.remove_unlocked(&account);
            }
        }

        published.cycle_timestamp = Some(started_at);
        self.last_cycle_timestamp_seconds
            .set(started_at.timestamp_millis() as f64 / 1000.0);
        self.stale_accounts_removed_total.inc_by(stale.len() as f64);
        stale.len()
    }

    fn remove_unlocked(&self, account: &PublishedAccount) {
        let values = account.labels.values();
        for name in &account.gauges {
            let Some(gauge) = self.account_gauges.get(name) else {
                continue;
            };
            if let Err(e) = gauge.remove_label_values(&values) {
                warn!("Failed to remove sample {} {:?}: {}", name, values, e);
            }
        }
    }

    pub fn set_total_accounts(&self, total: usize) {
        self.total_accounts.set(total as f64);
    }

    pub fn record_cycle(&self, outcome: &str, duration: Duration) {
        self.cycles_total.with_label_values(&[outcome]).inc();
        self.cycle_duration_seconds.observe(duration.as_secs_f64());
    }

    pub fn record_account_failure(&self, kind: &str) {
        self.account_failures_total.with_label_values(&[kind]).inc();
    }

    pub fn set_build_info(&self, env: &str, version: &str) {
        self.build_info.with_label_values(&[env, version]).set(1.0);
    }

    /// Addresses that currently have samples in the registry
    pub fn published_addresses(&self) -> HashSet<String> {
        let published = self.published.read().unwrap_or_else(PoisonError::into_inner);
        published.accounts.keys().cloned().collect()
    }

    /// Every account sample plus the total-accounts gauge.
    pub fn snapshot(&self) -> Vec<MetricSample> {
        let published = self.published.read().unwrap_or_else(PoisonError::into_inner);
        let cycle_timestamp = published.cycle_timestamp;

        let mut samples = vec![MetricSample {
            name: TOTAL_ACCOUNTS,
            labels: Vec::new(),
            value: self.total_accounts.get(),
            cycle_timestamp,
        }];

        for account in published.accounts.values() {
            let values = account.labels.values();
            for gauge in AccountGauge::ALL {
                if !account.gauges.contains(gauge.name()) {
                    continue;
                }
                let Some(vec) = self.account_gauges.get(gauge.name()) else {
                    continue;
                };
                match vec.get_metric_with_label_values(&values) {
                    Ok(metric) => samples.push(MetricSample {
                        name: gauge.name(),
                        labels: account.labels.pairs(),
                        value: metric.get(),
                        cycle_timestamp,
                    }),
                    Err(e) => warn!("Unreadable sample {} {:?}: {}", gauge.name(), values, e),
                }
            }
        }
        samples
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> String {
        let _published = self.published.read().unwrap_or_else(PoisonError::into_inner);
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        match encoder.encode_to_string(&metric_families) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode metrics: {}", e);
                String::new()
            }
        }
    }

    pub fn last_cycle_at(&self) -> Option<DateTime<Utc>> {
        let seconds = self.last_cycle_timestamp_seconds.get();
        if seconds <= 0.0 {
            return None;
        }
        Utc.timestamp_millis_opt((seconds * 1000.0) as i64).single()
    }

    fn write_published(&self) -> RwLockWriteGuard<'_, PublishedAccounts> {
        self.published.write().unwrap_or_else(PoisonError::into_inner)
    }
}
