use crate::domain::account::AccountSnapshot;
use crate::domain::errors::SourceError;
use crate::domain::ports::AccountSource;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

#[derive(Default)]
struct MockState {
    addresses: Vec<String>,
    accounts: HashMap<String, AccountSnapshot>,
    failing: HashSet<String>,
    slow: HashMap<String, Duration>,
    list_failure: bool,
}

/// In-memory account source for tests and local runs.
///
/// Listing returns the configured address list (which may name accounts
/// that have no snapshot, yielding `NotFound` on load).
#[derive(Default)]
pub struct MockAccountSource {
    state: Mutex<MockState>,
    list_calls: AtomicUsize,
    load_calls: AtomicUsize,
}

impl MockAccountSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source listing exactly these accounts, in order
    pub fn with_accounts(accounts: Vec<AccountSnapshot>) -> Self {
        let source = Self::new();
        source.set_accounts(accounts);
        source
    }

    /// Replace every account and the address list
    pub fn set_accounts(&self, accounts: Vec<AccountSnapshot>) {
        let mut state = self.lock();
        state.addresses = accounts.iter().map(|a| a.address.clone()).collect();
        state.accounts = accounts.into_iter().map(|a| (a.address.clone(), a)).collect();
    }

    /// Override the listed addresses without touching stored snapshots
    pub fn set_addresses(&self, addresses: Vec<String>) {
        self.lock().addresses = addresses;
    }

    /// Serve `snapshot` when `address` is loaded, whatever address it reports
    pub fn set_snapshot_for(&self, address: &str, snapshot: AccountSnapshot) {
        self.lock().accounts.insert(address.to_string(), snapshot);
    }

    /// Make `load_account` fail with a connection error for this address
    pub fn fail_address(&self, address: &str) {
        self.lock().failing.insert(address.to_string());
    }

    pub fn heal_address(&self, address: &str) {
        self.lock().failing.remove(address);
    }

    /// Delay every load of this address
    pub fn slow_address(&self, address: &str, delay: Duration) {
        self.lock().slow.insert(address.to_string(), delay);
    }

    pub fn set_list_failure(&self, failing: bool) {
        self.lock().list_failure = failing;
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::Relaxed)
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AccountSource for MockAccountSource {
    async fn list_account_addresses(&self) -> Result<Vec<String>, SourceError> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
        let state = self.lock();
        if state.list_failure {
            return Err(SourceError::Connection {
                reason: "mock ledger node unreachable".to_string(),
            });
        }
        Ok(state.addresses.clone())
    }

    async fn load_account(&self, address: &str) -> Result<AccountSnapshot, SourceError> {
        self.load_calls.fetch_add(1, Ordering::Relaxed);

        let delay = self.lock().slow.get(address).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.lock();
        if state.failing.contains(address) {
            return Err(SourceError::Connection {
                reason: format!("mock load failure for {}", address),
            });
        }
        state
            .accounts
            .get(address)
            .cloned()
            .ok_or_else(|| SourceError::NotFound {
                address: address.to_string(),
            })
    }
}
