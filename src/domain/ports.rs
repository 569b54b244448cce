use crate::domain::account::AccountSnapshot;
use crate::domain::errors::SourceError;
use async_trait::async_trait;

/// Read-only view of the lending protocol's accounts on the ledger.
#[async_trait]
pub trait AccountSource: Send + Sync {
    /// Addresses of every margin account currently known to the ledger.
    async fn list_account_addresses(&self) -> Result<Vec<String>, SourceError>;

    /// Current decoded state of one account.
    async fn load_account(&self, address: &str) -> Result<AccountSnapshot, SourceError>;
}
