use super::account::Account;
use super::invoice::{Invoice, InvoiceStatus};
use crate::error::Result;
use async_trait::async_trait;

/// Persistence gateway for accounts.
///
/// Implementations must make [`AccountStore::update_balance`] atomic: the target
/// row is locked for the whole read-write-commit sequence, so concurrent updates
/// of the same account are applied one after the other and a failed update leaves
/// nothing behind.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Inserts a new account. Fails with `DuplicateKey` if the id or API key is taken.
    async fn save(&self, account: &Account) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Account>;
    async fn find_by_api_key(&self, api_key: &str) -> Result<Account>;
    /// Writes `balance` and `updated_at` of an existing account under a row lock.
    async fn update_balance(&self, account: &Account) -> Result<()>;
}

/// Persistence gateway for invoices.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn save(&self, invoice: &Invoice) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Invoice>;
    /// All invoices of an account ordered by creation time; empty when there are none.
    async fn find_by_account_id(&self, account_id: &str) -> Result<Vec<Invoice>>;
    /// Writes `status` and `updated_at`. Fails with `InvoiceNotFound` if no row matched.
    async fn update_status(&self, invoice: &Invoice) -> Result<()>;
    /// Writes `status` and `updated_at` only if the stored status is still `from`,
    /// with the row locked between the check and the write.
    ///
    /// Returns `false` when another writer changed the status first, and fails
    /// with `InvoiceNotFound` if no row matched.
    async fn transition_status(&self, invoice: &Invoice, from: InvoiceStatus) -> Result<bool>;
}

pub type AccountStoreBox = Box<dyn AccountStore>;
pub type InvoiceStoreBox = Box<dyn InvoiceStore>;
