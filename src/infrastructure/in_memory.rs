use crate::domain::account::Account;
use crate::domain::invoice::{Invoice, InvoiceStatus};
use crate::domain::ports::{AccountStore, InvoiceStore};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

#[derive(Default)]
struct AccountTable {
    rows: HashMap<String, Arc<Mutex<Account>>>,
    // api_key -> account id
    api_keys: HashMap<String, String>,
}

impl AccountTable {
    fn row(&self, id: &str) -> Result<Arc<Mutex<Account>>> {
        self.rows
            .get(id)
            .cloned()
            .ok_or(GatewayError::AccountNotFound)
    }
}

/// A thread-safe in-memory store for accounts.
///
/// Every row sits behind its own `Mutex`, which plays the part of a database
/// row lock: `update_balance` holds it for the whole read-modify-write, so two
/// updates of the same account never interleave while different accounts proceed
/// in parallel. The table-level `RwLock` only guards inserts and index lookups.
#[derive(Default, Clone)]
pub struct InMemoryAccountStore {
    table: Arc<RwLock<AccountTable>>,
}

impl InMemoryAccountStore {
    /// Creates a new, empty in-memory account store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn save(&self, account: &Account) -> Result<()> {
        let mut table = self.table.write().await;
        if table.rows.contains_key(&account.id) {
            return Err(GatewayError::DuplicateKey("accounts.id".to_string()));
        }
        if table.api_keys.contains_key(account.api_key.as_str()) {
            return Err(GatewayError::DuplicateKey("accounts.api_key".to_string()));
        }

        table
            .api_keys
            .insert(account.api_key.as_str().to_string(), account.id.clone());
        table
            .rows
            .insert(account.id.clone(), Arc::new(Mutex::new(account.clone())));
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Account> {
        let row = self.table.read().await.row(id)?;
        let account = row.lock().await.clone();
        Ok(account)
    }

    async fn find_by_api_key(&self, api_key: &str) -> Result<Account> {
        let row = {
            let table = self.table.read().await;
            let id = table
                .api_keys
                .get(api_key)
                .ok_or(GatewayError::AccountNotFound)?;
            table.row(id)?
        };
        let account = row.lock().await.clone();
        Ok(account)
    }

    async fn update_balance(&self, account: &Account) -> Result<()> {
        let row = self.table.read().await.row(&account.id)?;
        let mut locked = row.lock().await;
        locked.sync_balance(account);
        debug!(account_id = %account.id, balance = %account.balance(), "balance written");
        Ok(())
    }
}

/// A thread-safe in-memory store for invoices.
#[derive(Default, Clone)]
pub struct InMemoryInvoiceStore {
    invoices: Arc<RwLock<HashMap<String, Invoice>>>,
}

impl InMemoryInvoiceStore {
    /// Creates a new, empty in-memory invoice store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InvoiceStore for InMemoryInvoiceStore {
    async fn save(&self, invoice: &Invoice) -> Result<()> {
        let mut invoices = self.invoices.write().await;
        if invoices.contains_key(&invoice.id) {
            return Err(GatewayError::DuplicateKey("invoices.id".to_string()));
        }
        invoices.insert(invoice.id.clone(), invoice.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Invoice> {
        let invoices = self.invoices.read().await;
        invoices
            .get(id)
            .cloned()
            .ok_or(GatewayError::InvoiceNotFound)
    }

    async fn find_by_account_id(&self, account_id: &str) -> Result<Vec<Invoice>> {
        let invoices = self.invoices.read().await;
        let mut matching: Vec<Invoice> = invoices
            .values()
            .filter(|invoice| invoice.account_id == account_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(matching)
    }

    async fn update_status(&self, invoice: &Invoice) -> Result<()> {
        let mut invoices = self.invoices.write().await;
        let stored = invoices
            .get_mut(&invoice.id)
            .ok_or(GatewayError::InvoiceNotFound)?;
        stored.status = invoice.status;
        stored.updated_at = invoice.updated_at;
        Ok(())
    }

    async fn transition_status(&self, invoice: &Invoice, from: InvoiceStatus) -> Result<bool> {
        let mut invoices = self.invoices.write().await;
        let stored = invoices
            .get_mut(&invoice.id)
            .ok_or(GatewayError::InvoiceNotFound)?;
        if stored.status != from {
            return Ok(false);
        }
        stored.status = invoice.status;
        stored.updated_at = invoice.updated_at;
        Ok(true)
    }
}
