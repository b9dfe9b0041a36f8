use crate::domain::account::Account;
use crate::domain::invoice::{Invoice, InvoiceStatus};
use crate::domain::ports::{AccountStore, InvoiceStore};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, TransactionDB,
    TransactionDBOptions,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Column Family for account rows, keyed by account id.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family mapping API keys to account ids (the unique index).
pub const CF_API_KEYS: &str = "account_api_keys";
/// Column Family for invoice rows, keyed by invoice id.
pub const CF_INVOICES: &str = "invoices";

/// A persistent store implementation using a pessimistic RocksDB `TransactionDB`.
///
/// Writes go through a RocksDB transaction. `get_for_update` takes an exclusive
/// lock on the key until commit or rollback, which gives the same guarantee as
/// `SELECT ... FOR UPDATE`: a second transaction touching the same row waits
/// (up to the configured lock timeout) instead of interleaving.
///
/// RocksDB calls block, so every operation runs on tokio's blocking pool.
/// This struct is thread-safe (`Clone` shares the underlying `Arc<TransactionDB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<TransactionDB>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    /// * `lock_timeout` - How long a transaction waits for a row lock before failing.
    pub fn open<P: AsRef<Path>>(path: P, lock_timeout: Duration) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let mut txn_db_opts = TransactionDBOptions::default();
        txn_db_opts.set_txn_lock_timeout(i64::try_from(lock_timeout.as_millis()).unwrap_or(i64::MAX));

        let descriptors = [CF_ACCOUNTS, CF_API_KEYS, CF_INVOICES]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

        let db: TransactionDB =
            TransactionDB::open_cf_descriptors(&opts, &txn_db_opts, path, descriptors)?;

        Ok(Self { db: Arc::new(db) })
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&TransactionDB) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(db.as_ref())).await?
    }
}

fn column<'a>(db: &'a TransactionDB, name: &str) -> Result<&'a ColumnFamily> {
    db.cf_handle(name)
        .ok_or_else(|| GatewayError::internal(format!("{name} column family not found")))
}

fn read_account(db: &TransactionDB, id: &[u8]) -> Result<Account> {
    let accounts = column(db, CF_ACCOUNTS)?;
    match db.get_cf(accounts, id)? {
        Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
        None => Err(GatewayError::AccountNotFound),
    }
}

#[async_trait]
impl AccountStore for RocksDBStore {
    async fn save(&self, account: &Account) -> Result<()> {
        let account = account.clone();
        self.blocking(move |db| {
            let accounts = column(db, CF_ACCOUNTS)?;
            let api_keys = column(db, CF_API_KEYS)?;
            let id = account.id.as_bytes();
            let api_key = account.api_key.as_str().as_bytes();

            let txn = db.transaction();
            if txn.get_for_update_cf(accounts, id, true)?.is_some() {
                txn.rollback()?;
                return Err(GatewayError::DuplicateKey("accounts.id".to_string()));
            }
            if txn.get_for_update_cf(api_keys, api_key, true)?.is_some() {
                txn.rollback()?;
                return Err(GatewayError::DuplicateKey("accounts.api_key".to_string()));
            }

            txn.put_cf(accounts, id, serde_json::to_vec(&account)?)?;
            txn.put_cf(api_keys, api_key, id)?;
            txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn find_by_id(&self, id: &str) -> Result<Account> {
        let id = id.to_string();
        self.blocking(move |db| read_account(db, id.as_bytes()))
            .await
    }

    async fn find_by_api_key(&self, api_key: &str) -> Result<Account> {
        let api_key = api_key.to_string();
        self.blocking(move |db| {
            let api_keys = column(db, CF_API_KEYS)?;
            let id = db
                .get_cf(api_keys, api_key.as_bytes())?
                .ok_or(GatewayError::AccountNotFound)?;
            read_account(db, &id)
        })
        .await
    }

    async fn update_balance(&self, account: &Account) -> Result<()> {
        let account = account.clone();
        self.blocking(move |db| {
            let accounts = column(db, CF_ACCOUNTS)?;
            let id = account.id.as_bytes();

            // Dropping `txn` on any early return rolls it back.
            let txn = db.transaction();
            let Some(bytes) = txn.get_for_update_cf(accounts, id, true)? else {
                txn.rollback()?;
                return Err(GatewayError::AccountNotFound);
            };

            let mut stored: Account = serde_json::from_slice(&bytes)?;
            stored.sync_balance(&account);
            txn.put_cf(accounts, id, serde_json::to_vec(&stored)?)?;
            txn.commit()?;

            debug!(account_id = %account.id, balance = %account.balance(), "balance committed");
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl InvoiceStore for RocksDBStore {
    async fn save(&self, invoice: &Invoice) -> Result<()> {
        let invoice = invoice.clone();
        self.blocking(move |db| {
            let invoices = column(db, CF_INVOICES)?;
            let id = invoice.id.as_bytes();

            let txn = db.transaction();
            if txn.get_for_update_cf(invoices, id, true)?.is_some() {
                txn.rollback()?;
                return Err(GatewayError::DuplicateKey("invoices.id".to_string()));
            }
            txn.put_cf(invoices, id, serde_json::to_vec(&invoice)?)?;
            txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn find_by_id(&self, id: &str) -> Result<Invoice> {
        let id = id.to_string();
        self.blocking(move |db| {
            let invoices = column(db, CF_INVOICES)?;
            match db.get_cf(invoices, id.as_bytes())? {
                Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
                None => Err(GatewayError::InvoiceNotFound),
            }
        })
        .await
    }

    async fn find_by_account_id(&self, account_id: &str) -> Result<Vec<Invoice>> {
        let account_id = account_id.to_string();
        self.blocking(move |db| {
            let invoices = column(db, CF_INVOICES)?;
            let mut matching = Vec::new();
            for item in db.iterator_cf(invoices, IteratorMode::Start) {
                let (_key, value) = item?;
                let invoice: Invoice = serde_json::from_slice(&value)?;
                if invoice.account_id == account_id {
                    matching.push(invoice);
                }
            }
            matching.sort_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            });
            Ok(matching)
        })
        .await
    }

    async fn update_status(&self, invoice: &Invoice) -> Result<()> {
        let invoice = invoice.clone();
        self.blocking(move |db| {
            let invoices = column(db, CF_INVOICES)?;
            let id = invoice.id.as_bytes();

            let txn = db.transaction();
            let Some(bytes) = txn.get_for_update_cf(invoices, id, true)? else {
                txn.rollback()?;
                return Err(GatewayError::InvoiceNotFound);
            };

            let mut stored: Invoice = serde_json::from_slice(&bytes)?;
            stored.status = invoice.status;
            stored.updated_at = invoice.updated_at;
            txn.put_cf(invoices, id, serde_json::to_vec(&stored)?)?;
            txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn transition_status(&self, invoice: &Invoice, from: InvoiceStatus) -> Result<bool> {
        let invoice = invoice.clone();
        self.blocking(move |db| {
            let invoices = column(db, CF_INVOICES)?;
            let id = invoice.id.as_bytes();

            let txn = db.transaction();
            let Some(bytes) = txn.get_for_update_cf(invoices, id, true)? else {
                txn.rollback()?;
                return Err(GatewayError::InvoiceNotFound);
            };

            let mut stored: Invoice = serde_json::from_slice(&bytes)?;
            if stored.status != from {
                txn.rollback()?;
                return Ok(false);
            }
            stored.status = invoice.status;
            stored.updated_at = invoice.updated_at;
            txn.put_cf(invoices, id, serde_json::to_vec(&stored)?)?;
            txn.commit()?;
            Ok(true)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::OverdraftPolicy;
    use crate::domain::invoice::CreditCard;
    use crate::domain::money::Balance;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn open(dir: &Path) -> RocksDBStore {
        RocksDBStore::open(dir, Duration::from_secs(5)).expect("Failed to open RocksDB")
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());

        assert!(store.db.cf_handle(CF_ACCOUNTS).is_some());
        assert!(store.db.cf_handle(CF_API_KEYS).is_some());
        assert!(store.db.cf_handle(CF_INVOICES).is_some());
    }

    #[tokio::test]
    async fn test_rocksdb_account_store() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        let account = Account::new("Merchant", "merchant@example.com").unwrap();

        AccountStore::save(&store, &account).await.unwrap();
        assert_eq!(
            AccountStore::find_by_id(&store, &account.id).await.unwrap(),
            account
        );
        assert_eq!(
            store
                .find_by_api_key(account.api_key.as_str())
                .await
                .unwrap(),
            account
        );
        assert!(matches!(
            AccountStore::save(&store, &account).await,
            Err(GatewayError::DuplicateKey(_))
        ));
        assert!(matches!(
            AccountStore::find_by_id(&store, "missing").await,
            Err(GatewayError::AccountNotFound)
        ));
    }

    #[tokio::test]
    async fn test_rocksdb_update_balance() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        let mut account = Account::new("Merchant", "merchant@example.com").unwrap();
        AccountStore::save(&store, &account).await.unwrap();

        account
            .apply_adjustment(dec!(75.25), OverdraftPolicy::Forbid)
            .unwrap();
        store.update_balance(&account).await.unwrap();

        let stored = AccountStore::find_by_id(&store, &account.id).await.unwrap();
        assert_eq!(stored, account);

        let ghost = Account::new("Ghost", "ghost@example.com").unwrap();
        assert!(matches!(
            store.update_balance(&ghost).await,
            Err(GatewayError::AccountNotFound)
        ));
        assert!(AccountStore::find_by_id(&store, &ghost.id).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_rocksdb_concurrent_updates_serialize() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        let account = Account::new("Merchant", "merchant@example.com").unwrap();
        AccountStore::save(&store, &account).await.unwrap();

        let mut writers = Vec::new();
        for amount in [dec!(10), dec!(20), dec!(30), dec!(40)] {
            let mut update = account.clone();
            update
                .apply_adjustment(amount, OverdraftPolicy::Forbid)
                .unwrap();
            writers.push(update);
        }

        let handles: Vec<_> = writers
            .iter()
            .cloned()
            .map(|update| {
                let store = store.clone();
                tokio::spawn(async move { store.update_balance(&update).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = AccountStore::find_by_id(&store, &account.id).await.unwrap();
        assert!(
            writers.iter().any(|w| w.balance() == stored.balance()
                && w.updated_at() == stored.updated_at()),
            "stored balance {} was not written by any writer",
            stored.balance()
        );
        assert_ne!(stored.balance(), Balance::ZERO);
    }

    #[tokio::test]
    async fn test_rocksdb_invoice_store() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        let card = CreditCard {
            number: "5555 4444 3333 1111".to_string(),
            ..Default::default()
        };

        let mut first = Invoice::new("acc-1", dec!(10), "first", "credit_card", &card).unwrap();
        let second = Invoice::new("acc-1", dec!(20), "second", "credit_card", &card).unwrap();
        let other = Invoice::new("acc-2", dec!(30), "other", "credit_card", &card).unwrap();
        for invoice in [&first, &second, &other] {
            InvoiceStore::save(&store, invoice).await.unwrap();
        }

        let listed = store.find_by_account_id("acc-1").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].created_at <= listed[1].created_at);
        assert!(store.find_by_account_id("acc-9").await.unwrap().is_empty());

        first.process().unwrap();
        store.update_status(&first).await.unwrap();
        let stored = InvoiceStore::find_by_id(&store, &first.id).await.unwrap();
        assert_eq!(stored.status, first.status);
        assert_ne!(stored.status, InvoiceStatus::Pending);

        let ghost = Invoice::new("acc-1", dec!(1), "", "credit_card", &card).unwrap();
        assert!(matches!(
            store.update_status(&ghost).await,
            Err(GatewayError::InvoiceNotFound)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_rocksdb_transition_status_has_one_winner() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        let card = CreditCard {
            number: "4000 0000 0000 0002".to_string(),
            ..Default::default()
        };
        let pending = Invoice::new("acc-1", dec!(10), "", "credit_card", &card).unwrap();
        InvoiceStore::save(&store, &pending).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                let mut decided = pending.clone();
                decided.status = if i % 2 == 0 {
                    InvoiceStatus::Approved
                } else {
                    InvoiceStatus::Rejected
                };
                tokio::spawn(async move {
                    let won = store
                        .transition_status(&decided, InvoiceStatus::Pending)
                        .await?;
                    Ok::<_, GatewayError>(won.then_some(decided.status))
                })
            })
            .collect();

        let mut winners = Vec::new();
        for handle in handles {
            if let Some(status) = handle.await.unwrap().unwrap() {
                winners.push(status);
            }
        }
        assert_eq!(winners.len(), 1);
        let stored = InvoiceStore::find_by_id(&store, &pending.id).await.unwrap();
        assert_eq!(stored.status, winners[0]);
    }
}
