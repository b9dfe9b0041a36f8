use crate::domain::account::{Account, OverdraftPolicy, SharedAccount};
use crate::domain::ports::AccountStoreBox;
use crate::error::Result;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{info, instrument};

/// Orchestrates account creation, lookup and balance changes.
///
/// The service keeps one [`SharedAccount`] per account id with a balance change
/// in flight, so every change made through this process for a given account
/// runs under the same lock. Entries are dropped once the last caller is done. Lock order is always: account lock first, then the
/// store's transaction.
pub struct AccountService {
    store: AccountStoreBox,
    policy: OverdraftPolicy,
    loaded: RwLock<HashMap<String, SharedAccount>>,
}

impl AccountService {
    pub fn new(store: AccountStoreBox, policy: OverdraftPolicy) -> Self {
        Self {
            store,
            policy,
            loaded: RwLock::new(HashMap::new()),
        }
    }

    #[instrument(skip(self), err)]
    pub async fn create_account(&self, name: &str, email: &str) -> Result<Account> {
        let account = Account::new(name, email)?;
        self.store.save(&account).await?;
        info!(account_id = %account.id, "account created");
        Ok(account)
    }

    pub async fn find_by_api_key(&self, api_key: &str) -> Result<Account> {
        self.store.find_by_api_key(api_key).await
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Account> {
        self.store.find_by_id(id).await
    }

    /// Adds a signed `amount` to the balance of the account owning `api_key`.
    #[instrument(skip(self, api_key), err)]
    pub async fn update_balance(&self, api_key: &str, amount: Decimal) -> Result<Account> {
        let account = self.store.find_by_api_key(api_key).await?;
        self.adjust(account, amount).await
    }

    /// Adds a signed `amount` to the balance of account `id`.
    #[instrument(skip(self), err)]
    pub async fn adjust_balance(&self, id: &str, amount: Decimal) -> Result<Account> {
        let account = self.store.find_by_id(id).await?;
        self.adjust(account, amount).await
    }

    async fn shared(&self, account: Account) -> SharedAccount {
        if let Some(shared) = self.loaded.read().await.get(&account.id) {
            return shared.clone();
        }
        let mut loaded = self.loaded.write().await;
        loaded
            .entry(account.id.clone())
            .or_insert_with(|| SharedAccount::new(account, self.policy))
            .clone()
    }

    async fn adjust(&self, account: Account, amount: Decimal) -> Result<Account> {
        let id = account.id.clone();
        let shared = self.shared(account).await;
        let result = self.adjust_locked(&shared, amount).await;
        drop(shared);
        self.release(&id).await;
        result
    }

    async fn adjust_locked(&self, shared: &SharedAccount, amount: Decimal) -> Result<Account> {
        let mut locked = shared.lock().await;

        // Another process may have moved the balance since this instance was loaded.
        let current = self.store.find_by_id(&locked.id).await?;
        locked.sync_balance(&current);

        let previous = locked.clone();
        locked.apply_adjustment(amount, shared.policy())?;
        if let Err(err) = self.store.update_balance(&locked).await {
            *locked = previous;
            return Err(err);
        }

        info!(account_id = %locked.id, balance = %locked.balance(), "balance updated");
        Ok(locked.clone())
    }

    /// Forgets the account's lock once no caller holds it any more. New handles
    /// are only handed out under the map lock, so the check cannot race with one.
    async fn release(&self, id: &str) {
        let mut loaded = self.loaded.write().await;
        if loaded.get(id).is_some_and(SharedAccount::is_unique) {
            loaded.remove(id);
        }
    }
}
