use crate::domain::money::Balance;
use crate::error::{GatewayError, Result};
use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Bytes of entropy behind an API key (hex-encoded to 32 characters).
pub const API_KEY_BYTES: usize = 16;

/// Opaque bearer credential identifying an account.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    /// Draws a fresh key from the operating system's CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; API_KEY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let mut encoded = String::with_capacity(API_KEY_BYTES * 2);
        for byte in bytes {
            let _ = write!(encoded, "{byte:02x}");
        }
        Self(encoded)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ApiKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// Keys stay out of logs and panic messages.
impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// What to do when a debit would leave the balance below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverdraftPolicy {
    /// Reject the adjustment with [`GatewayError::InsufficientFunds`].
    #[default]
    Forbid,
    /// Let the balance go negative.
    Allow,
}

/// A monetary account owned by a merchant.
///
/// `balance` and `updated_at` are private: the only way to change them is
/// [`Account::apply_adjustment`], which needs `&mut self`. Instances shared
/// between tasks go through [`SharedAccount`], so every mutation happens under
/// that instance's lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub email: String,
    pub api_key: ApiKey,
    balance: Balance,
    pub created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Account {
    /// Creates a new account with a zero balance and a freshly generated API key.
    pub fn new(name: &str, email: &str) -> Result<Self> {
        let name = name.trim();
        let email = email.trim();
        if name.is_empty() {
            return Err(GatewayError::InvalidName);
        }
        if email.is_empty() || !email.contains('@') {
            return Err(GatewayError::InvalidEmail);
        }

        let now = Utc::now();
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: email.to_string(),
            api_key: ApiKey::generate(),
            balance: Balance::ZERO,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuilds an account from persisted columns.
    pub fn restore(
        id: String,
        name: String,
        email: String,
        api_key: ApiKey,
        balance: Balance,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            email,
            api_key,
            balance,
            created_at,
            updated_at,
        }
    }

    pub fn balance(&self) -> Balance {
        self.balance
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Adds a signed `delta` to the balance and refreshes `updated_at`.
    ///
    /// On error the account is left untouched.
    pub fn apply_adjustment(&mut self, delta: Decimal, policy: OverdraftPolicy) -> Result<Balance> {
        let next = self
            .balance
            .checked_adjust(delta)
            .ok_or(GatewayError::InvalidAmount)?;
        if policy == OverdraftPolicy::Forbid && next.is_negative() {
            return Err(GatewayError::InsufficientFunds);
        }

        self.balance = next;
        self.updated_at = Utc::now();
        Ok(next)
    }

    /// Copies `balance` and `updated_at` from `source` into this instance.
    pub(crate) fn sync_balance(&mut self, source: &Account) {
        self.balance = source.balance;
        self.updated_at = source.updated_at;
    }
}

/// An [`Account`] behind its own exclusive lock.
///
/// Clones share the same lock and data. Each logical account gets its own lock,
/// so unrelated accounts never contend.
#[derive(Debug, Clone)]
pub struct SharedAccount {
    inner: Arc<Mutex<Account>>,
    policy: OverdraftPolicy,
}

impl SharedAccount {
    pub fn new(account: Account, policy: OverdraftPolicy) -> Self {
        Self {
            inner: Arc::new(Mutex::new(account)),
            policy,
        }
    }

    pub fn policy(&self) -> OverdraftPolicy {
        self.policy
    }

    /// Adjusts the balance while holding the account lock.
    ///
    /// The guard is dropped on every return path, including errors.
    pub async fn add_balance(&self, amount: Decimal) -> Result<Balance> {
        let mut account = self.inner.lock().await;
        account.apply_adjustment(amount, self.policy)
    }

    /// Takes the lock and returns the guard, for callers that must keep other
    /// work (such as a store transaction) inside the critical section.
    pub async fn lock(&self) -> MutexGuard<'_, Account> {
        self.inner.lock().await
    }

    /// True when no other clone of this handle exists.
    pub fn is_unique(&self) -> bool {
        Arc::strong_count(&self.inner) == 1
    }

    /// A consistent copy of the account, taken under the lock.
    pub async fn snapshot(&self) -> Account {
        self.inner.lock().await.clone()
    }
}
