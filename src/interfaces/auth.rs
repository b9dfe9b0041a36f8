use crate::application::account_service::AccountService;
use crate::domain::account::Account;
use crate::error::{GatewayError, Result};
use std::sync::Arc;

/// Resolves API keys to accounts for every authenticated request.
#[derive(Clone)]
pub struct Authenticator {
    accounts: Arc<AccountService>,
}

impl Authenticator {
    pub fn new(accounts: Arc<AccountService>) -> Self {
        Self { accounts }
    }

    /// Missing, blank or unknown keys all come back as `Unauthorized`; storage
    /// failures pass through untouched.
    pub async fn authenticate(&self, api_key: Option<&str>) -> Result<Account> {
        let api_key = api_key
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(GatewayError::Unauthorized)?;

        match self.accounts.find_by_api_key(api_key).await {
            Err(GatewayError::AccountNotFound) => Err(GatewayError::Unauthorized),
            other => other,
        }
    }
}
