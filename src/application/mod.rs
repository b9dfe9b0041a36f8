//! Application layer orchestrating entities and stores.
//!
//! [`Gateway`] bundles the two services over a pair of stores; the CLI (or any
//! other adapter) builds one at startup and shares it.

pub mod account_service;
pub mod invoice_service;

use crate::domain::account::OverdraftPolicy;
use crate::domain::ports::{AccountStoreBox, InvoiceStoreBox};
use account_service::AccountService;
use invoice_service::InvoiceService;
use std::sync::Arc;

pub struct Gateway {
    pub accounts: Arc<AccountService>,
    pub invoices: InvoiceService,
}

impl Gateway {
    pub fn new(
        account_store: AccountStoreBox,
        invoice_store: InvoiceStoreBox,
        policy: OverdraftPolicy,
    ) -> Self {
        let accounts = Arc::new(AccountService::new(account_store, policy));
        let invoices = InvoiceService::new(invoice_store, Arc::clone(&accounts));
        Self { accounts, invoices }
    }
}
