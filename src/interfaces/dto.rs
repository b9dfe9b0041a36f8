use crate::application::invoice_service::NewInvoice;
use crate::domain::account::Account;
use crate::domain::invoice::{CreditCard, Invoice, InvoiceStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountOutput {
    pub id: String,
    pub name: String,
    pub email: String,
    pub balance: Decimal,
    /// Omitted from the JSON when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccountOutput {
    /// Same output with the API key left out.
    pub fn without_api_key(mut self) -> Self {
        self.api_key.clear();
        self
    }
}

impl From<&Account> for AccountOutput {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.clone(),
            name: account.name.clone(),
            email: account.email.clone(),
            balance: account.balance().value(),
            api_key: account.api_key.as_str().to_string(),
            created_at: account.created_at,
            updated_at: account.updated_at(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CardInput {
    pub number: String,
    pub cvv: String,
    pub expiry_month: u32,
    pub expiry_year: u32,
    pub cardholder_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateInvoiceInput {
    pub amount: Decimal,
    #[serde(default)]
    pub description: String,
    pub payment_type: String,
    pub card: CardInput,
}

impl From<CreateInvoiceInput> for NewInvoice {
    fn from(input: CreateInvoiceInput) -> Self {
        NewInvoice {
            amount: input.amount,
            description: input.description,
            payment_type: input.payment_type,
            card: CreditCard {
                number: input.card.number,
                cvv: input.card.cvv,
                expiry_month: input.card.expiry_month,
                expiry_year: input.card.expiry_year,
                cardholder_name: input.card.cardholder_name,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceOutput {
    pub id: String,
    pub account_id: String,
    pub amount: Decimal,
    pub status: InvoiceStatus,
    pub description: String,
    pub payment_type: String,
    pub card_last_digits: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Invoice> for InvoiceOutput {
    fn from(invoice: &Invoice) -> Self {
        Self {
            id: invoice.id.clone(),
            account_id: invoice.account_id.clone(),
            amount: invoice.amount.value(),
            status: invoice.status,
            description: invoice.description.clone(),
            payment_type: invoice.payment_type.clone(),
            card_last_digits: invoice.card_last_digits.clone(),
            created_at: invoice.created_at,
            updated_at: invoice.updated_at,
        }
    }
}
