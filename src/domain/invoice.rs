use crate::domain::money::Amount;
use crate::error::{GatewayError, Result};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Invoices above this amount wait for manual review instead of being decided
/// automatically.
pub const MANUAL_REVIEW_THRESHOLD: Decimal = dec!(1000);

/// Probability that an automatically decided invoice is approved.
pub const APPROVAL_PROBABILITY: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Pending,
    Approved,
    Rejected,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Approved => "approved",
            InvoiceStatus::Rejected => "rejected",
        }
    }

    /// Approved and rejected are the outcomes of processing.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, InvoiceStatus::Pending)
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = GatewayError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InvoiceStatus::Pending),
            "approved" => Ok(InvoiceStatus::Approved),
            "rejected" => Ok(InvoiceStatus::Rejected),
            other => Err(GatewayError::internal(format!(
                "unknown invoice status {other:?}"
            ))),
        }
    }
}

/// Card details presented with a payment.
///
/// Only the last four digits survive into an [`Invoice`]; the card itself is never
/// stored or serialized, and its `Debug` output is masked.
#[derive(Clone, Default)]
pub struct CreditCard {
    pub number: String,
    pub cvv: String,
    pub expiry_month: u32,
    pub expiry_year: u32,
    pub cardholder_name: String,
}

impl CreditCard {
    /// Last four digits of the card number, ignoring spaces and hyphens.
    pub fn last_digits(&self) -> Result<String> {
        let digits: Vec<char> = self
            .number
            .chars()
            .filter(|c| !matches!(c, ' ' | '-'))
            .collect();
        if digits.len() < 4 || !digits.iter().all(|c| c.is_ascii_digit()) {
            return Err(GatewayError::InvalidCard);
        }
        Ok(digits[digits.len() - 4..].iter().collect())
    }
}

impl fmt::Debug for CreditCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let masked = self
            .last_digits()
            .map(|last| format!("**** {last}"))
            .unwrap_or_else(|_| "****".to_string());
        f.debug_struct("CreditCard")
            .field("number", &masked)
            .field("cvv", &"***")
            .field("expiry_month", &self.expiry_month)
            .field("expiry_year", &self.expiry_year)
            .field("cardholder_name", &self.cardholder_name)
            .finish()
    }
}

/// One charge attempt against an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub account_id: String,
    pub amount: Amount,
    pub status: InvoiceStatus,
    pub description: String,
    pub payment_type: String,
    pub card_last_digits: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Creates a pending invoice.
    ///
    /// Checks run in order: amount, account id, card.
    pub fn new(
        account_id: &str,
        amount: Decimal,
        description: &str,
        payment_type: &str,
        card: &CreditCard,
    ) -> Result<Self> {
        let amount = Amount::new(amount)?;
        if account_id.trim().is_empty() {
            return Err(GatewayError::InvalidAccountId);
        }
        let card_last_digits = card.last_digits()?;

        let now = Utc::now();
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            amount,
            status: InvoiceStatus::Pending,
            description: description.to_string(),
            payment_type: payment_type.to_string(),
            card_last_digits,
            created_at: now,
            updated_at: now,
        })
    }

    /// Decides a pending invoice.
    ///
    /// Amounts above [`MANUAL_REVIEW_THRESHOLD`] stay pending. Anything else is
    /// approved with [`APPROVAL_PROBABILITY`], using a generator freshly seeded
    /// from OS entropy on every call.
    pub fn process(&mut self) -> Result<InvoiceStatus> {
        let mut rng = StdRng::from_entropy();
        self.process_with(&mut rng)
    }

    /// Same as [`Invoice::process`] with a caller-supplied generator.
    pub fn process_with<R: Rng>(&mut self, rng: &mut R) -> Result<InvoiceStatus> {
        if self.status.is_terminal() {
            return Err(GatewayError::AlreadyProcessed(self.status));
        }
        if self.amount.value() > MANUAL_REVIEW_THRESHOLD {
            return Ok(self.status);
        }

        self.status = if rng.gen_bool(APPROVAL_PROBABILITY) {
            InvoiceStatus::Approved
        } else {
            InvoiceStatus::Rejected
        };
        self.updated_at = Utc::now();
        Ok(self.status)
    }

    /// Puts the invoice back to pending, refreshing `updated_at`.
    ///
    /// This is not a general transition API: approved and rejected are only
    /// reachable through [`Invoice::process`].
    pub fn update_status(&mut self, new_status: InvoiceStatus) -> Result<()> {
        if new_status != InvoiceStatus::Pending {
            return Err(GatewayError::InvalidStatus {
                current: self.status,
                requested: new_status,
            });
        }

        self.status = new_status;
        self.updated_at = Utc::now();
        Ok(())
    }
}
