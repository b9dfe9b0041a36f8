use crate::application::account_service::AccountService;
use crate::domain::invoice::{CreditCard, Invoice, InvoiceStatus};
use crate::domain::ports::InvoiceStoreBox;
use crate::error::{GatewayError, Result};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Everything needed to charge an account, minus the account itself.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub amount: Decimal,
    pub description: String,
    pub payment_type: String,
    pub card: CreditCard,
}

/// Orchestrates the invoice lifecycle and credits approved amounts.
pub struct InvoiceService {
    store: InvoiceStoreBox,
    accounts: Arc<AccountService>,
}

impl InvoiceService {
    pub fn new(store: InvoiceStoreBox, accounts: Arc<AccountService>) -> Self {
        Self { store, accounts }
    }

    /// Creates, decides and stores an invoice for `account_id`.
    ///
    /// The invoice is saved before the account is credited, so a crash in
    /// between leaves an approved invoice rather than an unexplained balance.
    #[instrument(skip(self, input), fields(amount = %input.amount), err)]
    pub async fn create_invoice(&self, account_id: &str, input: NewInvoice) -> Result<Invoice> {
        let mut invoice = Invoice::new(
            account_id,
            input.amount,
            &input.description,
            &input.payment_type,
            &input.card,
        )?;
        self.accounts.find_by_id(account_id).await?;

        invoice.process()?;
        self.store.save(&invoice).await?;
        info!(invoice_id = %invoice.id, status = %invoice.status, "invoice created");

        self.credit_if_approved(&invoice).await?;
        Ok(invoice)
    }

    /// Decides a pending invoice and persists the outcome.
    ///
    /// The store only accepts the decision while the invoice is still pending, so
    /// among concurrent callers exactly one wins and only the winner credits the
    /// account. The others get `AlreadyProcessed`.
    #[instrument(skip(self), err)]
    pub async fn process_invoice(&self, id: &str) -> Result<Invoice> {
        let mut invoice = self.store.find_by_id(id).await?;
        let status = invoice.process()?;
        if status == InvoiceStatus::Pending {
            return Ok(invoice);
        }

        if !self
            .store
            .transition_status(&invoice, InvoiceStatus::Pending)
            .await?
        {
            let current = self.store.find_by_id(id).await?;
            return Err(GatewayError::AlreadyProcessed(current.status));
        }
        info!(invoice_id = %invoice.id, %status, "invoice processed");

        self.credit_if_approved(&invoice).await?;
        Ok(invoice)
    }

    /// Puts a pending invoice back in the review queue, refreshing its timestamp.
    ///
    /// Decided invoices are refused: reprocessing an approved one would credit
    /// the account twice.
    #[instrument(skip(self), err)]
    pub async fn reset_invoice(&self, id: &str) -> Result<Invoice> {
        let mut invoice = self.store.find_by_id(id).await?;
        if invoice.status.is_terminal() {
            return Err(GatewayError::InvalidStatus {
                current: invoice.status,
                requested: InvoiceStatus::Pending,
            });
        }
        invoice.update_status(InvoiceStatus::Pending)?;
        if !self
            .store
            .transition_status(&invoice, InvoiceStatus::Pending)
            .await?
        {
            let current = self.store.find_by_id(id).await?;
            return Err(GatewayError::InvalidStatus {
                current: current.status,
                requested: InvoiceStatus::Pending,
            });
        }
        Ok(invoice)
    }

    /// Loads an invoice owned by `account_id`.
    pub async fn get_invoice(&self, id: &str, account_id: &str) -> Result<Invoice> {
        let invoice = self.store.find_by_id(id).await?;
        if invoice.account_id != account_id {
            return Err(GatewayError::Unauthorized);
        }
        Ok(invoice)
    }

    pub async fn list_invoices(&self, account_id: &str) -> Result<Vec<Invoice>> {
        self.store.find_by_account_id(account_id).await
    }

    /// The invoice is already stored as approved here, so a failure is reported
    /// as `CreditFailed` rather than a plain error a caller might retry.
    async fn credit_if_approved(&self, invoice: &Invoice) -> Result<()> {
        if invoice.status != InvoiceStatus::Approved {
            return Ok(());
        }
        if let Err(err) = self
            .accounts
            .adjust_balance(&invoice.account_id, invoice.amount.value())
            .await
        {
            error!(
                invoice_id = %invoice.id,
                account_id = %invoice.account_id,
                error = %err,
                "approved invoice was not credited"
            );
            return Err(GatewayError::CreditFailed {
                invoice_id: invoice.id.clone(),
                source: Box::new(err),
            });
        }
        Ok(())
    }
}
