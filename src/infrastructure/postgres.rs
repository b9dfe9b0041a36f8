//! Postgres-backed account and invoice stores.
//!
//! ## Error Mapping
//!
//! | SQLx error | SQLSTATE | GatewayError |
//! |------------|----------|--------------|
//! | Database (unique violation) | `23505` | `DuplicateKey` |
//! | Anything else | any | `InternalError`, unchanged |
//!
//! Missing rows are reported as `AccountNotFound` / `InvoiceNotFound`.
//!
//! ## Balance updates
//!
//! `update_balance` opens a transaction, locks the row with `SELECT ... FOR UPDATE`,
//! writes the new balance and commits. A `sqlx::Transaction` that is dropped before
//! `commit` rolls back, so every early return (including `?`) releases the lock and
//! discards partial writes. `transition_status` follows the same shape on the
//! invoice row and only writes when the locked row still has the expected status.

use crate::domain::account::{Account, ApiKey};
use crate::domain::invoice::{Invoice, InvoiceStatus};
use crate::domain::money::{Amount, Balance};
use crate::domain::ports::{AccountStore, InvoiceStore};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use tracing::{debug, instrument};

/// Schema applied by [`PostgresStore::migrate`].
pub const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const ACCOUNT_COLUMNS: &str = "id, name, email, api_key, balance, created_at, updated_at";
const INVOICE_COLUMNS: &str = "id, account_id, amount, status, description, payment_type, card_last_digits, created_at, updated_at";

/// Account and invoice stores sharing one connection pool.
///
/// `Clone` is cheap: `PgPool` is reference-counted.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the tables if they don't exist yet.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

fn map_insert_error(table: &str, err: sqlx::Error) -> GatewayError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            let constraint = db_err.constraint().unwrap_or(table);
            return GatewayError::DuplicateKey(constraint.to_string());
        }
    }
    err.into()
}

fn account_from_row(row: &PgRow) -> Result<Account> {
    Ok(Account::restore(
        row.try_get("id")?,
        row.try_get("name")?,
        row.try_get("email")?,
        ApiKey::from(row.try_get::<String, _>("api_key")?),
        Balance::new(row.try_get("balance")?),
        row.try_get("created_at")?,
        row.try_get("updated_at")?,
    ))
}

fn invoice_from_row(row: &PgRow) -> Result<Invoice> {
    let status: String = row.try_get("status")?;
    Ok(Invoice {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        amount: Amount::new(row.try_get("amount")?)?,
        status: status.parse::<InvoiceStatus>()?,
        description: row.try_get("description")?,
        payment_type: row.try_get("payment_type")?,
        card_last_digits: row.try_get("card_last_digits")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl AccountStore for PostgresStore {
    #[instrument(skip_all, fields(account_id = %account.id))]
    async fn save(&self, account: &Account) -> Result<()> {
        sqlx::query(
            "INSERT INTO accounts (id, name, email, api_key, balance, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&account.id)
        .bind(&account.name)
        .bind(&account.email)
        .bind(account.api_key.as_str())
        .bind(account.balance().value())
        .bind(account.created_at)
        .bind(account.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error("accounts", e))?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Account> {
        let row = sqlx::query(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(GatewayError::AccountNotFound)?;
        account_from_row(&row)
    }

    async fn find_by_api_key(&self, api_key: &str) -> Result<Account> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE api_key = $1"
        ))
        .bind(api_key)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(GatewayError::AccountNotFound)?;
        account_from_row(&row)
    }

    #[instrument(skip_all, fields(account_id = %account.id))]
    async fn update_balance(&self, account: &Account) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Blocks until any other transaction holding this row commits or rolls back.
        let locked = sqlx::query("SELECT balance FROM accounts WHERE id = $1 FOR UPDATE")
            .bind(&account.id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            tx.rollback().await?;
            return Err(GatewayError::AccountNotFound);
        }

        sqlx::query("UPDATE accounts SET balance = $1, updated_at = $2 WHERE id = $3")
            .bind(account.balance().value())
            .bind(account.updated_at())
            .bind(&account.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(balance = %account.balance(), "balance committed");
        Ok(())
    }
}

#[async_trait]
impl InvoiceStore for PostgresStore {
    #[instrument(skip_all, fields(invoice_id = %invoice.id))]
    async fn save(&self, invoice: &Invoice) -> Result<()> {
        sqlx::query(
            "INSERT INTO invoices (id, account_id, amount, status, description, payment_type, \
             card_last_digits, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&invoice.id)
        .bind(&invoice.account_id)
        .bind(invoice.amount.value())
        .bind(invoice.status.as_str())
        .bind(&invoice.description)
        .bind(&invoice.payment_type)
        .bind(&invoice.card_last_digits)
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error("invoices", e))?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Invoice> {
        let row = sqlx::query(&format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(GatewayError::InvoiceNotFound)?;
        invoice_from_row(&row)
    }

    async fn find_by_account_id(&self, account_id: &str) -> Result<Vec<Invoice>> {
        let rows = sqlx::query(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE account_id = $1 ORDER BY created_at, id"
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(invoice_from_row).collect()
    }

    #[instrument(skip_all, fields(invoice_id = %invoice.id, status = %invoice.status))]
    async fn update_status(&self, invoice: &Invoice) -> Result<()> {
        let result = sqlx::query("UPDATE invoices SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(invoice.status.as_str())
            .bind(invoice.updated_at)
            .bind(&invoice.id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(GatewayError::InvoiceNotFound);
        }
        Ok(())
    }

    #[instrument(skip_all, fields(invoice_id = %invoice.id, status = %invoice.status))]
    async fn transition_status(&self, invoice: &Invoice, from: InvoiceStatus) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT status FROM invoices WHERE id = $1 FOR UPDATE")
            .bind(&invoice.id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            tx.rollback().await?;
            return Err(GatewayError::InvoiceNotFound);
        };
        let current: String = row.try_get("status")?;
        if current.parse::<InvoiceStatus>()? != from {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("UPDATE invoices SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(invoice.status.as_str())
            .bind(invoice.updated_at)
            .bind(&invoice.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }
}
