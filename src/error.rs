use crate::domain::invoice::InvoiceStatus;
use thiserror::Error;

/// Result type alias used across the gateway.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Coarse failure categories exposed to callers.
///
/// An outer adapter (HTTP, CLI) maps these to its own status codes; every
/// [`GatewayError`] belongs to exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    DuplicateKey,
    InvalidInput,
    InvalidStatus,
    Unauthorized,
    Internal,
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("account not found")]
    AccountNotFound,
    #[error("invoice not found")]
    InvoiceNotFound,
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
    #[error("invalid amount")]
    InvalidAmount,
    #[error("invalid account ID")]
    InvalidAccountId,
    #[error("invalid card number")]
    InvalidCard,
    #[error("account name must not be empty")]
    InvalidName,
    #[error("invalid email address")]
    InvalidEmail,
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("invalid status transition from {current} to {requested}")]
    InvalidStatus {
        current: InvoiceStatus,
        requested: InvoiceStatus,
    },
    #[error("invoice is already {0}")]
    AlreadyProcessed(InvoiceStatus),
    #[error("invoice {invoice_id} is approved but crediting the account failed: {source}")]
    CreditFailed {
        invoice_id: String,
        #[source]
        source: Box<GatewayError>,
    },
    #[error("unauthorized access")]
    Unauthorized,
    #[error("internal error: {0}")]
    InternalError(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::AccountNotFound | GatewayError::InvoiceNotFound => ErrorKind::NotFound,
            GatewayError::DuplicateKey(_) => ErrorKind::DuplicateKey,
            GatewayError::InvalidAmount
            | GatewayError::InvalidAccountId
            | GatewayError::InvalidCard
            | GatewayError::InvalidName
            | GatewayError::InvalidEmail
            | GatewayError::InsufficientFunds => ErrorKind::InvalidInput,
            GatewayError::InvalidStatus { .. } | GatewayError::AlreadyProcessed(_) => {
                ErrorKind::InvalidStatus
            }
            GatewayError::Unauthorized => ErrorKind::Unauthorized,
            GatewayError::CreditFailed { .. } | GatewayError::InternalError(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Wraps an arbitrary backend failure without altering it.
    pub fn internal<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        GatewayError::InternalError(err.into())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::InternalError(Box::new(err))
    }
}

impl From<tokio::task::JoinError> for GatewayError {
    fn from(err: tokio::task::JoinError) -> Self {
        GatewayError::InternalError(Box::new(err))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for GatewayError {
    fn from(err: rocksdb::Error) -> Self {
        GatewayError::InternalError(Box::new(err))
    }
}

#[cfg(feature = "storage-postgres")]
impl From<sqlx::Error> for GatewayError {
    fn from(err: sqlx::Error) -> Self {
        GatewayError::InternalError(Box::new(err))
    }
}
