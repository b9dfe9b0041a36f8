use crate::domain::account::OverdraftPolicy;
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

/// Default wait for a row lock before a balance write gives up.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Runtime settings shared by every subcommand. Each flag can also come from
/// the environment.
#[derive(Args, Debug, Clone)]
pub struct Config {
    /// Postgres connection string. Takes precedence over --db-path.
    #[arg(long, env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "GATEWAY_DB_PATH", global = true)]
    pub db_path: Option<PathBuf>,

    /// Milliseconds a balance write waits for a row lock.
    #[arg(long, env = "GATEWAY_LOCK_TIMEOUT_MS", default_value_t = DEFAULT_LOCK_TIMEOUT_MS, global = true)]
    pub lock_timeout_ms: u64,

    /// Size of the Postgres connection pool.
    #[arg(long, env = "GATEWAY_MAX_CONNECTIONS", default_value_t = DEFAULT_MAX_CONNECTIONS, global = true)]
    pub max_connections: u32,

    /// Let debits take balances below zero.
    #[arg(long, env = "GATEWAY_ALLOW_OVERDRAFT", global = true)]
    pub allow_overdraft: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Which storage backend the configuration asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Postgres(String),
    RocksDB(PathBuf),
    InMemory,
}

impl Config {
    pub fn backend(&self) -> Backend {
        if let Some(url) = &self.database_url {
            Backend::Postgres(url.clone())
        } else if let Some(path) = &self.db_path {
            Backend::RocksDB(path.clone())
        } else {
            Backend::InMemory
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn overdraft_policy(&self) -> OverdraftPolicy {
        if self.allow_overdraft {
            OverdraftPolicy::Allow
        } else {
            OverdraftPolicy::Forbid
        }
    }
}
