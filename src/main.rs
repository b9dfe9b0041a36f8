use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use payment_gateway::application::Gateway;
use payment_gateway::config::{Backend, Config};
use payment_gateway::domain::ports::{AccountStoreBox, InvoiceStoreBox};
use payment_gateway::infrastructure::in_memory::{InMemoryAccountStore, InMemoryInvoiceStore};
use payment_gateway::interfaces::auth::Authenticator;
use payment_gateway::interfaces::dto::{
    AccountOutput, CardInput, CreateInvoiceInput, InvoiceOutput,
};
use payment_gateway::telemetry;
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::Path;
use tracing::warn;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a merchant account and print its API key
    CreateAccount {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
    /// Show the account owning an API key
    ShowAccount {
        #[arg(long, env = "GATEWAY_API_KEY")]
        api_key: String,
    },
    /// Add a signed amount to an account balance
    Credit {
        #[arg(long, env = "GATEWAY_API_KEY")]
        api_key: String,
        #[arg(long, allow_negative_numbers = true)]
        amount: Decimal,
    },
    /// Charge a card and credit the account if approved
    CreateInvoice {
        #[arg(long, env = "GATEWAY_API_KEY")]
        api_key: String,
        #[arg(long, allow_negative_numbers = true)]
        amount: Decimal,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "credit_card")]
        payment_type: String,
        #[arg(long)]
        card_number: String,
        #[arg(long, default_value = "")]
        cvv: String,
        #[arg(long, default_value_t = 1)]
        expiry_month: u32,
        #[arg(long, default_value_t = 2099)]
        expiry_year: u32,
        #[arg(long, default_value = "")]
        cardholder_name: String,
    },
    /// Show one invoice of the authenticated account
    GetInvoice {
        #[arg(long, env = "GATEWAY_API_KEY")]
        api_key: String,
        #[arg(long)]
        id: String,
    },
    /// Decide a pending invoice
    ProcessInvoice {
        #[arg(long, env = "GATEWAY_API_KEY")]
        api_key: String,
        #[arg(long)]
        id: String,
    },
    /// Put a pending invoice back in the review queue
    ResetInvoice {
        #[arg(long, env = "GATEWAY_API_KEY")]
        api_key: String,
        #[arg(long)]
        id: String,
    },
    /// List the invoices of the authenticated account
    ListInvoices {
        #[arg(long, env = "GATEWAY_API_KEY")]
        api_key: String,
    },
    /// Create the Postgres schema
    Migrate,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

fn in_memory_stores() -> (AccountStoreBox, InvoiceStoreBox) {
    let accounts: AccountStoreBox = Box::new(InMemoryAccountStore::new());
    let invoices: InvoiceStoreBox = Box::new(InMemoryInvoiceStore::new());
    (accounts, invoices)
}

#[cfg(feature = "storage-postgres")]
async fn postgres_stores(url: &str, config: &Config) -> Result<(AccountStoreBox, InvoiceStoreBox)> {
    use payment_gateway::infrastructure::postgres::PostgresStore;
    let store = PostgresStore::connect(url, config.max_connections)
        .await
        .into_diagnostic()?;
    let accounts: AccountStoreBox = Box::new(store.clone());
    let invoices: InvoiceStoreBox = Box::new(store);
    Ok((accounts, invoices))
}

#[cfg(not(feature = "storage-postgres"))]
async fn postgres_stores(_url: &str, _config: &Config) -> Result<(AccountStoreBox, InvoiceStoreBox)> {
    warn!(
        "Postgres storage requested via --database-url, but 'storage-postgres' feature is not enabled. Falling back to In-Memory storage."
    );
    Ok(in_memory_stores())
}

#[cfg(feature = "storage-rocksdb")]
fn rocksdb_stores(path: &Path, config: &Config) -> Result<(AccountStoreBox, InvoiceStoreBox)> {
    use payment_gateway::infrastructure::rocksdb::RocksDBStore;
    let store = RocksDBStore::open(path, config.lock_timeout()).into_diagnostic()?;
    let accounts: AccountStoreBox = Box::new(store.clone());
    let invoices: InvoiceStoreBox = Box::new(store);
    Ok((accounts, invoices))
}

#[cfg(not(feature = "storage-rocksdb"))]
fn rocksdb_stores(_path: &Path, _config: &Config) -> Result<(AccountStoreBox, InvoiceStoreBox)> {
    warn!(
        "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
    );
    Ok(in_memory_stores())
}

async fn open_stores(config: &Config) -> Result<(AccountStoreBox, InvoiceStoreBox)> {
    match config.backend() {
        Backend::Postgres(url) => postgres_stores(&url, config).await,
        Backend::RocksDB(path) => rocksdb_stores(&path, config),
        Backend::InMemory => Ok(in_memory_stores()),
    }
}

#[cfg(feature = "storage-postgres")]
async fn migrate(config: &Config) -> Result<()> {
    use payment_gateway::infrastructure::postgres::PostgresStore;
    let Backend::Postgres(url) = config.backend() else {
        warn!("migrate only applies to Postgres storage; nothing to do");
        return Ok(());
    };
    let store = PostgresStore::connect(&url, config.max_connections)
        .await
        .into_diagnostic()?;
    store.migrate().await.into_diagnostic()?;
    eprintln!("schema is up to date");
    Ok(())
}

#[cfg(not(feature = "storage-postgres"))]
async fn migrate(_config: &Config) -> Result<()> {
    warn!("migrate needs the 'storage-postgres' feature; nothing to do");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.config.log_json);

    let (account_store, invoice_store) = open_stores(&cli.config).await?;
    let gateway = Gateway::new(account_store, invoice_store, cli.config.overdraft_policy());
    let auth = Authenticator::new(gateway.accounts.clone());

    match cli.command {
        Command::CreateAccount { name, email } => {
            let account = gateway
                .accounts
                .create_account(&name, &email)
                .await
                .into_diagnostic()?;
            print_json(&AccountOutput::from(&account))?;
        }
        Command::ShowAccount { api_key } => {
            let account = auth.authenticate(Some(&api_key)).await.into_diagnostic()?;
            print_json(&AccountOutput::from(&account).without_api_key())?;
        }
        Command::Credit { api_key, amount } => {
            auth.authenticate(Some(&api_key)).await.into_diagnostic()?;
            let account = gateway
                .accounts
                .update_balance(&api_key, amount)
                .await
                .into_diagnostic()?;
            print_json(&AccountOutput::from(&account).without_api_key())?;
        }
        Command::CreateInvoice {
            api_key,
            amount,
            description,
            payment_type,
            card_number,
            cvv,
            expiry_month,
            expiry_year,
            cardholder_name,
        } => {
            let account = auth.authenticate(Some(&api_key)).await.into_diagnostic()?;
            let input = CreateInvoiceInput {
                amount,
                description,
                payment_type,
                card: CardInput {
                    number: card_number,
                    cvv,
                    expiry_month,
                    expiry_year,
                    cardholder_name,
                },
            };
            let invoice = gateway
                .invoices
                .create_invoice(&account.id, input.into())
                .await
                .into_diagnostic()?;
            print_json(&InvoiceOutput::from(&invoice))?;
        }
        Command::GetInvoice { api_key, id } => {
            let account = auth.authenticate(Some(&api_key)).await.into_diagnostic()?;
            let invoice = gateway
                .invoices
                .get_invoice(&id, &account.id)
                .await
                .into_diagnostic()?;
            print_json(&InvoiceOutput::from(&invoice))?;
        }
        Command::ProcessInvoice { api_key, id } => {
            let account = auth.authenticate(Some(&api_key)).await.into_diagnostic()?;
            gateway
                .invoices
                .get_invoice(&id, &account.id)
                .await
                .into_diagnostic()?;
            let invoice = gateway.invoices.process_invoice(&id).await.into_diagnostic()?;
            print_json(&InvoiceOutput::from(&invoice))?;
        }
        Command::ResetInvoice { api_key, id } => {
            let account = auth.authenticate(Some(&api_key)).await.into_diagnostic()?;
            gateway
                .invoices
                .get_invoice(&id, &account.id)
                .await
                .into_diagnostic()?;
            let invoice = gateway.invoices.reset_invoice(&id).await.into_diagnostic()?;
            print_json(&InvoiceOutput::from(&invoice))?;
        }
        Command::ListInvoices { api_key } => {
            let account = auth.authenticate(Some(&api_key)).await.into_diagnostic()?;
            let invoices: Vec<InvoiceOutput> = gateway
                .invoices
                .list_invoices(&account.id)
                .await
                .into_diagnostic()?
                .iter()
                .map(InvoiceOutput::from)
                .collect();
            print_json(&invoices)?;
        }
        Command::Migrate => migrate(&cli.config).await?,
    }

    Ok(())
}
