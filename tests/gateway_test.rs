mod common;

use common::{charge, in_memory_gateway};
use payment_gateway::domain::account::OverdraftPolicy;
use payment_gateway::domain::invoice::InvoiceStatus;
use payment_gateway::domain::money::Balance;
use payment_gateway::error::{ErrorKind, GatewayError};
use payment_gateway::interfaces::auth::Authenticator;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_invoices_credit_exactly_the_approved_total() {
    let gateway = Arc::new(in_memory_gateway(OverdraftPolicy::Forbid));
    let account = gateway
        .accounts
        .create_account("Acme", "billing@acme.test")
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 1..=100u32 {
        let gateway = Arc::clone(&gateway);
        let account_id = account.id.clone();
        handles.push(tokio::spawn(async move {
            gateway
                .invoices
                .create_invoice(&account_id, charge(Decimal::from(i)))
                .await
        }));
    }

    let mut approved = Decimal::ZERO;
    for handle in handles {
        let invoice = handle.await.unwrap().unwrap();
        if invoice.status == InvoiceStatus::Approved {
            approved += invoice.amount.value();
        }
    }

    let account = gateway.accounts.find_by_id(&account.id).await.unwrap();
    assert_eq!(account.balance(), Balance::new(approved));

    let invoices = gateway.invoices.list_invoices(&account.id).await.unwrap();
    assert_eq!(invoices.len(), 100);
    let listed_total: Decimal = invoices
        .iter()
        .filter(|invoice| invoice.status == InvoiceStatus::Approved)
        .map(|invoice| invoice.amount.value())
        .sum();
    assert_eq!(listed_total, approved);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_debits_never_overdraw() {
    let gateway = Arc::new(in_memory_gateway(OverdraftPolicy::Forbid));
    let account = gateway
        .accounts
        .create_account("Acme", "billing@acme.test")
        .await
        .unwrap();
    gateway
        .accounts
        .update_balance(account.api_key.as_str(), dec!(10))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..50 {
        let gateway = Arc::clone(&gateway);
        let api_key = account.api_key.as_str().to_string();
        handles.push(tokio::spawn(async move {
            gateway.accounts.update_balance(&api_key, dec!(-1)).await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(GatewayError::InsufficientFunds) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(succeeded, 10);
    let account = gateway.accounts.find_by_id(&account.id).await.unwrap();
    assert_eq!(account.balance(), Balance::ZERO);
}

#[tokio::test]
async fn test_accounts_do_not_share_balances() {
    let gateway = in_memory_gateway(OverdraftPolicy::Forbid);
    let first = gateway
        .accounts
        .create_account("First", "first@example.com")
        .await
        .unwrap();
    let second = gateway
        .accounts
        .create_account("Second", "second@example.com")
        .await
        .unwrap();
    assert_ne!(first.api_key, second.api_key);

    gateway
        .accounts
        .update_balance(first.api_key.as_str(), dec!(42.42))
        .await
        .unwrap();

    let first = gateway.accounts.find_by_id(&first.id).await.unwrap();
    let second = gateway.accounts.find_by_id(&second.id).await.unwrap();
    assert_eq!(first.balance(), Balance::new(dec!(42.42)));
    assert_eq!(second.balance(), Balance::ZERO);
}

#[tokio::test]
async fn test_authenticated_invoice_lifecycle() {
    let gateway = in_memory_gateway(OverdraftPolicy::Forbid);
    let auth = Authenticator::new(Arc::clone(&gateway.accounts));
    let created = gateway
        .accounts
        .create_account("Acme", "billing@acme.test")
        .await
        .unwrap();

    let account = auth
        .authenticate(Some(created.api_key.as_str()))
        .await
        .unwrap();
    let invoice = gateway
        .invoices
        .create_invoice(&account.id, charge(dec!(2500)))
        .await
        .unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Pending);
    assert_eq!(invoice.card_last_digits, "4444");

    let fetched = gateway
        .invoices
        .get_invoice(&invoice.id, &account.id)
        .await
        .unwrap();
    assert_eq!(fetched, invoice);

    let err = auth.authenticate(Some("wrong")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[tokio::test]
async fn test_error_kinds_reach_callers() {
    let gateway = in_memory_gateway(OverdraftPolicy::Forbid);

    let err = gateway
        .accounts
        .create_account("Acme", "no-at-sign")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = gateway.invoices.process_invoice("missing").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let account = gateway
        .accounts
        .create_account("Acme", "billing@acme.test")
        .await
        .unwrap();
    let mut bad_card = charge(dec!(5));
    bad_card.card.number = "12a4".to_string();
    let err = gateway
        .invoices
        .create_invoice(&account.id, bad_card)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::InvalidCard));
}
