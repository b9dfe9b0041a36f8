#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::Path;
use std::process::Command;
use std::str::FromStr;
use tempfile::tempdir;

fn run(db_path: &Path, args: &[&str]) -> serde_json::Value {
    let output = Command::new(cargo_bin!("payment-gateway"))
        .env_remove("DATABASE_URL")
        .env_remove("GATEWAY_API_KEY")
        .arg("--db-path")
        .arg(db_path)
        .args(args)
        .output()
        .expect("Failed to execute command");
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

fn balance(account: &serde_json::Value) -> Decimal {
    Decimal::from_str(account["balance"].as_str().unwrap()).unwrap()
}

#[test]
fn test_rocksdb_persistence_recovery() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    // 1. First run: create the account
    let created = run(
        &db_path,
        &["create-account", "--name", "Acme", "--email", "billing@acme.test"],
    );
    let api_key = created["api_key"].as_str().unwrap().to_string();

    // 2. Separate runs against the same DB path accumulate
    run(&db_path, &["credit", "--api-key", &api_key, "--amount", "100.00"]);
    let account = run(&db_path, &["credit", "--api-key", &api_key, "--amount", "50.00"]);
    assert_eq!(balance(&account), dec!(150));

    let account = run(&db_path, &["show-account", "--api-key", &api_key]);
    assert_eq!(balance(&account), dec!(150));
    assert_eq!(account["id"], created["id"]);
    assert!(account.get("api_key").is_none());
}

#[test]
fn test_rocksdb_invoices_survive_restarts() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    let created = run(
        &db_path,
        &["create-account", "--name", "Acme", "--email", "billing@acme.test"],
    );
    let api_key = created["api_key"].as_str().unwrap().to_string();

    // Above the review threshold, so the outcome is deterministic.
    let invoice = run(
        &db_path,
        &[
            "create-invoice",
            "--api-key",
            &api_key,
            "--amount",
            "1500.00",
            "--card-number",
            "4111111111111111",
        ],
    );
    assert_eq!(invoice["status"], "pending");
    assert_eq!(invoice["card_last_digits"], "1111");

    let listed = run(&db_path, &["list-invoices", "--api-key", &api_key]);
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["id"], invoice["id"]);

    let account = run(&db_path, &["show-account", "--api-key", &api_key]);
    assert_eq!(balance(&account), Decimal::ZERO);
}
