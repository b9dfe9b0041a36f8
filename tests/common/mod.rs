#![allow(dead_code)]

use payment_gateway::application::Gateway;
use payment_gateway::application::invoice_service::NewInvoice;
use payment_gateway::domain::account::OverdraftPolicy;
use payment_gateway::domain::invoice::CreditCard;
use payment_gateway::infrastructure::in_memory::{InMemoryAccountStore, InMemoryInvoiceStore};
use rust_decimal::Decimal;

pub fn in_memory_gateway(policy: OverdraftPolicy) -> Gateway {
    Gateway::new(
        Box::new(InMemoryAccountStore::new()),
        Box::new(InMemoryInvoiceStore::new()),
        policy,
    )
}

pub fn card() -> CreditCard {
    CreditCard {
        number: "5555 5555 5555 4444".to_string(),
        cvv: "737".to_string(),
        expiry_month: 3,
        expiry_year: 2030,
        cardholder_name: "Ada Lovelace".to_string(),
    }
}

pub fn charge(amount: Decimal) -> NewInvoice {
    NewInvoice {
        amount,
        description: "Order".to_string(),
        payment_type: "credit_card".to_string(),
        card: card(),
    }
}
