//! Entities, value objects and the storage ports they are persisted through.

pub mod account;
pub mod invoice;
pub mod money;
pub mod ports;
