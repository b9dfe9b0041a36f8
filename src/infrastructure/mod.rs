//! Storage adapters implementing the domain ports.

pub mod in_memory;
#[cfg(feature = "storage-postgres")]
pub mod postgres;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
