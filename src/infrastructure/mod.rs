//! Adapters behind the domain ports: payment repositories and the in-process
//! simulated gateway.

pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod simulated;
