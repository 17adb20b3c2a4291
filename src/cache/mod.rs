//! Namespaced response cache and the strategies that read and fill it.
//!
//! This module provides:
//! - A `CacheStore` trait over named namespaces of response snapshots
//! - SQLite, in-memory and no-op stores
//! - `CacheLayer`, running cache-first, network-first and
//!   stale-while-revalidate against a store and the network

mod layer;
mod memory;
mod storage;
mod traits;

pub use layer::{CacheLayer, Namespaces};
pub use memory::MemoryStore;
pub use storage::{NoopStore, SqliteStore};
pub use traits::CacheStore;
