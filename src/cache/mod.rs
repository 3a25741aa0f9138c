//! Time-to-live read-through cache over a string key-value store.
//!
//! This module provides:
//! - A `KeyValueStore` trait with SQLite, in-memory and no-op backends
//! - Entries stored as a JSON payload plus a companion timestamp key
//! - A `CacheLayer` that serves fresh entries directly and routes misses
//!   through the single-lane request queue

mod entry;
mod layer;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use storage::{KeyValueStore, MemoryStore, NoopStore, SqliteStore};
pub use traits::{CacheKey, CacheResult, CacheSource};
