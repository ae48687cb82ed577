//! Named response stores.
//!
//! A cache store maps request identities to complete responses. Stores are
//! named after the cache version that owns them, so retiring a version is a
//! matter of deleting its store. All stores share a single SQLite database.

mod sqlite;
mod traits;

pub use sqlite::SqliteCacheStorage;
pub use traits::CacheStorage;
