//! Cache storage trait.

use crate::error::Result;
use crate::http::{FetchResponse, RequestKey};

/// Named response stores.
///
/// Mirrors the storage primitives a browser exposes to offline workers: each
/// store is an independent key→response map identified by name. Individual
/// operations are atomic; there are no transactions spanning several calls.
/// All operations are synchronous to match rusqlite's API.
pub trait CacheStorage: Send + Sync {
    /// Open the store `name`, creating it if needed.
    ///
    /// Returns `true` if the store did not exist before.
    fn open(&self, name: &str) -> Result<bool>;

    /// Check whether a store exists.
    fn has(&self, name: &str) -> Result<bool>;

    /// Names of all stores, in creation order.
    fn keys(&self) -> Result<Vec<String>>;

    /// Delete a store and every entry in it.
    ///
    /// Returns `false` if there was no such store.
    fn delete(&self, name: &str) -> Result<bool>;

    /// Look up a request in a store.
    ///
    /// Returns `None` for a missing entry, a missing store, or a key that is
    /// not cacheable.
    fn match_request(&self, name: &str, key: &RequestKey) -> Result<Option<FetchResponse>>;

    /// Store a response, replacing any previous entry for the same key.
    ///
    /// Creates the store if it does not exist.
    fn put(&self, name: &str, key: &RequestKey, response: &FetchResponse) -> Result<()>;

    /// Store several responses at once. Either all are written or none are.
    fn put_all(&self, name: &str, entries: &[(RequestKey, FetchResponse)]) -> Result<()>;

    /// Number of entries in a store (0 if it does not exist).
    fn entry_count(&self, name: &str) -> Result<usize>;
}
