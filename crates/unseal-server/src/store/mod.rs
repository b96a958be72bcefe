//! Record storage: a key-value layer with per-key expiry.
//!
//! Backends know nothing about read counts. Callers that need an atomic
//! read-modify-write must serialize on the key themselves (see
//! [`crate::locks::KeyLocks`]).

pub mod db;
pub mod memory;
pub mod model;

use anyhow::Result;

pub use db::RedbStore;
pub use memory::MemoryStore;
pub use model::SecretRecord;

/// Time left before a key expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// The key has no expiry.
    Persistent,
    /// Seconds left, rounded up. Never 0 for a live key.
    Remaining(u64),
}

impl Ttl {
    pub fn as_secs(self) -> Option<u64> {
        match self {
            Ttl::Persistent => None,
            Ttl::Remaining(secs) => Some(secs),
        }
    }
}

pub trait SecretStore: Send + Sync + 'static {
    /// Insert or overwrite `id`. With `ttl_seconds`, the key expires after that
    /// many seconds; without, it persists until deleted.
    fn put(&self, id: &str, record: &SecretRecord, ttl_seconds: Option<u64>) -> Result<()>;

    /// Fetch a live record. Expired keys read as absent.
    fn get(&self, id: &str) -> Result<Option<SecretRecord>>;

    /// Expiry state of `id`, or `None` if the key is absent or expired.
    fn remaining_ttl(&self, id: &str) -> Result<Option<Ttl>>;

    /// Remove `id`. Returns true if a live record was removed.
    fn delete(&self, id: &str) -> Result<bool>;

    /// Overwrite a live record, applying `ttl_seconds` as its new expiry
    /// window. Returns false without writing if the key is absent or expired.
    fn replace(&self, id: &str, record: &SecretRecord, ttl_seconds: Option<u64>) -> Result<bool>;

    /// Remove every expired key. Returns how many were removed.
    fn prune_expired(&self) -> Result<usize>;
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Round a millisecond span up to whole seconds.
pub(crate) fn ceil_secs(millis: i64) -> u64 {
    (millis.max(0) as u64).div_ceil(1000)
}

/// Spawn a background Tokio task that calls `prune_expired()` every `interval`.
pub fn spawn_sweep(store: std::sync::Arc<dyn SecretStore>, interval: std::time::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // skip first immediate tick
        loop {
            ticker.tick().await;
            if let Err(e) = store.prune_expired() {
                tracing::warn!(error = %e, "background sweep error");
            }
        }
    });
}
