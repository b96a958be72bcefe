//! Secret lifecycle: create records and serve reads under the read-count and
//! expiry policy.
//!
//! `load` is the only multi-step mutation. It runs under a per-id lock so two
//! concurrent reads of a record with one read left resolve to exactly one
//! success and one `NotFound`.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::id;
use crate::locks::KeyLocks;
use crate::store::{SecretRecord, SecretStore};

pub const SECONDS_PER_HOUR: u64 = 3600;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("missing {0}")]
    MissingField(&'static str),
    #[error("invalid {0}")]
    InvalidField(&'static str),
    #[error("secret not found")]
    NotFound,
    /// Store failure. Never retried: a repeated decrement could double-count.
    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

/// Input to [`SecretService::create`]. `0` and `None` both mean "no limit".
#[derive(Debug, Clone, Default)]
pub struct NewSecret {
    pub encrypted: String,
    pub iv: String,
    pub ttl_hours: Option<u32>,
    pub reads: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedSecret {
    pub id: String,
    pub ttl_hours: Option<u32>,
    pub reads: Option<u32>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CreatedSecret {
    /// `expires_at` as an ISO-8601 string with millisecond precision.
    pub fn expires_at_iso(&self) -> Option<String> {
        self.expires_at
            .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSecret {
    pub encrypted: String,
    pub iv: String,
    /// `None` for unlimited records; `Some(0)` on the read that deleted it.
    pub remaining_reads: Option<u32>,
}

/// Share URL for record `id`. Clients append `#<composite key>`.
pub fn share_url(origin: &str, id: &str) -> String {
    format!("{}/unseal/{id}", origin.trim_end_matches('/'))
}

/// `now + secs`, or `None` if that instant is not representable.
fn expiry_after(now: DateTime<Utc>, secs: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(secs).ok()?;
    now.checked_add_signed(chrono::Duration::try_seconds(secs)?)
}

/// Create/load entry point over an injected store.
#[derive(Clone)]
pub struct SecretService {
    store: Arc<dyn SecretStore>,
    locks: Arc<KeyLocks>,
}

impl SecretService {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self {
            store,
            locks: Arc::new(KeyLocks::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn SecretStore> {
        &self.store
    }

    /// Store a new record and return its id and effective limits.
    pub fn create(&self, new: NewSecret) -> Result<CreatedSecret, SecretError> {
        if new.encrypted.is_empty() {
            return Err(SecretError::MissingField("encrypted"));
        }
        if new.iv.is_empty() {
            return Err(SecretError::MissingField("iv"));
        }

        let ttl_hours = new.ttl_hours.filter(|&h| h > 0);
        let reads = new.reads.filter(|&r| r > 0);
        let ttl_seconds = ttl_hours.map(|h| u64::from(h) * SECONDS_PER_HOUR);

        let now = Utc::now();
        let expires_at = match ttl_seconds {
            Some(secs) => Some(expiry_after(now, secs).ok_or(SecretError::InvalidField("ttl"))?),
            None => None,
        };

        let id = id::generate();
        let record = SecretRecord::new(new.encrypted, new.iv, reads, now.timestamp_millis());

        self.store
            .put(&id, &record, ttl_seconds)
            .map_err(SecretError::Internal)?;

        info!(id = %id, ttl_hours = ?ttl_hours, reads = ?reads, "secret created");

        Ok(CreatedSecret {
            id,
            ttl_hours,
            reads,
            expires_at,
        })
    }

    /// Serve one read of `id`, decrementing and possibly deleting it.
    pub async fn load(&self, id: &str) -> Result<LoadedSecret, SecretError> {
        if id.is_empty() {
            return Err(SecretError::MissingField("id"));
        }
        if !id::is_well_formed(id) {
            return Err(SecretError::NotFound);
        }

        let _guard = self.locks.lock(id).await;

        let record = self
            .store
            .get(id)
            .map_err(SecretError::Internal)?
            .ok_or(SecretError::NotFound)?;

        let Some(remaining) = record.remaining_reads else {
            debug!(id = %id, "served unlimited secret");
            return Ok(LoadedSecret {
                encrypted: record.encrypted,
                iv: record.iv,
                remaining_reads: None,
            });
        };

        let remaining = remaining.saturating_sub(1);
        if remaining == 0 {
            self.store.delete(id).map_err(SecretError::Internal)?;
            info!(id = %id, "secret burned after final read");
            return Ok(LoadedSecret {
                encrypted: record.encrypted,
                iv: record.iv,
                remaining_reads: Some(0),
            });
        }

        // Re-apply what is left of the expiry window, not the full duration.
        let ttl = self
            .store
            .remaining_ttl(id)
            .map_err(SecretError::Internal)?
            .ok_or(SecretError::NotFound)?;

        let updated = SecretRecord {
            remaining_reads: Some(remaining),
            ..record
        };
        let replaced = self
            .store
            .replace(id, &updated, ttl.as_secs())
            .map_err(SecretError::Internal)?;
        if !replaced {
            // Expired between the read and the write.
            return Err(SecretError::NotFound);
        }

        debug!(id = %id, remaining_reads = remaining, "secret read");
        Ok(LoadedSecret {
            encrypted: updated.encrypted,
            iv: updated.iv,
            remaining_reads: Some(remaining),
        })
    }
}
