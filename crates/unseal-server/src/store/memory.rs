use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use dashmap::DashMap;
use tracing::debug;

use super::model::SecretRecord;
use super::{SecretStore, Ttl};

struct Entry {
    /// JSON-encoded record, so both backends fail on the same inputs.
    bytes: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process store. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn deadline(ttl_seconds: Option<u64>) -> Option<Instant> {
    ttl_seconds.map(|secs| {
        let now = Instant::now();
        now.checked_add(Duration::from_secs(secs))
            // Far enough out to never fire.
            .unwrap_or_else(|| now + Duration::from_secs(100 * 365 * 86_400))
    })
}

impl SecretStore for MemoryStore {
    fn put(&self, id: &str, record: &SecretRecord, ttl_seconds: Option<u64>) -> Result<()> {
        let bytes = serde_json::to_vec(record).context("encode secret record")?;
        self.entries.insert(
            id.to_owned(),
            Entry {
                bytes,
                expires_at: deadline(ttl_seconds),
            },
        );
        debug!(id = %id, ttl_seconds = ?ttl_seconds, "stored secret");
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<SecretRecord>> {
        let now = Instant::now();
        let bytes = match self.entries.get(id) {
            None => return Ok(None),
            Some(entry) if entry.is_expired(now) => None,
            Some(entry) => Some(entry.bytes.clone()),
        };
        // The read guard above is released before any removal.
        match bytes {
            None => {
                self.entries.remove_if(id, |_, e| e.is_expired(now));
                Ok(None)
            }
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .context("decode secret record"),
        }
    }

    fn remaining_ttl(&self, id: &str) -> Result<Option<Ttl>> {
        let now = Instant::now();
        Ok(self.entries.get(id).and_then(|entry| match entry.expires_at {
            None => Some(Ttl::Persistent),
            Some(at) if at <= now => None,
            Some(at) => Some(Ttl::Remaining(
                super::ceil_secs((at - now).as_millis() as i64),
            )),
        }))
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(id)
            .is_some_and(|(_, entry)| !entry.is_expired(now)))
    }

    fn replace(&self, id: &str, record: &SecretRecord, ttl_seconds: Option<u64>) -> Result<bool> {
        let now = Instant::now();
        let bytes = serde_json::to_vec(record).context("encode secret record")?;
        let replaced = match self.entries.get_mut(id) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.bytes = bytes;
                entry.expires_at = deadline(ttl_seconds);
                true
            }
            _ => false,
        };
        if !replaced {
            self.entries.remove_if(id, |_, e| e.is_expired(now));
        }
        Ok(replaced)
    }

    fn prune_expired(&self) -> Result<usize> {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        Ok(before.saturating_sub(self.entries.len()))
    }
}
