use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use redb::{Database, ReadableTable, TableDefinition};
use tracing::{debug, info};

use super::model::SecretRecord;
use super::{ceil_secs, now_millis, SecretStore, Ttl};

const SECRETS: TableDefinition<&str, &[u8]> = TableDefinition::new("secrets");
/// Expiry deadlines as unix milliseconds. Keys without an entry never expire.
const EXPIRIES: TableDefinition<&str, i64> = TableDefinition::new("expiries");

/// Thread-safe handle to the redb store.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).context("open redb database")?;

        // Ensure all tables exist.
        let write_txn = db.begin_write()?;
        write_txn.open_table(SECRETS)?;
        write_txn.open_table(EXPIRIES)?;
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Remove `id` if its deadline has passed. Another writer may have
    /// refreshed it since the caller looked, so the deadline is re-checked.
    fn evict_if_expired(&self, id: &str) -> Result<()> {
        let now = now_millis();
        let write_txn = self.db.begin_write()?;
        {
            let mut expiries = write_txn.open_table(EXPIRIES)?;
            if deadline(&expiries, id)?.is_some_and(|d| d <= now) {
                expiries.remove(id)?;
                write_txn.open_table(SECRETS)?.remove(id)?;
                debug!(id = %id, "lazy-evicted expired secret");
            }
        }
        write_txn.commit()?;
        Ok(())
    }
}

impl SecretStore for RedbStore {
    fn put(&self, id: &str, record: &SecretRecord, ttl_seconds: Option<u64>) -> Result<()> {
        let bytes = encode(record)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut secrets = write_txn.open_table(SECRETS)?;
            secrets.insert(id, bytes.as_slice())?;
            let mut expiries = write_txn.open_table(EXPIRIES)?;
            set_expiry(&mut expiries, id, ttl_seconds)?;
        }
        write_txn.commit()?;

        debug!(id = %id, ttl_seconds = ?ttl_seconds, "stored secret");
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<SecretRecord>> {
        let now = now_millis();
        let (raw_bytes, expired) = {
            let read_txn = self.db.begin_read()?;
            let secrets = read_txn.open_table(SECRETS)?;
            let expiries = read_txn.open_table(EXPIRIES)?;

            // Copy out of the AccessGuard so the borrow on `secrets` ends here.
            let raw_bytes: Option<Vec<u8>> = secrets.get(id)?.map(|guard| guard.value().to_vec());
            let expired = deadline(&expiries, id)?.is_some_and(|d| d <= now);
            (raw_bytes, expired)
        };

        match raw_bytes {
            None => Ok(None),
            Some(_) if expired => {
                self.evict_if_expired(id)?;
                Ok(None)
            }
            Some(bytes) => decode(&bytes).map(Some),
        }
    }

    fn remaining_ttl(&self, id: &str) -> Result<Option<Ttl>> {
        let now = now_millis();
        let read_txn = self.db.begin_read()?;
        let secrets = read_txn.open_table(SECRETS)?;
        if secrets.get(id)?.is_none() {
            return Ok(None);
        }
        let expiries = read_txn.open_table(EXPIRIES)?;
        Ok(match deadline(&expiries, id)? {
            None => Some(Ttl::Persistent),
            Some(d) if d <= now => None,
            Some(d) => Some(Ttl::Remaining(ceil_secs(d - now))),
        })
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let now = now_millis();
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut secrets = write_txn.open_table(SECRETS)?;
            let mut expiries = write_txn.open_table(EXPIRIES)?;
            let expired = expiries.remove(id)?.is_some_and(|g| g.value() <= now);
            let removed = secrets.remove(id)?.is_some();
            removed && !expired
        };
        write_txn.commit()?;
        Ok(existed)
    }

    fn replace(&self, id: &str, record: &SecretRecord, ttl_seconds: Option<u64>) -> Result<bool> {
        let now = now_millis();
        let bytes = encode(record)?;
        let write_txn = self.db.begin_write()?;
        let replaced = {
            let mut secrets = write_txn.open_table(SECRETS)?;
            let mut expiries = write_txn.open_table(EXPIRIES)?;
            let present = secrets.get(id)?.is_some();
            let expired = deadline(&expiries, id)?.is_some_and(|d| d <= now);

            if !present {
                false
            } else if expired {
                secrets.remove(id)?;
                expiries.remove(id)?;
                false
            } else {
                secrets.insert(id, bytes.as_slice())?;
                set_expiry(&mut expiries, id, ttl_seconds)?;
                true
            }
        };
        write_txn.commit()?;
        Ok(replaced)
    }

    fn prune_expired(&self) -> Result<usize> {
        let now = now_millis();

        // Collect candidates in a read pass first.
        let expired_ids: Vec<String> = {
            let read_txn = self.db.begin_read()?;
            let expiries = read_txn.open_table(EXPIRIES)?;
            let mut ids = Vec::new();
            for item in expiries.iter()? {
                let (k, v) = item?;
                if v.value() <= now {
                    ids.push(k.value().to_owned());
                }
            }
            ids
        };

        if expired_ids.is_empty() {
            return Ok(0);
        }

        let write_txn = self.db.begin_write()?;
        let mut removed = 0usize;
        {
            let mut secrets = write_txn.open_table(SECRETS)?;
            let mut expiries = write_txn.open_table(EXPIRIES)?;
            for id in &expired_ids {
                // A concurrent replace may have pushed the deadline out.
                if deadline(&expiries, id)?.is_some_and(|d| d <= now) {
                    expiries.remove(id.as_str())?;
                    secrets.remove(id.as_str())?;
                    removed += 1;
                }
            }
        }
        write_txn.commit()?;

        if removed > 0 {
            info!(removed, "pruned expired secrets");
        }
        Ok(removed)
    }
}

fn deadline<T: ReadableTable<&'static str, i64>>(table: &T, id: &str) -> Result<Option<i64>> {
    Ok(table.get(id)?.map(|guard| guard.value()))
}

fn set_expiry(
    expiries: &mut redb::Table<'_, &'static str, i64>,
    id: &str,
    ttl_seconds: Option<u64>,
) -> Result<()> {
    match ttl_seconds {
        Some(ttl) => {
            let ttl_millis = i64::try_from(ttl.saturating_mul(1000)).unwrap_or(i64::MAX);
            expiries.insert(id, now_millis().saturating_add(ttl_millis))?;
        }
        None => {
            expiries.remove(id)?;
        }
    }
    Ok(())
}

fn encode(record: &SecretRecord) -> Result<Vec<u8>> {
    serde_json::to_vec(record).context("encode secret record")
}

fn decode(bytes: &[u8]) -> Result<SecretRecord> {
    serde_json::from_slice(bytes).context("decode secret record")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_store() -> (RedbStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let store = RedbStore::open(&path).unwrap();
        (store, dir)
    }

    fn record(reads: Option<u32>) -> SecretRecord {
        SecretRecord::new("ct".into(), "iv".into(), reads, now_millis())
    }

    #[test]
    fn put_get_delete() {
        let (s, _dir) = make_store();
        let r = record(Some(2));
        s.put("ID", &r, None).unwrap();
        assert_eq!(s.get("ID").unwrap(), Some(r));
        assert!(s.delete("ID").unwrap());
        assert_eq!(s.get("ID").unwrap(), None);
        assert!(!s.delete("ID").unwrap());
    }

    #[test]
    fn ttl_expiry() {
        let (s, _dir) = make_store();
        // TTL = 0 means already expired.
        s.put("EXPIRED", &record(None), Some(0)).unwrap();
        assert_eq!(s.get("EXPIRED").unwrap(), None);
        assert_eq!(s.remaining_ttl("EXPIRED").unwrap(), None);
    }

    #[test]
    fn remaining_ttl_states() {
        let (s, _dir) = make_store();
        s.put("FOREVER", &record(None), None).unwrap();
        s.put("HOUR", &record(None), Some(3600)).unwrap();
        assert_eq!(s.remaining_ttl("FOREVER").unwrap(), Some(Ttl::Persistent));
        assert!(matches!(
            s.remaining_ttl("HOUR").unwrap(),
            Some(Ttl::Remaining(secs)) if secs > 3590 && secs <= 3600
        ));
        assert_eq!(s.remaining_ttl("MISSING").unwrap(), None);
    }

    #[test]
    fn put_without_ttl_clears_previous_expiry() {
        let (s, _dir) = make_store();
        s.put("K", &record(None), Some(60)).unwrap();
        s.put("K", &record(None), None).unwrap();
        assert_eq!(s.remaining_ttl("K").unwrap(), Some(Ttl::Persistent));
    }

    #[test]
    fn replace_applies_given_window() {
        let (s, _dir) = make_store();
        s.put("R", &record(Some(3)), Some(3600)).unwrap();
        let mut updated = record(Some(3));
        updated.remaining_reads = Some(2);
        assert!(s.replace("R", &updated, Some(120)).unwrap());
        assert_eq!(s.get("R").unwrap().unwrap().remaining_reads, Some(2));
        assert!(matches!(
            s.remaining_ttl("R").unwrap(),
            Some(Ttl::Remaining(secs)) if secs <= 120
        ));
    }

    #[test]
    fn replace_does_not_resurrect() {
        let (s, _dir) = make_store();
        assert!(!s.replace("GONE", &record(None), None).unwrap());
        assert_eq!(s.get("GONE").unwrap(), None);

        s.put("STALE", &record(None), Some(0)).unwrap();
        assert!(!s.replace("STALE", &record(None), None).unwrap());
        assert_eq!(s.get("STALE").unwrap(), None);
    }

    #[test]
    fn delete_of_expired_reports_absent() {
        let (s, _dir) = make_store();
        s.put("OLD", &record(None), Some(0)).unwrap();
        assert!(!s.delete("OLD").unwrap());
    }

    #[test]
    fn prune_removes_only_expired() {
        let (s, _dir) = make_store();
        s.put("LIVE", &record(None), Some(3600)).unwrap();
        s.put("FOREVER", &record(None), None).unwrap();
        s.put("DEAD", &record(None), Some(0)).unwrap();
        assert_eq!(s.prune_expired().unwrap(), 1);
        assert!(s.get("LIVE").unwrap().is_some());
        assert!(s.get("FOREVER").unwrap().is_some());
        assert_eq!(s.prune_expired().unwrap(), 0);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reopen.db");
        let r = record(Some(1));
        {
            let s = RedbStore::open(&path).unwrap();
            s.put("KEEP", &r, Some(3600)).unwrap();
        }
        let s = RedbStore::open(&path).unwrap();
        assert_eq!(s.get("KEEP").unwrap(), Some(r));
        assert!(matches!(s.remaining_ttl("KEEP").unwrap(), Some(Ttl::Remaining(_))));
    }
}
