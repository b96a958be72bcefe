use serde::{Deserialize, Serialize};

/// A stored secret. Persisted as JSON under its identifier.
/// `encrypted` and `iv` are base-58 strings produced by the client; the server
/// never decrypts them. Expiry is not a field: each backend tracks it per key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretRecord {
    pub encrypted: String,
    pub iv: String,
    /// Read limit set at creation; `None` means unlimited.
    pub reads: Option<u32>,
    /// Reads left before the record is deleted; `None` means unlimited.
    pub remaining_reads: Option<u32>,
    /// Unix timestamp (milliseconds) when the record was created.
    pub created_at: i64,
}

impl SecretRecord {
    pub fn new(encrypted: String, iv: String, reads: Option<u32>, created_at: i64) -> Self {
        Self {
            encrypted,
            iv,
            reads,
            remaining_reads: reads,
            created_at,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.remaining_reads.is_none()
    }
}
