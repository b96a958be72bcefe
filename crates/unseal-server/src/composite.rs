//! Composite key: the `version.id.key` token carried in a share link's
//! fragment. The server never sees it; clients build it after a successful
//! store and take it apart when a link is opened.

use std::fmt;
use std::num::IntErrorKind;
use std::str::FromStr;

use thiserror::Error;

use crate::base58;

/// Format version written by [`CompositeKey::new`].
pub const LATEST_KEY_VERSION: u32 = 1;

const DELIMITER: char = '.';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("malformed composite key: {0}")]
    Malformed(&'static str),
    /// Carries the version as written, which may not fit in a `u32`.
    #[error("unsupported composite key version {0}")]
    UnsupportedVersion(String),
    #[error("encryption key is not valid base-58")]
    InvalidEncoding,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeKey {
    pub version: u32,
    pub id: String,
    /// Base-58 encoding of the raw symmetric key.
    pub encryption_key: String,
}

impl CompositeKey {
    /// Build a current-version key for record `id` and raw key bytes.
    pub fn new(id: impl Into<String>, key_bytes: &[u8]) -> Self {
        Self {
            version: LATEST_KEY_VERSION,
            id: id.into(),
            encryption_key: base58::encode(key_bytes),
        }
    }

    /// Decode the raw key bytes. Deferred until the key is actually used.
    pub fn key_bytes(&self) -> Result<Vec<u8>, KeyError> {
        base58::decode(&self.encryption_key).ok_or(KeyError::InvalidEncoding)
    }
}

/// Encode `(version, id, key_bytes)` as `version.id.base58(key_bytes)`.
pub fn encode(version: u32, id: &str, key_bytes: &[u8]) -> String {
    format!(
        "{version}{DELIMITER}{id}{DELIMITER}{}",
        base58::encode(key_bytes)
    )
}

/// Split a token into its three fields.
///
/// Only framing is checked here: the id is not looked up and the key is not
/// base-58 decoded.
pub fn decode(token: &str) -> Result<CompositeKey, KeyError> {
    let parts: Vec<&str> = token.split(DELIMITER).collect();
    let [version, id, encryption_key] = parts.as_slice() else {
        return Err(KeyError::Malformed("expected exactly three parts"));
    };

    let version = match version.parse::<u32>() {
        Ok(LATEST_KEY_VERSION) => LATEST_KEY_VERSION,
        Ok(_) => return Err(KeyError::UnsupportedVersion((*version).to_owned())),
        Err(e) if *e.kind() == IntErrorKind::PosOverflow => {
            return Err(KeyError::UnsupportedVersion((*version).to_owned()))
        }
        Err(_) => return Err(KeyError::Malformed("version is not an integer")),
    };

    Ok(CompositeKey {
        version,
        id: (*id).to_owned(),
        encryption_key: (*encryption_key).to_owned(),
    })
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{DELIMITER}{}{DELIMITER}{}",
            self.version, self.id, self.encryption_key
        )
    }
}

impl FromStr for CompositeKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id;

    #[test]
    fn round_trip() {
        let id = id::generate();
        let key = [7u8; 32];
        let token = encode(LATEST_KEY_VERSION, &id, &key);
        let decoded = decode(&token).unwrap();
        assert_eq!(decoded.version, LATEST_KEY_VERSION);
        assert_eq!(decoded.id, id);
        assert_eq!(decoded.key_bytes().unwrap(), key);
        assert_eq!(decoded.to_string(), token);
    }

    #[test]
    fn new_matches_encode() {
        let key = [0u8, 1, 2, 3];
        let ck = CompositeKey::new("abc", &key);
        assert_eq!(ck.to_string(), encode(1, "abc", &key));
        assert_eq!(ck.to_string().parse::<CompositeKey>().unwrap(), ck);
    }

    #[test]
    fn wrong_part_count_is_malformed() {
        assert!(matches!(decode("not.enough"), Err(KeyError::Malformed(_))));
        assert!(matches!(decode("x.y.z.w"), Err(KeyError::Malformed(_))));
        assert!(matches!(decode(""), Err(KeyError::Malformed(_))));
    }

    #[test]
    fn non_numeric_version_is_malformed() {
        assert!(matches!(decode("abc.id.key"), Err(KeyError::Malformed(_))));
        assert!(matches!(decode("-1.id.key"), Err(KeyError::Malformed(_))));
    }

    #[test]
    fn future_version_is_unsupported() {
        assert_eq!(
            decode("2.id.key"),
            Err(KeyError::UnsupportedVersion("2".into()))
        );
    }

    #[test]
    fn oversized_version_is_unsupported() {
        assert_eq!(
            decode("4294967296.id.key"),
            Err(KeyError::UnsupportedVersion("4294967296".into()))
        );
        assert!(matches!(
            decode("99999999999999999999999.id.key"),
            Err(KeyError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn key_encoding_checked_on_use() {
        let ck = decode("1.someid.0OIl").unwrap();
        assert_eq!(ck.key_bytes(), Err(KeyError::InvalidEncoding));
    }
}
