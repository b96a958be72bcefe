//! Client-side AES-256-GCM sealing. Output matches what browsers produce with
//! WebCrypto: ciphertext with the 16-byte tag appended, and a 12-byte IV.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use anyhow::Result;
use rand::{rngs::OsRng, RngCore};
use zeroize::ZeroizeOnDrop;

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 12;

/// Raw 256-bit key. Only ever travels in a link fragment.
#[derive(ZeroizeOnDrop)]
pub struct SealKey([u8; KEY_LEN]);

impl SealKey {
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("key must be {KEY_LEN} bytes, got {}", bytes.len()))?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

/// Encrypt `plaintext` under `key` with a fresh random IV.
pub fn encrypt(key: &SealKey, plaintext: &[u8]) -> Result<(Vec<u8>, [u8; IV_LEN])> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|e| anyhow::anyhow!("encrypt: {e}"))?;

    Ok((ciphertext, iv))
}

/// Decrypt `ciphertext` (with trailing tag) under `key` and `iv`.
pub fn decrypt(key: &SealKey, ciphertext: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
    if iv.len() != IV_LEN {
        anyhow::bail!("iv must be {IV_LEN} bytes, got {}", iv.len());
    }
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|e| anyhow::anyhow!("decrypt: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let key = SealKey::generate();
        let plaintext = b"4242 4242 4242 4242";
        let (ct, iv) = encrypt(&key, plaintext).unwrap();
        assert_eq!(ct.len(), plaintext.len() + 16);
        assert_eq!(decrypt(&key, &ct, &iv).unwrap(), plaintext);
    }

    #[test]
    fn wrong_key_fails() {
        let (ct, iv) = encrypt(&SealKey::generate(), b"secret").unwrap();
        assert!(decrypt(&SealKey::generate(), &ct, &iv).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = SealKey::generate();
        let (mut ct, iv) = encrypt(&key, b"secret").unwrap();
        ct[0] ^= 1;
        assert!(decrypt(&key, &ct, &iv).is_err());
    }

    #[test]
    fn rejects_bad_lengths() {
        assert!(SealKey::from_slice(&[0u8; 16]).is_err());
        let key = SealKey::from_slice(&[1u8; KEY_LEN]).unwrap();
        assert!(decrypt(&key, b"whatever", &[0u8; 8]).is_err());
    }
}
