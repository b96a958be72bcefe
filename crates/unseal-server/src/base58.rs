//! Base-58 transport encoding for binary payloads (ciphertext, IVs, keys).
//!
//! Uses the Bitcoin alphabet: no `0`, `O`, `I` or `l`, and no `.`, which keeps
//! encoded values safe to join with the composite-key delimiter.

pub const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Map from ASCII byte to digit value; 0xff marks bytes outside the alphabet.
const DIGITS: [u8; 128] = build_digits();

const fn build_digits() -> [u8; 128] {
    let mut map = [0xffu8; 128];
    let mut i = 0;
    while i < ALPHABET.len() {
        map[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    map
}

fn digit(c: u8) -> Option<u8> {
    match DIGITS.get(c as usize) {
        Some(&d) if d != 0xff => Some(d),
        _ => None,
    }
}

/// Encode `bytes` as base-58. Each leading zero byte becomes a leading `1`.
pub fn encode(bytes: &[u8]) -> String {
    // Little-endian base-58 digits of the big-endian input number.
    let mut digits: Vec<u8> = Vec::with_capacity(bytes.len() * 138 / 100 + 1);
    for &byte in bytes {
        let mut carry = byte as u32;
        for d in &mut digits {
            let x = ((*d as u32) << 8) + carry;
            *d = (x % 58) as u8;
            carry = x / 58;
        }
        while carry != 0 {
            digits.push((carry % 58) as u8);
            carry /= 58;
        }
    }

    let zeros = bytes.iter().take_while(|&&b| b == 0).count();
    let mut out = String::with_capacity(zeros + digits.len());
    out.extend(std::iter::repeat('1').take(zeros));
    out.extend(digits.iter().rev().map(|&d| ALPHABET[d as usize] as char));
    out
}

/// Decode a base-58 string. Returns `None` if any character is outside the
/// alphabet.
pub fn decode(s: &str) -> Option<Vec<u8>> {
    // Little-endian bytes of the number.
    let mut bytes: Vec<u8> = Vec::with_capacity(s.len() * 733 / 1000 + 1);
    for c in s.bytes() {
        let mut carry = digit(c)? as u32;
        for b in &mut bytes {
            let x = (*b as u32) * 58 + carry;
            *b = x as u8;
            carry = x >> 8;
        }
        while carry != 0 {
            bytes.push(carry as u8);
            carry >>= 8;
        }
    }

    let zeros = s.bytes().take_while(|&c| c == b'1').count();
    bytes.extend(std::iter::repeat(0).take(zeros));
    bytes.reverse();
    Some(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vectors() {
        assert_eq!(encode(b""), "");
        assert_eq!(encode(b"hello world"), "StV1DL6CwTryKyV");
        assert_eq!(encode(&[0, 0, 1]), "112");
        assert_eq!(decode("StV1DL6CwTryKyV").unwrap(), b"hello world");
        assert_eq!(decode("112").unwrap(), vec![0, 0, 1]);
    }

    #[test]
    fn leading_zeros_survive() {
        let iv = [0u8, 0, 7, 255, 3, 0, 0, 0, 9, 1, 2, 3];
        let encoded = encode(&iv);
        assert!(encoded.starts_with("11"));
        assert_eq!(decode(&encoded).unwrap(), iv);
    }

    #[test]
    fn rejects_foreign_characters() {
        assert!(decode("0OIl").is_none());
        assert!(decode("abc.def").is_none());
        assert!(decode("héllo").is_none());
    }

    #[test]
    fn never_emits_delimiter() {
        let key: Vec<u8> = (0..=255u8).collect();
        assert!(!encode(&key).contains('.'));
    }
}
