use rand::{rngs::OsRng, Rng};

use crate::base58::ALPHABET;

/// Length of a record identifier in characters.
pub const ID_LEN: usize = 22;

/// Generate a random record identifier: 22 characters, each drawn uniformly
/// from the base-58 alphabet using the OS random source.
///
/// No uniqueness check is made; the id space is 58^22.
pub fn generate() -> String {
    let mut rng = OsRng;
    (0..ID_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// True if `id` has the shape of a generated identifier.
pub fn is_well_formed(id: &str) -> bool {
    id.len() == ID_LEN && id.bytes().all(|b| ALPHABET.contains(&b))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn shape() {
        for _ in 0..100 {
            let id = generate();
            assert_eq!(id.len(), ID_LEN);
            assert!(is_well_formed(&id), "bad id {id}");
        }
    }

    #[test]
    fn no_repeats_in_small_sample() {
        let ids: HashSet<String> = (0..1000).map(|_| generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn rejects_malformed() {
        assert!(!is_well_formed(""));
        assert!(!is_well_formed("nonexistent"));
        assert!(!is_well_formed("0000000000000000000000"));
        assert!(!is_well_formed("abcdefghijkmnopqrstuv."));
    }
}
