//! Deterministic name digests for path substitution
//!
//! Names in the opaque tree are SHA-256 digests of the original names,
//! truncated to keep paths short. Directory segments use fewer characters than
//! file names because they stack up along a path; both lengths leave accidental
//! collisions impractical at directory-tree scale.

use sha2::{Digest, Sha256};

/// Digest characters used for a substituted file name.
pub const FILE_NAME_CHARS: usize = 24;

/// Digest characters used for a substituted directory segment.
pub const DIR_NAME_CHARS: usize = 16;

const MIN_CHARS: usize = 16;

/// Digest a name to a truncated lowercase-hex string.
///
/// The output length is `max_chars` clamped to at least [`MIN_CHARS`] and at
/// most the natural hex length of the digest (64).
pub fn hashed_name(input: &str, max_chars: usize) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let hex = hex::encode(digest);
    let take = max_chars.min(hex.len()).max(MIN_CHARS);
    hex[..take].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(
            hashed_name("photo.jpg", FILE_NAME_CHARS),
            hashed_name("photo.jpg", FILE_NAME_CHARS)
        );
    }

    #[test]
    fn distinct_names_distinct_digests() {
        assert_ne!(
            hashed_name("file_a.txt", FILE_NAME_CHARS),
            hashed_name("file_b.txt", FILE_NAME_CHARS)
        );
    }

    #[test]
    fn output_lengths() {
        assert_eq!(hashed_name("docs", DIR_NAME_CHARS).len(), 16);
        assert_eq!(hashed_name("file.txt", FILE_NAME_CHARS).len(), 24);
        // Requests below the floor are adjusted upward
        assert_eq!(hashed_name("x", 4).len(), 16);
        // Requests beyond the natural hex length are capped
        assert_eq!(hashed_name("x", 1000).len(), 64);
    }

    #[test]
    fn output_is_lowercase_hex() {
        let digest = hashed_name("Mixed Case Name.TXT", 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn no_collisions_in_realistic_set() {
        let names: Vec<String> = (0..500).map(|i| format!("file-{i:03}.dat")).collect();
        let mut digests: Vec<String> = names
            .iter()
            .map(|n| hashed_name(n, FILE_NAME_CHARS))
            .collect();
        digests.sort();
        digests.dedup();
        assert_eq!(digests.len(), names.len());
    }
}
