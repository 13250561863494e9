//! Metadata header carrying the original file name through encryption
//!
//! Header layout (prepended to the plaintext before sealing):
//! ```text
//! [2 bytes: format version][32 bytes: magic][16 bytes: reserved]
//! [4 bytes: name length, little-endian][248 bytes: UTF-8 name capacity]
//! ```
//!
//! The header is always exactly [`HEADER_LEN`] bytes: unused name capacity and
//! the reserved region are filled with random bytes, so the sealed size leaks
//! nothing beyond the explicit length field.

use rand::RngCore;
use thiserror::Error;

const VER_MAJOR: u8 = 1;
const VER_MINOR: u8 = 0;

const SIGNATURE_LEN: usize = 34;
const RESERVED_LEN: usize = 16;
const NAME_LEN_FIELD: usize = 4;

/// Maximum encoded length of an original file name (248 bytes of UTF-8).
pub const MAX_NAME_BYTES: usize = 248;

/// Total header size, constant regardless of the actual name length.
pub const HEADER_LEN: usize = SIGNATURE_LEN + RESERVED_LEN + NAME_LEN_FIELD + MAX_NAME_BYTES;

const IDX_NAME_LEN: usize = SIGNATURE_LEN + RESERVED_LEN;
const IDX_NAME: usize = IDX_NAME_LEN + NAME_LEN_FIELD;

/// Version bytes plus a fixed anti-tamper magic. A decrypt that produces
/// anything else did not come from this tool (or this format version).
const SIGNATURE: [u8; SIGNATURE_LEN] = [
    VER_MAJOR, VER_MINOR, //
    0x93, 0x2b, 0xc4, 0x0e, 0x71, 0xd8, 0x5f, 0xa2, 0x36, 0xe9, 0x1c, 0x84, 0xbd, 0x47, 0x6a,
    0xf0, 0x58, 0x21, 0xcf, 0x9e, 0x03, 0xb6, 0x7d, 0xe4, 0x12, 0xa8, 0x5b, 0xc0, 0x39, 0xf7,
    0x66, 0x8d,
];

#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("file name too long for header: {len} bytes (maximum {MAX_NAME_BYTES})")]
    NameTooLong { len: usize },

    #[error("plaintext shorter than header: {len} bytes (minimum {HEADER_LEN})")]
    Truncated { len: usize },

    #[error("invalid metadata signature")]
    BadSignature,

    #[error("invalid name length in header: {len}")]
    BadNameLength { len: u32 },

    #[error("header name is not valid UTF-8")]
    BadName,
}

/// Prepend the metadata header to `payload`, recording `name` as the original
/// file name.
pub fn add_header(name: &str, payload: &[u8]) -> Result<Vec<u8>, HeaderError> {
    let name_bytes = name.as_bytes();
    if name_bytes.len() > MAX_NAME_BYTES {
        return Err(HeaderError::NameTooLong {
            len: name_bytes.len(),
        });
    }

    let mut out = vec![0u8; HEADER_LEN + payload.len()];
    // Random fill first, then overwrite the structured fields.
    rand::thread_rng().fill_bytes(&mut out[..HEADER_LEN]);

    out[..SIGNATURE_LEN].copy_from_slice(&SIGNATURE);
    out[IDX_NAME_LEN..IDX_NAME].copy_from_slice(&(name_bytes.len() as u32).to_le_bytes());
    out[IDX_NAME..IDX_NAME + name_bytes.len()].copy_from_slice(name_bytes);
    out[HEADER_LEN..].copy_from_slice(payload);
    Ok(out)
}

/// Split an opened plaintext into the original file name and the payload.
pub fn remove_header(plain: &[u8]) -> Result<(String, Vec<u8>), HeaderError> {
    if plain.len() < HEADER_LEN {
        return Err(HeaderError::Truncated { len: plain.len() });
    }
    if plain[..SIGNATURE_LEN] != SIGNATURE {
        return Err(HeaderError::BadSignature);
    }

    let mut len_bytes = [0u8; NAME_LEN_FIELD];
    len_bytes.copy_from_slice(&plain[IDX_NAME_LEN..IDX_NAME]);
    let name_len = u32::from_le_bytes(len_bytes);
    if name_len as usize > MAX_NAME_BYTES {
        return Err(HeaderError::BadNameLength { len: name_len });
    }

    let name = std::str::from_utf8(&plain[IDX_NAME..IDX_NAME + name_len as usize])
        .map_err(|_| HeaderError::BadName)?
        .to_string();
    if name.is_empty() {
        return Err(HeaderError::BadNameLength { len: 0 });
    }

    Ok((name, plain[HEADER_LEN..].to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_remove_roundtrip() {
        let payload = b"the payload bytes";
        let headered = add_header("report.pdf", payload).unwrap();

        let (name, recovered) = remove_header(&headered).unwrap();
        assert_eq!(name, "report.pdf");
        assert_eq!(recovered, payload);
    }

    #[test]
    fn header_size_is_constant() {
        let short = add_header("a", b"").unwrap();
        let long = add_header(&"x".repeat(200), b"").unwrap();
        assert_eq!(short.len(), HEADER_LEN);
        assert_eq!(long.len(), HEADER_LEN);
    }

    #[test]
    fn name_at_capacity_roundtrips() {
        let name = "n".repeat(MAX_NAME_BYTES);
        let headered = add_header(&name, b"x").unwrap();
        let (recovered, _) = remove_header(&headered).unwrap();
        assert_eq!(recovered, name);
    }

    #[test]
    fn oversized_name_rejected() {
        let name = "n".repeat(MAX_NAME_BYTES + 1);
        match add_header(&name, b"x") {
            Err(HeaderError::NameTooLong { len }) => assert_eq!(len, MAX_NAME_BYTES + 1),
            other => panic!("expected NameTooLong, got {other:?}"),
        }
    }

    #[test]
    fn multibyte_name_length_is_bytes_not_chars() {
        // 83 four-byte scalars = 332 encoded bytes, over capacity at 83 chars.
        let name: String = std::iter::repeat('\u{1F512}').take(83).collect();
        assert!(matches!(
            add_header(&name, b""),
            Err(HeaderError::NameTooLong { .. })
        ));
    }

    #[test]
    fn truncated_input_rejected() {
        assert!(matches!(
            remove_header(&[0u8; HEADER_LEN - 1]),
            Err(HeaderError::Truncated { .. })
        ));
    }

    #[test]
    fn bad_signature_rejected() {
        let mut headered = add_header("file.txt", b"payload").unwrap();
        headered[2] ^= 0xff;
        assert!(matches!(
            remove_header(&headered),
            Err(HeaderError::BadSignature)
        ));
    }

    #[test]
    fn empty_payload_roundtrips() {
        let headered = add_header("empty.bin", b"").unwrap();
        let (name, payload) = remove_header(&headered).unwrap();
        assert_eq!(name, "empty.bin");
        assert!(payload.is_empty());
    }
}
