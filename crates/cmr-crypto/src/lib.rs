//! cmr-crypto: sealing primitives for cryptmirror
//!
//! File pipeline: plaintext → metadata header (carries the original name) →
//! XChaCha20-Poly1305 seal under the master key → opaque artifact on disk.
//!
//! Name pipeline: original name → SHA-256 digest → truncated lowercase hex.
//! Digests are deterministic and unkeyed; they obscure names, they do not
//! authenticate them. The authenticated copy of the name travels inside the
//! sealed header.

pub mod aead;
pub mod header;
pub mod keygen;
pub mod names;

pub use aead::{open, seal, MasterKey, MIN_KEY_FILE_BYTES, SEAL_OVERHEAD};
pub use keygen::{generate_key_file, KeySize};
pub use header::{add_header, remove_header, HeaderError, HEADER_LEN, MAX_NAME_BYTES};
pub use names::{hashed_name, DIR_NAME_CHARS, FILE_NAME_CHARS};

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;
