//! Key-file generation
//!
//! A key file is a raw byte blob of cryptographically random material. The
//! `--ascii` variant restricts bytes to printable ASCII (33..=126) for key
//! files that must survive copy/paste or text-mode transfer.

use std::path::Path;

use anyhow::Context;
use rand::{Rng, RngCore};

/// Selectable key-file sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySize {
    /// 32 bytes (256 bits)
    Small,
    /// 64 bytes (512 bits) — the default
    Medium,
    /// 128 bytes (1024 bits)
    Large,
    /// 256 bytes (2048 bits)
    Huge,
}

impl KeySize {
    pub fn bytes(self) -> usize {
        match self {
            KeySize::Small => 32,
            KeySize::Medium => 64,
            KeySize::Large => 128,
            KeySize::Huge => 256,
        }
    }
}

/// Generate a random key file of the requested size.
///
/// An existing file is overwritten without confirmation. Returns the number of
/// bytes written.
pub fn generate_key_file(path: &Path, size: KeySize, ascii: bool) -> anyhow::Result<usize> {
    if path.is_dir() {
        anyhow::bail!("key file refers to a directory: {}", path.display());
    }

    let mut rng = rand::thread_rng();
    let mut key = vec![0u8; size.bytes()];
    if ascii {
        for b in key.iter_mut() {
            *b = rng.gen_range(33..=126);
        }
    } else {
        rng.fill_bytes(&mut key);
    }

    std::fs::write(path, &key)
        .with_context(|| format!("writing key file: {}", path.display()))?;
    Ok(key.len())
}
