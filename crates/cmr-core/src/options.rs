//! Run options and fail-fast validation.
//!
//! Everything here is checked before either tree is built: a run that starts
//! walking directories has already passed every structural precondition.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CmrError, CmrResult};

/// Direction of the run: plaintext → opaque, or opaque → plaintext.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    Encrypt,
    Decrypt,
}

impl std::fmt::Display for OperationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationMode::Encrypt => write!(f, "encrypt"),
            OperationMode::Decrypt => write!(f, "decrypt"),
        }
    }
}

/// Reprocessing policy for files whose timestamps already match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForceMode {
    /// Skip files whose source and target timestamps match.
    #[default]
    None,
    /// Reprocess every file regardless of timestamps.
    Force,
    /// Reprocess every file and advance the source mtime by one minute,
    /// guaranteeing a strictly newer timestamp on future runs.
    ForceWithTimestamp,
}

impl std::fmt::Display for ForceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForceMode::None => write!(f, "none"),
            ForceMode::Force => write!(f, "force"),
            ForceMode::ForceWithTimestamp => write!(f, "force+timestamp"),
        }
    }
}

/// Options for a single sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub source: PathBuf,
    pub target: PathBuf,
    pub key_file: PathBuf,
    pub mode: OperationMode,
    force: ForceMode,
    pub verbose: bool,
    pub dry_run: bool,
}

impl SyncOptions {
    pub fn new(
        source: PathBuf,
        target: PathBuf,
        key_file: PathBuf,
        mode: OperationMode,
        force: ForceMode,
        verbose: bool,
        dry_run: bool,
    ) -> Self {
        Self {
            source,
            target,
            key_file,
            mode,
            force,
            verbose,
            dry_run,
        }
    }

    /// The effective force mode. Force only applies when encrypting; a decrypt
    /// run always behaves as `ForceMode::None`.
    pub fn force(&self) -> ForceMode {
        match self.mode {
            OperationMode::Encrypt => self.force,
            OperationMode::Decrypt => ForceMode::None,
        }
    }

    /// Validates the run preconditions. Any failure here is fatal and happens
    /// before any tree is built or any byte is touched.
    pub fn validate(&self) -> CmrResult<()> {
        if !self.source.is_dir() {
            return Err(CmrError::Validation(format!(
                "source is not a directory: {}",
                self.source.display()
            )));
        }
        if !self.target.is_dir() {
            return Err(CmrError::Validation(format!(
                "target is not a directory: {}",
                self.target.display()
            )));
        }

        let source = canonical(&self.source)?;
        let target = canonical(&self.target)?;

        if source == target {
            return Err(CmrError::Validation(
                "source and target are the same directory".into(),
            ));
        }
        if source.starts_with(&target) || target.starts_with(&source) {
            return Err(CmrError::Validation(
                "source and target must not be nested inside one another".into(),
            ));
        }
        if !self.key_file.is_file() {
            return Err(CmrError::Validation(format!(
                "key file does not exist: {}",
                self.key_file.display()
            )));
        }
        if self.mode == OperationMode::Decrypt && !is_dir_empty(&self.target)? {
            return Err(CmrError::Validation(
                "target directory must be empty when decrypting".into(),
            ));
        }
        Ok(())
    }
}

fn canonical(path: &Path) -> CmrResult<PathBuf> {
    fs::canonicalize(path).map_err(CmrError::Io)
}

fn is_dir_empty(dir: &Path) -> CmrResult<bool> {
    Ok(fs::read_dir(dir)?.next().is_none())
}
