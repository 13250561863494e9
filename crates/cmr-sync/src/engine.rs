//! The sync session: builds both trees, drives the processing walk
//!
//! One session per run, exclusively owning the master key. The walk is
//! single-threaded, synchronous, and depth-first; files are fully buffered
//! before transform and fully written after. Every mutating filesystem call is
//! gated on the dry-run flag immediately before it happens, so decision logic
//! runs identically whether or not mutation is suppressed.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use filetime::FileTime;
use tracing::{debug, info, warn};

use cmr_core::{ForceMode, OperationMode, SyncOptions};
use cmr_crypto::{
    add_header, hashed_name, remove_header, seal, HeaderError, MasterKey, FILE_NAME_CHARS,
    MAX_NAME_BYTES,
};

use crate::node::{
    build_index, build_tree, resolve_mut, DirNode, FileEntry, IdSequence, TreeContext, TreeRole,
    DIR_MARKER_EXT, ENCRYPTED_FILE_EXT,
};
use crate::reconcile;

/// How a source file relates to its target artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    NoTargetYet,
    SourceNewer,
    SourceOlder,
    SameTimestamp,
}

/// Counters for one run, used for the summary and for dry-run equivalence.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    /// Files (re)encrypted or (re)decrypted, plus directory markers written.
    pub processed: usize,
    /// Files left alone because their timestamps matched.
    pub skipped: usize,
    /// Per-file recoverable failures (oversized name, failed authentication).
    pub failed: usize,
    /// Orphaned target directories removed by cleanup.
    pub dirs_pruned: usize,
    /// Orphaned target files removed by cleanup.
    pub files_pruned: usize,
}

/// One sync run: validated options, the master key, and both trees.
pub struct SyncSession {
    opts: SyncOptions,
    key: MasterKey,
    source: DirNode,
    target: DirNode,
    index: HashMap<u32, Vec<usize>>,
}

impl SyncSession {
    /// Validate options, load the key, and build both trees from a single
    /// point-in-time snapshot.
    pub fn new(opts: SyncOptions) -> Result<Self> {
        opts.validate()?;
        let key = MasterKey::from_key_file(&opts.key_file)?;

        let ctx = TreeContext { opts: &opts, key: &key };
        let source = build_tree(&ctx, TreeRole::Source, &mut IdSequence::new())?;
        let target = build_tree(&ctx, TreeRole::Target, &mut IdSequence::new())?;
        let index = build_index(&target);

        debug!(
            nodes = source.node_count(),
            mode = %opts.mode,
            "trees built"
        );
        Ok(Self {
            opts,
            key,
            source,
            target,
            index,
        })
    }

    pub fn options(&self) -> &SyncOptions {
        &self.opts
    }

    /// Walk the source tree and transform every file that needs it.
    pub fn process(&mut self) -> Result<SyncStats> {
        let mut stats = SyncStats::default();
        let Self {
            opts,
            key,
            source,
            target,
            index,
        } = self;
        process_dir(source, target, index, opts, key, &mut stats)?;
        Ok(stats)
    }

    /// Remove target entries with no surviving source counterpart.
    /// A no-op when decrypting.
    pub fn cleanup(&self, stats: &mut SyncStats) -> Result<()> {
        reconcile::cleanup(&self.target, &self.opts, stats)
    }
}

/// Per-directory drive: resolve the paired target, prepare it, classify and
/// transform this directory's files, then recurse in id order.
fn process_dir(
    node: &DirNode,
    target_root: &mut DirNode,
    index: &HashMap<u32, Vec<usize>>,
    opts: &SyncOptions,
    key: &MasterKey,
    stats: &mut SyncStats,
) -> Result<()> {
    {
        // A miss here means the trees are no longer isomorphic; abort.
        let target = resolve_mut(target_root, index, node.id).ok_or_else(|| {
            anyhow::anyhow!(
                "no target node for id {} ({})",
                node.id,
                node.dir.display()
            )
        })?;

        prepare_target(target, opts, key, stats)?;

        for file in &node.files {
            match opts.mode {
                OperationMode::Encrypt => {
                    let status = classify(target, file);
                    if status == FileStatus::SameTimestamp && opts.force() == ForceMode::None {
                        debug!(path = %file.path.display(), "skip: unchanged");
                        stats.skipped += 1;
                        continue;
                    }
                    debug!(path = %file.path.display(), status = ?status, "processing");
                    let mtime = effective_mtime(file, opts)?;
                    encrypt_file(target, file, mtime, opts, key, stats)?;
                }
                OperationMode::Decrypt => {
                    // Only sealed content files; markers and foreign files are
                    // not decrypt candidates.
                    if !is_sealed_content(&file.path) {
                        continue;
                    }
                    decrypt_file(target, file, opts, key, stats)?;
                }
            }
        }
    }

    for child in &node.children {
        process_dir(child, target_root, index, opts, key, stats)?;
    }
    Ok(())
}

fn is_sealed_content(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == ENCRYPTED_FILE_EXT)
}

/// Classify a source file against its target artifact by mtime, registering
/// the artifact path either way so cleanup knows it belongs to source.
fn classify(target: &mut DirNode, file: &FileEntry) -> FileStatus {
    let artifact = target_artifact(target, &file.name);
    target.register(artifact.clone());

    let Ok(meta) = fs::metadata(&artifact) else {
        return FileStatus::NoTargetYet;
    };
    let Ok(target_mtime) = meta.modified() else {
        return FileStatus::NoTargetYet;
    };
    match file.modified.cmp(&target_mtime) {
        std::cmp::Ordering::Equal => FileStatus::SameTimestamp,
        std::cmp::Ordering::Greater => FileStatus::SourceNewer,
        std::cmp::Ordering::Less => FileStatus::SourceOlder,
    }
}

fn target_artifact(target: &DirNode, source_name: &str) -> PathBuf {
    target.out_path.join(format!(
        "{}.{ENCRYPTED_FILE_EXT}",
        hashed_name(source_name, FILE_NAME_CHARS)
    ))
}

/// Force-with-timestamp advances the source mtime by one minute before
/// processing, so the file is guaranteed newer on future runs. Returns the
/// mtime the saved target will be stamped with.
fn effective_mtime(file: &FileEntry, opts: &SyncOptions) -> Result<SystemTime> {
    if opts.force() != ForceMode::ForceWithTimestamp {
        return Ok(file.modified);
    }
    let bumped = file.modified + Duration::from_secs(60);
    if !opts.dry_run {
        filetime::set_file_mtime(&file.path, FileTime::from_system_time(bumped))
            .with_context(|| format!("bumping mtime: {}", file.path.display()))?;
    }
    Ok(bumped)
}

/// Prepare a target directory: create it, and in encrypt mode write/refresh
/// the directory-name marker. Roots need neither.
fn prepare_target(
    target: &mut DirNode,
    opts: &SyncOptions,
    key: &MasterKey,
    stats: &mut SyncStats,
) -> Result<()> {
    if target.is_root() {
        return Ok(());
    }
    if !opts.dry_run {
        fs::create_dir_all(&target.out_path)
            .with_context(|| format!("creating directory: {}", target.out_path.display()))?;
    }
    if opts.mode == OperationMode::Decrypt {
        // The segment was already recovered from the marker at tree build.
        return Ok(());
    }

    let marker = target.out_path.join(format!(
        "{}.{DIR_MARKER_EXT}",
        hashed_name(&target.segment, FILE_NAME_CHARS)
    ));
    target.register(marker.clone());

    // An existing marker is assumed good unless a force mode is active.
    if marker.exists() && opts.force() == ForceMode::None {
        return Ok(());
    }

    let original_name = target
        .dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    info!(
        path = %marker.display(),
        dry_run = opts.dry_run,
        "writing directory marker"
    );
    stats.processed += 1;
    if !opts.dry_run {
        let sealed = seal(key, original_name.as_bytes())?;
        fs::write(&marker, sealed)
            .with_context(|| format!("writing marker: {}", marker.display()))?;
    }
    Ok(())
}

/// Encrypt one file: whole-file read, header, seal, save under the digest name.
fn encrypt_file(
    target: &mut DirNode,
    file: &FileEntry,
    mtime: SystemTime,
    opts: &SyncOptions,
    key: &MasterKey,
    stats: &mut SyncStats,
) -> Result<()> {
    // The name-capacity decision is byte-length only, so it is made up front;
    // dry-run and real runs reach the same verdict.
    if file.name.len() > MAX_NAME_BYTES {
        warn!(
            path = %file.path.display(),
            len = file.name.len(),
            "file name exceeds header capacity, skipping"
        );
        stats.failed += 1;
        return Ok(());
    }

    let out = target_artifact(target, &file.name);
    info!(
        path = %file.path.display(),
        out = %out.display(),
        dry_run = opts.dry_run,
        "encrypting"
    );
    stats.processed += 1;
    if opts.dry_run {
        return Ok(());
    }

    let plain =
        fs::read(&file.path).with_context(|| format!("reading: {}", file.path.display()))?;
    let headered = match add_header(&file.name, &plain) {
        Ok(bytes) => bytes,
        Err(e @ HeaderError::NameTooLong { .. }) => {
            warn!(path = %file.path.display(), "{e}");
            stats.processed -= 1;
            stats.failed += 1;
            return Ok(());
        }
        Err(e) => return Err(e).context("building metadata header"),
    };
    let sealed = seal(key, &headered)?;
    save(&out, &sealed, mtime)?;
    Ok(())
}

/// Decrypt one sealed file: open, strip the header, save the payload under the
/// recovered original name. Authentication failure skips the file and the walk
/// continues.
fn decrypt_file(
    target: &mut DirNode,
    file: &FileEntry,
    opts: &SyncOptions,
    key: &MasterKey,
    stats: &mut SyncStats,
) -> Result<()> {
    info!(
        path = %file.path.display(),
        dry_run = opts.dry_run,
        "decrypting"
    );
    stats.processed += 1;
    if opts.dry_run {
        return Ok(());
    }

    let sealed =
        fs::read(&file.path).with_context(|| format!("reading: {}", file.path.display()))?;
    let plain = match cmr_crypto::open(key, &sealed) {
        Ok(plain) => plain,
        Err(e) => {
            warn!(path = %file.path.display(), "skipping file: {e}");
            stats.processed -= 1;
            stats.failed += 1;
            return Ok(());
        }
    };

    // A valid seal with a bad header signature means the artifact was not
    // produced by this tool; that aborts the run.
    let (original_name, payload) =
        remove_header(&plain).with_context(|| format!("header: {}", file.path.display()))?;

    let out = target.out_path.join(&original_name);
    save(&out, &payload, file.modified)?;
    Ok(())
}

/// Write bytes and stamp the file with the source mtime; the stamp is what
/// makes the next run's incremental comparison correct.
fn save(path: &Path, bytes: &[u8], mtime: SystemTime) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("writing: {}", path.display()))?;
    filetime::set_file_mtime(path, FileTime::from_system_time(mtime))
        .with_context(|| format!("stamping mtime: {}", path.display()))?;
    Ok(())
}
