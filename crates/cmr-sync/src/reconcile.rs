//! Mirror cleanup: remove target entries with no surviving source counterpart
//!
//! Two passes, encrypt mode only. Pass 1 prunes whole directories: every
//! physically-existing directory under the target root is tested against the
//! full substituted path of every node in the in-memory target tree, and
//! unmatched directories are deleted child-before-ancestor. Pass 2 prunes
//! stray files inside live directories: anything not registered by the current
//! run. The split exists because a vanished source directory must take its
//! whole target directory with it, while a renamed or deleted source file must
//! be removed individually from a directory that survives.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;
use walkdir::WalkDir;

use cmr_core::{OperationMode, SyncOptions};

use crate::engine::SyncStats;
use crate::node::DirNode;

pub fn cleanup(target_root: &DirNode, opts: &SyncOptions, stats: &mut SyncStats) -> Result<()> {
    if opts.mode != OperationMode::Encrypt {
        // Decrypt writes into a target that was validated empty; there is
        // nothing to reconcile.
        return Ok(());
    }
    prune_directories(target_root, opts, stats)?;
    prune_files(target_root, opts, stats)?;
    Ok(())
}

/// Pass 1: schedule every physical directory that is not a tree node, then
/// delete in reverse discovery order so children go before their ancestors.
fn prune_directories(
    target_root: &DirNode,
    opts: &SyncOptions,
    stats: &mut SyncStats,
) -> Result<()> {
    let mut live = HashSet::new();
    target_root.collect_out_paths(&mut live);

    let mut doomed: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(&opts.target).min_depth(1).sort_by_file_name() {
        let entry = entry.context("enumerating target directories")?;
        if entry.file_type().is_dir() && !live.contains(entry.path()) {
            doomed.push(entry.into_path());
        }
    }

    for dir in doomed.iter().rev() {
        info!(path = %dir.display(), dry_run = opts.dry_run, "removing orphaned directory");
        stats.dirs_pruned += 1;
        if !opts.dry_run {
            remove_dir_with_files(dir)?;
        }
    }
    Ok(())
}

/// Delete a directory's immediate files, then the directory itself. Any
/// subdirectories were scheduled separately and removed first.
fn remove_dir_with_files(dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("reading: {}", dir.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            fs::remove_file(entry.path())
                .with_context(|| format!("removing file: {}", entry.path().display()))?;
        }
    }
    fs::remove_dir(dir).with_context(|| format!("removing directory: {}", dir.display()))
}

/// Pass 2: inside every live directory, delete physical files the current run
/// neither wrote nor verified.
fn prune_files(node: &DirNode, opts: &SyncOptions, stats: &mut SyncStats) -> Result<()> {
    let entries = match fs::read_dir(&node.out_path) {
        Ok(entries) => entries,
        // Dry-run never created the directory; nothing to prune inside.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            for child in &node.children {
                prune_files(child, opts, stats)?;
            }
            return Ok(());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("reading: {}", node.out_path.display()))
        }
    };

    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        if node.is_registered(&path) {
            continue;
        }
        info!(path = %path.display(), dry_run = opts.dry_run, "removing orphaned file");
        stats.files_pruned += 1;
        if !opts.dry_run {
            fs::remove_file(&path)
                .with_context(|| format!("removing file: {}", path.display()))?;
        }
    }

    for child in &node.children {
        prune_files(child, opts, stats)?;
    }
    Ok(())
}
