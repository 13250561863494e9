//! Directory tree nodes and the paired tree builder
//!
//! One generic recursive builder constructs both trees; the only per-role
//! difference is how a child's path segment is computed. Both trees snapshot
//! the same physical directory (the source root), so their shape, traversal
//! order, and ids always align. Construction never hard-fails on a missing
//! directory; it yields an empty node instead.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use cmr_core::{OperationMode, SyncOptions};
use cmr_crypto::{hashed_name, MasterKey, DIR_NAME_CHARS};

/// Extension of a sealed content file in the target tree.
pub const ENCRYPTED_FILE_EXT: &str = "cmr";

/// Extension of the per-directory name marker in the target tree.
///
/// Distinct from [`ENCRYPTED_FILE_EXT`] so the two artifact kinds never
/// collide and decrypt-mode selection can filter by extension alone.
pub const DIR_MARKER_EXT: &str = "cmrd";

const ID_START: u32 = 1000;

/// Explicit id sequence passed into each root build. Source and target roots
/// are each built with a fresh sequence, which is what keeps their pre-order
/// ids aligned.
#[derive(Debug)]
pub struct IdSequence {
    next: u32,
}

impl IdSequence {
    pub fn new() -> Self {
        Self { next: ID_START }
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }
}

impl Default for IdSequence {
    fn default() -> Self {
        Self::new()
    }
}

/// Which of the two trees a node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeRole {
    Source,
    Target,
}

/// A file beneath a [`DirNode`], snapshotted at tree-build time.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub name: String,
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// One directory in one of the two trees.
#[derive(Debug)]
pub struct DirNode {
    /// Pre-order id, shared with the paired node in the other tree.
    pub id: u32,
    pub role: TreeRole,
    /// Nesting level; 0 for the root.
    pub level: usize,
    /// Physical snapshot directory (always under the source root).
    pub dir: PathBuf,
    /// Full substituted output path. For the source tree this equals `dir`;
    /// for the target tree it is the digest-substituted path under the target
    /// root. Target directories may not physically exist yet.
    pub out_path: PathBuf,
    /// This node's path segment (opaque on the target side). Empty for roots,
    /// whose `out_path` is the literal root path.
    pub segment: String,
    /// Immediate files, sorted by name.
    pub files: Vec<FileEntry>,
    /// Immediate subdirectories, sorted by original name.
    pub children: Vec<DirNode>,
    /// Target paths written or verified by the current run; cleanup treats
    /// anything else in this directory as an orphan.
    pub(crate) registered: HashSet<PathBuf>,
}

/// Shared inputs for a tree build.
pub struct TreeContext<'a> {
    pub opts: &'a SyncOptions,
    pub key: &'a MasterKey,
}

/// Build one tree over the source-root snapshot.
pub fn build_tree(ctx: &TreeContext<'_>, role: TreeRole, seq: &mut IdSequence) -> Result<DirNode> {
    let out_root = match role {
        TreeRole::Source => ctx.opts.source.clone(),
        TreeRole::Target => ctx.opts.target.clone(),
    };
    build_node(ctx, role, ctx.opts.source.clone(), out_root, String::new(), 0, seq)
}

fn build_node(
    ctx: &TreeContext<'_>,
    role: TreeRole,
    dir: PathBuf,
    out_path: PathBuf,
    segment: String,
    level: usize,
    seq: &mut IdSequence,
) -> Result<DirNode> {
    let id = seq.next_id();
    let (files, subdirs) = snapshot(&dir)?;

    let mut node = DirNode {
        id,
        role,
        level,
        dir,
        out_path,
        segment,
        files,
        children: Vec::with_capacity(subdirs.len()),
        registered: HashSet::new(),
    };

    for sub in subdirs {
        let child_segment = node_segment(ctx, role, &sub)?;
        let child_out = node.out_path.join(&child_segment);
        node.children
            .push(build_node(ctx, role, sub, child_out, child_segment, level + 1, seq)?);
    }
    Ok(node)
}

/// Snapshot a directory's immediate files and subdirectories, both sorted by
/// name. A missing directory yields an empty snapshot.
fn snapshot(dir: &Path) -> Result<(Vec<FileEntry>, Vec<PathBuf>)> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), Vec::new())),
        Err(e) => {
            return Err(e).with_context(|| format!("reading directory: {}", dir.display()))
        }
    };

    let mut files = Vec::new();
    let mut subdirs = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("reading entry in: {}", dir.display()))?;
        let meta = entry
            .metadata()
            .with_context(|| format!("stat: {}", entry.path().display()))?;
        if meta.is_dir() {
            subdirs.push(entry.path());
        } else if meta.is_file() {
            files.push(FileEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: entry.path(),
                modified: meta
                    .modified()
                    .with_context(|| format!("mtime: {}", entry.path().display()))?,
            });
        }
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    subdirs.sort();
    Ok((files, subdirs))
}

/// Compute a (non-root) child's path segment for the given role.
fn node_segment(ctx: &TreeContext<'_>, role: TreeRole, dir: &Path) -> Result<String> {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    match (role, ctx.opts.mode) {
        (TreeRole::Source, _) => Ok(name),
        (TreeRole::Target, OperationMode::Encrypt) => Ok(hashed_name(&name, DIR_NAME_CHARS)),
        (TreeRole::Target, OperationMode::Decrypt) => recover_segment(ctx, dir, name),
    }
}

/// Decrypt-mode segment recovery: open the single directory marker and use the
/// recovered plaintext name. Falls back to the literal opaque name when no
/// single marker exists; that is expected only at the root, so seeing it here
/// is flagged.
fn recover_segment(ctx: &TreeContext<'_>, dir: &Path, fallback: String) -> Result<String> {
    let mut markers: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("reading directory: {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == DIR_MARKER_EXT))
        .collect();

    if markers.len() != 1 {
        warn!(
            path = %dir.display(),
            markers = markers.len(),
            "no single directory marker found, keeping opaque name"
        );
        return Ok(fallback);
    }
    if ctx.opts.dry_run {
        // Dry-run reads no file bodies; the opaque name stands in.
        return Ok(fallback);
    }
    let Some(marker) = markers.pop() else {
        return Ok(fallback);
    };
    let sealed =
        fs::read(&marker).with_context(|| format!("reading marker: {}", marker.display()))?;
    let plain = cmr_crypto::open(ctx.key, &sealed)
        .with_context(|| format!("opening directory marker: {}", marker.display()))?;
    let name = String::from_utf8(plain)
        .with_context(|| format!("directory marker is not UTF-8: {}", marker.display()))?;
    debug!(path = %dir.display(), name = %name, "recovered directory name");
    Ok(name)
}

impl DirNode {
    pub fn is_root(&self) -> bool {
        self.level == 0
    }

    /// Depth-first search over self and descendants.
    pub fn find_by_id(&self, id: u32) -> Option<&DirNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_by_id(id))
    }

    /// Number of nodes in this subtree, self included.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(DirNode::node_count).sum::<usize>()
    }

    /// Collect the substituted output path of every node in this subtree.
    pub fn collect_out_paths(&self, out: &mut HashSet<PathBuf>) {
        out.insert(self.out_path.clone());
        for child in &self.children {
            child.collect_out_paths(out);
        }
    }

    pub(crate) fn register(&mut self, path: PathBuf) {
        self.registered.insert(path);
    }

    pub(crate) fn is_registered(&self, path: &Path) -> bool {
        self.registered.contains(path)
    }
}

/// Direct id → node index, built once after both trees exist. Values are
/// child-index paths from the root, so resolution is a handful of vector hops
/// instead of a depth-first search per lookup.
pub fn build_index(root: &DirNode) -> HashMap<u32, Vec<usize>> {
    let mut index = HashMap::with_capacity(root.node_count());
    let mut trail = Vec::new();
    index_walk(root, &mut trail, &mut index);
    index
}

fn index_walk(node: &DirNode, trail: &mut Vec<usize>, index: &mut HashMap<u32, Vec<usize>>) {
    index.insert(node.id, trail.clone());
    for (i, child) in node.children.iter().enumerate() {
        trail.push(i);
        index_walk(child, trail, index);
        trail.pop();
    }
}

/// Resolve a node mutably through the index.
pub fn resolve_mut<'a>(
    root: &'a mut DirNode,
    index: &HashMap<u32, Vec<usize>>,
    id: u32,
) -> Option<&'a mut DirNode> {
    let trail = index.get(&id)?;
    let mut node = root;
    for &i in trail {
        node = node.children.get_mut(i)?;
    }
    (node.id == id).then_some(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmr_core::ForceMode;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, SyncOptions, MasterKey) {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("src");
        let target = tmp.path().join("dst");
        fs::create_dir_all(source.join("beta/deep")).unwrap();
        fs::create_dir_all(source.join("alpha")).unwrap();
        fs::create_dir_all(&target).unwrap();
        fs::write(source.join("top.txt"), b"top").unwrap();
        fs::write(source.join("alpha/a.txt"), b"a").unwrap();
        fs::write(source.join("beta/deep/d.txt"), b"d").unwrap();

        let key_file = tmp.path().join("k.key");
        fs::write(&key_file, [9u8; 64]).unwrap();
        let key = MasterKey::from_key_file(&key_file).unwrap();

        let opts = SyncOptions::new(
            source,
            target,
            key_file,
            OperationMode::Encrypt,
            ForceMode::None,
            false,
            false,
        );
        (tmp, opts, key)
    }

    fn collect_ids(node: &DirNode, out: &mut Vec<u32>) {
        out.push(node.id);
        for child in &node.children {
            collect_ids(child, out);
        }
    }

    #[test]
    fn trees_are_isomorphic_with_aligned_ids() {
        let (_tmp, opts, key) = fixture();
        let ctx = TreeContext { opts: &opts, key: &key };

        let source = build_tree(&ctx, TreeRole::Source, &mut IdSequence::new()).unwrap();
        let target = build_tree(&ctx, TreeRole::Target, &mut IdSequence::new()).unwrap();

        assert_eq!(source.node_count(), 4);
        assert_eq!(source.node_count(), target.node_count());

        let (mut source_ids, mut target_ids) = (Vec::new(), Vec::new());
        collect_ids(&source, &mut source_ids);
        collect_ids(&target, &mut target_ids);
        assert_eq!(source_ids, target_ids);
        // Pre-order, children in name order: root, alpha, beta, beta/deep.
        assert_eq!(source_ids, vec![1000, 1001, 1002, 1003]);
    }

    #[test]
    fn source_paths_are_literal_target_paths_are_substituted() {
        let (_tmp, opts, key) = fixture();
        let ctx = TreeContext { opts: &opts, key: &key };

        let source = build_tree(&ctx, TreeRole::Source, &mut IdSequence::new()).unwrap();
        let target = build_tree(&ctx, TreeRole::Target, &mut IdSequence::new()).unwrap();

        assert_eq!(source.out_path, opts.source);
        assert_eq!(target.out_path, opts.target);

        let src_alpha = &source.children[0];
        let dst_alpha = &target.children[0];
        assert_eq!(src_alpha.segment, "alpha");
        assert_eq!(dst_alpha.segment, hashed_name("alpha", DIR_NAME_CHARS));
        assert_eq!(dst_alpha.segment.len(), 16);
        assert_eq!(dst_alpha.out_path, opts.target.join(&dst_alpha.segment));
        // Both point at the same physical snapshot directory.
        assert_eq!(src_alpha.dir, dst_alpha.dir);
    }

    #[test]
    fn files_are_snapshotted_in_name_order() {
        let (_tmp, opts, key) = fixture();
        let ctx = TreeContext { opts: &opts, key: &key };
        let source = build_tree(&ctx, TreeRole::Source, &mut IdSequence::new()).unwrap();

        assert_eq!(source.files.len(), 1);
        assert_eq!(source.files[0].name, "top.txt");
        assert_eq!(source.children[1].children[0].files[0].name, "d.txt");
    }

    #[test]
    fn missing_directory_yields_empty_node() {
        let (tmp, mut opts, key) = fixture();
        opts.source = tmp.path().join("does-not-exist");
        let ctx = TreeContext { opts: &opts, key: &key };

        let node = build_tree(&ctx, TreeRole::Source, &mut IdSequence::new()).unwrap();
        assert!(node.files.is_empty());
        assert!(node.children.is_empty());
    }

    #[test]
    fn find_by_id_and_index_agree() {
        let (_tmp, opts, key) = fixture();
        let ctx = TreeContext { opts: &opts, key: &key };
        let mut target = build_tree(&ctx, TreeRole::Target, &mut IdSequence::new()).unwrap();
        let index = build_index(&target);

        let mut ids = Vec::new();
        collect_ids(&target, &mut ids);
        for id in ids {
            let via_search = target.find_by_id(id).map(|n| n.out_path.clone()).unwrap();
            let via_index = resolve_mut(&mut target, &index, id)
                .map(|n| n.out_path.clone())
                .unwrap();
            assert_eq!(via_search, via_index);
        }
        assert!(target.find_by_id(99).is_none());
        assert!(resolve_mut(&mut target, &index, 99).is_none());
    }
}
