//! cmr-sync: the synchronization engine
//!
//! Two isomorphic in-memory trees are built from the same point-in-time
//! snapshot of the source directory: a source tree whose paths are the real
//! filesystem paths, and a target tree whose paths are digest-substituted
//! under the target root. Ids are assigned pre-order with children in name
//! order, identically for both trees, so a source node resolves its paired
//! target node by id.
//!
//! A run is `process()` (walk the source tree, prepare each target directory,
//! classify each file, transform what needs transforming) followed by
//! `cleanup()` (remove target entries with no surviving source counterpart).

pub mod engine;
pub mod node;
pub mod reconcile;

pub use engine::{FileStatus, SyncSession, SyncStats};
pub use node::{DirNode, FileEntry, IdSequence, TreeRole, DIR_MARKER_EXT, ENCRYPTED_FILE_EXT};
