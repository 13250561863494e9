//! Dry-run parity: a dry run reports exactly the stats of a real run and
//! leaves the filesystem untouched.

use std::fs;
use std::path::{Path, PathBuf};

use cmr_core::{ForceMode, OperationMode, SyncOptions};
use cmr_sync::{SyncSession, SyncStats};
use tempfile::TempDir;

fn setup() -> (TempDir, PathBuf, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("source");
    let target = tmp.path().join("target");
    fs::create_dir_all(source.join("sub")).unwrap();
    fs::create_dir_all(&target).unwrap();
    fs::write(source.join("one.txt"), b"one").unwrap();
    fs::write(source.join("two.txt"), b"two").unwrap();
    fs::write(source.join("sub/three.txt"), b"three").unwrap();
    let key = tmp.path().join("master.key");
    fs::write(&key, [0x42u8; 64]).unwrap();
    (tmp, source, target, key)
}

fn opts(
    source: &Path,
    target: &Path,
    key: &Path,
    mode: OperationMode,
    dry_run: bool,
) -> SyncOptions {
    SyncOptions::new(
        source.to_path_buf(),
        target.to_path_buf(),
        key.to_path_buf(),
        mode,
        ForceMode::None,
        false,
        dry_run,
    )
}

fn run(options: SyncOptions) -> SyncStats {
    let mut session = SyncSession::new(options).unwrap();
    let mut stats = session.process().unwrap();
    session.cleanup(&mut stats).unwrap();
    stats
}

fn entry_count(root: &Path) -> usize {
    let mut count = 0;
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let entry = entry.unwrap();
            count += 1;
            if entry.file_type().unwrap().is_dir() {
                stack.push(entry.path());
            }
        }
    }
    count
}

#[test]
fn dry_encrypt_reports_real_stats_and_writes_nothing() {
    let (_tmp, source, target, key) = setup();

    let dry = run(opts(&source, &target, &key, OperationMode::Encrypt, true));
    assert_eq!(entry_count(&target), 0);

    let real = run(opts(&source, &target, &key, OperationMode::Encrypt, false));
    assert_eq!(dry, real);
}

#[test]
fn dry_incremental_run_matches_real_incremental_run() {
    let (_tmp, source, target, key) = setup();
    run(opts(&source, &target, &key, OperationMode::Encrypt, false));
    fs::write(source.join("two.txt"), b"two, revised").unwrap();

    let before = entry_count(&target);
    let dry = run(opts(&source, &target, &key, OperationMode::Encrypt, true));
    assert_eq!(entry_count(&target), before);

    let real = run(opts(&source, &target, &key, OperationMode::Encrypt, false));
    assert_eq!(dry, real);
    assert_eq!(real.processed, 1);
    assert_eq!(real.skipped, 2);
}

#[test]
fn dry_cleanup_counts_orphans_but_removes_nothing() {
    let (_tmp, source, target, key) = setup();
    run(opts(&source, &target, &key, OperationMode::Encrypt, false));

    fs::remove_file(source.join("one.txt")).unwrap();
    fs::remove_dir_all(source.join("sub")).unwrap();

    let before = entry_count(&target);
    let dry = run(opts(&source, &target, &key, OperationMode::Encrypt, true));
    assert_eq!(dry.files_pruned, 1);
    assert_eq!(dry.dirs_pruned, 1);
    assert_eq!(entry_count(&target), before);

    let real = run(opts(&source, &target, &key, OperationMode::Encrypt, false));
    assert_eq!(real.files_pruned, 1);
    assert_eq!(real.dirs_pruned, 1);
    assert!(entry_count(&target) < before);
}

#[test]
fn dry_decrypt_touches_nothing() {
    let (tmp, source, target, key) = setup();
    run(opts(&source, &target, &key, OperationMode::Encrypt, false));

    let restore = tmp.path().join("restore");
    fs::create_dir_all(&restore).unwrap();
    let dry = run(opts(&target, &restore, &key, OperationMode::Decrypt, true));
    assert_eq!(dry.processed, 3);
    assert_eq!(entry_count(&restore), 0);
}
