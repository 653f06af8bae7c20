//! Round-trip and boundary behavior against a real directory.
//!
//! Run with: `cargo test --test roundtrip`

use fdspool::{OpError, Spool, SpoolConfig, SpoolError};

fn spool_in(dir: &tempfile::TempDir, max_open_files: usize) -> Spool {
    Spool::open(SpoolConfig::new(dir.path(), max_open_files)).expect("spool opens")
}

#[test]
fn basic_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let spool = spool_in(&dir, 2);

    let handle = spool.storage_for("a").unwrap();
    handle.write(0, b"hello ".to_vec()).unwrap().wait().unwrap();
    handle.write(6, b"world!".to_vec()).unwrap().wait().unwrap();

    let bytes = handle.read(0, 12).unwrap().wait().unwrap();
    assert_eq!(&bytes, b"hello world!");
}

#[test]
fn disjoint_writes_commute() {
    let dir = tempfile::tempdir().unwrap();
    let spool = spool_in(&dir, 2);

    let handle = spool.storage_for("disjoint").unwrap();
    // Submitted back-to-back without waiting: the ranges do not overlap, so
    // completion order cannot change the observable contents.
    let t_high = handle.write(8, b"33333333".to_vec()).unwrap();
    let t_low = handle.write(0, b"11111111".to_vec()).unwrap();
    t_low.wait().unwrap();
    t_high.wait().unwrap();

    let bytes = handle.read(0, 16).unwrap().wait().unwrap();
    assert_eq!(&bytes, b"1111111133333333");
}

#[test]
fn interleaved_large_io() {
    let dir = tempfile::tempdir().unwrap();
    let spool = spool_in(&dir, 2);

    let handle = spool.storage_for("big").unwrap();
    handle.write(0, vec![0u8; 2048]).unwrap().wait().unwrap();
    handle.write(1024, vec![0u8; 32768]).unwrap().wait().unwrap();

    // Both reads in flight at once against the same worker.
    let first = handle.read(0, 2048).unwrap();
    let second = handle.read(1024, 32768).unwrap();

    let first = first.wait().unwrap();
    let second = second.wait().unwrap();
    assert_eq!(first.len(), 2048);
    assert_eq!(second.len(), 32768);
    assert!(first.iter().all(|&b| b == 0));
    assert!(second.iter().all(|&b| b == 0));
}

#[test]
fn lazy_directory_creation() {
    let dir = tempfile::tempdir().unwrap();
    let spool = spool_in(&dir, 1);

    let nested = spool.storage_for("sub/nested/leaf").unwrap();
    nested.write(0, b"n".to_vec()).unwrap().wait().unwrap();

    assert!(dir.path().join("sub/nested").is_dir());
    assert!(dir.path().join("sub/nested/leaf").is_file());
    assert_eq!(spool.stats().dir_creates, 1);

    // Force the nested worker through a close/reopen cycle; the sticky
    // directory bit must keep the second open from re-running the mkdir.
    let other = spool.storage_for("plain").unwrap();
    other.write(0, b"p".to_vec()).unwrap().wait().unwrap();
    nested.write(1, b"n".to_vec()).unwrap().wait().unwrap();

    let stats = spool.stats();
    assert_eq!(stats.dir_creates, 2, "one mkdir per worker, ever: {stats:?}");
}

#[test]
fn zero_sized_read_is_rejected_synchronously() {
    let dir = tempfile::tempdir().unwrap();
    let spool = spool_in(&dir, 2);

    let handle = spool.storage_for("empty-read").unwrap();
    assert!(matches!(
        handle.read(0, 0),
        Err(SpoolError::ZeroSizedRead)
    ));
}

#[test]
fn read_past_eof_is_a_short_read() {
    let dir = tempfile::tempdir().unwrap();
    let spool = spool_in(&dir, 2);

    let handle = spool.storage_for("short").unwrap();
    handle.write(0, b"abc".to_vec()).unwrap().wait().unwrap();

    match handle.read(10, 4).unwrap().wait() {
        Err(OpError::ShortRead { requested: 4, got: 0 }) => {}
        other => panic!("expected short read, got {other:?}"),
    }
    match handle.read(1, 4).unwrap().wait() {
        Err(OpError::ShortRead { requested: 4, got: 2 }) => {}
        other => panic!("expected partial short read, got {other:?}"),
    }
}

#[test]
fn read_of_a_never_written_file_is_short_not_missing() {
    let dir = tempfile::tempdir().unwrap();
    let spool = spool_in(&dir, 2);

    // The first open creates the file lazily with create-if-missing.
    let handle = spool.storage_for("fresh").unwrap();
    match handle.read(0, 1).unwrap().wait() {
        Err(OpError::ShortRead { got: 0, .. }) => {}
        other => panic!("expected short read at EOF, got {other:?}"),
    }
    assert!(dir.path().join("fresh").is_file());
}

#[test]
fn open_never_truncates_existing_contents() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("kept"), b"pre-existing").unwrap();

    let spool = spool_in(&dir, 2);
    let handle = spool.storage_for("kept").unwrap();
    let bytes = handle.read(0, 12).unwrap().wait().unwrap();
    assert_eq!(&bytes, b"pre-existing");
}

#[test]
fn storage_for_is_memoised() {
    let dir = tempfile::tempdir().unwrap();
    let spool = spool_in(&dir, 2);

    let first = spool.storage_for("same").unwrap();
    let second = spool.storage_for("same").unwrap();
    first.write(0, b"x".to_vec()).unwrap().wait().unwrap();
    // Both handles address the same worker and file.
    assert_eq!(&second.read(0, 1).unwrap().wait().unwrap(), b"x");
    assert_eq!(spool.stats().files_opened, 1);
}

#[test]
fn short_path_hygiene_is_enforced() {
    let dir = tempfile::tempdir().unwrap();
    let spool = spool_in(&dir, 2);

    assert!(matches!(
        spool.storage_for(""),
        Err(SpoolError::InvalidShortPath { .. })
    ));
    assert!(matches!(
        spool.storage_for("/etc/passwd"),
        Err(SpoolError::InvalidShortPath { .. })
    ));
    assert!(matches!(
        spool.storage_for("../outside"),
        Err(SpoolError::InvalidShortPath { .. })
    ));
    assert!(matches!(
        spool.storage_for("ok/../not-ok"),
        Err(SpoolError::InvalidShortPath { .. })
    ));
}

#[test]
fn invalid_configs_are_construction_errors() {
    assert!(matches!(
        Spool::open(SpoolConfig::new("", 4)),
        Err(SpoolError::InvalidConfig { .. })
    ));
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        Spool::open(SpoolConfig::new(dir.path(), 0)),
        Err(SpoolError::InvalidConfig { .. })
    ));
}

#[test]
fn handles_outlive_the_store_but_fail_fast() {
    let dir = tempfile::tempdir().unwrap();
    let spool = spool_in(&dir, 2);
    let handle = spool.storage_for("orphan").unwrap();
    handle.write(0, b"z".to_vec()).unwrap().wait().unwrap();

    drop(spool);
    assert!(matches!(
        handle.write(1, b"late".to_vec()),
        Err(SpoolError::Shutdown)
    ));
    assert!(matches!(handle.read(0, 1), Err(SpoolError::Shutdown)));
}
