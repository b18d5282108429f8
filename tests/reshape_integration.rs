//! End-to-end reshape tests against the library API

use pertool::error::ReshapeError;
use pertool::reshape::{
    copy_parallel, copy_serial, scan_source_directory, ParallelOptions, SilentProgress,
};
use pertool::storage::{default_store, SharedPoolStore};
use pertool::testing::{expected_record, read_all_records, RecordingProgress, SourceFixture};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn reshape_serial(store: &SharedPoolStore, from: &Path, to: &Path, pools: usize) {
    let source = scan_source_directory(from, store.as_ref()).unwrap();
    copy_serial(&source, store.clone(), to, pools, &mut SilentProgress).unwrap();
}

async fn reshape_parallel(store: &SharedPoolStore, from: &Path, to: &Path, pools: usize) {
    let source = scan_source_directory(from, store.as_ref()).unwrap();
    let options = ParallelOptions {
        max_workers: 3,
        report_interval: Duration::from_millis(1),
    };
    copy_parallel(&source, store.clone(), to, pools, &options, &mut SilentProgress)
        .await
        .unwrap();
}

#[test]
fn test_round_trip_restores_original_layout() {
    let store = default_store();
    let original = TempDir::new().unwrap();
    let middle = TempDir::new().unwrap();
    let back = TempDir::new().unwrap();
    SourceFixture::new("si", 37, 4).write(original.path(), store.as_ref()).unwrap();

    reshape_serial(&store, original.path(), middle.path(), 9);
    reshape_serial(&store, middle.path(), back.path(), 4);

    let before = scan_source_directory(original.path(), store.as_ref()).unwrap();
    let after = scan_source_directory(back.path(), store.as_ref()).unwrap();
    let layout = |s: &pertool::reshape::SourceSet| {
        s.pools.iter().map(|p| (p.filename.clone(), p.nk_loc, p.nkq)).collect::<Vec<_>>()
    };
    assert_eq!(layout(&before), layout(&after));
    assert_eq!(
        read_all_records(original.path(), store.as_ref()).unwrap(),
        read_all_records(back.path(), store.as_ref()).unwrap()
    );
}

#[tokio::test]
async fn test_parallel_round_trip() {
    let store = default_store();
    let original = TempDir::new().unwrap();
    let middle = TempDir::new().unwrap();
    let back = TempDir::new().unwrap();
    SourceFixture::new("gaas", 29, 3).write(original.path(), store.as_ref()).unwrap();

    reshape_parallel(&store, original.path(), middle.path(), 8).await;
    reshape_parallel(&store, middle.path(), back.path(), 3).await;

    assert_eq!(
        read_all_records(back.path(), store.as_ref()).unwrap(),
        (0..29).map(expected_record).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_serial_and_parallel_agree_across_pool_counts() {
    let store = default_store();
    let src = TempDir::new().unwrap();
    SourceFixture::new("si", 31, 5).write(src.path(), store.as_ref()).unwrap();

    for pools in [1, 2, 5, 7, 31, 40] {
        let serial = TempDir::new().unwrap();
        let parallel = TempDir::new().unwrap();
        reshape_serial(&store, src.path(), serial.path(), pools);
        reshape_parallel(&store, src.path(), parallel.path(), pools).await;

        let a = scan_source_directory(serial.path(), store.as_ref()).unwrap();
        let b = scan_source_directory(parallel.path(), store.as_ref()).unwrap();
        assert_eq!(a.pools.len(), pools);
        assert_eq!(
            a.pools.iter().map(|p| (p.nk_loc, p.nkq)).collect::<Vec<_>>(),
            b.pools.iter().map(|p| (p.nk_loc, p.nkq)).collect::<Vec<_>>(),
            "layouts differ for {pools} pools"
        );
        assert_eq!(
            read_all_records(serial.path(), store.as_ref()).unwrap(),
            read_all_records(parallel.path(), store.as_ref()).unwrap()
        );
    }
}

#[tokio::test]
async fn test_parallel_progress_reaches_nkpt() {
    let store = default_store();
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    SourceFixture::new("si", 64, 4).write(src.path(), store.as_ref()).unwrap();
    let source = scan_source_directory(src.path(), store.as_ref()).unwrap();

    let mut progress = RecordingProgress::default();
    let options = ParallelOptions {
        max_workers: 2,
        report_interval: Duration::ZERO,
    };
    copy_parallel(&source, store.clone(), dst.path(), 16, &options, &mut progress)
        .await
        .unwrap();
    assert_eq!(progress.total, Some(64));
    assert_eq!(progress.positions.len(), 64);
    assert_eq!(progress.positions.last(), Some(&64));
}

fn assert_empty_pool_set(dir: &Path, store: &SharedPoolStore, pools: usize) {
    let set = scan_source_directory(dir, store.as_ref()).unwrap();
    assert_eq!(set.nkpt, 0);
    assert_eq!(set.nkq, 0);
    assert_eq!(
        set.pools.iter().map(|p| p.filename.clone()).collect::<Vec<_>>(),
        (1..=pools).map(|n| format!("si_eph_g2_p{n}.h5")).collect::<Vec<_>>()
    );
    assert!(set.pools.iter().all(|p| p.nk_loc == 0));
}

#[test]
fn test_serial_copy_of_empty_source_set() {
    let store = default_store();
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    SourceFixture::new("si", 0, 3).write(src.path(), store.as_ref()).unwrap();
    let source = scan_source_directory(src.path(), store.as_ref()).unwrap();
    assert_eq!(source.nkpt, 0);

    let mut progress = RecordingProgress::default();
    let summary = copy_serial(&source, store.clone(), dst.path(), 4, &mut progress).unwrap();
    assert_eq!(summary.records_copied, 0);
    assert_eq!(summary.files.len(), 4);
    assert_eq!(progress.total, Some(0));
    assert!(progress.positions.is_empty());
    assert!(progress.finished);
    assert_empty_pool_set(dst.path(), &store, 4);
}

#[tokio::test]
async fn test_parallel_copy_of_empty_source_set() {
    let store = default_store();
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    SourceFixture::new("si", 0, 3).write(src.path(), store.as_ref()).unwrap();
    let source = scan_source_directory(src.path(), store.as_ref()).unwrap();

    let mut progress = RecordingProgress::default();
    let options = ParallelOptions {
        max_workers: 2,
        report_interval: Duration::ZERO,
    };
    let summary = copy_parallel(&source, store.clone(), dst.path(), 4, &options, &mut progress)
        .await
        .unwrap();
    assert_eq!(summary.records_copied, 0);
    assert_eq!(summary.files.len(), 4);
    assert_eq!(progress.total, Some(0));
    assert!(progress.positions.is_empty());
    assert!(progress.finished);
    assert_empty_pool_set(dst.path(), &store, 4);
}

#[test]
fn test_scanning_twice_gives_same_result() {
    let store = default_store();
    let src = TempDir::new().unwrap();
    SourceFixture::new("si", 12, 5).write(src.path(), store.as_ref()).unwrap();
    assert_eq!(
        scan_source_directory(src.path(), store.as_ref()).unwrap(),
        scan_source_directory(src.path(), store.as_ref()).unwrap()
    );
}

#[tokio::test]
async fn test_non_empty_target_rejected_by_both_engines() {
    let store = default_store();
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    SourceFixture::new("si", 6, 2).write(src.path(), store.as_ref()).unwrap();
    fs::create_dir(dst.path().join("leftover")).unwrap();
    let source = scan_source_directory(src.path(), store.as_ref()).unwrap();

    let serial = copy_serial(&source, store.clone(), dst.path(), 2, &mut SilentProgress);
    assert!(matches!(serial, Err(ReshapeError::Precondition(_))));

    let parallel = copy_parallel(
        &source,
        store.clone(),
        dst.path(),
        2,
        &ParallelOptions::default(),
        &mut SilentProgress,
    )
    .await;
    assert!(matches!(parallel, Err(ReshapeError::Precondition(_))));
    assert_eq!(fs::read_dir(dst.path()).unwrap().count(), 1);
}
