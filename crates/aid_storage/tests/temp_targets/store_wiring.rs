#![forbid(unsafe_code)]

use aid_kernel_contracts::profile::TemporaryTarget;
use aid_kernel_contracts::EpochTimeMs;
use aid_storage::temp_targets::TemporaryTargetStore;
use aid_storage::StorageError;

fn target(low: f64, high: f64, started_at: i64, duration_min: u32) -> TemporaryTarget {
    TemporaryTarget::v1(low, high, EpochTimeMs(started_at), duration_min).unwrap()
}

#[test]
fn at_tt_db_01_duplicate_id_rejected() {
    let mut store = TemporaryTargetStore::new_in_memory();
    store.insert(1, target(80.0, 100.0, 1_000, 60)).unwrap();
    assert!(matches!(
        store.insert(1, target(90.0, 110.0, 2_000, 60)),
        Err(StorageError::DuplicateKey { .. })
    ));
    assert_eq!(store.len(), 1);
}

#[test]
fn at_tt_db_02_active_at_respects_window() {
    let mut store = TemporaryTargetStore::new_in_memory();
    store.insert(1, target(80.0, 100.0, 60_000, 30)).unwrap();

    assert!(store.active_at(EpochTimeMs(59_999)).is_none());
    assert!(store.active_at(EpochTimeMs(60_000)).is_some());
    assert!(store.active_at(EpochTimeMs(60_000 + 30 * 60_000 - 1)).is_some());
    assert!(store.active_at(EpochTimeMs(60_000 + 30 * 60_000)).is_none());
}

#[test]
fn at_tt_db_03_latest_start_wins_under_overlap() {
    let mut store = TemporaryTargetStore::new_in_memory();
    store.insert(1, target(80.0, 100.0, 60_000, 120)).unwrap();
    store.insert(2, target(90.0, 110.0, 90_000, 120)).unwrap();

    let active = store.active_at(EpochTimeMs(100_000)).unwrap();
    assert_eq!(active.low_target_mgdl, 90.0);
}

#[test]
fn at_tt_db_04_cancel_truncates_window() {
    let mut store = TemporaryTargetStore::new_in_memory();
    store.insert(1, target(80.0, 100.0, 60_000, 120)).unwrap();

    store.cancel(1, EpochTimeMs(60_000 + 10 * 60_000)).unwrap();
    assert!(store.active_at(EpochTimeMs(60_000 + 5 * 60_000)).is_some());
    assert!(store.active_at(EpochTimeMs(60_000 + 11 * 60_000)).is_none());
}

#[test]
fn at_tt_db_05_cancel_before_start_removes_row() {
    let mut store = TemporaryTargetStore::new_in_memory();
    store.insert(1, target(80.0, 100.0, 60_000, 120)).unwrap();

    store.cancel(1, EpochTimeMs(1_000)).unwrap();
    assert!(store.is_empty());
    assert!(matches!(
        store.cancel(1, EpochTimeMs(2_000)),
        Err(StorageError::NotFound { .. })
    ));
}
