#![forbid(unsafe_code)]

use aid_kernel_contracts::dosing::{DoseInput, DoseResult, IobEntry, MealData, SensitivityResult};
use aid_kernel_contracts::glucose::GlucoseStatus;
use aid_kernel_contracts::profile::ProfileSnapshot;
use aid_kernel_contracts::EpochTimeMs;
use aid_storage::run_cache::{input_fingerprint, RunResultCache, RunState};

fn profile() -> ProfileSnapshot {
    ProfileSnapshot::v1(100.0, 120.0, 110.0, 6.0, 10.0, 40.0, 1.2, 0.8).unwrap()
}

fn glucose() -> GlucoseStatus {
    GlucoseStatus::v1(140.0, 2.0, 1.5, 1.0, EpochTimeMs(1_700_000_000_000)).unwrap()
}

fn dose_input(max_iob: f64) -> DoseInput {
    DoseInput::v1(
        profile(),
        0.8,
        max_iob,
        1.5,
        100.0,
        120.0,
        110.0,
        vec![IobEntry::v1(1.2, 0.02, 0.4).unwrap()],
        glucose(),
        MealData::none(),
        1.0,
        false,
        true,
        false,
        true,
        true,
    )
    .unwrap()
}

fn dose_result(rate: f64) -> DoseResult {
    DoseResult::v1(rate, 30, None, true, serde_json::json!({})).unwrap()
}

#[test]
fn at_cache_db_01_commit_replaces_whole_state() {
    let mut cache = RunResultCache::new();
    assert!(cache.last_result().is_none());

    let first = RunState::completed_v1(
        EpochTimeMs(1_000),
        dose_result(0.5),
        SensitivityResult::neutral(),
        Some("fp_first".to_string()),
    )
    .unwrap();
    cache.commit(first);
    assert_eq!(cache.last_run(), Some(EpochTimeMs(1_000)));
    assert_eq!(cache.last_input_fingerprint(), Some("fp_first"));

    let second = RunState::completed_v1(
        EpochTimeMs(2_000),
        dose_result(0.9),
        SensitivityResult::v1(0.8, "resolved").unwrap(),
        None,
    )
    .unwrap();
    cache.commit(second);
    assert_eq!(cache.last_run(), Some(EpochTimeMs(2_000)));
    assert_eq!(cache.last_result().unwrap().rate_u_per_h, 0.9);
    assert_eq!(cache.last_sensitivity().ratio, 0.8);
    assert!(cache.last_input_fingerprint().is_none());
}

#[test]
fn at_cache_db_02_cleared_state_drops_result_keeps_sensitivity() {
    let mut cache = RunResultCache::new();
    cache.commit(
        RunState::completed_v1(
            EpochTimeMs(1_000),
            dose_result(0.5),
            SensitivityResult::neutral(),
            Some("fp".to_string()),
        )
        .unwrap(),
    );

    let sensitivity = SensitivityResult::v1(1.1, "resolved").unwrap();
    cache.commit(RunState::cleared(sensitivity.clone()));
    assert!(cache.last_result().is_none());
    assert!(cache.last_run().is_none());
    assert!(cache.last_input_fingerprint().is_none());
    assert_eq!(cache.last_sensitivity(), &sensitivity);
}

#[test]
fn at_cache_db_03_completed_state_validates_inputs() {
    assert!(RunState::completed_v1(
        EpochTimeMs(0),
        dose_result(0.5),
        SensitivityResult::neutral(),
        None,
    )
    .is_err());
}

#[test]
fn at_cache_db_04_fingerprint_is_stable_and_input_sensitive() {
    let a = input_fingerprint(&dose_input(3.0)).unwrap();
    let b = input_fingerprint(&dose_input(3.0)).unwrap();
    let c = input_fingerprint(&dose_input(2.5)).unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.len(), 64);
    assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
}
