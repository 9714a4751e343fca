#![forbid(unsafe_code)]

use aid_kernel_contracts::hard_limits::{
    self, STANDING_MAX_BG, STANDING_MIN_BG, STANDING_TARGET_BG, TEMP_MAX_BG, TEMP_MIN_BG,
    TEMP_TARGET_BG,
};
use aid_kernel_contracts::profile::{ProfileSnapshot, TemporaryTarget};

/// Effective glycemic target corridor for one run. `is_temp_target`
/// propagates to the dose engine because an active override changes dosing
/// aggressiveness downstream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedTargets {
    pub min_bg_mgdl: f64,
    pub max_bg_mgdl: f64,
    pub target_bg_mgdl: f64,
    pub is_temp_target: bool,
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Resolve the effective targets: the profile corridor clamped against the
/// standing hard bounds, unless a temporary target is active, in which case
/// its values replace the profile's and are clamped against the wider
/// temp-target bounds instead.
pub fn resolve_targets(
    profile: &ProfileSnapshot,
    active_temp_target: Option<&TemporaryTarget>,
) -> ResolvedTargets {
    match active_temp_target {
        Some(temp_target) => ResolvedTargets {
            min_bg_mgdl: hard_limits::verify(temp_target.low_target_mgdl, TEMP_MIN_BG),
            max_bg_mgdl: hard_limits::verify(temp_target.high_target_mgdl, TEMP_MAX_BG),
            target_bg_mgdl: hard_limits::verify(temp_target.target_mgdl(), TEMP_TARGET_BG),
            is_temp_target: true,
        },
        None => ResolvedTargets {
            min_bg_mgdl: hard_limits::verify(round_to_tenth(profile.target_low_mgdl), STANDING_MIN_BG),
            max_bg_mgdl: hard_limits::verify(round_to_tenth(profile.target_high_mgdl), STANDING_MAX_BG),
            target_bg_mgdl: hard_limits::verify(profile.target_mgdl, STANDING_TARGET_BG),
            is_temp_target: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aid_kernel_contracts::EpochTimeMs;

    fn profile(low: f64, high: f64, target: f64) -> ProfileSnapshot {
        ProfileSnapshot::v1(low, high, target, 6.0, 10.0, 40.0, 1.2, 0.8).unwrap()
    }

    #[test]
    fn at_targets_01_profile_corridor_passes_through() {
        let resolved = resolve_targets(&profile(100.0, 120.0, 110.0), None);
        assert_eq!(resolved.min_bg_mgdl, 100.0);
        assert_eq!(resolved.max_bg_mgdl, 120.0);
        assert_eq!(resolved.target_bg_mgdl, 110.0);
        assert!(!resolved.is_temp_target);
    }

    #[test]
    fn at_targets_02_profile_values_clamped_to_standing_bounds() {
        let resolved = resolve_targets(&profile(50.0, 300.0, 60.0), None);
        assert_eq!(resolved.min_bg_mgdl, 72.0);
        assert_eq!(resolved.max_bg_mgdl, 270.0);
        assert_eq!(resolved.target_bg_mgdl, 80.0);
    }

    #[test]
    fn at_targets_03_profile_corridor_rounded_to_tenth() {
        let resolved = resolve_targets(&profile(99.97, 120.04, 110.0), None);
        assert_eq!(resolved.min_bg_mgdl, 100.0);
        assert_eq!(resolved.max_bg_mgdl, 120.0);
    }

    #[test]
    fn at_targets_04_active_override_replaces_profile() {
        let temp = TemporaryTarget::v1(80.0, 100.0, EpochTimeMs(1_000), 60).unwrap();
        let resolved = resolve_targets(&profile(100.0, 120.0, 110.0), Some(&temp));
        assert_eq!(resolved.min_bg_mgdl, 80.0);
        assert_eq!(resolved.max_bg_mgdl, 100.0);
        assert_eq!(resolved.target_bg_mgdl, 90.0);
        assert!(resolved.is_temp_target);
    }

    #[test]
    fn at_targets_05_override_clamped_to_temp_bounds() {
        let temp = TemporaryTarget::v1(60.0, 300.0, EpochTimeMs(1_000), 60).unwrap();
        let resolved = resolve_targets(&profile(100.0, 120.0, 110.0), Some(&temp));
        assert_eq!(resolved.min_bg_mgdl, 72.0);
        assert_eq!(resolved.max_bg_mgdl, 270.0);
        assert_eq!(resolved.target_bg_mgdl, 180.0);
    }
}
