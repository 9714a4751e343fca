#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::common::{require_finite, require_in_range};
use crate::{ContractViolation, EpochTimeMs, SchemaVersion, Validate};

pub const THERAPY_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

/// Immutable per-run snapshot of the operating therapy profile. Values here
/// are only sanity-checked for physical plausibility; the absolute
/// hard-limit gates run later, at validation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub schema_version: SchemaVersion,
    pub target_low_mgdl: f64,
    pub target_high_mgdl: f64,
    pub target_mgdl: f64,
    pub dia_hours: f64,
    pub ic_ratio_g_per_u: f64,
    pub isf_mgdl_per_u: f64,
    pub max_daily_basal_u_per_h: f64,
    pub current_basal_u_per_h: f64,
}

impl ProfileSnapshot {
    #[allow(clippy::too_many_arguments)]
    pub fn v1(
        target_low_mgdl: f64,
        target_high_mgdl: f64,
        target_mgdl: f64,
        dia_hours: f64,
        ic_ratio_g_per_u: f64,
        isf_mgdl_per_u: f64,
        max_daily_basal_u_per_h: f64,
        current_basal_u_per_h: f64,
    ) -> Result<Self, ContractViolation> {
        let p = Self {
            schema_version: THERAPY_CONTRACT_VERSION,
            target_low_mgdl,
            target_high_mgdl,
            target_mgdl,
            dia_hours,
            ic_ratio_g_per_u,
            isf_mgdl_per_u,
            max_daily_basal_u_per_h,
            current_basal_u_per_h,
        };
        p.validate()?;
        Ok(p)
    }
}

impl Validate for ProfileSnapshot {
    fn validate(&self) -> Result<(), ContractViolation> {
        require_in_range("profile_snapshot.target_low_mgdl", self.target_low_mgdl, 1.0, 1000.0)?;
        require_in_range("profile_snapshot.target_high_mgdl", self.target_high_mgdl, 1.0, 1000.0)?;
        require_in_range("profile_snapshot.target_mgdl", self.target_mgdl, 1.0, 1000.0)?;
        require_in_range("profile_snapshot.dia_hours", self.dia_hours, 0.1, 48.0)?;
        require_in_range("profile_snapshot.ic_ratio_g_per_u", self.ic_ratio_g_per_u, 0.1, 500.0)?;
        require_in_range("profile_snapshot.isf_mgdl_per_u", self.isf_mgdl_per_u, 0.1, 5000.0)?;
        require_in_range(
            "profile_snapshot.max_daily_basal_u_per_h",
            self.max_daily_basal_u_per_h,
            0.0,
            100.0,
        )?;
        require_in_range(
            "profile_snapshot.current_basal_u_per_h",
            self.current_basal_u_per_h,
            0.0,
            100.0,
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PumpState {
    pub base_basal_rate_u_per_h: f64,
    pub supports_temp_basal: bool,
}

impl PumpState {
    pub fn v1(base_basal_rate_u_per_h: f64, supports_temp_basal: bool) -> Result<Self, ContractViolation> {
        let p = Self {
            base_basal_rate_u_per_h,
            supports_temp_basal,
        };
        p.validate()?;
        Ok(p)
    }
}

impl Validate for PumpState {
    fn validate(&self) -> Result<(), ContractViolation> {
        require_in_range(
            "pump_state.base_basal_rate_u_per_h",
            self.base_basal_rate_u_per_h,
            0.0,
            100.0,
        )?;
        Ok(())
    }
}

/// Time-bounded override of the glycemic target corridor. At most one is
/// active at a given instant; the store's answer for "active at now" is
/// authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporaryTarget {
    pub schema_version: SchemaVersion,
    pub low_target_mgdl: f64,
    pub high_target_mgdl: f64,
    pub started_at: EpochTimeMs,
    pub duration_min: u32,
}

impl TemporaryTarget {
    pub fn v1(
        low_target_mgdl: f64,
        high_target_mgdl: f64,
        started_at: EpochTimeMs,
        duration_min: u32,
    ) -> Result<Self, ContractViolation> {
        let t = Self {
            schema_version: THERAPY_CONTRACT_VERSION,
            low_target_mgdl,
            high_target_mgdl,
            started_at,
            duration_min,
        };
        t.validate()?;
        Ok(t)
    }

    /// The override's single target value: midpoint of the corridor.
    pub fn target_mgdl(&self) -> f64 {
        (self.low_target_mgdl + self.high_target_mgdl) / 2.0
    }

    pub fn ends_at(&self) -> EpochTimeMs {
        self.started_at.plus_minutes(self.duration_min)
    }

    pub fn active_at(&self, now: EpochTimeMs) -> bool {
        self.started_at <= now && now < self.ends_at()
    }
}

impl Validate for TemporaryTarget {
    fn validate(&self) -> Result<(), ContractViolation> {
        require_in_range("temporary_target.low_target_mgdl", self.low_target_mgdl, 1.0, 1000.0)?;
        require_in_range("temporary_target.high_target_mgdl", self.high_target_mgdl, 1.0, 1000.0)?;
        require_finite("temporary_target.target_mgdl", self.target_mgdl())?;
        self.started_at.validate()?;
        if self.duration_min == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "temporary_target.duration_min",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}
