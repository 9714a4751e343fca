#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::common::{require_finite, require_in_range};
use crate::constraint::AuditTrail;
use crate::glucose::GlucoseStatus;
use crate::profile::ProfileSnapshot;
use crate::{ContractViolation, EpochTimeMs, SchemaVersion, Validate};

pub const DOSING_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

/// Outcome of the autosensitivity resolution step. `neutral()` is the
/// placeholder used when autosens is disabled by configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityResult {
    pub ratio: f64,
    pub label: String,
}

impl SensitivityResult {
    pub fn v1(ratio: f64, label: impl Into<String>) -> Result<Self, ContractViolation> {
        let s = Self {
            ratio,
            label: label.into(),
        };
        s.validate()?;
        Ok(s)
    }

    pub fn neutral() -> Self {
        Self {
            ratio: 1.0,
            label: "autosens disabled".to_string(),
        }
    }
}

impl Validate for SensitivityResult {
    fn validate(&self) -> Result<(), ContractViolation> {
        require_in_range("sensitivity_result.ratio", self.ratio, 0.1, 10.0)?;
        if self.label.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "sensitivity_result.label",
                reason: "must not be empty",
            });
        }
        Ok(())
    }
}

/// One slot of the insulin-on-board projection, indexed by time offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IobEntry {
    pub iob_u: f64,
    pub activity_u_per_min: f64,
    pub basal_iob_u: f64,
}

impl IobEntry {
    pub fn v1(iob_u: f64, activity_u_per_min: f64, basal_iob_u: f64) -> Result<Self, ContractViolation> {
        let e = Self {
            iob_u,
            activity_u_per_min,
            basal_iob_u,
        };
        e.validate()?;
        Ok(e)
    }
}

impl Validate for IobEntry {
    fn validate(&self) -> Result<(), ContractViolation> {
        require_finite("iob_entry.iob_u", self.iob_u)?;
        require_finite("iob_entry.activity_u_per_min", self.activity_u_per_min)?;
        require_finite("iob_entry.basal_iob_u", self.basal_iob_u)?;
        Ok(())
    }
}

/// Aggregate meal and carbohydrate-absorption context for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealData {
    pub carbs_g: f64,
    pub meal_cob_g: f64,
    pub slope_from_max_deviation: f64,
    pub slope_from_min_deviation: f64,
    pub last_bolus_at: Option<EpochTimeMs>,
    pub last_carb_at: Option<EpochTimeMs>,
}

impl MealData {
    pub fn v1(
        carbs_g: f64,
        meal_cob_g: f64,
        slope_from_max_deviation: f64,
        slope_from_min_deviation: f64,
        last_bolus_at: Option<EpochTimeMs>,
        last_carb_at: Option<EpochTimeMs>,
    ) -> Result<Self, ContractViolation> {
        let m = Self {
            carbs_g,
            meal_cob_g,
            slope_from_max_deviation,
            slope_from_min_deviation,
            last_bolus_at,
            last_carb_at,
        };
        m.validate()?;
        Ok(m)
    }

    pub fn none() -> Self {
        Self {
            carbs_g: 0.0,
            meal_cob_g: 0.0,
            slope_from_max_deviation: 0.0,
            slope_from_min_deviation: 0.0,
            last_bolus_at: None,
            last_carb_at: None,
        }
    }
}

impl Validate for MealData {
    fn validate(&self) -> Result<(), ContractViolation> {
        require_in_range("meal_data.carbs_g", self.carbs_g, 0.0, 1000.0)?;
        require_in_range("meal_data.meal_cob_g", self.meal_cob_g, 0.0, 1000.0)?;
        require_finite("meal_data.slope_from_max_deviation", self.slope_from_max_deviation)?;
        require_finite("meal_data.slope_from_min_deviation", self.slope_from_min_deviation)?;
        if let Some(t) = self.last_bolus_at {
            t.validate()?;
        }
        if let Some(t) = self.last_carb_at {
            t.validate()?;
        }
        Ok(())
    }
}

/// A running temp basal as reported by history, converted to an absolute
/// rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempBasal {
    pub rate_u_per_h: f64,
    pub duration_min: u32,
    pub started_at: EpochTimeMs,
}

impl TempBasal {
    pub fn v1(rate_u_per_h: f64, duration_min: u32, started_at: EpochTimeMs) -> Result<Self, ContractViolation> {
        let t = Self {
            rate_u_per_h,
            duration_min,
            started_at,
        };
        t.validate()?;
        Ok(t)
    }
}

impl Validate for TempBasal {
    fn validate(&self) -> Result<(), ContractViolation> {
        require_in_range("temp_basal.rate_u_per_h", self.rate_u_per_h, 0.0, 100.0)?;
        self.started_at.validate()?;
        Ok(())
    }
}

/// Exercise-mode inputs to the insulin-on-board projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExerciseSettings {
    pub exercise_mode: bool,
    pub half_basal_exercise_target_mgdl: f64,
}

impl Default for ExerciseSettings {
    fn default() -> Self {
        Self {
            exercise_mode: false,
            half_basal_exercise_target_mgdl: 160.0,
        }
    }
}

impl Validate for ExerciseSettings {
    fn validate(&self) -> Result<(), ContractViolation> {
        require_in_range(
            "exercise_settings.half_basal_exercise_target_mgdl",
            self.half_basal_exercise_target_mgdl,
            1.0,
            1000.0,
        )?;
        Ok(())
    }
}

/// The complete validated input bundle handed to the dose-computation
/// engine. Immutable once built; the engine is invoked exactly once per
/// run with one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoseInput {
    pub schema_version: SchemaVersion,
    pub profile: ProfileSnapshot,
    pub pump_base_basal_u_per_h: f64,
    pub max_iob_u: f64,
    pub max_basal_u_per_h: f64,
    pub min_bg_mgdl: f64,
    pub max_bg_mgdl: f64,
    pub target_bg_mgdl: f64,
    pub iob_array: Vec<IobEntry>,
    pub glucose: GlucoseStatus,
    pub meal: MealData,
    pub autosens_ratio: f64,
    pub is_temp_target: bool,
    pub smb_allowed: bool,
    pub uam_allowed: bool,
    pub advanced_filtering_allowed: bool,
    pub advanced_filtering_source: bool,
}

impl DoseInput {
    #[allow(clippy::too_many_arguments)]
    pub fn v1(
        profile: ProfileSnapshot,
        pump_base_basal_u_per_h: f64,
        max_iob_u: f64,
        max_basal_u_per_h: f64,
        min_bg_mgdl: f64,
        max_bg_mgdl: f64,
        target_bg_mgdl: f64,
        iob_array: Vec<IobEntry>,
        glucose: GlucoseStatus,
        meal: MealData,
        autosens_ratio: f64,
        is_temp_target: bool,
        smb_allowed: bool,
        uam_allowed: bool,
        advanced_filtering_allowed: bool,
        advanced_filtering_source: bool,
    ) -> Result<Self, ContractViolation> {
        let input = Self {
            schema_version: DOSING_CONTRACT_VERSION,
            profile,
            pump_base_basal_u_per_h,
            max_iob_u,
            max_basal_u_per_h,
            min_bg_mgdl,
            max_bg_mgdl,
            target_bg_mgdl,
            iob_array,
            glucose,
            meal,
            autosens_ratio,
            is_temp_target,
            smb_allowed,
            uam_allowed,
            advanced_filtering_allowed,
            advanced_filtering_source,
        };
        input.validate()?;
        Ok(input)
    }
}

impl Validate for DoseInput {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.profile.validate()?;
        self.glucose.validate()?;
        self.meal.validate()?;
        require_in_range(
            "dose_input.pump_base_basal_u_per_h",
            self.pump_base_basal_u_per_h,
            0.0,
            100.0,
        )?;
        require_in_range("dose_input.max_iob_u", self.max_iob_u, 0.0, 100.0)?;
        require_in_range("dose_input.max_basal_u_per_h", self.max_basal_u_per_h, 0.0, 100.0)?;
        require_in_range("dose_input.min_bg_mgdl", self.min_bg_mgdl, 1.0, 1000.0)?;
        require_in_range("dose_input.max_bg_mgdl", self.max_bg_mgdl, 1.0, 1000.0)?;
        require_in_range("dose_input.target_bg_mgdl", self.target_bg_mgdl, 1.0, 1000.0)?;
        require_in_range("dose_input.autosens_ratio", self.autosens_ratio, 0.1, 10.0)?;
        if self.iob_array.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "dose_input.iob_array",
                reason: "must not be empty",
            });
        }
        for entry in &self.iob_array {
            entry.validate()?;
        }
        Ok(())
    }
}

/// The engine's recommendation. The orchestrator mutates this post-hoc
/// (current-IOB echo, completion timestamp, constraint trail) before it is
/// cached; nothing else may touch it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoseResult {
    pub schema_version: SchemaVersion,
    pub rate_u_per_h: f64,
    pub duration_min: u32,
    pub smb_units: Option<f64>,
    pub temp_basal_requested: bool,
    pub iob: Option<IobEntry>,
    pub computed_at: Option<EpochTimeMs>,
    pub diagnostics: serde_json::Value,
    pub constraint_trail: AuditTrail,
}

impl DoseResult {
    pub fn v1(
        rate_u_per_h: f64,
        duration_min: u32,
        smb_units: Option<f64>,
        temp_basal_requested: bool,
        diagnostics: serde_json::Value,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: DOSING_CONTRACT_VERSION,
            rate_u_per_h,
            duration_min,
            smb_units,
            temp_basal_requested,
            iob: None,
            computed_at: None,
            diagnostics,
            constraint_trail: AuditTrail::new(),
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for DoseResult {
    fn validate(&self) -> Result<(), ContractViolation> {
        require_in_range("dose_result.rate_u_per_h", self.rate_u_per_h, 0.0, 100.0)?;
        if let Some(units) = self.smb_units {
            require_in_range("dose_result.smb_units", units, 0.0, 100.0)?;
        }
        if let Some(iob) = &self.iob {
            iob.validate()?;
        }
        if let Some(at) = self.computed_at {
            at.validate()?;
        }
        Ok(())
    }
}

/// Failure surface of the external dose-computation engine. The kernel
/// never retries; a failed computation is surfaced as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    NoRecommendation,
    Internal { detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> ProfileSnapshot {
        ProfileSnapshot::v1(100.0, 120.0, 110.0, 6.0, 10.0, 40.0, 1.2, 0.8).unwrap()
    }

    fn glucose() -> GlucoseStatus {
        GlucoseStatus::v1(140.0, 2.0, 1.5, 1.0, EpochTimeMs(1_700_000_000_000)).unwrap()
    }

    fn iob() -> Vec<IobEntry> {
        vec![IobEntry::v1(1.2, 0.02, 0.4).unwrap()]
    }

    #[test]
    fn at_dosing_01_valid_input_constructs() {
        let input = DoseInput::v1(
            profile(),
            0.8,
            3.0,
            1.5,
            100.0,
            120.0,
            110.0,
            iob(),
            glucose(),
            MealData::none(),
            1.0,
            false,
            true,
            false,
            true,
            true,
        )
        .unwrap();
        assert_eq!(input.max_iob_u, 3.0);
    }

    #[test]
    fn at_dosing_02_empty_iob_array_rejected() {
        let err = DoseInput::v1(
            profile(),
            0.8,
            3.0,
            1.5,
            100.0,
            120.0,
            110.0,
            Vec::new(),
            glucose(),
            MealData::none(),
            1.0,
            false,
            true,
            false,
            true,
            true,
        );
        assert!(matches!(err, Err(ContractViolation::InvalidValue { .. })));
    }

    #[test]
    fn at_dosing_03_neutral_sensitivity_is_unity() {
        let s = SensitivityResult::neutral();
        assert_eq!(s.ratio, 1.0);
        assert_eq!(s.label, "autosens disabled");
        assert!(s.validate().is_ok());
    }

    #[test]
    fn at_dosing_04_result_rejects_negative_rate() {
        assert!(DoseResult::v1(-0.5, 30, None, true, serde_json::Value::Null).is_err());
    }

    #[test]
    fn at_dosing_05_result_round_trips_through_json() {
        let r = DoseResult::v1(0.75, 30, Some(0.3), true, serde_json::json!({"reason": "test"})).unwrap();
        let encoded = serde_json::to_string(&r).unwrap();
        let decoded: DoseResult = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, r);
    }
}
