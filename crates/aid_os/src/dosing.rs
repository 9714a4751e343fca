#![forbid(unsafe_code)]

//! Dosing OS wiring: one synchronous run from trigger to cached
//! recommendation. Collaborators are reached only through the traits below;
//! every failure collapses into a `RunOutcome` plus a published event, and
//! validation aborts leave the previous cached result untouched.

use aid_engines::constraints::{
    AdvancedFilteringToggle, AutosensToggle, ConstraintContext, EnablementConstraint, MaxBasalLimit,
    MaxIobLimit, RateConstraint, SmbToggle, UamToggle,
};
use aid_engines::sensitivity::{SensitivityGate, SensitivityGateConfig, SensitivityService};
use aid_engines::targets::resolve_targets;
use aid_kernel_contracts::constraint::{AuditTrail, ConstraintValue};
use aid_kernel_contracts::dosing::{
    DoseInput, DoseResult, EngineError, ExerciseSettings, IobEntry, MealData, SensitivityResult,
    TempBasal,
};
use aid_kernel_contracts::events::DosingEvent;
use aid_kernel_contracts::glucose::GlucoseStatus;
use aid_kernel_contracts::hard_limits;
use aid_kernel_contracts::profile::{ProfileSnapshot, PumpState, TemporaryTarget};
use aid_kernel_contracts::{ContractViolation, EpochTimeMs, ReasonCodeId, Validate};
use aid_storage::run_cache::{input_fingerprint, RunResultCache, RunState};
use aid_storage::temp_targets::TemporaryTargetStore;

pub mod reason_codes {
    use aid_kernel_contracts::ReasonCodeId;

    // Dosing OS wiring reason-code namespace. Values are placeholders until
    // registry lock.
    pub const DOSE_NO_PROFILE: ReasonCodeId = ReasonCodeId(0x4453_0101);
    pub const DOSE_LOOP_DISABLED: ReasonCodeId = ReasonCodeId(0x4453_0102);
    pub const DOSE_NO_GLUCOSE_DATA: ReasonCodeId = ReasonCodeId(0x4453_0103);
    pub const DOSE_NO_SENSITIVITY_DATA: ReasonCodeId = ReasonCodeId(0x4453_0104);
    pub const DOSE_HARD_LIMIT_VIOLATION: ReasonCodeId = ReasonCodeId(0x4453_01F1);
    pub const DOSE_INPUT_CONTRACT_VIOLATION: ReasonCodeId = ReasonCodeId(0x4453_01F2);
    pub const DOSE_ENGINE_FAILED: ReasonCodeId = ReasonCodeId(0x4453_01F3);
}

/// User-tunable preference keys. Values are read fresh on every run; the
/// kernel never caches them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrefKey {
    MaxIob,
    MaxBasal,
    CurrentBasalSafetyMultiplier,
    MaxDailySafetyMultiplier,
    UseSmb,
    UseUam,
    UseAutosens,
}

impl PrefKey {
    pub fn key(&self) -> &'static str {
        match self {
            PrefKey::MaxIob => "dosing_max_iob",
            PrefKey::MaxBasal => "dosing_max_basal",
            PrefKey::CurrentBasalSafetyMultiplier => "dosing_current_basal_safety_multiplier",
            PrefKey::MaxDailySafetyMultiplier => "dosing_max_daily_safety_multiplier",
            PrefKey::UseSmb => "dosing_use_smb",
            PrefKey::UseUam => "dosing_use_uam",
            PrefKey::UseAutosens => "dosing_use_autosens",
        }
    }
}

pub trait PreferenceStore {
    fn get_f64(&self, key: PrefKey, default: f64) -> f64;
    fn get_bool(&self, key: PrefKey, default: bool) -> bool;
}

pub trait ProfileProvider {
    fn active_profile(&self) -> Option<ProfileSnapshot>;
}

pub trait GlucoseStatusProvider {
    fn current_status(&self) -> Option<GlucoseStatus>;
    fn supports_advanced_filtering(&self) -> bool;
}

pub trait PumpStateProvider {
    fn pump_state(&self) -> PumpState;
}

pub trait IobHistoryService {
    fn iob_array_for_smb(
        &self,
        sensitivity: &SensitivityResult,
        exercise: &ExerciseSettings,
        is_temp_target: bool,
    ) -> Vec<IobEntry>;
    fn meal_data(&self) -> MealData;
    fn converted_temp_basal_at(&self, now: EpochTimeMs) -> Option<TempBasal>;
}

pub trait TemporaryTargetSource {
    fn active_at(&self, now: EpochTimeMs) -> Option<TemporaryTarget>;
}

impl TemporaryTargetSource for TemporaryTargetStore {
    fn active_at(&self, now: EpochTimeMs) -> Option<TemporaryTarget> {
        TemporaryTargetStore::active_at(self, now).cloned()
    }
}

/// The external dose-computation engine: pure, synchronous, single-shot per
/// run. The kernel performs no retries; failure is surfaced as-is.
pub trait DetermineBasalEngine {
    fn compute_dose(&self, input: &DoseInput) -> Result<DoseResult, EngineError>;
}

pub trait EventSink {
    fn publish(&self, event: DosingEvent);
}

/// Everything the pipeline reaches outside itself, bundled per call so the
/// wiring stays free of collaborator state.
#[derive(Clone, Copy)]
pub struct DosingServices<'a> {
    pub profile: &'a dyn ProfileProvider,
    pub glucose: &'a dyn GlucoseStatusProvider,
    pub pump: &'a dyn PumpStateProvider,
    pub history: &'a dyn IobHistoryService,
    pub sensitivity: &'a dyn SensitivityService,
    pub temp_targets: &'a dyn TemporaryTargetSource,
    pub engine: &'a dyn DetermineBasalEngine,
    pub events: &'a dyn EventSink,
    pub prefs: &'a dyn PreferenceStore,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DosingWiringConfig {
    pub loop_enabled: bool,
    pub sensitivity: SensitivityGateConfig,
    pub exercise: ExerciseSettings,
}

impl DosingWiringConfig {
    pub fn mvp_v1(loop_enabled: bool) -> Self {
        Self {
            loop_enabled,
            sensitivity: SensitivityGateConfig::mvp_v1(),
            exercise: ExerciseSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunTrigger {
    pub initiator: String,
    /// A fallback trigger (re-run after a rejected SMB delivery) seeds the
    /// SMB and advanced-filtering chains with `false`.
    pub temp_basal_fallback: bool,
}

impl RunTrigger {
    pub fn v1(initiator: impl Into<String>, temp_basal_fallback: bool) -> Result<Self, ContractViolation> {
        let t = Self {
            initiator: initiator.into(),
            temp_basal_fallback,
        };
        t.validate()?;
        Ok(t)
    }
}

impl Validate for RunTrigger {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.initiator.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "run_trigger.initiator",
                reason: "must not be empty",
            });
        }
        if self.initiator.len() > 64 {
            return Err(ContractViolation::InvalidValue {
                field: "run_trigger.initiator",
                reason: "must be <= 64 chars",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Validating,
    GatheringContext,
    Constraining,
    Invoking,
    Completed,
    Aborted,
    EngineFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Aborted { reason_code: ReasonCodeId },
    EngineFailed,
}

#[derive(Debug)]
pub struct DosingWiring {
    config: DosingWiringConfig,
    gate: SensitivityGate,
    phase: RunPhase,
}

impl DosingWiring {
    pub fn new(config: DosingWiringConfig) -> Result<Self, ContractViolation> {
        config.exercise.validate()?;
        let gate = SensitivityGate::new(config.sensitivity)?;
        Ok(Self {
            config,
            gate,
            phase: RunPhase::Idle,
        })
    }

    pub fn last_phase(&self) -> RunPhase {
        self.phase
    }

    fn abort(
        &mut self,
        services: &DosingServices<'_>,
        event: DosingEvent,
        reason_code: ReasonCodeId,
    ) -> RunOutcome {
        services.events.publish(event);
        self.phase = RunPhase::Aborted;
        RunOutcome::Aborted { reason_code }
    }

    /// Execute one full dosing run. The `&mut` cache borrow serializes
    /// runs: a second run over the same cache cannot start while this one
    /// is in flight. Validation aborts leave the cache untouched; only an
    /// engine failure replaces it with a cleared state.
    pub fn run_once(
        &mut self,
        services: &DosingServices<'_>,
        cache: &mut RunResultCache,
        trigger: &RunTrigger,
        now: EpochTimeMs,
    ) -> RunOutcome {
        self.phase = RunPhase::Validating;

        let Some(profile) = services.profile.active_profile() else {
            return self.abort(
                services,
                DosingEvent::NoData {
                    reason_code: reason_codes::DOSE_NO_PROFILE,
                },
                reason_codes::DOSE_NO_PROFILE,
            );
        };
        let pump = services.pump.pump_state();
        if !self.config.loop_enabled || !pump.supports_temp_basal {
            return self.abort(services, DosingEvent::LoopDisabled, reason_codes::DOSE_LOOP_DISABLED);
        }
        let Some(glucose) = services.glucose.current_status() else {
            return self.abort(
                services,
                DosingEvent::NoData {
                    reason_code: reason_codes::DOSE_NO_GLUCOSE_DATA,
                },
                reason_codes::DOSE_NO_GLUCOSE_DATA,
            );
        };
        if trigger.validate().is_err()
            || profile.validate().is_err()
            || pump.validate().is_err()
            || glucose.validate().is_err()
        {
            return self.abort(
                services,
                DosingEvent::RunRefused {
                    reason_code: reason_codes::DOSE_INPUT_CONTRACT_VIOLATION,
                },
                reason_codes::DOSE_INPUT_CONTRACT_VIOLATION,
            );
        }

        let hard_gates: [(&'static str, f64, hard_limits::HardBound); 5] = [
            ("insulin action duration", profile.dia_hours, hard_limits::DIA_HOURS),
            ("insulin to carb ratio", profile.ic_ratio_g_per_u, hard_limits::IC_RATIO_G_PER_U),
            ("insulin sensitivity factor", profile.isf_mgdl_per_u, hard_limits::ISF_MGDL_PER_U),
            (
                "max daily basal",
                profile.max_daily_basal_u_per_h,
                hard_limits::MAX_DAILY_BASAL_U_PER_H,
            ),
            (
                "current basal rate",
                pump.base_basal_rate_u_per_h,
                hard_limits::CURRENT_BASAL_U_PER_H,
            ),
        ];
        for (quantity, value, bound) in hard_gates {
            if !hard_limits::check(value, bound) {
                services
                    .events
                    .publish(DosingEvent::HardLimitViolation { quantity, value });
                self.phase = RunPhase::Aborted;
                return RunOutcome::Aborted {
                    reason_code: reason_codes::DOSE_HARD_LIMIT_VIOLATION,
                };
            }
        }

        self.phase = RunPhase::GatheringContext;
        let temp_target = services.temp_targets.active_at(now);
        let targets = resolve_targets(&profile, temp_target.as_ref());
        let ctx = ConstraintContext { profile: &profile };

        let mut autosens_allowed = ConstraintValue::new(true);
        AutosensToggle {
            enabled_preference: services.prefs.get_bool(PrefKey::UseAutosens, false),
        }
        .narrow(&mut autosens_allowed, &ctx);

        // The sensitivity ratio must be settled before the IOB projection:
        // the projection is a function of it.
        let sensitivity = match self.gate.resolve(
            autosens_allowed.value(),
            services.sensitivity,
            trigger.initiator.as_str(),
        ) {
            Ok(sensitivity) => sensitivity,
            Err(_) => {
                return self.abort(
                    services,
                    DosingEvent::NoData {
                        reason_code: reason_codes::DOSE_NO_SENSITIVITY_DATA,
                    },
                    reason_codes::DOSE_NO_SENSITIVITY_DATA,
                );
            }
        };
        let iob_array =
            services
                .history
                .iob_array_for_smb(&sensitivity, &self.config.exercise, targets.is_temp_target);
        let meal = services.history.meal_data();

        self.phase = RunPhase::Constraining;
        let mut trail = AuditTrail::new();
        trail.absorb(&autosens_allowed);

        let mut max_iob = ConstraintValue::new(f64::MAX);
        MaxIobLimit {
            enabled: self.config.loop_enabled,
            preference_max_iob_u: services.prefs.get_f64(PrefKey::MaxIob, 3.0),
        }
        .narrow(&mut max_iob, &ctx);
        trail.absorb(&max_iob);

        let mut max_basal = ConstraintValue::new(f64::MAX);
        MaxBasalLimit {
            enabled: self.config.loop_enabled,
            preference_max_basal_u_per_h: services.prefs.get_f64(PrefKey::MaxBasal, 1.0),
            current_basal_safety_multiplier: services
                .prefs
                .get_f64(PrefKey::CurrentBasalSafetyMultiplier, 4.0),
            max_daily_safety_multiplier: services
                .prefs
                .get_f64(PrefKey::MaxDailySafetyMultiplier, 3.0),
        }
        .narrow(&mut max_basal, &ctx);
        trail.absorb(&max_basal);

        let mut smb_allowed = ConstraintValue::new(!trigger.temp_basal_fallback);
        SmbToggle {
            enabled_preference: services.prefs.get_bool(PrefKey::UseSmb, false),
        }
        .narrow(&mut smb_allowed, &ctx);
        trail.absorb(&smb_allowed);

        let mut advanced_filtering = ConstraintValue::new(!trigger.temp_basal_fallback);
        AdvancedFilteringToggle {
            source_capable: services.glucose.supports_advanced_filtering(),
        }
        .narrow(&mut advanced_filtering, &ctx);
        trail.absorb(&advanced_filtering);

        let mut uam_allowed = ConstraintValue::new(true);
        UamToggle {
            enabled_preference: services.prefs.get_bool(PrefKey::UseUam, false),
        }
        .narrow(&mut uam_allowed, &ctx);
        trail.absorb(&uam_allowed);

        self.phase = RunPhase::Invoking;
        let input = match DoseInput::v1(
            profile,
            pump.base_basal_rate_u_per_h,
            max_iob.value(),
            max_basal.value(),
            targets.min_bg_mgdl,
            targets.max_bg_mgdl,
            targets.target_bg_mgdl,
            iob_array.clone(),
            glucose,
            meal,
            sensitivity.ratio,
            targets.is_temp_target,
            smb_allowed.value(),
            uam_allowed.value(),
            advanced_filtering.value(),
            services.glucose.supports_advanced_filtering(),
        ) {
            Ok(input) => input,
            Err(_) => {
                return self.abort(
                    services,
                    DosingEvent::RunRefused {
                        reason_code: reason_codes::DOSE_INPUT_CONTRACT_VIOLATION,
                    },
                    reason_codes::DOSE_INPUT_CONTRACT_VIOLATION,
                );
            }
        };

        let mut result = match services.engine.compute_dose(&input) {
            Ok(result) if result.validate().is_ok() => result,
            _ => {
                // A null recommendation must never keep being served as the
                // current plan.
                cache.commit(RunState::cleared(sensitivity));
                self.phase = RunPhase::EngineFailed;
                services.events.publish(DosingEvent::EngineFailed);
                return RunOutcome::EngineFailed;
            }
        };

        if result.rate_u_per_h == 0.0
            && result.duration_min == 0
            && services.history.converted_temp_basal_at(now).is_none()
        {
            // A zero/zero recommendation with nothing running would issue a
            // spurious no-op temp-basal command.
            result.temp_basal_requested = false;
        }
        result.iob = iob_array.first().copied();
        result.computed_at = Some(now);
        stamp_timestamp(&mut result, now);
        result.constraint_trail = trail;

        let fingerprint = input_fingerprint(&input).ok();
        let state = match RunState::completed_v1(now, result, sensitivity, fingerprint) {
            Ok(state) => state,
            Err(_) => {
                return self.abort(
                    services,
                    DosingEvent::RunRefused {
                        reason_code: reason_codes::DOSE_INPUT_CONTRACT_VIOLATION,
                    },
                    reason_codes::DOSE_INPUT_CONTRACT_VIOLATION,
                );
            }
        };
        cache.commit(state);
        self.phase = RunPhase::Completed;
        services
            .events
            .publish(DosingEvent::RecommendationUpdated { at: now });
        RunOutcome::Completed
    }
}

fn stamp_timestamp(result: &mut DoseResult, now: EpochTimeMs) {
    if result.diagnostics.is_null() {
        result.diagnostics = serde_json::json!({ "timestamp": now.0 });
        return;
    }
    if let serde_json::Value::Object(map) = &mut result.diagnostics {
        map.insert("timestamp".to_string(), serde_json::json!(now.0));
    }
}
