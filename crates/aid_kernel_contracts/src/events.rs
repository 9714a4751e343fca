#![forbid(unsafe_code)]

use crate::{EpochTimeMs, ReasonCodeId};

/// Fire-and-forget notifications published by the dosing pipeline. No
/// acknowledgment is expected; callers learn outcomes from these plus the
/// run-result cache.
#[derive(Debug, Clone, PartialEq)]
pub enum DosingEvent {
    RecommendationUpdated { at: EpochTimeMs },
    LoopDisabled,
    NoData { reason_code: ReasonCodeId },
    HardLimitViolation { quantity: &'static str, value: f64 },
    RunRefused { reason_code: ReasonCodeId },
    EngineFailed,
}
