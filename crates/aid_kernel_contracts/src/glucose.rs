#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::common::{require_finite, require_in_range};
use crate::{ContractViolation, EpochTimeMs, SchemaVersion, Validate};

pub const GLUCOSE_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

/// Most recent glucose reading plus trend deltas, mg/dL. Supplied per run
/// by the sensor side; absent data aborts the run before any constraint is
/// computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlucoseStatus {
    pub schema_version: SchemaVersion,
    pub glucose_mgdl: f64,
    pub delta_mgdl: f64,
    pub short_avg_delta_mgdl: f64,
    pub long_avg_delta_mgdl: f64,
    pub read_at: EpochTimeMs,
}

impl GlucoseStatus {
    pub fn v1(
        glucose_mgdl: f64,
        delta_mgdl: f64,
        short_avg_delta_mgdl: f64,
        long_avg_delta_mgdl: f64,
        read_at: EpochTimeMs,
    ) -> Result<Self, ContractViolation> {
        let g = Self {
            schema_version: GLUCOSE_CONTRACT_VERSION,
            glucose_mgdl,
            delta_mgdl,
            short_avg_delta_mgdl,
            long_avg_delta_mgdl,
            read_at,
        };
        g.validate()?;
        Ok(g)
    }
}

impl Validate for GlucoseStatus {
    fn validate(&self) -> Result<(), ContractViolation> {
        require_in_range("glucose_status.glucose_mgdl", self.glucose_mgdl, 1.0, 1000.0)?;
        require_finite("glucose_status.delta_mgdl", self.delta_mgdl)?;
        require_finite("glucose_status.short_avg_delta_mgdl", self.short_avg_delta_mgdl)?;
        require_finite("glucose_status.long_avg_delta_mgdl", self.long_avg_delta_mgdl)?;
        self.read_at.validate()?;
        Ok(())
    }
}
