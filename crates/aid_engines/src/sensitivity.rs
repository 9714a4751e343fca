#![forbid(unsafe_code)]

use aid_kernel_contracts::dosing::SensitivityResult;
use aid_kernel_contracts::{ContractViolation, Validate};

/// Source of background autosensitivity computations. `latest_or_wait`
/// blocks for up to `max_wait_ms` while an in-flight computation finishes;
/// `None` after the wait means no usable data exists.
pub trait SensitivityService {
    fn latest_or_wait(&self, tag: &str, max_wait_ms: u32) -> Option<SensitivityResult>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensitivityGateConfig {
    pub max_wait_ms: u32,
}

impl SensitivityGateConfig {
    pub fn mvp_v1() -> Self {
        Self {
            max_wait_ms: 120_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SensitivityGateError {
    /// Autosens is enabled but no computation arrived within the bounded
    /// wait. The run must abort: the IOB projection downstream is a
    /// function of the sensitivity ratio.
    Unavailable,
    Invalid(ContractViolation),
}

#[derive(Debug, Clone)]
pub struct SensitivityGate {
    config: SensitivityGateConfig,
}

impl SensitivityGate {
    pub fn new(config: SensitivityGateConfig) -> Result<Self, ContractViolation> {
        if config.max_wait_ms == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "sensitivity_gate_config.max_wait_ms",
                reason: "must be > 0",
            });
        }
        Ok(Self { config })
    }

    /// Resolve the run's sensitivity ratio. Disabled autosens yields the
    /// neutral placeholder and the run continues; enabled autosens with no
    /// data after the bounded wait is a hard failure.
    pub fn resolve(
        &self,
        autosens_enabled: bool,
        service: &dyn SensitivityService,
        tag: &str,
    ) -> Result<SensitivityResult, SensitivityGateError> {
        if !autosens_enabled {
            return Ok(SensitivityResult::neutral());
        }
        let result = service
            .latest_or_wait(tag, self.config.max_wait_ms)
            .ok_or(SensitivityGateError::Unavailable)?;
        result.validate().map_err(SensitivityGateError::Invalid)?;
        Ok(result)
    }
}
