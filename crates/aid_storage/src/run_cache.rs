#![forbid(unsafe_code)]

use sha2::{Digest, Sha256};

use aid_kernel_contracts::dosing::{DoseInput, DoseResult, SensitivityResult};
use aid_kernel_contracts::{ContractViolation, EpochTimeMs, Validate};

#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    DuplicateKey { table: &'static str, key: String },
    NotFound { table: &'static str, key: String },
    Encoding { what: &'static str },
    ContractViolation(ContractViolation),
}

impl From<ContractViolation> for StorageError {
    fn from(v: ContractViolation) -> Self {
        StorageError::ContractViolation(v)
    }
}

/// The last completed run's output. Replaced wholesale at the end of each
/// run; read-only to every component except the cache owner.
#[derive(Debug, Clone, PartialEq)]
pub struct RunState {
    pub last_run: Option<EpochTimeMs>,
    pub last_result: Option<DoseResult>,
    pub last_sensitivity: SensitivityResult,
    pub last_input_fingerprint: Option<String>,
}

impl RunState {
    pub fn empty() -> Self {
        Self {
            last_run: None,
            last_result: None,
            last_sensitivity: SensitivityResult::neutral(),
            last_input_fingerprint: None,
        }
    }

    pub fn completed_v1(
        at: EpochTimeMs,
        result: DoseResult,
        sensitivity: SensitivityResult,
        input_fingerprint: Option<String>,
    ) -> Result<Self, ContractViolation> {
        at.validate()?;
        result.validate()?;
        sensitivity.validate()?;
        Ok(Self {
            last_run: Some(at),
            last_result: Some(result),
            last_sensitivity: sensitivity,
            last_input_fingerprint: input_fingerprint,
        })
    }

    /// Replacement state for an engine failure: the stale recommendation is
    /// dropped, the sensitivity resolved during the failed run is kept for
    /// diagnostics.
    pub fn cleared(sensitivity: SensitivityResult) -> Self {
        Self {
            last_run: None,
            last_result: None,
            last_sensitivity: sensitivity,
            last_input_fingerprint: None,
        }
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::empty()
    }
}

/// Holder of the last run's state. The owner hands it `&mut` to the
/// orchestrator for the duration of a run, which is what serializes runs:
/// two concurrent runs over one cache do not compile.
#[derive(Debug, Clone, Default)]
pub struct RunResultCache {
    state: RunState,
}

impl RunResultCache {
    pub fn new() -> Self {
        Self {
            state: RunState::empty(),
        }
    }

    /// Whole-value replace. Readers never observe a half-written state.
    pub fn commit(&mut self, state: RunState) {
        self.state = state;
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn last_run(&self) -> Option<EpochTimeMs> {
        self.state.last_run
    }

    pub fn last_result(&self) -> Option<&DoseResult> {
        self.state.last_result.as_ref()
    }

    pub fn last_sensitivity(&self) -> &SensitivityResult {
        &self.state.last_sensitivity
    }

    pub fn last_input_fingerprint(&self) -> Option<&str> {
        self.state.last_input_fingerprint.as_deref()
    }
}

/// Audit-grade provenance for a cached recommendation: SHA-256 over the
/// canonical JSON encoding of the validated engine input.
pub fn input_fingerprint(input: &DoseInput) -> Result<String, StorageError> {
    let bytes = serde_json::to_vec(input).map_err(|_| StorageError::Encoding { what: "dose_input" })?;
    let digest = Sha256::digest(&bytes);
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    Ok(hex)
}
