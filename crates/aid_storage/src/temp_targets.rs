#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use aid_kernel_contracts::profile::TemporaryTarget;
use aid_kernel_contracts::{EpochTimeMs, Validate};

use crate::run_cache::StorageError;

/// In-memory temporary-target store. The external lifecycle (creation and
/// expiry) lives here; the dosing core only ever asks for the one entry
/// active at "now".
#[derive(Debug, Clone, Default)]
pub struct TemporaryTargetStore {
    rows: BTreeMap<u64, TemporaryTarget>,
}

impl TemporaryTargetStore {
    pub fn new_in_memory() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: u64, target: TemporaryTarget) -> Result<(), StorageError> {
        target.validate()?;
        if self.rows.contains_key(&id) {
            return Err(StorageError::DuplicateKey {
                table: "temporary_targets",
                key: id.to_string(),
            });
        }
        self.rows.insert(id, target);
        Ok(())
    }

    /// Truncate a target so it ends at `at`. A cancellation before the
    /// window opens removes the row entirely.
    pub fn cancel(&mut self, id: u64, at: EpochTimeMs) -> Result<(), StorageError> {
        let row = self.rows.get_mut(&id).ok_or(StorageError::NotFound {
            table: "temporary_targets",
            key: id.to_string(),
        })?;
        let elapsed_min = at.0.saturating_sub(row.started_at.0) / 60_000;
        if at <= row.started_at || elapsed_min == 0 {
            self.rows.remove(&id);
            return Ok(());
        }
        row.duration_min = u32::try_from(elapsed_min).unwrap_or(u32::MAX);
        Ok(())
    }

    /// The single authoritative entry whose validity window contains `now`.
    /// Under overlap the latest-starting entry wins, matching the source
    /// database's ordering.
    pub fn active_at(&self, now: EpochTimeMs) -> Option<&TemporaryTarget> {
        self.rows
            .values()
            .filter(|t| t.active_at(now))
            .max_by_key(|t| t.started_at)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
