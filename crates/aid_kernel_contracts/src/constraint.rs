#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::{ContractViolation, Validate};

pub const MAX_REASON_CHARS: usize = 160;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintEntry {
    pub reason: String,
    pub source: String,
}

impl ConstraintEntry {
    pub fn new(reason: impl Into<String>, source: &'static str) -> Self {
        Self {
            reason: reason.into(),
            source: source.to_string(),
        }
    }
}

impl Validate for ConstraintEntry {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.reason.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "constraint_entry.reason",
                reason: "must not be empty",
            });
        }
        if self.reason.chars().count() > MAX_REASON_CHARS {
            return Err(ContractViolation::InvalidValue {
                field: "constraint_entry.reason",
                reason: "must be <= 160 chars",
            });
        }
        if self.source.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "constraint_entry.source",
                reason: "must not be empty",
            });
        }
        Ok(())
    }
}

/// A safety-narrowable value with an ordered audit trail. Created fresh per
/// dosing run and discarded afterwards; narrowing may only ever move the
/// value toward the stricter setting.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintValue<T> {
    value: T,
    entries: Vec<ConstraintEntry>,
}

impl<T: Copy> ConstraintValue<T> {
    pub fn new(initial: T) -> Self {
        Self {
            value: initial,
            entries: Vec::new(),
        }
    }

    pub fn value(&self) -> T {
        self.value
    }

    pub fn reasons(&self) -> &[ConstraintEntry] {
        &self.entries
    }

    /// Attach an explanation without changing the value.
    pub fn add_reason(&mut self, reason: impl Into<String>, source: &'static str) {
        self.entries.push(ConstraintEntry::new(reason, source));
    }

    /// Merge another chain's audit trail into this one.
    pub fn copy_reasons<U: Copy>(&mut self, other: &ConstraintValue<U>) {
        self.entries.extend_from_slice(&other.entries);
    }
}

impl ConstraintValue<f64> {
    /// Unconditional overwrite, audited.
    pub fn set(&mut self, value: f64, reason: impl Into<String>, source: &'static str) {
        self.value = value;
        self.add_reason(reason, source);
    }

    /// Narrow: overwrite only when the candidate is stricter, recording the
    /// reason exactly when the value actually moved.
    pub fn set_if_smaller(&mut self, candidate: f64, reason: impl Into<String>, source: &'static str) {
        if candidate < self.value {
            self.value = candidate;
            self.add_reason(reason, source);
        }
    }
}

impl ConstraintValue<bool> {
    /// AND-latch for enablement chains: once false, no later candidate can
    /// flip the chain back to true within the same run. A reason is recorded
    /// exactly when the candidate is false.
    pub fn restrict(&mut self, candidate: bool, reason: impl Into<String>, source: &'static str) {
        if !candidate {
            self.value = false;
            self.add_reason(reason, source);
        }
    }
}

/// Aggregate of every narrowing decision made across one dosing run, kept
/// as a single inspectable trail and attached to the run's result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditTrail {
    entries: Vec<ConstraintEntry>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn absorb<T: Copy>(&mut self, chain: &ConstraintValue<T>) {
        self.entries.extend_from_slice(chain.reasons());
    }

    pub fn entries(&self) -> &[ConstraintEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_constraint_01_numeric_final_value_is_minimum_of_candidates() {
        let mut chain = ConstraintValue::new(f64::MAX);
        chain.set_if_smaller(5.0, "limit a", "test_a");
        chain.set_if_smaller(8.0, "limit b", "test_b");
        chain.set_if_smaller(3.5, "limit c", "test_c");
        assert_eq!(chain.value(), 3.5);
    }

    #[test]
    fn at_constraint_02_one_entry_per_effective_narrowing() {
        let mut chain = ConstraintValue::new(f64::MAX);
        chain.set_if_smaller(5.0, "limit a", "test_a");
        chain.set_if_smaller(8.0, "not effective", "test_b");
        chain.set_if_smaller(3.5, "limit c", "test_c");
        assert_eq!(chain.reasons().len(), 2);
        assert_eq!(chain.reasons()[0].reason, "limit a");
        assert_eq!(chain.reasons()[1].reason, "limit c");
    }

    #[test]
    fn at_constraint_03_bool_false_is_terminal() {
        let mut chain = ConstraintValue::new(true);
        chain.restrict(false, "feature disabled", "test");
        chain.restrict(true, "would re-enable", "test");
        assert!(!chain.value());
        assert_eq!(chain.reasons().len(), 1);
    }

    #[test]
    fn at_constraint_04_bool_true_candidate_records_nothing() {
        let mut chain = ConstraintValue::new(true);
        chain.restrict(true, "no-op", "test");
        assert!(chain.value());
        assert!(chain.reasons().is_empty());
    }

    #[test]
    fn at_constraint_05_add_reason_keeps_value() {
        let mut chain = ConstraintValue::new(1.0);
        chain.add_reason("increasing max basal", "test");
        assert_eq!(chain.value(), 1.0);
        assert_eq!(chain.reasons().len(), 1);
    }

    #[test]
    fn at_constraint_06_copy_reasons_merges_across_types() {
        let mut numeric = ConstraintValue::new(f64::MAX);
        numeric.set_if_smaller(2.0, "numeric limit", "test_a");
        let mut flags = ConstraintValue::new(true);
        flags.restrict(false, "flag off", "test_b");
        let mut collector = ConstraintValue::new(0.0);
        collector.copy_reasons(&numeric);
        collector.copy_reasons(&flags);
        assert_eq!(collector.reasons().len(), 2);
    }

    #[test]
    fn at_constraint_07_audit_trail_preserves_order() {
        let mut a = ConstraintValue::new(f64::MAX);
        a.set_if_smaller(1.0, "first", "src_a");
        let mut b = ConstraintValue::new(true);
        b.restrict(false, "second", "src_b");
        let mut trail = AuditTrail::new();
        trail.absorb(&a);
        trail.absorb(&b);
        let reasons: Vec<&str> = trail.entries().iter().map(|e| e.reason.as_str()).collect();
        assert_eq!(reasons, vec!["first", "second"]);
    }

    #[test]
    fn at_constraint_08_numeric_set_is_unconditional_and_audited() {
        let mut chain = ConstraintValue::new(3.0);
        chain.set(5.0, "profile override", "test");
        assert_eq!(chain.value(), 5.0);
        assert_eq!(chain.reasons().len(), 1);
    }

    #[test]
    fn at_constraint_09_entry_validation() {
        assert!(ConstraintEntry::new("ok", "src").validate().is_ok());
        assert!(ConstraintEntry::new("", "src").validate().is_err());
        assert!(ConstraintEntry::new("r".repeat(200), "src").validate().is_err());
    }
}
