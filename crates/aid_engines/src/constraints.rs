#![forbid(unsafe_code)]

//! Composable safety-constraint providers. Each provider narrows exactly
//! one audited chain and knows nothing about the others; the orchestrator
//! invokes them in a fixed order and folds every trail into one.

use aid_kernel_contracts::constraint::ConstraintValue;
use aid_kernel_contracts::hard_limits::MAX_IOB_SMB_U;
use aid_kernel_contracts::profile::ProfileSnapshot;

#[derive(Debug, Clone, Copy)]
pub struct ConstraintContext<'a> {
    pub profile: &'a ProfileSnapshot,
}

pub trait RateConstraint {
    fn narrow(&self, chain: &mut ConstraintValue<f64>, ctx: &ConstraintContext<'_>);
}

pub trait EnablementConstraint {
    fn narrow(&self, chain: &mut ConstraintValue<bool>, ctx: &ConstraintContext<'_>);
}

fn floor_to_hundredth(value: f64) -> f64 {
    (value * 100.0).floor() / 100.0
}

/// Maximum insulin-on-board: user preference first, then the absolute
/// SMB-mode hard limit.
#[derive(Debug, Clone, Copy)]
pub struct MaxIobLimit {
    pub enabled: bool,
    pub preference_max_iob_u: f64,
}

impl RateConstraint for MaxIobLimit {
    fn narrow(&self, chain: &mut ConstraintValue<f64>, _ctx: &ConstraintContext<'_>) {
        if !self.enabled {
            return;
        }
        chain.set_if_smaller(
            self.preference_max_iob_u,
            format!("limiting IOB to {:.2} U: max value in preferences", self.preference_max_iob_u),
            "max_iob_limit",
        );
        chain.set_if_smaller(
            MAX_IOB_SMB_U,
            format!("limiting IOB to {MAX_IOB_SMB_U:.2} U: hard limit"),
            "max_iob_limit",
        );
    }
}

/// Maximum basal rate. The preference is the starting ceiling, except that
/// a preference below the profile's max daily basal is raised to the
/// profile value (the profile is authoritative over a stale preference —
/// the one permitted raise in the whole pipeline). Two multiplier caps can
/// then only lower the ceiling further.
#[derive(Debug, Clone, Copy)]
pub struct MaxBasalLimit {
    pub enabled: bool,
    pub preference_max_basal_u_per_h: f64,
    pub current_basal_safety_multiplier: f64,
    pub max_daily_safety_multiplier: f64,
}

impl RateConstraint for MaxBasalLimit {
    fn narrow(&self, chain: &mut ConstraintValue<f64>, ctx: &ConstraintContext<'_>) {
        if !self.enabled {
            return;
        }
        let mut ceiling = self.preference_max_basal_u_per_h;
        if ceiling < ctx.profile.max_daily_basal_u_per_h {
            ceiling = ctx.profile.max_daily_basal_u_per_h;
            chain.add_reason("increasing max basal to profile max daily basal", "max_basal_limit");
        }
        chain.set_if_smaller(
            ceiling,
            format!("limiting basal rate to {ceiling:.2} U/h: max value in preferences"),
            "max_basal_limit",
        );

        let from_current = floor_to_hundredth(
            self.current_basal_safety_multiplier * ctx.profile.current_basal_u_per_h,
        );
        chain.set_if_smaller(
            from_current,
            format!("limiting basal rate to {from_current:.2} U/h: current basal multiplier"),
            "max_basal_limit",
        );

        let from_daily = floor_to_hundredth(
            self.max_daily_safety_multiplier * ctx.profile.max_daily_basal_u_per_h,
        );
        chain.set_if_smaller(
            from_daily,
            format!("limiting basal rate to {from_daily:.2} U/h: max daily basal multiplier"),
            "max_basal_limit",
        );
    }
}

/// Super-micro-bolus enablement, driven by the user preference.
#[derive(Debug, Clone, Copy)]
pub struct SmbToggle {
    pub enabled_preference: bool,
}

impl EnablementConstraint for SmbToggle {
    fn narrow(&self, chain: &mut ConstraintValue<bool>, _ctx: &ConstraintContext<'_>) {
        chain.restrict(self.enabled_preference, "SMB disabled in preferences", "smb_toggle");
    }
}

/// Unannounced-meal detection enablement.
#[derive(Debug, Clone, Copy)]
pub struct UamToggle {
    pub enabled_preference: bool,
}

impl EnablementConstraint for UamToggle {
    fn narrow(&self, chain: &mut ConstraintValue<bool>, _ctx: &ConstraintContext<'_>) {
        chain.restrict(self.enabled_preference, "UAM disabled in preferences", "uam_toggle");
    }
}

/// Autosensitivity enablement; the resulting chain value gates the
/// sensitivity fetch.
#[derive(Debug, Clone, Copy)]
pub struct AutosensToggle {
    pub enabled_preference: bool,
}

impl EnablementConstraint for AutosensToggle {
    fn narrow(&self, chain: &mut ConstraintValue<bool>, _ctx: &ConstraintContext<'_>) {
        chain.restrict(
            self.enabled_preference,
            "autosens disabled in preferences",
            "autosens_toggle",
        );
    }
}

/// Advanced filtering requires a glucose source that actually delivers
/// filtered readings.
#[derive(Debug, Clone, Copy)]
pub struct AdvancedFilteringToggle {
    pub source_capable: bool,
}

impl EnablementConstraint for AdvancedFilteringToggle {
    fn narrow(&self, chain: &mut ConstraintValue<bool>, _ctx: &ConstraintContext<'_>) {
        chain.restrict(
            self.source_capable,
            "glucose source without advanced filtering",
            "advanced_filtering_toggle",
        );
    }
}

/// Super-bolus is never allowed while this kernel drives dosing.
#[derive(Debug, Clone, Copy)]
pub struct SuperBolusToggle;

impl EnablementConstraint for SuperBolusToggle {
    fn narrow(&self, chain: &mut ConstraintValue<bool>, _ctx: &ConstraintContext<'_>) {
        chain.restrict(false, "super bolus not allowed by dosing kernel", "super_bolus_toggle");
    }
}
