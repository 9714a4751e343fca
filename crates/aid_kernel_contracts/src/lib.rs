#![forbid(unsafe_code)]

pub mod common;
pub mod constraint;
pub mod dosing;
pub mod events;
pub mod glucose;
pub mod hard_limits;
pub mod profile;

pub use common::{ContractViolation, EpochTimeMs, ReasonCodeId, SchemaVersion, Validate};
