#![forbid(unsafe_code)]

pub mod constraints;
pub mod sensitivity;
pub mod targets;
