#![forbid(unsafe_code)]

pub mod dosing;
