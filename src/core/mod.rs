//! Core primitives - shared registries and decimal unit conversion

pub mod constants;
pub mod units;
