//! RateSync Common Types
//!
//! This crate contains shared types used across the RateSync services,
//! including the currency enumeration, rate value types, raw provider rates
//! and date-window helpers.

pub mod currency;
pub mod identifiers;
pub mod rates;
pub mod time;

pub use currency::*;
pub use identifiers::*;
pub use rates::*;
pub use time::*;
