//! Foundational low-level utilities shared across otto crates.
//!
//! Provides wall-clock helpers and the injectable clock alias used by the
//! retry sweeper and store timestamps so tests can pin time deterministically.

pub mod time_utils;

pub use time_utils::{system_clock, utc_now, Clock};
