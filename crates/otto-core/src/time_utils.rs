use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Injectable wall-clock used by time-sensitive components.
///
/// Production code passes [`system_clock`]; tests pass a closure returning a
/// pinned instant so retry-window math can be asserted exactly.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Returns the current UTC instant.
pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}

/// Returns a [`Clock`] backed by the system wall clock.
pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}
