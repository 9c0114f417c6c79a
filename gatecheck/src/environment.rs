//! Injected dependencies shared by the engine, issuer and scanner.

use chrono::{DateTime, Utc};

/// Clock trait - abstracts time for testability.
///
/// Purchase dates, validation timestamps and scan start times all come from
/// the injected clock, never from `Utc::now()` directly.
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
