//! Clock abstraction port for time operations
//!
//! Backends stamp `created_at`/`updated_at` through this port rather than
//! calling `Utc::now()` directly, so tests can pin time.

use chrono::{DateTime, Utc};

pub trait ClockPort: Send + Sync {
    /// Get current time as DateTime<Utc>
    fn now(&self) -> DateTime<Utc>;
}
