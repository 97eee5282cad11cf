//! Infrastructure layer - External adapters and implementations
//!
//! This layer contains:
//! - Persistence: in-memory and SQLite storage backends
//! - Config: Application configuration
//! - Clock: wall-clock and fixed clocks behind `ClockPort`

pub mod clock;
pub mod config;
pub mod persistence;
