//! Aggregates - Consistency boundaries of the domain

mod aggregate_guard;

pub use aggregate_guard::{AggregateGuard, CascadePlan};
