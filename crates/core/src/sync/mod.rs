//! Reconciliation engine
//!
//! Push/pull/diff/drift-cleanup shared conceptually across the three
//! providers: time-ranged events for the calendar, cursor-based records for
//! the CRM pipeline and the lead tracker.

pub mod calendar;
pub mod mapping;
pub mod records;
