//! Callback saga
//!
//! The multi-step retryable workflow linking a lead event to a CRM deal, a
//! local task and a calendar prep block.

pub mod callback;
pub mod matching;
