//! Provider API clients
//!
//! One reqwest-backed client per external system, each implementing the
//! corresponding connector port from `tempo-core`. All requests go through
//! the shared retrying [`crate::http::HttpClient`].

pub mod google;
pub mod pipedrive;
pub mod salesrabbit;

pub use google::GoogleCalendarClient;
pub use pipedrive::PipedriveClient;
pub use salesrabbit::SalesRabbitClient;
