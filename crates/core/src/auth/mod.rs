//! Credential and token lifecycle

mod token_manager;

pub use token_manager::{TokenManager, TokenRefreshers};
