//! Hosted backend adapters
//!
//! - [`BackendClient`]: invokes named backend functions over HTTPS
//! - [`HttpSessionRefresher`]: exchanges a refresh token for a new session
//!
//! Both plug into the resilience layer through the `FunctionInvoker` and
//! `SessionRefresher` traits from `superapp-common`.

mod auth;
mod client;
mod errors;

pub use auth::{HttpSessionRefresher, TokenResponse};
pub use client::BackendClient;
