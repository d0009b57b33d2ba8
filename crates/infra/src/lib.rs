//! # SuperApp Infrastructure
//!
//! Impure adapters for the resilience layer in `superapp-common`.
//!
//! This crate contains:
//! - HTTP transport and backend adapters (function invocation, session refresh)
//! - Configuration loading and logging setup
//! - Background workers (reconnect replay, cron maintenance jobs)
//! - [`AppContext`], which wires everything from a [`superapp_domain::Config`]
//!
//! ## Architecture
//! - Implements traits defined in `superapp-common` (`FunctionInvoker`,
//!   `SessionRefresher`, `MutationExecutor`)
//! - Depends on `superapp-domain` for configuration and the error type
//! - Contains all I/O (network, filesystem, timers)

pub mod backend;
pub mod config;
pub mod context;
pub mod errors;
pub mod http;
pub mod jobs;
pub mod observability;
pub mod sync;

pub use backend::{BackendClient, HttpSessionRefresher};
pub use context::{AppContext, ConnectionStatus, MutationOutcome};
pub use errors::InfraError;
pub use http::HttpClient;
pub use sync::{ConnectivityMonitor, ReconnectWorker};
