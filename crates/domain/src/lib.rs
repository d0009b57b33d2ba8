//! # SuperApp Domain
//!
//! Pure domain types for the SuperApp resilience layer.
//!
//! This crate contains:
//! - Configuration structures with defaults
//! - The application-level error type and `Result` alias
//! - Storage keys, thresholds and backend function names
//!
//! ## Architecture
//! - No dependencies on other SuperApp crates
//! - No I/O

pub mod config;
pub mod constants;
pub mod errors;

pub use config::*;
pub use errors::*;
