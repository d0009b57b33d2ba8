//! Logging setup for binaries and integration harnesses

pub mod logging;

pub use logging::init;
