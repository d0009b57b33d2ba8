//! Infrastructure error handling
//!
//! Adapters return their own error types; [`InfraError`] is the single
//! bridge that turns them into the domain's [`SuperAppError`].

mod conversions;

pub use conversions::InfraError;
