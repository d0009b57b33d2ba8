//! Test doubles for the resilience layer
//!
//! - **[`mocks`]**: scripted refreshers, invokers and executors
//! - **[`temp`]**: throwaway on-disk stores
//!
//! ```rust
//! # #[cfg(feature = "test-utils")]
//! # {
//! use superapp_common::testing::{MockClock, MockFunctionInvoker};
//!
//! let clock = MockClock::new();
//! clock.advance(std::time::Duration::from_secs(5));
//! let backend = MockFunctionInvoker::new().respond_ok(serde_json::json!({"ok": true}));
//! assert!(backend.calls().is_empty());
//! # }
//! ```

pub mod mocks;
pub mod temp;

pub use mocks::{
    ExecutorFailure, FailingWritesStore, InvocationRecord, MockFunctionInvoker,
    MockSessionRefresher, RecordingExecutor,
};
pub use temp::temp_file_store;

pub use crate::time::{Clock, MockClock, SystemClock};
