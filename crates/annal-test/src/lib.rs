//! Annal Test - Shared test utilities for the Annal audit log.
//!
//! This crate provides mock stores, reporters and fixture entities that are
//! used across the Annal crates as a dev-dependency.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! annal-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use annal_test::{FailingStore, RecordingReporter, sample_draft, test_writer_over};
//!
//! let reporter = RecordingReporter::new();
//! let writer = test_writer_over(FailingStore::new()).with_reporter(reporter.clone());
//! writer.write_audit(sample_draft(1));
//! assert_eq!(reporter.count(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
