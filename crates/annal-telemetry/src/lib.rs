//! Annal Telemetry - logging setup and request correlation.
//!
//! This crate provides:
//! - Configurable `tracing` subscriber setup (pretty, compact, JSON, full;
//!   stderr, stdout, or daily-rotated files)
//! - [`RequestContext`], the per-request facts the audit log captures
//!
//! # Example
//!
//! ```rust,no_run
//! use annal_telemetry::{LogConfig, LogFormat, RequestContext, setup_logging};
//!
//! # fn main() -> Result<(), annal_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Json)
//!     .with_directive("annal_audit=debug");
//! setup_logging(&config)?;
//!
//! let ctx = RequestContext::new("http").with_session_id("abc");
//! let _span = ctx.span().entered();
//! tracing::info!("handling request");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod context;
mod error;
mod logging;

pub use context::RequestContext;
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_logging};
