//! Common imports for crates that set up logging or carry request context.

pub use crate::{
    LogConfig, LogFormat, LogTarget, RequestContext, TelemetryError, TelemetryResult,
    setup_logging,
};
