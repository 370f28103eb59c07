//! # Postmortem Util
//!
//! Utility layer shared by the postmortem crates: bridging async resolution
//! into synchronous callers, rendering resolved rows into output formats,
//! and persisting report content to destinations.

pub mod async_runtime;
pub mod format;
pub mod writer;

pub use async_runtime::block_on_future;
pub use format::{ResultFormatter, ResultRow, formatter_for};
pub use writer::{FileSystemWriter, ReportWriter, writer_for};
