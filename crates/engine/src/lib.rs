//! # Postmortem Engine
//!
//! The resolution engine behind postmortem's diagnostic capture: a
//! capability-aware resolver dispatch registry, the built-in REST and
//! database resolvers, and the execution orchestrator that turns registered
//! reporters into persisted report files.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use postmortem_engine::{Registry, RestApiReporter, ResultsFormat};
//!
//! # fn main() -> Result<(), postmortem_engine::ReportError> {
//! let reporter = Arc::new(
//!     RestApiReporter::new()
//!         .with_base_url("https://api.example.com")
//!         .with_endpoint("/health")
//!         .with_results_format(ResultsFormat::Json)
//!         .with_file_name_prefix("health_check"),
//! );
//!
//! let mut registry = Registry::new()?.with_destination_location("./reports");
//! registry.register_reporter(reporter);
//! registry.execute()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **`dispatch`**: capability-keyed resolver registry with delegate and
//!   instance registrations
//! - **`resolver`**: the authenticated REST pipeline and the database
//!   resolver
//! - **`registry`**: the execution orchestrator and file naming

pub mod dispatch;
pub mod registry;
pub mod resolver;

pub use dispatch::{AsyncResolveFn, ErasedResolver, ResolverRegistry, SyncResolveFn, delegates_for};
pub use registry::Registry;
pub use resolver::{DbResolver, RestApiResolver};

// Re-export the shared types so most callers only need this crate.
pub use postmortem_types::{
    ApiSource, BodyContentType, CapabilityKey, DatabaseType, DbParam, DbReporter, DbSource, DestinationType, ExecutionMode,
    HttpMethod, ReportError, Reporter, RestApiReporter, RestSource, ResultsFormat, TokenProvider,
};
