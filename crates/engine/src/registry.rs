//! Execution orchestrator.
//!
//! The [`Registry`] holds the registered reporters and the destination
//! configuration, and drives one capture pass: resolve every reporter
//! through the dispatch registry, generate a file name, and hand the
//! content to a writer. Synchronous orchestration runs strictly in
//! registration order; asynchronous orchestration fans out over all
//! reporters and aggregates every failure.

use std::future::Future;
use std::sync::Arc;

use chrono::Local;
use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use postmortem_types::{CapabilityKey, DestinationType, ExecutionMode, ReportError, Reporter};
use postmortem_util::{ReportWriter, writer_for};

use crate::dispatch::{AsyncResolveFn, ErasedResolver, ResolverRegistry, SyncResolveFn};
use crate::resolver::{DbResolver, RestApiResolver};

/// Wire the built-in resolvers under their capability interfaces.
fn default_resolver_registry() -> Result<ResolverRegistry, ReportError> {
    let registry = ResolverRegistry::new();
    registry.register_resolver(
        CapabilityKey::of::<dyn postmortem_types::RestSource>(),
        Arc::new(RestApiResolver::new()?),
    );
    registry.register_resolver(CapabilityKey::of::<dyn postmortem_types::DbSource>(), Arc::new(DbResolver::new()));
    Ok(registry)
}

/// Top-level capture registry: reporters, destination, and execution mode.
pub struct Registry {
    reporters: Vec<Arc<dyn Reporter>>,
    destination_type: DestinationType,
    destination_location: String,
    compress_results: bool,
    execution_mode: ExecutionMode,
    resolvers: Arc<ResolverRegistry>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("reporters", &self.reporters.len())
            .field("destination_type", &self.destination_type)
            .field("destination_location", &self.destination_location)
            .field("compress_results", &self.compress_results)
            .field("execution_mode", &self.execution_mode)
            .finish()
    }
}

impl Registry {
    /// A registry wired with the built-in REST and database resolvers.
    pub fn new() -> Result<Self, ReportError> {
        Ok(Self {
            reporters: Vec::new(),
            destination_type: DestinationType::FileSystem,
            destination_location: String::new(),
            compress_results: false,
            execution_mode: ExecutionMode::Synchronous,
            resolvers: Arc::new(default_resolver_registry()?),
        })
    }

    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    pub fn with_destination_type(mut self, destination_type: DestinationType) -> Self {
        self.destination_type = destination_type;
        self
    }

    pub fn with_destination_location(mut self, location: impl Into<String>) -> Self {
        self.destination_location = location.into();
        self
    }

    pub fn with_compression(mut self) -> Self {
        self.compress_results = true;
        self
    }

    /// Register a custom resolver instance for a capability key.
    pub fn register_custom_resolver(self, key: CapabilityKey, resolver: Arc<dyn ErasedResolver>) -> Self {
        self.resolvers.register_resolver(key, resolver);
        self
    }

    /// Register custom delegate functions for a capability key.
    pub fn register_custom_delegates(self, key: CapabilityKey, async_fn: AsyncResolveFn, sync_fn: SyncResolveFn) -> Self {
        self.resolvers.register_delegates(key, async_fn, sync_fn);
        self
    }

    /// The dispatch registry, for typed registrations or lookups.
    pub fn resolvers(&self) -> &ResolverRegistry {
        &self.resolvers
    }

    /// Registering the same reporter (by identity) twice is a no-op.
    pub fn register_reporter(&mut self, reporter: Arc<dyn Reporter>) {
        let already_registered = self.reporters.iter().any(|existing| Arc::ptr_eq(existing, &reporter));
        if !already_registered {
            self.reporters.push(reporter);
        }
    }

    /// Remove a reporter by identity; unknown reporters are ignored.
    pub fn unregister_reporter(&mut self, reporter: &Arc<dyn Reporter>) {
        self.reporters.retain(|existing| !Arc::ptr_eq(existing, reporter));
    }

    pub fn reporter_count(&self) -> usize {
        self.reporters.len()
    }

    fn validate_for_execution(&self) -> Result<(), ReportError> {
        if self.destination_location.is_empty() {
            return Err(ReportError::invalid_operation("Destination location must be set before execution."));
        }
        if self.reporters.is_empty() {
            return Err(ReportError::invalid_operation(
                "At least one reporter must be registered before execution.",
            ));
        }
        Ok(())
    }

    fn build_writer(&self) -> Result<Box<dyn ReportWriter>, ReportError> {
        writer_for(self.destination_type, &self.destination_location, self.compress_results)
    }

    /// Resolve and write every reporter strictly in registration order,
    /// blocking on each in turn.
    pub fn execute(&self) -> Result<(), ReportError> {
        self.validate_for_execution()?;
        let writer = self.build_writer()?;

        for reporter in &self.reporters {
            let content = self.resolvers.resolve_sync(reporter.clone())?;
            let file_name = generate_file_name(reporter.as_ref());
            writer.write(&content, &file_name)?;
            debug!(file_name = %file_name, "report captured");
        }

        info!(report_count = self.reporters.len(), "capture pass complete");
        Ok(())
    }

    /// Asynchronous capture pass. With the registry in asynchronous mode
    /// all reporters are resolved and written concurrently and every
    /// failure is aggregated; otherwise reporters run sequentially in
    /// registration order. Each reporter's own execution-mode override, when
    /// present, selects the resolution path used for it.
    pub async fn execute_async(&self, cancel: &CancellationToken) -> Result<(), ReportError> {
        self.validate_for_execution()?;
        let writer = self.build_writer()?;

        if self.execution_mode == ExecutionMode::Asynchronous {
            let captures = self.reporters.iter().map(|reporter| self.capture_one(reporter.clone(), &*writer, cancel));
            let failures: Vec<ReportError> = join_all(captures).await.into_iter().filter_map(Result::err).collect();
            if !failures.is_empty() {
                return Err(ReportError::aggregate(failures));
            }
        } else {
            for reporter in &self.reporters {
                self.capture_one(reporter.clone(), &*writer, cancel).await?;
            }
        }

        info!(report_count = self.reporters.len(), "capture pass complete");
        Ok(())
    }

    /// Resolve one reporter with its effective execution mode and hand the
    /// content to the writer.
    fn capture_one<'a>(
        &'a self,
        reporter: Arc<dyn Reporter>,
        writer: &'a dyn ReportWriter,
        cancel: &'a CancellationToken,
    ) -> impl Future<Output = Result<(), ReportError>> + 'a {
        async move {
            let effective_mode = reporter.execution_mode_override().unwrap_or(self.execution_mode);
            let content = match effective_mode {
                ExecutionMode::Asynchronous => self.resolvers.resolve_async(reporter.clone(), cancel).await?,
                ExecutionMode::Synchronous => self.resolvers.resolve_sync(reporter.clone())?,
            };
            let file_name = generate_file_name(reporter.as_ref());
            writer.write_async(&content, &file_name, cancel).await?;
            debug!(file_name = %file_name, "report captured");
            Ok(())
        }
    }
}

/// `{prefix}_{yyyyMMdd}_{HHmmss}_{8 hex}.{extension}`
fn generate_file_name(reporter: &dyn Reporter) -> String {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let id = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}.{}",
        reporter.file_name_prefix(),
        timestamp,
        &id[..8],
        reporter.results_format().file_extension()
    )
}
