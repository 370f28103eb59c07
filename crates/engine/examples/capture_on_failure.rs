//! Capture a pair of diagnostic reports after a failed test run.
//!
//! Run with: `cargo run --example capture_on_failure`

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use postmortem_engine::{
    DatabaseType, DbReporter, ExecutionMode, HttpMethod, Registry, RestApiReporter, ResultsFormat,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let service_health = Arc::new(
        RestApiReporter::new()
            .with_base_url("https://httpbin.org")
            .with_endpoint("/json")
            .with_method(HttpMethod::Get)
            .with_header("X-Request-Source", "postmortem-example")
            .with_timeout_seconds(10)
            .with_results_format(ResultsFormat::Json)
            .with_file_name_prefix("service_health"),
    );

    let recent_runs = Arc::new(
        DbReporter::new(DatabaseType::Sqlite)
            .with_connection_string("sqlite::memory:")
            .with_query("SELECT 1 AS run_id, 'failed' AS status, datetime('now') AS finished_at")
            .with_results_format(ResultsFormat::Csv)
            .with_file_name_prefix("recent_runs"),
    );

    let mut registry = Registry::new()?
        .with_execution_mode(ExecutionMode::Asynchronous)
        .with_destination_location("./reports");
    registry.register_reporter(service_health);
    registry.register_reporter(recent_runs);

    registry.execute_async(&CancellationToken::new()).await?;
    println!("reports written to ./reports");
    Ok(())
}
