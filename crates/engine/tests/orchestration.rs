//! End-to-end orchestration tests: registry validation, capture passes in
//! both execution modes, custom resolvers, and destination output.

use std::any::Any;
use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use postmortem_engine::{
    CapabilityKey, DatabaseType, DbReporter, ExecutionMode, Registry, ReportError, Reporter, RestApiReporter, ResultsFormat,
};

fn api_reporter(server: &MockServer, prefix: &str) -> Arc<dyn Reporter> {
    Arc::new(
        RestApiReporter::new()
            .with_base_url(server.uri())
            .with_endpoint("/status")
            .with_results_format(ResultsFormat::Json)
            .with_file_name_prefix(prefix),
    )
}

async fn mock_status_endpoint(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"healthy": false})))
        .mount(server)
        .await;
}

fn written_files(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Custom reporter without any built-in family, resolved via delegates.
#[derive(Clone)]
struct ProcessListReporter {
    prefix: String,
}

impl Reporter for ProcessListReporter {
    fn results_format(&self) -> ResultsFormat {
        ResultsFormat::Text
    }

    fn file_name_prefix(&self) -> &str {
        &self.prefix
    }

    fn type_key(&self) -> CapabilityKey {
        CapabilityKey::of::<Self>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn synchronous_execute_writes_one_file_per_reporter() {
    let server = MockServer::start().await;
    mock_status_endpoint(&server).await;
    let output = tempfile::tempdir().unwrap();

    let mut registry = Registry::new()
        .unwrap()
        .with_destination_location(output.path().to_string_lossy().into_owned());
    registry.register_reporter(api_reporter(&server, "first"));
    registry.register_reporter(api_reporter(&server, "second"));

    registry.execute().unwrap();

    let files = written_files(output.path());
    assert_eq!(files.len(), 2);
    assert!(files[0].starts_with("first_"));
    assert!(files[1].starts_with("second_"));
    assert!(files.iter().all(|name| name.ends_with(".json")));

    let content = std::fs::read_to_string(output.path().join(&files[0])).unwrap();
    assert!(content.contains("\"StatusCode\": 200"), "content: {content}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn asynchronous_execute_captures_all_reporters_concurrently() {
    let server = MockServer::start().await;
    mock_status_endpoint(&server).await;
    let output = tempfile::tempdir().unwrap();

    let mut registry = Registry::new()
        .unwrap()
        .with_execution_mode(ExecutionMode::Asynchronous)
        .with_destination_location(output.path().to_string_lossy().into_owned());
    for index in 0..4 {
        registry.register_reporter(api_reporter(&server, &format!("report{index}")));
    }

    registry.execute_async(&CancellationToken::new()).await.unwrap();

    assert_eq!(written_files(output.path()).len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn a_reporter_without_a_resolver_fails_the_pass_with_unsupported() {
    let server = MockServer::start().await;
    mock_status_endpoint(&server).await;
    let output = tempfile::tempdir().unwrap();

    let mut registry = Registry::new()
        .unwrap()
        .with_execution_mode(ExecutionMode::Asynchronous)
        .with_destination_location(output.path().to_string_lossy().into_owned());
    registry.register_reporter(api_reporter(&server, "healthy"));
    registry.register_reporter(Arc::new(ProcessListReporter {
        prefix: "orphan".to_string(),
    }));

    let error = registry.execute_async(&CancellationToken::new()).await.unwrap_err();
    assert!(error.to_string().contains("ProcessListReporter"), "got: {error}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn custom_delegates_resolve_custom_reporter_types() {
    let output = tempfile::tempdir().unwrap();

    let (async_fn, sync_fn) = postmortem_engine::delegates_for::<ProcessListReporter, _, _, _>(
        |reporter, _cancel| async move { Ok(format!("processes for {}", reporter.prefix)) },
        |reporter| Ok(format!("processes for {}", reporter.prefix)),
    );

    let mut registry = Registry::new()
        .unwrap()
        .with_destination_location(output.path().to_string_lossy().into_owned())
        .register_custom_delegates(CapabilityKey::of::<ProcessListReporter>(), async_fn, sync_fn);
    registry.register_reporter(Arc::new(ProcessListReporter {
        prefix: "worker".to_string(),
    }));

    registry.execute_async(&CancellationToken::new()).await.unwrap();

    let files = written_files(output.path());
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with("worker_") && files[0].ends_with(".txt"));

    let content = std::fs::read_to_string(output.path().join(&files[0])).unwrap();
    assert_eq!(content, "processes for worker");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn a_database_reporter_flows_through_the_same_pass() {
    let output = tempfile::tempdir().unwrap();

    let mut registry = Registry::new()
        .unwrap()
        .with_destination_location(output.path().to_string_lossy().into_owned());
    registry.register_reporter(Arc::new(
        DbReporter::new(DatabaseType::Sqlite)
            .with_connection_string("sqlite::memory:")
            .with_query("SELECT 7 AS run_id, 'failed' AS status")
            .with_results_format(ResultsFormat::Csv)
            .with_file_name_prefix("last_runs"),
    ));

    registry.execute_async(&CancellationToken::new()).await.unwrap();

    let files = written_files(output.path());
    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with(".csv"));

    let content = std::fs::read_to_string(output.path().join(&files[0])).unwrap();
    assert_eq!(content, "\"run_id\",\"status\"\n\"7\",\"failed\"\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn compressed_destinations_produce_zip_files() {
    let server = MockServer::start().await;
    mock_status_endpoint(&server).await;
    let output = tempfile::tempdir().unwrap();

    let mut registry = Registry::new()
        .unwrap()
        .with_destination_location(output.path().to_string_lossy().into_owned())
        .with_compression();
    registry.register_reporter(api_reporter(&server, "zipped"));

    registry.execute_async(&CancellationToken::new()).await.unwrap();

    let files = written_files(output.path());
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with("zipped_") && files[0].ends_with(".zip"), "got: {files:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn per_reporter_overrides_select_the_resolution_path() {
    let server = MockServer::start().await;
    mock_status_endpoint(&server).await;
    let output = tempfile::tempdir().unwrap();

    let async_reporter: Arc<dyn Reporter> = Arc::new(
        RestApiReporter::new()
            .with_base_url(server.uri())
            .with_endpoint("/status")
            .with_execution_mode_override(ExecutionMode::Asynchronous)
            .with_file_name_prefix("overridden"),
    );

    let mut registry = Registry::new()
        .unwrap()
        .with_destination_location(output.path().to_string_lossy().into_owned());
    registry.register_reporter(async_reporter);

    // Registry stays in synchronous mode; the reporter's override routes it
    // through the async resolution path.
    registry.execute_async(&CancellationToken::new()).await.unwrap();

    assert_eq!(written_files(output.path()).len(), 1);
}

#[tokio::test]
async fn validation_failures_abort_before_any_resolution() {
    let mut registry = Registry::new().unwrap();
    registry.register_reporter(Arc::new(ProcessListReporter {
        prefix: "never".to_string(),
    }));

    let error = registry.execute_async(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(error, ReportError::InvalidOperation { .. }));
    assert_eq!(error.to_string(), "Destination location must be set before execution.");
}
