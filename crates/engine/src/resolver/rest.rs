//! Authenticated REST resolver.
//!
//! One resolution runs the pipeline Authenticate → BuildRequest → Send →
//! Interpret → (RetryOnAuthFailure →) Format. The interpreted response is
//! report *content* regardless of HTTP status: a 500 with a body is
//! captured the same way a 200 is. The only automatic recovery is a single
//! token refresh-and-resend when a 401 arrives and the reporter carries a
//! token provider.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use postmortem_api::build_http_client;
use postmortem_types::{ApiSource as _, HttpMethod, ReportError, Reporter, RestSource, TokenProvider};
use postmortem_util::{ResultRow, block_on_future};

use crate::dispatch::ErasedResolver;
use crate::resolver::format_api_results;

/// Headers that describe the body rather than the request envelope. They
/// are attached only when the request actually carries a body.
const CONTENT_HEADERS: &[&str] = &[
    "content-type",
    "content-length",
    "content-encoding",
    "content-language",
    "content-disposition",
    "content-range",
];

fn is_content_header(name: &str) -> bool {
    CONTENT_HEADERS.iter().any(|header| name.eq_ignore_ascii_case(header))
}

fn to_reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Options => Method::OPTIONS,
    }
}

/// Resolves any [`RestSource`] reporter into formatted report content.
pub struct RestApiResolver {
    http: Client,
}

impl RestApiResolver {
    pub fn new() -> Result<Self, ReportError> {
        Ok(Self { http: build_http_client()? })
    }

    /// Use a caller-supplied client, e.g. one shared across resolvers.
    pub fn with_client(client: Client) -> Self {
        Self { http: client }
    }

    async fn resolve_rest(&self, source: &dyn RestSource, cancel: &CancellationToken) -> Result<String, ReportError> {
        // Authenticate: live providers produce a bearer credential; static
        // credentials already live in the reporter's headers.
        let mut bearer_token = None;
        if let Some(provider) = source.token_provider() {
            bearer_token = Some(provider.get_token(cancel).await?);
        }

        let mut row = self.execute_request(source, bearer_token.as_deref(), cancel).await?;

        if response_status(&row) == Some(StatusCode::UNAUTHORIZED.as_u16())
            && let Some(provider) = source.token_provider()
        {
            match refresh_and_get(provider.as_ref(), cancel).await {
                Ok(fresh_token) => {
                    debug!("retrying request once with a refreshed token");
                    row = self.execute_request(source, Some(&fresh_token), cancel).await?;
                }
                Err(error) => {
                    // Deliberate: a failed refresh keeps the original
                    // unauthorized response as the captured result.
                    warn!(%error, "token refresh after 401 failed; keeping the unauthorized response");
                }
            }
        }

        Ok(format_api_results(&[row], source.results_format()))
    }

    /// Build and send one request, interpreting the response into a
    /// structured row whatever its status.
    async fn execute_request(
        &self,
        source: &dyn RestSource,
        bearer_token: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ResultRow, ReportError> {
        let url = source.build_full_url()?;
        if cancel.is_cancelled() {
            return Err(ReportError::cancelled(format!("request to {url}")));
        }

        let method = to_reqwest_method(source.method());
        let mut builder = self
            .http
            .request(method, url.as_str())
            .timeout(Duration::from_secs(source.timeout_seconds()));

        for (name, value) in source.headers() {
            if is_content_header(name) {
                continue;
            }
            // A live bearer credential overrides any static Authorization
            // header on the reporter.
            if bearer_token.is_some() && name.eq_ignore_ascii_case("authorization") {
                continue;
            }
            builder = builder.header(name, value);
        }
        if let Some(token) = bearer_token {
            builder = builder.bearer_auth(token);
        }

        if source.method().allows_body() {
            if !source.form_data().is_empty() {
                builder = builder.form(source.form_data());
            } else if let Some(body) = source.request_body() {
                let mut explicit_content_type = false;
                for (name, value) in source.headers() {
                    if is_content_header(name) {
                        explicit_content_type |= name.eq_ignore_ascii_case("content-type");
                        builder = builder.header(name, value);
                    }
                }
                if !explicit_content_type && let Some(content_type) = declared_content_type(source) {
                    builder = builder.header(CONTENT_TYPE, content_type);
                }
                builder = builder.body(body.to_string());
            }
        }

        debug!(method = source.method().as_str(), url = %url, "sending API request");
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ReportError::cancelled(format!("request to {url}"))),
            result = builder.send() => result.map_err(|error| map_send_error(error, url.as_str(), source.timeout_seconds()))?,
        };

        Ok(interpret_response(response).await)
    }
}

#[async_trait]
impl ErasedResolver for RestApiResolver {
    async fn resolve(&self, reporter: Arc<dyn Reporter>, cancel: CancellationToken) -> Result<String, ReportError> {
        let source = reporter
            .as_rest_source()
            .ok_or_else(|| ReportError::no_resolver(reporter.type_name()))?;
        self.resolve_rest(source, &cancel).await
    }

    fn resolve_blocking(&self, reporter: Arc<dyn Reporter>) -> Result<String, ReportError> {
        block_on_future(self.resolve(reporter, CancellationToken::new()))
    }
}

/// Forced refresh followed by a read of the refreshed cache.
async fn refresh_and_get(provider: &dyn TokenProvider, cancel: &CancellationToken) -> Result<String, ReportError> {
    provider.refresh_token(cancel).await?;
    provider.get_token(cancel).await
}

fn declared_content_type(source: &dyn RestSource) -> Option<String> {
    let content_type = source.body_content_type()?;
    if content_type.includes_charset() {
        Some(format!("{}; charset={}", content_type.media_type(), source.body_charset()))
    } else {
        Some(content_type.media_type().to_string())
    }
}

fn map_send_error(error: reqwest::Error, url: &str, timeout_seconds: u64) -> ReportError {
    if error.is_timeout() {
        ReportError::cancelled(format!("request to {url} timed out after {timeout_seconds}s"))
    } else {
        ReportError::network(format!("request to {url} failed: {error}"))
    }
}

fn response_status(row: &ResultRow) -> Option<u16> {
    row.get("StatusCode")?.as_u64().map(|status| status as u16)
}

/// Capture the response as data: status, body, and every header flattened
/// into a uniquely-named field. Non-2xx responses land here too.
async fn interpret_response(response: reqwest::Response) -> ResultRow {
    let status = response.status();
    let final_url = response.url().to_string();
    let headers = response.headers().clone();
    let content = response.text().await.unwrap_or_default();

    let mut row = ResultRow::new();
    row.insert("StatusCode".to_string(), json!(status.as_u16()));
    row.insert(
        "Status".to_string(),
        json!(status.canonical_reason().unwrap_or_else(|| status.as_str())),
    );
    row.insert("IsSuccess".to_string(), json!(status.is_success()));
    row.insert("Content".to_string(), json!(content));
    row.insert("ContentLength".to_string(), json!(content.len()));
    row.insert(
        "ContentType".to_string(),
        headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map_or(Value::Null, |value| json!(value)),
    );
    row.insert("Url".to_string(), json!(final_url));
    row.insert("Timestamp".to_string(), json!(Utc::now().to_rfc3339()));

    for name in headers.keys() {
        let joined = headers
            .get_all(name)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect::<Vec<_>>()
            .join(", ");
        row.insert(format!("Header_{name}"), json!(joined));
    }

    row
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_headers_are_recognized_case_insensitively() {
        assert!(is_content_header("Content-Type"));
        assert!(is_content_header("content-length"));
        assert!(is_content_header("CONTENT-RANGE"));
        assert!(!is_content_header("Authorization"));
        assert!(!is_content_header("Accept"));
    }

    #[test]
    fn methods_map_onto_reqwest() {
        assert_eq!(to_reqwest_method(HttpMethod::Get), Method::GET);
        assert_eq!(to_reqwest_method(HttpMethod::Patch), Method::PATCH);
        assert_eq!(to_reqwest_method(HttpMethod::Options), Method::OPTIONS);
    }

    #[test]
    fn declared_content_type_appends_charset_for_text_like_bodies() {
        let source = postmortem_types::RestApiReporter::new().with_json_body("{}");
        assert_eq!(declared_content_type(&source).as_deref(), Some("application/json; charset=utf-8"));

        let source = postmortem_types::RestApiReporter::new().with_body("bytes", postmortem_types::BodyContentType::OctetStream);
        assert_eq!(declared_content_type(&source).as_deref(), Some("application/octet-stream"));
    }

    #[test]
    fn response_status_reads_the_captured_status_code() {
        let mut row = ResultRow::new();
        row.insert("StatusCode".to_string(), json!(401));
        assert_eq!(response_status(&row), Some(401));

        assert_eq!(response_status(&ResultRow::new()), None);
    }
}
