//! Reporter capability hierarchy and the concrete reporter values.
//!
//! The capability traits (`Reporter`, `ApiSource`, `RestSource`, `DbSource`)
//! are the dispatch surface: resolvers are registered against capability
//! keys and receive reporters through these views. The concrete structs are
//! plain configuration values with fluent `with_*` setters.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use indexmap::IndexMap;
use url::Url;

use crate::error::ReportError;
use crate::token::TokenProvider;
use crate::{BodyContentType, CapabilityKey, DatabaseType, ExecutionMode, HttpMethod, ResultsFormat};

/// Root capability: every reporter describes what to capture and how the
/// result is formatted and named.
pub trait Reporter: Send + Sync + 'static {
    fn results_format(&self) -> ResultsFormat;

    fn execution_mode_override(&self) -> Option<ExecutionMode> {
        None
    }

    fn file_name_prefix(&self) -> &str;

    /// Capability key of the concrete runtime type.
    fn type_key(&self) -> CapabilityKey;

    /// Short runtime type name, used in dispatch-miss errors.
    fn type_name(&self) -> &'static str {
        self.type_key().short_name()
    }

    /// Capability interfaces the runtime type implements, in declaration
    /// order. The dispatch registry walks these when neither the requested
    /// nor the runtime type has an exact registration.
    fn capability_keys(&self) -> Vec<CapabilityKey> {
        Vec::new()
    }

    fn as_any(&self) -> &dyn Any;

    fn as_api_source(&self) -> Option<&dyn ApiSource> {
        None
    }

    fn as_rest_source(&self) -> Option<&dyn RestSource> {
        None
    }

    fn as_db_source(&self) -> Option<&dyn DbSource> {
        None
    }
}

/// Base HTTP capability shared by API reporter families.
pub trait ApiSource: Reporter {
    fn base_url(&self) -> &str;
    fn endpoint(&self) -> &str;
    fn timeout_seconds(&self) -> u64;
    fn headers(&self) -> &IndexMap<String, String>;
    fn token_provider(&self) -> Option<&Arc<dyn TokenProvider>>;
    fn request_body(&self) -> Option<&str>;
    fn body_content_type(&self) -> Option<BodyContentType>;
    fn body_charset(&self) -> &str;
}

/// REST capability: method, query string, and form fields on top of the
/// base HTTP surface.
pub trait RestSource: ApiSource {
    fn method(&self) -> HttpMethod;
    fn query_parameters(&self) -> &IndexMap<String, String>;
    fn form_data(&self) -> &IndexMap<String, String>;

    /// Join base URL and endpoint, stripping exactly one redundant slash at
    /// the join point, then append the URL-encoded query parameters.
    fn build_full_url(&self) -> Result<Url, ReportError> {
        let base = self.base_url();
        if base.trim().is_empty() {
            return Err(ReportError::invalid_argument("base URL must be set before building a request URL"));
        }

        let base = base.strip_suffix('/').unwrap_or(base);
        let endpoint = self.endpoint();
        let endpoint = endpoint.strip_prefix('/').unwrap_or(endpoint);
        let joined = if endpoint.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{endpoint}")
        };

        let mut full_url =
            Url::parse(&joined).map_err(|error| ReportError::invalid_argument(format!("invalid request URL '{joined}': {error}")))?;

        if !self.query_parameters().is_empty() {
            let mut pairs = full_url.query_pairs_mut();
            for (key, value) in self.query_parameters() {
                pairs.append_pair(key, value);
            }
        }

        Ok(full_url)
    }
}

/// Database capability: enough to resolve a provider, open a connection,
/// and run one query.
pub trait DbSource: Reporter {
    fn database_type(&self) -> DatabaseType;
    fn connection_string(&self) -> &str;
    fn query(&self) -> &str;
    fn command_timeout_seconds(&self) -> u64;
    fn parameters(&self) -> &[DbParam];
}

/// Typed bind parameter for database queries.
#[derive(Debug, Clone, PartialEq)]
pub enum DbParam {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl From<&str> for DbParam {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for DbParam {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for DbParam {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for DbParam {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for DbParam {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Configuration for one REST API capture.
#[derive(Clone)]
pub struct RestApiReporter {
    pub results_format: ResultsFormat,
    pub execution_mode_override: Option<ExecutionMode>,
    pub file_name_prefix: String,
    pub base_url: String,
    pub endpoint: String,
    pub method: HttpMethod,
    pub timeout_seconds: u64,
    pub headers: IndexMap<String, String>,
    pub query_parameters: IndexMap<String, String>,
    pub form_data: IndexMap<String, String>,
    pub request_body: Option<String>,
    pub body_content_type: Option<BodyContentType>,
    pub body_charset: String,
    pub token_provider: Option<Arc<dyn TokenProvider>>,
}

impl Default for RestApiReporter {
    fn default() -> Self {
        Self {
            results_format: ResultsFormat::default(),
            execution_mode_override: None,
            file_name_prefix: String::new(),
            base_url: String::new(),
            endpoint: String::new(),
            method: HttpMethod::Get,
            timeout_seconds: 30,
            headers: IndexMap::new(),
            query_parameters: IndexMap::new(),
            form_data: IndexMap::new(),
            request_body: None,
            body_content_type: None,
            body_charset: "utf-8".to_string(),
            token_provider: None,
        }
    }
}

impl fmt::Debug for RestApiReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestApiReporter")
            .field("method", &self.method)
            .field("base_url", &self.base_url)
            .field("endpoint", &self.endpoint)
            .field("results_format", &self.results_format)
            .field("has_token_provider", &self.token_provider.is_some())
            .finish()
    }
}

impl RestApiReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results_format(mut self, format: ResultsFormat) -> Self {
        self.results_format = format;
        self
    }

    pub fn with_execution_mode_override(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode_override = Some(mode);
        self
    }

    pub fn with_file_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_name_prefix = prefix.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in headers {
            self.headers.insert(name.into(), value.into());
        }
        self
    }

    pub fn with_query_parameter(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query_parameters.insert(name.into(), value.to_string());
        self
    }

    pub fn with_query_parameters<I, K, V>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        for (name, value) in parameters {
            self.query_parameters.insert(name.into(), value.to_string());
        }
        self
    }

    /// Add one form field. Any form data forces a form-url-encoded body.
    pub fn with_form_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form_data.insert(name.into(), value.into());
        self.body_content_type = Some(BodyContentType::FormUrlEncoded);
        self
    }

    pub fn with_form_data<I, K, V>(mut self, form_data: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in form_data {
            self.form_data.insert(name.into(), value.into());
        }
        self.body_content_type = Some(BodyContentType::FormUrlEncoded);
        self
    }

    pub fn with_json_body(self, body: impl Into<String>) -> Self {
        self.with_body(body, BodyContentType::Json)
    }

    pub fn with_xml_body(self, body: impl Into<String>) -> Self {
        self.with_body(body, BodyContentType::Xml)
    }

    pub fn with_text_body(self, body: impl Into<String>) -> Self {
        self.with_body(body, BodyContentType::TextPlain)
    }

    pub fn with_body(mut self, body: impl Into<String>, content_type: BodyContentType) -> Self {
        self.request_body = Some(body.into());
        self.body_content_type = Some(content_type);
        self
    }

    pub fn with_body_charset(mut self, charset: impl Into<String>) -> Self {
        self.body_charset = charset.into();
        self
    }

    /// Attach a static bearer credential as a plain header.
    pub fn with_static_bearer_token(mut self, token: impl AsRef<str>) -> Self {
        self.headers
            .insert("Authorization".to_string(), format!("Bearer {}", token.as_ref()));
        self
    }

    /// Attach basic-auth credentials as a plain header.
    pub fn with_basic_auth(mut self, username: impl AsRef<str>, password: impl AsRef<str>) -> Self {
        let credentials = BASE64_STANDARD.encode(format!("{}:{}", username.as_ref(), password.as_ref()));
        self.headers.insert("Authorization".to_string(), format!("Basic {credentials}"));
        self
    }

    /// Attach an API key as a header, or as a query parameter when
    /// `in_header` is false.
    pub fn with_api_key(mut self, key_name: impl Into<String>, key_value: impl Into<String>, in_header: bool) -> Self {
        if in_header {
            self.headers.insert(key_name.into(), key_value.into());
        } else {
            self.query_parameters.insert(key_name.into(), key_value.into());
        }
        self
    }

    /// Attach a live token provider; the resolver fetches a bearer token
    /// from it before each request.
    pub fn with_token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }
}

impl Reporter for RestApiReporter {
    fn results_format(&self) -> ResultsFormat {
        self.results_format
    }

    fn execution_mode_override(&self) -> Option<ExecutionMode> {
        self.execution_mode_override
    }

    fn file_name_prefix(&self) -> &str {
        &self.file_name_prefix
    }

    fn type_key(&self) -> CapabilityKey {
        CapabilityKey::of::<Self>()
    }

    fn capability_keys(&self) -> Vec<CapabilityKey> {
        vec![CapabilityKey::of::<dyn RestSource>(), CapabilityKey::of::<dyn ApiSource>()]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_api_source(&self) -> Option<&dyn ApiSource> {
        Some(self)
    }

    fn as_rest_source(&self) -> Option<&dyn RestSource> {
        Some(self)
    }
}

impl ApiSource for RestApiReporter {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }

    fn headers(&self) -> &IndexMap<String, String> {
        &self.headers
    }

    fn token_provider(&self) -> Option<&Arc<dyn TokenProvider>> {
        self.token_provider.as_ref()
    }

    fn request_body(&self) -> Option<&str> {
        self.request_body.as_deref()
    }

    fn body_content_type(&self) -> Option<BodyContentType> {
        self.body_content_type
    }

    fn body_charset(&self) -> &str {
        &self.body_charset
    }
}

impl RestSource for RestApiReporter {
    fn method(&self) -> HttpMethod {
        self.method
    }

    fn query_parameters(&self) -> &IndexMap<String, String> {
        &self.query_parameters
    }

    fn form_data(&self) -> &IndexMap<String, String> {
        &self.form_data
    }
}

/// Configuration for one database query capture.
#[derive(Debug, Clone)]
pub struct DbReporter {
    pub results_format: ResultsFormat,
    pub execution_mode_override: Option<ExecutionMode>,
    pub file_name_prefix: String,
    pub database_type: DatabaseType,
    pub connection_string: String,
    pub query: String,
    pub command_timeout_seconds: u64,
    pub parameters: Vec<DbParam>,
}

impl DbReporter {
    pub fn new(database_type: DatabaseType) -> Self {
        Self {
            results_format: ResultsFormat::default(),
            execution_mode_override: None,
            file_name_prefix: String::new(),
            database_type,
            connection_string: String::new(),
            query: String::new(),
            command_timeout_seconds: 30,
            parameters: Vec::new(),
        }
    }

    pub fn with_results_format(mut self, format: ResultsFormat) -> Self {
        self.results_format = format;
        self
    }

    pub fn with_execution_mode_override(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode_override = Some(mode);
        self
    }

    pub fn with_file_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_name_prefix = prefix.into();
        self
    }

    pub fn with_database_type(mut self, database_type: DatabaseType) -> Self {
        self.database_type = database_type;
        self
    }

    pub fn with_connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.connection_string = connection_string.into();
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_command_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.command_timeout_seconds = timeout_seconds;
        self
    }

    pub fn add_parameter(mut self, parameter: impl Into<DbParam>) -> Self {
        self.parameters.push(parameter.into());
        self
    }

    pub fn add_parameters<I, P>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<DbParam>,
    {
        self.parameters.extend(parameters.into_iter().map(Into::into));
        self
    }
}

impl Reporter for DbReporter {
    fn results_format(&self) -> ResultsFormat {
        self.results_format
    }

    fn execution_mode_override(&self) -> Option<ExecutionMode> {
        self.execution_mode_override
    }

    fn file_name_prefix(&self) -> &str {
        &self.file_name_prefix
    }

    fn type_key(&self) -> CapabilityKey {
        CapabilityKey::of::<Self>()
    }

    fn capability_keys(&self) -> Vec<CapabilityKey> {
        vec![CapabilityKey::of::<dyn DbSource>()]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_db_source(&self) -> Option<&dyn DbSource> {
        Some(self)
    }
}

impl DbSource for DbReporter {
    fn database_type(&self) -> DatabaseType {
        self.database_type
    }

    fn connection_string(&self) -> &str {
        &self.connection_string
    }

    fn query(&self) -> &str {
        &self.query
    }

    fn command_timeout_seconds(&self) -> u64 {
        self.command_timeout_seconds
    }

    fn parameters(&self) -> &[DbParam] {
        &self.parameters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_full_url_strips_one_redundant_slash_at_the_join() {
        let reporter = RestApiReporter::new()
            .with_base_url("https://api.example.com/")
            .with_endpoint("/users");

        let url = reporter.build_full_url().unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/users");
    }

    #[test]
    fn build_full_url_inserts_the_missing_slash() {
        let reporter = RestApiReporter::new()
            .with_base_url("https://api.example.com")
            .with_endpoint("users");

        let url = reporter.build_full_url().unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/users");
    }

    #[test]
    fn build_full_url_encodes_query_parameters() {
        let reporter = RestApiReporter::new()
            .with_base_url("https://api.example.com")
            .with_endpoint("/search")
            .with_query_parameter("q", "hello world")
            .with_query_parameter("page", 2);

        let url = reporter.build_full_url().unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/search?q=hello+world&page=2");
    }

    #[test]
    fn build_full_url_rejects_an_empty_base() {
        let reporter = RestApiReporter::new().with_endpoint("/users");
        let error = reporter.build_full_url().unwrap_err();
        assert!(matches!(error, ReportError::InvalidArgument { .. }));
    }

    #[test]
    fn static_bearer_token_becomes_an_authorization_header() {
        let reporter = RestApiReporter::new().with_static_bearer_token("abc123");
        assert_eq!(reporter.headers.get("Authorization").map(String::as_str), Some("Bearer abc123"));
    }

    #[test]
    fn basic_auth_encodes_credentials() {
        let reporter = RestApiReporter::new().with_basic_auth("user", "pass");
        // base64("user:pass")
        assert_eq!(
            reporter.headers.get("Authorization").map(String::as_str),
            Some("Basic dXNlcjpwYXNz")
        );
    }

    #[test]
    fn api_key_lands_in_header_or_query() {
        let header_reporter = RestApiReporter::new().with_api_key("X-Api-Key", "secret", true);
        assert_eq!(header_reporter.headers.get("X-Api-Key").map(String::as_str), Some("secret"));

        let query_reporter = RestApiReporter::new().with_api_key("api_key", "secret", false);
        assert_eq!(query_reporter.query_parameters.get("api_key").map(String::as_str), Some("secret"));
    }

    #[test]
    fn form_fields_force_a_form_encoded_body() {
        let reporter = RestApiReporter::new().with_form_field("name", "value");
        assert_eq!(reporter.body_content_type, Some(BodyContentType::FormUrlEncoded));
        assert_eq!(reporter.form_data.get("name").map(String::as_str), Some("value"));
    }

    #[test]
    fn rest_reporter_advertises_its_capability_interfaces_in_order() {
        let reporter = RestApiReporter::new();
        let keys = reporter.capability_keys();
        assert_eq!(keys[0], CapabilityKey::of::<dyn RestSource>());
        assert_eq!(keys[1], CapabilityKey::of::<dyn ApiSource>());
        assert!(reporter.as_rest_source().is_some());
        assert!(reporter.as_db_source().is_none());
    }

    #[test]
    fn db_reporter_collects_typed_parameters() {
        let reporter = DbReporter::new(DatabaseType::Sqlite)
            .with_query("SELECT * FROM runs WHERE id = ?")
            .add_parameter(42i64)
            .add_parameter("failed")
            .add_parameter(true);

        assert_eq!(
            reporter.parameters,
            vec![DbParam::Int(42), DbParam::Text("failed".to_string()), DbParam::Bool(true)]
        );
    }
}
