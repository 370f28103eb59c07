//! # Postmortem Types
//!
//! Shared type definitions for the postmortem diagnostic-capture crates:
//! the reporter capability hierarchy, dispatch keys, configuration enums,
//! the token-provider contract, and the error taxonomy.
//!
//! A *reporter* is a plain configuration value describing one unit of
//! diagnostic data to capture (an HTTP call, a database query, a custom
//! source). Reporters are built fluently, handed to the execution registry,
//! and treated as read-only once resolution begins.

use std::any::TypeId;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod error;
pub mod reporter;
pub mod token;

pub use error::ReportError;
pub use reporter::{ApiSource, DbParam, DbReporter, DbSource, Reporter, RestApiReporter, RestSource};
pub use token::TokenProvider;

/// Output format for resolved report content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResultsFormat {
    #[default]
    Json,
    Csv,
    Xml,
    Html,
    Text,
}

impl ResultsFormat {
    /// File extension used when persisting content in this format.
    pub fn file_extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Xml => "xml",
            Self::Html => "html",
            Self::Text => "txt",
        }
    }
}

impl fmt::Display for ResultsFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Json => "Json",
            Self::Csv => "Csv",
            Self::Xml => "Xml",
            Self::Html => "Html",
            Self::Text => "Text",
        };
        f.write_str(name)
    }
}

/// How the registry schedules resolution and writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Reporters are resolved and written strictly in registration order.
    #[default]
    Synchronous,
    /// Reporters are resolved and written concurrently.
    Asynchronous,
}

/// Where resolved report content is persisted.
///
/// Only the file system is implemented; the cloud backends are reserved
/// destinations that fail with [`ReportError::Unsupported`] today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DestinationType {
    #[default]
    FileSystem,
    AzureBlobStorage,
    AmazonS3,
    GoogleCloudStorage,
}

/// HTTP method for API reporters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    /// Whether a request body is sent for this method.
    pub fn allows_body(&self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }
}

/// Declared content type for a raw request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyContentType {
    Json,
    Xml,
    FormUrlEncoded,
    TextPlain,
    TextHtml,
    OctetStream,
    MultipartFormData,
}

impl BodyContentType {
    pub fn media_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Xml => "application/xml",
            Self::FormUrlEncoded => "application/x-www-form-urlencoded",
            Self::TextPlain => "text/plain",
            Self::TextHtml => "text/html",
            Self::OctetStream => "application/octet-stream",
            Self::MultipartFormData => "multipart/form-data",
        }
    }

    /// Text-like media types carry an explicit charset parameter.
    pub fn includes_charset(&self) -> bool {
        !matches!(self, Self::OctetStream | Self::MultipartFormData)
    }
}

/// Database family tag for database reporters.
///
/// Parsed from lowercase tags; an unknown tag is the range error that keeps
/// unconfigured database families out of the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatabaseType {
    Postgres,
    MySql,
    Sqlite,
}

impl DatabaseType {
    /// Connection-string scheme expected for this family.
    pub fn url_scheme(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url_scheme())
    }
}

impl FromStr for DatabaseType {
    type Err = ParseDatabaseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" => Ok(Self::MySql),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(ParseDatabaseTypeError { tag: other.to_string() }),
        }
    }
}

/// Unknown database-type tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDatabaseTypeError {
    pub tag: String,
}

impl fmt::Display for ParseDatabaseTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no database provider is configured for the tag '{}'", self.tag)
    }
}

impl std::error::Error for ParseDatabaseTypeError {}

impl From<ParseDatabaseTypeError> for ReportError {
    fn from(error: ParseDatabaseTypeError) -> Self {
        ReportError::unsupported(error.to_string())
    }
}

/// Dispatch key identifying a reporter capability.
///
/// A key can name a concrete reporter type (`CapabilityKey::of::<MyReporter>()`)
/// or a capability trait-object type (`CapabilityKey::of::<dyn RestSource>()`).
/// Keys carry the type name so lookup misses can report which runtime type
/// had no registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CapabilityKey {
    id: TypeId,
    name: &'static str,
}

impl CapabilityKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Fully qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path, e.g. `RestApiReporter` or
    /// `dyn RestSource`.
    pub fn short_name(&self) -> &'static str {
        match self.name.rsplit("::").next() {
            Some(short) => short,
            None => self.name,
        }
    }
}

impl fmt::Display for CapabilityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_format_maps_to_expected_extensions() {
        assert_eq!(ResultsFormat::Json.file_extension(), "json");
        assert_eq!(ResultsFormat::Csv.file_extension(), "csv");
        assert_eq!(ResultsFormat::Xml.file_extension(), "xml");
        assert_eq!(ResultsFormat::Html.file_extension(), "html");
        assert_eq!(ResultsFormat::Text.file_extension(), "txt");
    }

    #[test]
    fn database_type_parses_known_tags() {
        assert_eq!("postgres".parse::<DatabaseType>().unwrap(), DatabaseType::Postgres);
        assert_eq!("postgresql".parse::<DatabaseType>().unwrap(), DatabaseType::Postgres);
        assert_eq!("MySQL".parse::<DatabaseType>().unwrap(), DatabaseType::MySql);
        assert_eq!("sqlite".parse::<DatabaseType>().unwrap(), DatabaseType::Sqlite);
    }

    #[test]
    fn database_type_rejects_unknown_tags() {
        let error = "oracle".parse::<DatabaseType>().unwrap_err();
        assert!(error.to_string().contains("oracle"));

        let report_error: ReportError = error.into();
        assert!(matches!(report_error, ReportError::Unsupported { .. }));
    }

    #[test]
    fn capability_keys_distinguish_types_and_trait_objects() {
        trait Marker {}
        struct A;
        struct B;

        assert_eq!(CapabilityKey::of::<A>(), CapabilityKey::of::<A>());
        assert_ne!(CapabilityKey::of::<A>(), CapabilityKey::of::<B>());
        assert_ne!(CapabilityKey::of::<A>(), CapabilityKey::of::<dyn Marker>());
    }

    #[test]
    fn capability_key_short_name_drops_the_module_path() {
        struct Local;
        let key = CapabilityKey::of::<Local>();
        assert_eq!(key.short_name(), "Local");
        assert!(key.name().contains("::"));
    }

    #[test]
    fn body_content_type_media_types() {
        assert_eq!(BodyContentType::Json.media_type(), "application/json");
        assert_eq!(BodyContentType::FormUrlEncoded.media_type(), "application/x-www-form-urlencoded");
        assert!(BodyContentType::Json.includes_charset());
        assert!(!BodyContentType::OctetStream.includes_charset());
    }
}
