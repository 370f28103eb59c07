//! Database resolver.
//!
//! Resolves a [`DbSource`] reporter by opening a connection for its
//! database family, binding the typed parameters, running the query, and
//! reading every row into an ordered column map. The provider is selected
//! from the reporter's database-type tag; a connection string whose scheme
//! does not match the tag never reaches the driver.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde_json::{Value, json};
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Column, Row};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use postmortem_types::{DatabaseType, DbParam, DbSource, ReportError, Reporter};
use postmortem_util::{ResultRow, block_on_future, formatter_for};

use crate::dispatch::ErasedResolver;

static DRIVERS: OnceCell<()> = OnceCell::new();

fn install_drivers() {
    DRIVERS.get_or_init(sqlx::any::install_default_drivers);
}

/// Open a pool for the reporter's database family, checking that the
/// connection string actually belongs to that family first.
async fn pool_for(database_type: DatabaseType, connection_string: &str) -> Result<AnyPool, ReportError> {
    if connection_string.trim().is_empty() {
        return Err(ReportError::invalid_argument(
            "connection string must be set before resolving a database reporter",
        ));
    }

    let scheme_matches = match database_type {
        DatabaseType::Postgres => connection_string.starts_with("postgres://") || connection_string.starts_with("postgresql://"),
        DatabaseType::MySql => connection_string.starts_with("mysql://"),
        DatabaseType::Sqlite => connection_string.starts_with("sqlite:"),
    };
    if !scheme_matches {
        return Err(ReportError::invalid_argument(format!(
            "connection string scheme does not match database type '{database_type}'"
        )));
    }

    install_drivers();
    AnyPoolOptions::new()
        .max_connections(1)
        .connect(connection_string)
        .await
        .map_err(|error| ReportError::database(format!("could not connect to {database_type}: {error}")))
}

/// Resolves any [`DbSource`] reporter into formatted report content.
#[derive(Debug, Default)]
pub struct DbResolver;

impl DbResolver {
    pub fn new() -> Self {
        Self
    }

    async fn resolve_db(&self, source: &dyn DbSource, cancel: &CancellationToken) -> Result<String, ReportError> {
        if cancel.is_cancelled() {
            return Err(ReportError::cancelled("database query"));
        }
        if source.query().trim().is_empty() {
            return Err(ReportError::invalid_argument("query must be set before resolving a database reporter"));
        }

        let pool = pool_for(source.database_type(), source.connection_string()).await?;

        let mut query = sqlx::query(source.query());
        for parameter in source.parameters() {
            query = match parameter {
                DbParam::Text(value) => query.bind(value.clone()),
                DbParam::Int(value) => query.bind(*value),
                DbParam::Float(value) => query.bind(*value),
                DbParam::Bool(value) => query.bind(*value),
                DbParam::Null => query.bind(Option::<String>::None),
            };
        }

        let timeout = Duration::from_secs(source.command_timeout_seconds());
        let rows = tokio::select! {
            _ = cancel.cancelled() => {
                pool.close().await;
                return Err(ReportError::cancelled("database query"));
            }
            result = tokio::time::timeout(timeout, query.fetch_all(&pool)) => match result {
                Ok(fetched) => fetched.map_err(|error| ReportError::database(error.to_string())),
                Err(_) => Err(ReportError::cancelled(format!(
                    "database query timed out after {}s",
                    source.command_timeout_seconds()
                ))),
            },
        };
        pool.close().await;
        let rows = rows?;

        debug!(row_count = rows.len(), "database query resolved");
        let result_rows: Vec<ResultRow> = rows.iter().map(row_to_map).collect();
        if result_rows.is_empty() {
            return Ok("Query executed successfully. No records were returned.".to_string());
        }
        Ok(formatter_for(source.results_format()).format(&result_rows))
    }
}

#[async_trait]
impl ErasedResolver for DbResolver {
    async fn resolve(&self, reporter: Arc<dyn Reporter>, cancel: CancellationToken) -> Result<String, ReportError> {
        let source = reporter
            .as_db_source()
            .ok_or_else(|| ReportError::no_resolver(reporter.type_name()))?;
        self.resolve_db(source, &cancel).await
    }

    fn resolve_blocking(&self, reporter: Arc<dyn Reporter>) -> Result<String, ReportError> {
        block_on_future(self.resolve(reporter, CancellationToken::new()))
    }
}

fn row_to_map(row: &AnyRow) -> ResultRow {
    let mut map = ResultRow::new();
    for (index, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), column_value(row, index));
    }
    map
}

/// Decode a column by probing the portable scalar types; anything the
/// `Any` driver cannot decode into one of them is captured as null.
fn column_value(row: &AnyRow, index: usize) -> Value {
    if let Ok(value) = row.try_get::<Option<String>, _>(index) {
        return value.map_or(Value::Null, Value::String);
    }
    if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
        return value.map_or(Value::Null, |inner| json!(inner));
    }
    if let Ok(value) = row.try_get::<Option<i32>, _>(index) {
        return value.map_or(Value::Null, |inner| json!(inner));
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
        return value.map_or(Value::Null, |inner| json!(inner));
    }
    if let Ok(value) = row.try_get::<Option<bool>, _>(index) {
        return value.map_or(Value::Null, |inner| json!(inner));
    }
    Value::Null
}
