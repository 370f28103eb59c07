//! Built-in resolvers for the shipped reporter families.

pub mod db;
pub mod rest;

pub use db::DbResolver;
pub use rest::RestApiResolver;

use postmortem_types::ResultsFormat;
use postmortem_util::{ResultRow, formatter_for};

/// Render resolved rows for an API family, substituting an explicit
/// message for an empty result set.
pub(crate) fn format_api_results(rows: &[ResultRow], format: ResultsFormat) -> String {
    if rows.is_empty() {
        return "No data returned from API call.".to_string();
    }
    formatter_for(format).format(rows)
}
