//! Result formatters.
//!
//! A resolver produces an ordered sequence of string-keyed rows; formatters
//! render that sequence into the output format the reporter requested.
//! Column order is preserved by using [`IndexMap`] rows.

use indexmap::IndexMap;
use serde_json::Value;

use postmortem_types::ResultsFormat;

/// One resolved record: field name to value, in capture order.
pub type ResultRow = IndexMap<String, Value>;

/// Renders resolved rows into a single output string.
pub trait ResultFormatter: Send + Sync {
    fn format(&self, rows: &[ResultRow]) -> String;
}

/// Select the formatter for a requested output format.
///
/// XML and HTML are reserved formats that render a fixed sentinel naming
/// the format instead of content.
pub fn formatter_for(format: ResultsFormat) -> Box<dyn ResultFormatter> {
    match format {
        ResultsFormat::Json => Box::new(JsonResultFormatter),
        ResultsFormat::Csv => Box::new(CsvResultFormatter),
        ResultsFormat::Text => Box::new(TextResultFormatter),
        ResultsFormat::Xml | ResultsFormat::Html => Box::new(NotImplementedResultFormatter {
            format_name: format.to_string(),
        }),
    }
}

/// Pretty-printed JSON rendering of the full row collection.
pub struct JsonResultFormatter;

impl ResultFormatter for JsonResultFormatter {
    fn format(&self, rows: &[ResultRow]) -> String {
        serde_json::to_string_pretty(rows).unwrap_or_else(|_| "[]".to_string())
    }
}

/// CSV rendering: a header row from the first record's keys, then one line
/// per record. Every field is double-quoted with embedded quotes doubled.
pub struct CsvResultFormatter;

impl ResultFormatter for CsvResultFormatter {
    fn format(&self, rows: &[ResultRow]) -> String {
        let Some(first_row) = rows.first() else {
            return String::new();
        };

        let mut output = String::new();
        let header = first_row.keys().map(|key| quote_csv_field(key)).collect::<Vec<_>>().join(",");
        output.push_str(&header);
        output.push('\n');

        for row in rows {
            let line = row
                .values()
                .map(|value| quote_csv_field(&display_value(value, "")))
                .collect::<Vec<_>>()
                .join(",");
            output.push_str(&line);
            output.push('\n');
        }

        output
    }
}

/// Plain-text rendering: `key: value | key: value` per record, separated by
/// a dashed rule.
pub struct TextResultFormatter;

impl ResultFormatter for TextResultFormatter {
    fn format(&self, rows: &[ResultRow]) -> String {
        let mut output = String::new();
        for row in rows {
            let line = row
                .iter()
                .map(|(key, value)| format!("{key}: {}", display_value(value, "NULL")))
                .collect::<Vec<_>>()
                .join(" | ");
            output.push_str(&line);
            output.push('\n');
            output.push_str(&"-".repeat(20));
            output.push('\n');
        }
        output
    }
}

/// Placeholder for formats without a real renderer yet.
pub struct NotImplementedResultFormatter {
    format_name: String,
}

impl ResultFormatter for NotImplementedResultFormatter {
    fn format(&self, _rows: &[ResultRow]) -> String {
        format!("Result formatting for '{}' is not yet implemented.", self.format_name)
    }
}

fn quote_csv_field(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn display_value(value: &Value, null_text: &str) -> String {
    match value {
        Value::Null => null_text.to_string(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
