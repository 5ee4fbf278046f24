//! Result export formats.
//!
//! Pure transforms from a [`QueryResult`] to text. Used by "copy as", the
//! Gist files and the Bdash Server payload. Output depends only on the input.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{BdashError, Result};
use crate::model::{QueryResult, Row, Value};

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultFormat {
    Json,
    Tsv,
    #[default]
    Csv,
    Markdown,
}

impl ResultFormat {
    pub const ALL: [ResultFormat; 4] = [Self::Json, Self::Tsv, Self::Csv, Self::Markdown];

    /// File extension used when the result is published as a file.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Tsv => "tsv",
            Self::Csv => "csv",
            Self::Markdown => "md",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Tsv => "tsv",
            Self::Csv => "csv",
            Self::Markdown => "markdown",
        }
    }
}

impl fmt::Display for ResultFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResultFormat {
    type Err = BdashError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "tsv" => Ok(Self::Tsv),
            "csv" => Ok(Self::Csv),
            "markdown" | "md" => Ok(Self::Markdown),
            other => Err(BdashError::config(format!(
                "Unknown result format '{}'. Expected one of: json, tsv, csv, markdown",
                other
            ))),
        }
    }
}

/// Formats query results.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultFormatter;

impl ResultFormatter {
    pub fn format(result: &QueryResult, format: ResultFormat) -> Result<String> {
        match format {
            ResultFormat::Json => Self::json(result),
            ResultFormat::Tsv => Self::delimited(result, b'\t'),
            ResultFormat::Csv => Self::delimited(result, b','),
            ResultFormat::Markdown => Ok(Self::markdown(result)),
        }
    }

    /// Array of row objects keyed by field name, in field order.
    pub fn json(result: &QueryResult) -> Result<String> {
        serde_json::to_string_pretty(&JsonRows(result))
            .map_err(|e| BdashError::internal(format!("failed to serialize result: {e}")))
    }

    /// Header line plus one record per row.
    ///
    /// Values containing the delimiter, a quote or a line break are quoted
    /// with quotes doubled, so a standard reader recovers every cell intact.
    pub fn delimited(result: &QueryResult, delimiter: u8) -> Result<String> {
        if result.fields.is_empty() {
            return Ok(String::new());
        }

        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .terminator(csv::Terminator::Any(b'\n'))
            .quote_style(csv::QuoteStyle::Necessary)
            .from_writer(Vec::new());

        writer.write_record(&result.fields).map_err(csv_error)?;
        for row in &result.rows {
            writer
                .write_record(row.iter().map(Value::to_text))
                .map_err(csv_error)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| BdashError::internal(format!("failed to flush result: {e}")))?;
        String::from_utf8(bytes)
            .map_err(|e| BdashError::internal(format!("result is not valid UTF-8: {e}")))
    }

    pub fn markdown(result: &QueryResult) -> String {
        if result.fields.is_empty() {
            return String::new();
        }

        let mut out = String::new();
        push_markdown_row(&mut out, result.fields.iter().map(|f| escape_markdown(f)));
        push_markdown_row(&mut out, result.fields.iter().map(|_| "---".to_string()));
        for row in &result.rows {
            push_markdown_row(&mut out, row.iter().map(|v| escape_markdown(&v.to_text())));
        }
        out
    }
}

fn csv_error(e: csv::Error) -> BdashError {
    BdashError::internal(format!("failed to write result: {e}"))
}

fn push_markdown_row(out: &mut String, cells: impl Iterator<Item = String>) {
    out.push('|');
    for cell in cells {
        out.push(' ');
        out.push_str(&cell);
        out.push_str(" |");
    }
    out.push('\n');
}

fn escape_markdown(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('|', "\\|")
        .replace("\r\n", "<br>")
        .replace('\n', "<br>")
}

struct JsonRows<'a>(&'a QueryResult);

impl Serialize for JsonRows<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.rows.len()))?;
        for row in &self.0.rows {
            seq.serialize_element(&JsonRow {
                fields: &self.0.fields,
                row,
            })?;
        }
        seq.end()
    }
}

struct JsonRow<'a> {
    fields: &'a [String],
    row: &'a Row,
}

impl Serialize for JsonRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (i, field) in self.fields.iter().enumerate() {
            let value = self.row.get(i).map(Value::to_json).unwrap_or_default();
            map.serialize_entry(field, &value)?;
        }
        map.end()
    }
}
