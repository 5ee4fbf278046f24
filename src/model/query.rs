//! The query entity and its execution state.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{DataSourceId, QueryResult};

/// Unique, immutable identifier of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(u64);

impl QueryId {
    /// Wraps a raw id.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the inner u64 value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Execution status of a query.
///
/// `Working` is the only non-terminal state; every other state may move back
/// to `Working` on the next execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    #[default]
    Idle,
    Working,
    Success,
    Failure,
    Cancelled,
}

impl QueryStatus {
    /// Returns the status as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Working => "working",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Cancelled => "cancelled",
        }
    }

    /// True for the outcomes that end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Cancelled)
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the last run left behind: rows or an error message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryOutput {
    Rows(QueryResult),
    Error { error: String },
}

impl QueryOutput {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    /// Returns the tabular result, if the last run produced one.
    pub fn rows(&self) -> Option<&QueryResult> {
        match self {
            Self::Rows(result) => Some(result),
            Self::Error { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Rows(_) => None,
            Self::Error { error } => Some(error),
        }
    }
}

/// Result pane tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultTab {
    #[default]
    Table,
    Chart,
}

/// A user-authored statement plus its execution/result state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub id: QueryId,
    pub title: String,
    pub body: String,
    pub data_source_id: DataSourceId,
    #[serde(default)]
    pub status: QueryStatus,
    #[serde(default)]
    pub result: Option<QueryOutput>,
    #[serde(default)]
    pub bdash_server_query_id: Option<String>,
    /// Opaque editor undo history, passed through untouched.
    #[serde(default)]
    pub editor_history: Option<serde_json::Value>,
    #[serde(default)]
    pub selected_tab: ResultTab,
}

impl Query {
    /// Creates an idle, empty query bound to a data source.
    pub fn new(id: QueryId, data_source_id: DataSourceId) -> Self {
        Self {
            id,
            title: "New Query".to_string(),
            body: String::new(),
            data_source_id,
            status: QueryStatus::Idle,
            result: None,
            bdash_server_query_id: None,
            editor_history: None,
            selected_tab: ResultTab::Table,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the tabular result of the last successful run, if any.
    pub fn rows(&self) -> Option<&QueryResult> {
        self.result.as_ref().and_then(QueryOutput::rows)
    }

    pub fn is_working(&self) -> bool {
        self.status == QueryStatus::Working
    }

    /// Merges a patch into this query. Execution state is never patched.
    pub fn apply_patch(&mut self, patch: QueryPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(body) = patch.body {
            self.body = body;
        }
        if let Some(data_source_id) = patch.data_source_id {
            self.data_source_id = data_source_id;
        }
        if let Some(id_hash) = patch.bdash_server_query_id {
            self.bdash_server_query_id = Some(id_hash);
        }
        if let Some(history) = patch.editor_history {
            self.editor_history = Some(history);
        }
    }
}

/// Partial update of the user-editable query fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPatch {
    pub title: Option<String>,
    pub body: Option<String>,
    pub data_source_id: Option<DataSourceId>,
    pub bdash_server_query_id: Option<String>,
    pub editor_history: Option<serde_json::Value>,
}

impl QueryPatch {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn data_source_id(mut self, id: DataSourceId) -> Self {
        self.data_source_id = Some(id);
        self
    }

    pub fn bdash_server_query_id(mut self, id_hash: impl Into<String>) -> Self {
        self.bdash_server_query_id = Some(id_hash.into());
        self
    }

    pub fn editor_history(mut self, history: serde_json::Value) -> Self {
        self.editor_history = Some(history);
        self
    }
}
