//! Configured connections to queryable backends.
//!
//! The core only references data sources; it never mutates them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a configured data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataSourceId(u64);

impl DataSourceId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DataSourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection keys never forwarded to a sharing service.
const SECRET_KEYS: &[&str] = &["password", "token", "secret", "key"];

/// A configured data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    pub id: DataSourceId,
    pub name: String,
    /// Driver type, e.g. `"postgres"` or `"mock"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Driver-specific connection parameters.
    #[serde(default)]
    pub config: BTreeMap<String, serde_json::Value>,
    /// Table names known from the last schema fetch.
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    /// Query language identifier used by the formatter in the editor.
    #[serde(default = "default_format_type")]
    pub format_type: String,
}

fn default_mime_type() -> String {
    "text/x-sql".to_string()
}

fn default_format_type() -> String {
    "sql".to_string()
}

impl DataSource {
    pub fn new(id: DataSourceId, name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: kind.into(),
            config: BTreeMap::new(),
            tables: Vec::new(),
            mime_type: default_mime_type(),
            format_type: default_format_type(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Description of the data source safe to publish alongside a shared query.
    pub fn info(&self) -> serde_json::Value {
        let mut info = serde_json::Map::new();
        info.insert("type".into(), self.kind.clone().into());
        info.insert("name".into(), self.name.clone().into());
        for (key, value) in &self.config {
            let lower = key.to_lowercase();
            if SECRET_KEYS.iter().any(|secret| lower.contains(secret)) {
                continue;
            }
            info.insert(key.clone(), value.clone());
        }
        serde_json::Value::Object(info)
    }
}
