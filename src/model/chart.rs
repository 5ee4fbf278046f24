//! Chart configuration attached to a query.

use serde::{Deserialize, Serialize};

use super::QueryId;

/// Chart flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    #[default]
    Line,
    Scatter,
    Bar,
    Area,
    Pie,
}

/// Stacking mode for bar and area charts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stacking {
    #[default]
    None,
    Enable,
    Percent,
}

/// Rendering settings for a chart; interpreted by the presentation layer only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfig {
    #[serde(rename = "type", default)]
    pub kind: ChartKind,
    #[serde(default)]
    pub x_column: Option<String>,
    #[serde(default)]
    pub y_columns: Vec<String>,
    #[serde(default)]
    pub group_columns: Vec<String>,
    #[serde(default)]
    pub stacking: Stacking,
}

/// At most one chart exists per query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chart {
    pub query_id: QueryId,
    pub config: ChartConfig,
}

impl Chart {
    pub fn new(query_id: QueryId, config: ChartConfig) -> Self {
        Self { query_id, config }
    }
}
