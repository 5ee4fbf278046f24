//! Entities shared by every component: queries, charts, data sources and settings.

mod chart;
mod data_source;
mod query;
mod result;
mod setting;

pub use chart::{Chart, ChartConfig, ChartKind, Stacking};
pub use data_source::{DataSource, DataSourceId};
pub use query::{Query, QueryId, QueryOutput, QueryPatch, QueryStatus, ResultTab};
pub use result::{QueryResult, Row, Value};
pub use setting::{BdashServerSetting, GithubSetting, Setting};
