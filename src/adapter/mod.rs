//! Data source adapter layer for Bdash.
//!
//! Provides a trait-based interface for running statements against a data
//! source, allowing different drivers to be plugged in by data source type.
//! No concrete network driver lives here; drivers register themselves in an
//! [`AdapterRegistry`].

mod mock;
pub mod statement;

pub use mock::{MockAdapter, MockBehavior};

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, ValidationError};
use crate::model::{DataSource, QueryId, QueryResult};

/// How a driver reacts to a multi-statement body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementScope {
    /// The whole body is sent to the driver as-is.
    WholeBody,
    /// Only the statement under the cursor line is sent.
    AtCursor,
}

/// Outcome of a driver run that did not produce rows.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The driver acknowledged a cancellation request.
    #[error("execution cancelled")]
    Cancelled,

    /// The driver reported a failure.
    #[error("{0}")]
    Failed(String),
}

impl DriverError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Identifies one run of one query to the driver.
///
/// Drivers may watch [`ExecutionContext::cancelled`] cooperatively, or use the
/// ids to cancel server-side from [`DataSourceAdapter::cancel`].
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub query_id: QueryId,
    pub run_id: u64,
    cancel: CancellationToken,
}

impl ExecutionContext {
    pub fn new(query_id: QueryId, run_id: u64, cancel: CancellationToken) -> Self {
        Self {
            query_id,
            run_id,
            cancel,
        }
    }

    /// Returns true once cancellation has been requested for this run.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes when cancellation is requested for this run.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

/// Trait defining the interface for data source drivers.
///
/// All operations are async; drivers must be thread-safe.
#[async_trait]
pub trait DataSourceAdapter: Send + Sync {
    /// Runs a statement. Must resolve with `DriverError::Cancelled` once it
    /// honours a cancellation request.
    async fn execute(
        &self,
        statement: &str,
        cursor_line: usize,
        ctx: &ExecutionContext,
    ) -> std::result::Result<QueryResult, DriverError>;

    /// Best-effort request to stop a running execution.
    async fn cancel(&self, ctx: &ExecutionContext) -> Result<()>;

    /// Lists table names, in driver order.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Whether this driver runs the statement under the cursor or the whole body.
    fn statement_scope(&self) -> StatementScope;

    /// Editor mime type for the driver's query language.
    fn mime_type(&self) -> &str {
        "text/x-sql"
    }

    /// Query language identifier.
    fn format_type(&self) -> &str {
        "sql"
    }
}

/// Builds an adapter for a configured data source.
pub type AdapterFactory =
    Arc<dyn Fn(&DataSource) -> Result<Arc<dyn DataSourceAdapter>> + Send + Sync>;

/// Maps data source types to adapter factories.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    factories: HashMap<String, AdapterFactory>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory for a data source type, replacing any previous one.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&DataSource) -> Result<Arc<dyn DataSourceAdapter>> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    /// Registers a single shared adapter instance for a data source type.
    pub fn register_instance(&mut self, kind: impl Into<String>, adapter: Arc<dyn DataSourceAdapter>) {
        self.register(kind, move |_| Ok(adapter.clone()));
    }

    /// Creates the adapter for a data source.
    pub fn create(&self, data_source: &DataSource) -> Result<Arc<dyn DataSourceAdapter>> {
        let factory = self.factories.get(&data_source.kind).ok_or_else(|| {
            ValidationError::UnsupportedDataSource {
                kind: data_source.kind.clone(),
            }
        })?;
        factory(data_source)
    }

    /// Returns the registered data source types, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
