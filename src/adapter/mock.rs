//! Mock data source adapter for testing.
//!
//! Provides an in-memory driver with scripted behaviour for headless runs and
//! tests: echo, canned rows, failures, and runs that wait for cancellation.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

use super::{DataSourceAdapter, DriverError, ExecutionContext, StatementScope};
use crate::error::Result;
use crate::model::{QueryResult, Value};

/// What the mock driver does when asked to execute.
#[derive(Debug, Clone, Default)]
pub enum MockBehavior {
    /// Returns a single `result` column echoing the statement.
    #[default]
    Echo,
    /// Returns the given rows.
    Respond(QueryResult),
    /// Fails with the given message.
    Fail(String),
    /// Never completes on its own; acknowledges cancellation.
    Hang,
    /// Never completes, even when cancelled.
    IgnoreCancel,
}

/// A mock adapter that returns predefined results.
#[derive(Debug)]
pub struct MockAdapter {
    behavior: MockBehavior,
    delay: Option<Duration>,
    ack_delay: Option<Duration>,
    gate: Option<Arc<Notify>>,
    scope: StatementScope,
    tables: Vec<String>,
    executed: Mutex<Vec<String>>,
    cancel_requests: AtomicUsize,
}

impl MockAdapter {
    /// Creates a new mock adapter that echoes statements.
    pub fn new() -> Self {
        Self {
            behavior: MockBehavior::Echo,
            delay: None,
            ack_delay: None,
            gate: None,
            scope: StatementScope::AtCursor,
            tables: Vec::new(),
            executed: Mutex::new(Vec::new()),
            cancel_requests: AtomicUsize::new(0),
        }
    }

    pub fn with_behavior(mut self, behavior: MockBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Shorthand for `MockBehavior::Respond`.
    pub fn responding(fields: &[&str], rows: Vec<Vec<Value>>) -> Self {
        let fields = fields.iter().map(|f| f.to_string()).collect();
        Self::new().with_behavior(MockBehavior::Respond(QueryResult::with_data(fields, rows)))
    }

    /// Suspends for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Delays the acknowledgement of a cancelled run.
    pub fn with_ack_delay(mut self, delay: Duration) -> Self {
        self.ack_delay = Some(delay);
        self
    }

    /// Waits for the gate to be notified before answering.
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_scope(mut self, scope: StatementScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_tables(mut self, tables: Vec<String>) -> Self {
        self.tables = tables;
        self
    }

    /// Statements received so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Number of `cancel` calls received.
    pub fn cancel_requests(&self) -> usize {
        self.cancel_requests.load(Ordering::SeqCst)
    }

    async fn suspend(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataSourceAdapter for MockAdapter {
    async fn execute(
        &self,
        statement: &str,
        _cursor_line: usize,
        ctx: &ExecutionContext,
    ) -> std::result::Result<QueryResult, DriverError> {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(statement.to_string());
        }
        let start = Instant::now();

        let answer = match &self.behavior {
            MockBehavior::Echo => Ok(QueryResult::with_data(
                vec!["result".to_string()],
                vec![vec![Value::String(format!("Mock result for: {}", statement))]],
            )),
            MockBehavior::Respond(result) => Ok(result.clone()),
            MockBehavior::Fail(message) => Err(DriverError::failed(message.clone())),
            MockBehavior::Hang => {
                ctx.cancelled().await;
                if let Some(delay) = self.ack_delay {
                    tokio::time::sleep(delay).await;
                }
                return Err(DriverError::Cancelled);
            }
            MockBehavior::IgnoreCancel => return std::future::pending().await,
        };

        tokio::select! {
            biased;

            _ = ctx.cancelled() => Err(DriverError::Cancelled),
            _ = self.suspend() => answer.map(|result| result.with_runtime(start.elapsed())),
        }
    }

    async fn cancel(&self, _ctx: &ExecutionContext) -> Result<()> {
        self.cancel_requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.clone())
    }

    fn statement_scope(&self) -> StatementScope {
        self.scope
    }
}
