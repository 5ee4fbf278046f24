//! Per-query execution handle table.
//!
//! Pure bookkeeping, separated from the async engine so the registration
//! rules can be unit tested directly: at most one handle per query id,
//! insertion fails with `QueryBusy`, and release only removes the run that
//! registered it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::adapter::{DataSourceAdapter, ExecutionContext};
use crate::error::{BdashError, Result};
use crate::model::QueryId;

/// A registered, in-flight execution.
pub struct RegisteredExecution {
    /// Context handed to the driver for this run.
    pub ctx: ExecutionContext,
    /// Driver running the statement.
    pub adapter: Arc<dyn DataSourceAdapter>,
    /// Cancellation token for this run.
    pub cancel: CancellationToken,
    /// When the run was registered.
    pub started_at: Instant,
}

impl std::fmt::Debug for RegisteredExecution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredExecution")
            .field("ctx", &self.ctx)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("started_at", &self.started_at)
            .finish()
    }
}

/// Mapping from query id to its in-flight execution.
#[derive(Debug, Default)]
pub struct ExecutionHandleTable {
    entries: HashMap<QueryId, RegisteredExecution>,
    next_run_id: u64,
}

impl ExecutionHandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a run for `query_id`.
    ///
    /// Fails with `QueryBusy` if the query already has a registered run.
    pub fn register(
        &mut self,
        query_id: QueryId,
        adapter: Arc<dyn DataSourceAdapter>,
    ) -> Result<ExecutionContext> {
        if self.entries.contains_key(&query_id) {
            return Err(BdashError::QueryBusy(query_id));
        }

        self.next_run_id += 1;
        let cancel = CancellationToken::new();
        let ctx = ExecutionContext::new(query_id, self.next_run_id, cancel.clone());

        self.entries.insert(
            query_id,
            RegisteredExecution {
                ctx: ctx.clone(),
                adapter,
                cancel,
                started_at: Instant::now(),
            },
        );
        Ok(ctx)
    }

    /// Signals cancellation for the query's run.
    ///
    /// Returns the context and adapter so the caller can forward the request
    /// to the driver, or `None` if nothing is running or cancellation was
    /// already requested. The entry stays registered until the run completes.
    pub fn cancel(
        &mut self,
        query_id: QueryId,
    ) -> Option<(ExecutionContext, Arc<dyn DataSourceAdapter>)> {
        let entry = self.entries.get(&query_id)?;
        if entry.cancel.is_cancelled() {
            return None;
        }
        entry.cancel.cancel();
        Some((entry.ctx.clone(), entry.adapter.clone()))
    }

    /// Removes the entry registered by `run_id`.
    ///
    /// A stale run id leaves the table untouched.
    pub fn release(&mut self, query_id: QueryId, run_id: u64) -> Option<RegisteredExecution> {
        match self.entries.get(&query_id) {
            Some(entry) if entry.ctx.run_id == run_id => self.entries.remove(&query_id),
            _ => None,
        }
    }

    /// Cancels every registered run; returns what must be forwarded to drivers.
    pub fn cancel_all(&mut self) -> Vec<(ExecutionContext, Arc<dyn DataSourceAdapter>)> {
        let ids: Vec<QueryId> = self.entries.keys().copied().collect();
        ids.into_iter().filter_map(|id| self.cancel(id)).collect()
    }

    pub fn contains(&self, query_id: QueryId) -> bool {
        self.entries.contains_key(&query_id)
    }

    pub fn get(&self, query_id: QueryId) -> Option<&RegisteredExecution> {
        self.entries.get(&query_id)
    }

    /// Ids of queries with a registered run, sorted.
    pub fn running(&self) -> Vec<QueryId> {
        let mut ids: Vec<QueryId> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
