//! Query execution lifecycle.
//!
//! The engine starts runs against a data source adapter, keeps one
//! cancellation handle per query id, and turns driver outcomes into store
//! mutations. Cancellation is cooperative: the engine signals the driver and
//! waits for it to finish with a cancellation outcome.

pub mod handles;

pub use handles::{ExecutionHandleTable, RegisteredExecution};

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adapter::statement::statement_at_line;
use crate::adapter::{
    AdapterRegistry, DataSourceAdapter, DriverError, ExecutionContext, StatementScope,
};
use crate::error::{BdashError, Result, ValidationError};
use crate::model::{DataSource, Query, QueryId, QueryOutput, QueryResult, QueryStatus};
use crate::store::{Mutation, QueryStore};

/// Engine tuning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// Cancel runs that take longer than this. `None` waits forever.
    pub timeout: Option<Duration>,
}

/// Tracks one started run; completion is also visible through the store.
#[derive(Debug)]
pub struct ExecutionHandle {
    query_id: QueryId,
    run_id: u64,
    task: JoinHandle<QueryStatus>,
}

impl ExecutionHandle {
    pub fn query_id(&self) -> QueryId {
        self.query_id
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Waits for the run to reach its terminal status.
    pub async fn finished(self) -> Result<QueryStatus> {
        self.task
            .await
            .map_err(|e| BdashError::internal(format!("execution task failed: {e}")))
    }
}

/// Owns the per-query execution lifecycle.
#[derive(Clone)]
pub struct ExecutionEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    store: QueryStore,
    adapters: AdapterRegistry,
    handles: Mutex<ExecutionHandleTable>,
    options: EngineOptions,
}

impl ExecutionEngine {
    pub fn new(store: QueryStore, adapters: AdapterRegistry) -> Self {
        Self::with_options(store, adapters, EngineOptions::default())
    }

    pub fn with_options(store: QueryStore, adapters: AdapterRegistry, options: EngineOptions) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store,
                adapters,
                handles: Mutex::new(ExecutionHandleTable::new()),
                options,
            }),
        }
    }

    /// Starts a run of `query` against `data_source`.
    ///
    /// Fails with `QueryBusy` if the query already has a run in flight; the
    /// stored state is untouched in that case. Otherwise the query becomes
    /// `working` and the driver is invoked on a spawned task. Must be called
    /// from within a tokio runtime.
    pub fn execute(
        &self,
        query: &Query,
        data_source: &DataSource,
        cursor_line: usize,
    ) -> Result<ExecutionHandle> {
        let adapter = self.inner.adapters.create(data_source)?;
        let statement = match adapter.statement_scope() {
            StatementScope::AtCursor => statement_at_line(&query.body, cursor_line),
            StatementScope::WholeBody => query.body.clone(),
        };

        let ctx = {
            let mut table = self.inner.table();
            let ctx = table.register(query.id, adapter.clone())?;
            if !self
                .inner
                .store
                .apply(Mutation::ExecutionStarted { id: query.id })
            {
                table.release(query.id, ctx.run_id);
                return Err(ValidationError::UnknownQuery(query.id).into());
            }
            ctx
        };

        info!(
            query_id = %query.id,
            run_id = ctx.run_id,
            data_source = %data_source.name,
            "Execution started"
        );

        let query_id = query.id;
        let run_id = ctx.run_id;
        let inner = self.inner.clone();
        let task = tokio::spawn(async move { inner.run(ctx, adapter, statement, cursor_line).await });

        Ok(ExecutionHandle {
            query_id,
            run_id,
            task,
        })
    }

    /// Requests cancellation of the query's run.
    ///
    /// No-op (returns false) when the query is not running or cancellation
    /// was already requested.
    pub fn cancel(&self, query_id: QueryId) -> bool {
        self.inner.request_cancel(query_id)
    }

    /// Requests cancellation of every run in flight.
    pub fn cancel_all(&self) -> usize {
        let pending = self.inner.table().cancel_all();
        let count = pending.len();
        for (ctx, adapter) in pending {
            forward_cancel(ctx, adapter);
        }
        count
    }

    pub fn is_running(&self, query_id: QueryId) -> bool {
        self.inner.table().contains(query_id)
    }

    /// Ids of queries with a run in flight.
    pub fn running(&self) -> Vec<QueryId> {
        self.inner.table().running()
    }

    pub fn store(&self) -> &QueryStore {
        &self.inner.store
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.inner.adapters
    }
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("running", &self.running())
            .field("options", &self.inner.options)
            .finish()
    }
}

impl EngineInner {
    fn table(&self) -> MutexGuard<'_, ExecutionHandleTable> {
        self.handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn request_cancel(&self, query_id: QueryId) -> bool {
        let Some((ctx, adapter)) = self.table().cancel(query_id) else {
            debug!(query_id = %query_id, "Cancel ignored, query is not running");
            return false;
        };
        info!(query_id = %query_id, run_id = ctx.run_id, "Cancellation requested");
        forward_cancel(ctx, adapter);
        true
    }

    async fn run(
        &self,
        ctx: ExecutionContext,
        adapter: Arc<dyn DataSourceAdapter>,
        statement: String,
        cursor_line: usize,
    ) -> QueryStatus {
        let started = Instant::now();
        let mut timed_out = None;

        let result = {
            let execution = adapter.execute(&statement, cursor_line, &ctx);
            tokio::pin!(execution);

            match self.options.timeout {
                Some(limit) => {
                    let bounded = tokio::time::timeout(limit, &mut execution).await;
                    match bounded {
                        Ok(result) => result,
                        Err(_) => {
                            warn!(
                                query_id = %ctx.query_id,
                                timeout = ?limit,
                                "Execution timed out, requesting cancellation"
                            );
                            // A cancel the user already issued keeps its outcome.
                            if self.request_cancel(ctx.query_id) {
                                timed_out = Some(limit);
                            }
                            execution.await
                        }
                    }
                }
                None => execution.await,
            }
        };

        let (status, output) = classify(result, ctx.is_cancelled(), timed_out, started.elapsed());
        self.finish(&ctx, status, output);
        status
    }

    /// Releases the handle and records the terminal state in one step.
    fn finish(&self, ctx: &ExecutionContext, status: QueryStatus, output: Option<QueryOutput>) {
        let mut table = self.table();
        if table.release(ctx.query_id, ctx.run_id).is_none() {
            warn!(query_id = %ctx.query_id, run_id = ctx.run_id, "Run finished without a registered handle");
            return;
        }
        let recorded = self.store.apply(Mutation::ExecutionFinished {
            id: ctx.query_id,
            status,
            output,
        });
        drop(table);

        info!(
            query_id = %ctx.query_id,
            run_id = ctx.run_id,
            status = %status,
            recorded,
            "Execution finished"
        );
    }
}

/// Maps a driver outcome to the terminal status and the result to store.
fn classify(
    result: std::result::Result<QueryResult, DriverError>,
    cancel_requested: bool,
    timed_out: Option<Duration>,
    elapsed: Duration,
) -> (QueryStatus, Option<QueryOutput>) {
    match result {
        Ok(mut rows) => {
            if rows.runtime.is_zero() {
                rows.runtime = elapsed;
            }
            (QueryStatus::Success, Some(QueryOutput::Rows(rows)))
        }
        Err(DriverError::Failed(message)) if !cancel_requested => {
            (QueryStatus::Failure, Some(QueryOutput::error(message)))
        }
        // A driver may report a cancelled statement as an ordinary error.
        Err(_) => match timed_out {
            Some(limit) => (
                QueryStatus::Failure,
                Some(QueryOutput::error(format!("Query timed out after {:?}", limit))),
            ),
            None => (QueryStatus::Cancelled, None),
        },
    }
}

/// Forwards a cancellation request to the driver without waiting for it.
fn forward_cancel(ctx: ExecutionContext, adapter: Arc<dyn DataSourceAdapter>) {
    tokio::spawn(async move {
        if let Err(e) = adapter.cancel(&ctx).await {
            warn!(query_id = %ctx.query_id, "Driver cancel request failed: {e}");
        }
    });
}
