//! User intents.
//!
//! [`ActionDispatcher`] is the command surface the presentation layer calls.
//! It validates, resolves entities from the [`QueryStore`], and delegates to
//! the [`ExecutionEngine`], the [`SharingService`] and the collaborators that
//! talk to the desktop (clipboard, URL opener, overwrite confirmation).
//! Errors are returned as values; how they are shown is up to the caller.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clipboard::Clipboard;
use crate::engine::{ExecutionEngine, ExecutionHandle};
use crate::error::{BdashError, Result, ValidationError};
use crate::format::{ResultFormat, ResultFormatter};
use crate::model::{
    Chart, ChartConfig, DataSource, DataSourceId, Query, QueryId, QueryPatch, ResultTab, Setting,
};
use crate::sharing::{BdashServerResponse, Overwrite, SharingService};
use crate::store::{Mutation, QueryStore};

/// Opens a URL for the user (browser, terminal output, ...).
pub trait UrlOpener: Send + Sync {
    fn open(&self, url: &str) -> Result<()>;
}

/// What to do when sharing a query that already has a Bdash Server identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteDecision {
    /// Abort; nothing is sent.
    Cancel,
    /// Update the existing remote record.
    Update,
    /// Create a new remote record.
    Create,
}

/// Asks the user how to resolve an already-shared query.
#[async_trait]
pub trait OverwriteConfirmation: Send + Sync {
    async fn confirm(&self, query: &Query) -> OverwriteDecision;
}

/// Confirmation that always answers the same; used by scripted runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedDecision(pub OverwriteDecision);

#[async_trait]
impl OverwriteConfirmation for FixedDecision {
    async fn confirm(&self, _query: &Query) -> OverwriteDecision {
        self.0
    }
}

/// Result of a Bdash Server share request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BdashShareOutcome {
    Shared(BdashServerResponse),
    /// The user declined to overwrite or create; nothing was sent.
    Cancelled,
}

/// Entities a share request reads, taken from one snapshot.
struct SharingInputs {
    query: Query,
    chart: Option<Chart>,
    setting: Setting,
    data_source: Option<DataSource>,
}

/// Dispatches user intents.
#[derive(Clone)]
pub struct ActionDispatcher {
    store: QueryStore,
    engine: ExecutionEngine,
    sharing: SharingService,
    clipboard: Arc<dyn Clipboard>,
    opener: Option<Arc<dyn UrlOpener>>,
    confirmation: Option<Arc<dyn OverwriteConfirmation>>,
}

impl ActionDispatcher {
    pub fn new(engine: ExecutionEngine, sharing: SharingService, clipboard: Arc<dyn Clipboard>) -> Self {
        Self {
            store: engine.store().clone(),
            engine,
            sharing,
            clipboard,
            opener: None,
            confirmation: None,
        }
    }

    pub fn with_url_opener(mut self, opener: Arc<dyn UrlOpener>) -> Self {
        self.opener = Some(opener);
        self
    }

    /// Sets the collaborator asked before re-sharing to Bdash Server.
    ///
    /// Without one, re-sharing an already shared query fails instead of
    /// guessing between update and create.
    pub fn with_confirmation(mut self, confirmation: Arc<dyn OverwriteConfirmation>) -> Self {
        self.confirmation = Some(confirmation);
        self
    }

    pub fn store(&self) -> &QueryStore {
        &self.store
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    /// Creates an idle query on `data_source_id` (or the default data source) and selects it.
    pub fn add_new_query(&self, data_source_id: Option<DataSourceId>) -> Result<QueryId> {
        let data_source_id = self.store.read(|state| match data_source_id {
            Some(id) => state
                .data_source(id)
                .map(|ds| ds.id)
                .ok_or(ValidationError::MissingDataSource),
            None => state
                .default_data_source()
                .map(|ds| ds.id)
                .ok_or(ValidationError::NoDataSource),
        })?;

        let query = Query::new(self.store.next_query_id(), data_source_id);
        let id = query.id;
        self.store.apply(Mutation::AddQuery(query));
        info!(query_id = %id, data_source_id = %data_source_id, "Query added");
        Ok(id)
    }

    /// Copies a query's title, body and data source into a new idle query.
    pub fn duplicate_query(&self, id: QueryId) -> Result<QueryId> {
        let source = self.require_query(id)?;
        let copy = Query::new(self.store.next_query_id(), source.data_source_id)
            .with_title(format!("copy of {}", source.title))
            .with_body(source.body);
        let copy_id = copy.id;
        self.store.apply(Mutation::AddQuery(copy));
        info!(query_id = %id, copy_id = %copy_id, "Query duplicated");
        Ok(copy_id)
    }

    /// Starts executing a query.
    ///
    /// `line` is the 0-based cursor line; `None` uses the editor's current
    /// line. A query that is already running is rejected with `QueryBusy`.
    pub fn execute_query(&self, id: QueryId, line: Option<usize>) -> Result<ExecutionHandle> {
        let (query, data_source, editor_line) = self.store.read(|state| {
            let query = state.query(id).cloned();
            let data_source = query
                .as_ref()
                .and_then(|q| state.data_source(q.data_source_id))
                .cloned();
            (query, data_source, state.editor.line)
        });
        let query = query.ok_or(ValidationError::UnknownQuery(id))?;
        let data_source = data_source.ok_or(ValidationError::MissingDataSource)?;

        let line = line.or(editor_line).unwrap_or(0);
        self.engine.execute(&query, &data_source, line)
    }

    /// Cancels a running query. Returns false when it is not running.
    pub fn cancel_query(&self, id: QueryId) -> bool {
        let working = self
            .store
            .read(|state| state.query(id).map(Query::is_working))
            .unwrap_or(false);
        if !working {
            debug!(query_id = %id, "Cancel ignored, query is not working");
            return false;
        }
        // The run may finish between the check and the signal; the engine
        // treats that as a no-op.
        self.engine.cancel(id)
    }

    /// Merges `patch` into the query. Unknown ids are ignored.
    pub fn update_query(&self, id: QueryId, patch: QueryPatch) -> bool {
        let updated = self.store.apply(Mutation::UpdateQuery { id, patch });
        if !updated {
            debug!(query_id = %id, "Update ignored, query does not exist");
        }
        updated
    }

    /// Cancels any run of the query, then removes it with its chart.
    pub fn delete_query(&self, id: QueryId) -> bool {
        self.engine.cancel(id);
        let deleted = self.store.apply(Mutation::DeleteQuery(id));
        if deleted {
            info!(query_id = %id, "Query deleted");
        }
        deleted
    }

    pub fn select_query(&self, id: QueryId) -> bool {
        self.store.apply(Mutation::SelectQuery(id))
    }

    pub fn select_result_tab(&self, id: QueryId, tab: ResultTab) -> bool {
        self.store.apply(Mutation::SelectResultTab { id, tab })
    }

    /// Records the editor cursor line used by [`execute_query`](Self::execute_query).
    pub fn update_editor(&self, line: Option<usize>) {
        self.store.apply(Mutation::UpdateEditor { line });
    }

    /// Creates or replaces the chart of a query.
    pub fn update_chart(&self, query_id: QueryId, config: ChartConfig) -> bool {
        self.store
            .apply(Mutation::UpdateChart(Chart::new(query_id, config)))
    }

    /// Formats the query's result and puts it on the clipboard.
    pub fn copy_result(&self, id: QueryId, format: ResultFormat) -> Result<()> {
        let query = self.require_query(id)?;
        let result = query.rows().ok_or(ValidationError::NoResult)?;
        let text = ResultFormatter::format(result, format)?;
        self.clipboard.write_text(&text)?;
        info!(query_id = %id, format = %format, "Result copied");
        Ok(())
    }

    /// Shares the query as a new gist and opens it. Returns the gist URL.
    pub async fn share_on_gist(&self, id: QueryId, format: ResultFormat) -> Result<String> {
        let SharingInputs {
            query,
            chart,
            setting,
            data_source,
        } = self.sharing_inputs(id)?;

        let url = self
            .sharing
            .share_on_gist(&query, chart.as_ref(), &setting, data_source.as_ref(), format)
            .await?;
        self.open(&url);
        Ok(url)
    }

    /// Shares the query on Bdash Server.
    ///
    /// If the query was shared before, the confirmation collaborator decides
    /// between updating the remote record, creating a new one, or stopping.
    /// A returned remote id is stored on the query.
    pub async fn share_on_bdash_server(&self, id: QueryId) -> Result<BdashShareOutcome> {
        let SharingInputs {
            query,
            chart,
            setting,
            data_source,
        } = self.sharing_inputs(id)?;

        // Fail fast before bothering the user with a confirmation.
        if setting.bdash_server.token().is_none() {
            return Err(ValidationError::MissingToken {
                service: "Bdash Server",
            }
            .into());
        }
        if data_source.is_none() {
            return Err(ValidationError::MissingDataSource.into());
        }

        let overwrite = match query.bdash_server_query_id.as_deref() {
            None => None,
            Some(id_hash) => {
                let confirmation = self.confirmation.as_ref().ok_or_else(|| {
                    BdashError::config(
                        "Query is already shared on Bdash Server; choose whether to update it or create a new one",
                    )
                })?;
                match confirmation.confirm(&query).await {
                    OverwriteDecision::Cancel => {
                        info!(query_id = %id, "Bdash Server share cancelled");
                        return Ok(BdashShareOutcome::Cancelled);
                    }
                    OverwriteDecision::Update => Some(Overwrite::new(id_hash)),
                    OverwriteDecision::Create => None,
                }
            }
        };

        let response = self
            .sharing
            .share_on_bdash_server(&query, chart.as_ref(), &setting, data_source.as_ref(), overwrite)
            .await?;

        self.open(&response.html_url);
        if let Some(remote_id) = &response.id {
            self.store.apply(Mutation::UpdateQuery {
                id,
                patch: QueryPatch::default().bdash_server_query_id(remote_id.clone()),
            });
        }
        Ok(BdashShareOutcome::Shared(response))
    }

    fn require_query(&self, id: QueryId) -> Result<Query> {
        self.store
            .query(id)
            .ok_or_else(|| ValidationError::UnknownQuery(id).into())
    }

    fn sharing_inputs(&self, id: QueryId) -> Result<SharingInputs> {
        let inputs = self.store.read(|state| {
            state.query(id).map(|query| SharingInputs {
                chart: state.chart(id).cloned(),
                setting: state.setting.clone(),
                data_source: state.data_source(query.data_source_id).cloned(),
                query: query.clone(),
            })
        });
        inputs.ok_or_else(|| ValidationError::UnknownQuery(id).into())
    }

    /// Opening is best effort; the share already succeeded.
    fn open(&self, url: &str) {
        let Some(opener) = &self.opener else {
            return;
        };
        if let Err(e) = opener.open(url) {
            warn!(url = %url, error = %e, "Failed to open URL");
        }
    }
}

impl std::fmt::Debug for ActionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDispatcher")
            .field("engine", &self.engine)
            .field("sharing", &self.sharing)
            .finish_non_exhaustive()
    }
}
