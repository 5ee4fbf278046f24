//! Canonical in-process state for queries, charts, data sources and settings.
//!
//! [`QueryStore::apply`] is the only way to change state. Each mutation is
//! applied atomically inside the watch channel and observers are notified
//! through [`QueryStore::subscribe`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::model::{
    Chart, DataSource, DataSourceId, Query, QueryId, QueryOutput, QueryPatch, QueryStatus,
    ResultTab, Setting,
};

/// Editor bookkeeping that is not part of a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditorState {
    /// 0-based cursor line.
    pub line: Option<usize>,
}

/// Snapshot of everything the presentation layer renders.
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    pub queries: Vec<Query>,
    pub charts: Vec<Chart>,
    pub data_sources: Vec<DataSource>,
    pub setting: Setting,
    pub selected_query_id: Option<QueryId>,
    pub editor: EditorState,
}

impl StoreState {
    pub fn query(&self, id: QueryId) -> Option<&Query> {
        self.queries.iter().find(|q| q.id == id)
    }

    fn query_mut(&mut self, id: QueryId) -> Option<&mut Query> {
        self.queries.iter_mut().find(|q| q.id == id)
    }

    pub fn chart(&self, query_id: QueryId) -> Option<&Chart> {
        self.charts.iter().find(|c| c.query_id == query_id)
    }

    pub fn data_source(&self, id: DataSourceId) -> Option<&DataSource> {
        self.data_sources.iter().find(|ds| ds.id == id)
    }

    /// The configured default data source, or the first one known.
    pub fn default_data_source(&self) -> Option<&DataSource> {
        self.setting
            .default_data_source_id
            .and_then(|id| self.data_source(id))
            .or_else(|| self.data_sources.first())
    }

    pub fn selected_query(&self) -> Option<&Query> {
        self.selected_query_id.and_then(|id| self.query(id))
    }
}

/// A state change request.
#[derive(Debug, Clone)]
pub enum Mutation {
    /// Replaces the whole state with loaded entities.
    Initialize {
        queries: Vec<Query>,
        charts: Vec<Chart>,
        data_sources: Vec<DataSource>,
        setting: Setting,
    },
    SetDataSources(Vec<DataSource>),
    SetSetting(Setting),
    /// Inserts a new query and selects it.
    AddQuery(Query),
    UpdateQuery { id: QueryId, patch: QueryPatch },
    /// Removes a query together with its chart.
    DeleteQuery(QueryId),
    SelectQuery(QueryId),
    SelectResultTab { id: QueryId, tab: ResultTab },
    UpdateEditor { line: Option<usize> },
    /// Creates or replaces the chart of a query.
    UpdateChart(Chart),
    /// A run has been registered: status becomes working and the old result is cleared.
    ExecutionStarted { id: QueryId },
    /// A run ended. `output: None` keeps whatever result is stored.
    ExecutionFinished {
        id: QueryId,
        status: QueryStatus,
        output: Option<QueryOutput>,
    },
}

/// Process-wide store with a single mutation entry point.
#[derive(Debug, Clone)]
pub struct QueryStore {
    tx: Arc<watch::Sender<StoreState>>,
    next_id: Arc<AtomicU64>,
}

impl QueryStore {
    pub fn new() -> Self {
        Self::with_state(StoreState::default())
    }

    pub fn with_state(state: StoreState) -> Self {
        let next = next_id_after(&state.queries);
        let (tx, _rx) = watch::channel(state);
        Self {
            tx: Arc::new(tx),
            next_id: Arc::new(AtomicU64::new(next)),
        }
    }

    /// Applies a mutation. Returns false when it changed nothing (e.g. unknown id).
    pub fn apply(&self, mutation: Mutation) -> bool {
        if let Mutation::Initialize { queries, .. } = &mutation {
            self.next_id
                .fetch_max(next_id_after(queries), Ordering::SeqCst);
        }

        let changed = self.tx.send_if_modified(|state| reduce(state, mutation));
        debug!(changed, "store mutation applied");
        changed
    }

    /// Allocates a fresh query id.
    pub fn next_query_id(&self) -> QueryId {
        QueryId::new(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Reads the current state without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&StoreState) -> R) -> R {
        f(&self.tx.borrow())
    }

    pub fn snapshot(&self) -> StoreState {
        self.tx.borrow().clone()
    }

    pub fn query(&self, id: QueryId) -> Option<Query> {
        self.read(|state| state.query(id).cloned())
    }

    /// Subscribes to change notifications.
    pub fn subscribe(&self) -> watch::Receiver<StoreState> {
        self.tx.subscribe()
    }

    /// Waits until the query satisfies `predicate`; returns its state then.
    ///
    /// Returns `None` if the query disappears first.
    pub async fn wait_for_query<F>(&self, id: QueryId, mut predicate: F) -> Option<Query>
    where
        F: FnMut(&Query) -> bool,
    {
        let mut rx = self.subscribe();
        let state = rx
            .wait_for(|state| state.query(id).map_or(true, &mut predicate))
            .await
            .ok()?;
        state.query(id).cloned()
    }
}

impl Default for QueryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Only the engine may put a query into `working`; a query that arrives in
/// that state has no run behind it.
fn settle_loaded(mut query: Query) -> Query {
    if query.status == QueryStatus::Working {
        warn!(query_id = %query.id, "Loaded query was working, resetting to idle");
        query.status = QueryStatus::Idle;
    }
    query
}

fn next_id_after(queries: &[Query]) -> u64 {
    queries.iter().map(|q| q.id.as_u64()).max().unwrap_or(0) + 1
}

fn reduce(state: &mut StoreState, mutation: Mutation) -> bool {
    match mutation {
        Mutation::Initialize {
            queries,
            charts,
            data_sources,
            setting,
        } => {
            let queries = queries.into_iter().map(settle_loaded).collect();
            *state = StoreState {
                queries,
                charts,
                data_sources,
                setting,
                selected_query_id: None,
                editor: EditorState::default(),
            };
            true
        }
        Mutation::SetDataSources(data_sources) => {
            state.data_sources = data_sources;
            true
        }
        Mutation::SetSetting(setting) => {
            state.setting = setting;
            true
        }
        Mutation::AddQuery(query) => {
            if state.query(query.id).is_some() {
                return false;
            }
            let query = settle_loaded(query);
            state.selected_query_id = Some(query.id);
            state.queries.push(query);
            true
        }
        Mutation::UpdateQuery { id, patch } => match state.query_mut(id) {
            Some(query) => {
                query.apply_patch(patch);
                true
            }
            None => false,
        },
        Mutation::DeleteQuery(id) => {
            let before = state.queries.len();
            state.queries.retain(|q| q.id != id);
            if state.queries.len() == before {
                return false;
            }
            state.charts.retain(|c| c.query_id != id);
            if state.selected_query_id == Some(id) {
                state.selected_query_id = state.queries.first().map(|q| q.id);
            }
            true
        }
        Mutation::SelectQuery(id) => {
            if state.query(id).is_none() {
                return false;
            }
            state.selected_query_id = Some(id);
            true
        }
        Mutation::SelectResultTab { id, tab } => match state.query_mut(id) {
            Some(query) => {
                query.selected_tab = tab;
                true
            }
            None => false,
        },
        Mutation::UpdateEditor { line } => {
            state.editor.line = line;
            true
        }
        Mutation::UpdateChart(chart) => {
            if state.query(chart.query_id).is_none() {
                return false;
            }
            match state.charts.iter_mut().find(|c| c.query_id == chart.query_id) {
                Some(existing) => *existing = chart,
                None => state.charts.push(chart),
            }
            true
        }
        Mutation::ExecutionStarted { id } => match state.query_mut(id) {
            Some(query) => {
                query.status = QueryStatus::Working;
                query.result = None;
                true
            }
            None => false,
        },
        Mutation::ExecutionFinished { id, status, output } => match state.query_mut(id) {
            Some(query) => {
                query.status = status;
                if output.is_some() {
                    query.result = output;
                }
                true
            }
            None => false,
        },
    }
}
