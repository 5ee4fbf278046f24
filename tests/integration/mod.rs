//! Shared fixtures for the integration tests.

pub mod execution_test;
pub mod format_test;
pub mod sharing_test;

use std::sync::Arc;

use bdash::adapter::{AdapterRegistry, DataSourceAdapter, MockAdapter};
use bdash::clipboard::MemoryClipboard;
use bdash::dispatcher::ActionDispatcher;
use bdash::engine::{EngineOptions, ExecutionEngine};
use bdash::model::{BdashServerSetting, DataSource, DataSourceId, GithubSetting, Setting};
use bdash::sharing::{MockBdashServerClient, MockGistClient, SharingService};
use bdash::store::{QueryStore, StoreState};

/// A dispatcher wired to in-memory collaborators.
pub struct Workbench {
    pub dispatcher: ActionDispatcher,
    pub store: QueryStore,
    pub adapter: Arc<MockAdapter>,
    pub gist: Arc<MockGistClient>,
    pub server: Arc<MockBdashServerClient>,
    pub clipboard: Arc<MemoryClipboard>,
}

pub fn setting() -> Setting {
    Setting {
        default_data_source_id: Some(DataSourceId::new(1)),
        github: GithubSetting {
            token: Some("gh-token".into()),
            ..Default::default()
        },
        bdash_server: BdashServerSetting {
            token: Some("bs-token".into()),
            base_url: Some("https://bdash.example.com".into()),
        },
    }
}

pub fn workbench(adapter: MockAdapter) -> Workbench {
    workbench_with(adapter, setting(), EngineOptions::default())
}

pub fn workbench_with(adapter: MockAdapter, setting: Setting, options: EngineOptions) -> Workbench {
    let store = QueryStore::with_state(StoreState {
        data_sources: vec![DataSource::new(DataSourceId::new(1), "local", "mock")],
        setting,
        ..Default::default()
    });

    let adapter = Arc::new(adapter);
    let mut registry = AdapterRegistry::new();
    registry.register_instance("mock", adapter.clone() as Arc<dyn DataSourceAdapter>);

    let gist = Arc::new(MockGistClient::new());
    let server = Arc::new(MockBdashServerClient::new());
    let clipboard = Arc::new(MemoryClipboard::new());

    let dispatcher = ActionDispatcher::new(
        ExecutionEngine::with_options(store.clone(), registry, options),
        SharingService::new(gist.clone(), server.clone()),
        clipboard.clone(),
    );

    Workbench {
        dispatcher,
        store,
        adapter,
        gist,
        server,
        clipboard,
    }
}
