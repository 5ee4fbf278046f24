//! Bdash - headless runner for the SQL workbench core.

use std::sync::Arc;
use tracing::{error, info, warn};

use bdash::adapter::{AdapterRegistry, DataSourceAdapter, MockAdapter};
use bdash::cli::{Cli, ShareTarget};
use bdash::clipboard::{Clipboard, MemoryClipboard, SystemClipboard};
use bdash::config::Config;
use bdash::dispatcher::{ActionDispatcher, BdashShareOutcome, FixedDecision, UrlOpener};
use bdash::engine::ExecutionEngine;
use bdash::error::{BdashError, Result};
use bdash::format::ResultFormatter;
use bdash::logging;
use bdash::model::{DataSource, DataSourceId, QueryPatch, QueryStatus};
use bdash::sharing::SharingService;
use bdash::store::{QueryStore, StoreState};

/// Prints shared URLs instead of launching a browser.
struct StdoutOpener;

impl UrlOpener for StdoutOpener {
    fn open(&self, url: &str) -> Result<()> {
        println!("{url}");
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();
    let cli = Cli::parse_args();
    logging::init(&cli.log_target());

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    cli.validate()?;
    let format = cli.result_format()?;

    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;
    config.apply_env_defaults();
    config.validate()?;

    let mut data_sources = config.data_sources.clone();
    if data_sources.is_empty() {
        info!("No data sources configured, using the built-in mock data source");
        data_sources.push(DataSource::new(DataSourceId::new(1), "mock", "mock"));
    }

    // Only the mock driver ships with the runner.
    let mut adapters = AdapterRegistry::new();
    adapters.register("mock", |_| Ok(Arc::new(MockAdapter::new()) as Arc<dyn DataSourceAdapter>));

    let store = QueryStore::with_state(StoreState {
        data_sources,
        setting: config.setting(),
        ..Default::default()
    });

    let mut options = config.engine_options();
    if let Some(timeout) = cli.timeout() {
        options.timeout = Some(timeout);
    }
    let engine = ExecutionEngine::with_options(store.clone(), adapters, options);

    let clipboard: Arc<dyn Clipboard> = if cli.copy {
        Arc::new(SystemClipboard::new()?)
    } else {
        Arc::new(MemoryClipboard::new())
    };

    let mut dispatcher = ActionDispatcher::new(engine, SharingService::http()?, clipboard)
        .with_url_opener(Arc::new(StdoutOpener));
    if let Some(on_conflict) = cli.on_conflict {
        dispatcher = dispatcher.with_confirmation(Arc::new(FixedDecision(on_conflict.into())));
    }

    let id = dispatcher.add_new_query(cli.data_source_id())?;
    let mut patch = QueryPatch::default().body(cli.sql.clone());
    if let Some(remote_id) = &cli.remote_id {
        patch = patch.bdash_server_query_id(remote_id.clone());
    }
    dispatcher.update_query(id, patch);
    dispatcher.update_editor(cli.line);

    let handle = dispatcher.execute_query(id, cli.line)?;
    tokio::select! {
        status = handle.finished() => {
            status?;
        }
        _ = tokio::signal::ctrl_c() => {
            warn!(query_id = %id, "Interrupted, cancelling query");
            dispatcher.cancel_query(id);
            store.wait_for_query(id, |q| q.status.is_terminal()).await;
        }
    }

    let query = store
        .query(id)
        .ok_or_else(|| BdashError::internal("query disappeared during execution"))?;
    match query.status {
        QueryStatus::Success => {}
        QueryStatus::Failure => {
            let message = query
                .result
                .as_ref()
                .and_then(|r| r.error_message())
                .unwrap_or("unknown error");
            return Err(BdashError::execution(message));
        }
        QueryStatus::Cancelled => return Err(BdashError::execution("Query was cancelled")),
        QueryStatus::Idle | QueryStatus::Working => {
            return Err(BdashError::internal(format!(
                "query ended in unexpected state '{}'",
                query.status
            )));
        }
    }

    if let Some(result) = query.rows() {
        print!("{}", ResultFormatter::format(result, format)?);
        info!(rows = result.row_count(), runtime = ?result.runtime, "Query succeeded");
    }

    if cli.copy {
        dispatcher.copy_result(id, format)?;
    }

    match cli.share {
        Some(ShareTarget::Gist) => {
            dispatcher.share_on_gist(id, format).await?;
        }
        Some(ShareTarget::BdashServer) => match dispatcher.share_on_bdash_server(id).await? {
            BdashShareOutcome::Shared(response) => {
                if let Some(remote_id) = response.id {
                    info!(remote_id = %remote_id, "Bdash Server identity assigned");
                }
            }
            BdashShareOutcome::Cancelled => {
                warn!("Not shared on Bdash Server");
            }
        },
        None => {}
    }

    Ok(())
}
