//! Publishing a query and its result to external services.
//!
//! [`SharingService`] validates preconditions, builds the payloads and hands
//! them to a [`GistClient`] or [`BdashServerClient`]. The HTTP
//! implementations live in [`gist`] and [`bdash_server`]; tests use the
//! recording clients from [`mock`].
//!
//! The service performs no UI and no retries. Create-versus-update on Bdash
//! Server is decided by the caller and passed in as an [`Overwrite`].

pub mod bdash_server;
pub mod gist;
pub mod mock;

pub use bdash_server::BdashServerHttpClient;
pub use gist::GistHttpClient;
pub use mock::{MockBdashServerClient, MockGistClient};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use url::Url;

use crate::error::{BdashError, Result, ValidationError};
use crate::format::{ResultFormat, ResultFormatter};
use crate::model::{Chart, ChartConfig, DataSource, Query, QueryResult, Setting};

/// Default GitHub API root.
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// One file of a gist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GistFile {
    pub content: String,
}

/// Create-gist request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GistRequest {
    pub description: String,
    pub public: bool,
    pub files: BTreeMap<String, GistFile>,
}

/// Creates gists.
#[async_trait]
pub trait GistClient: Send + Sync {
    /// Creates a new gist and returns its URL.
    async fn create_gist(&self, api_url: &Url, token: &str, request: &GistRequest) -> Result<String>;
}

/// Remote identity to update instead of creating a new record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Overwrite {
    #[serde(rename = "idHash")]
    pub id_hash: String,
}

impl Overwrite {
    pub fn new(id_hash: impl Into<String>) -> Self {
        Self {
            id_hash: id_hash.into(),
        }
    }
}

/// Create-or-update request for a shared query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BdashServerQueryRequest {
    pub title: String,
    pub description: String,
    pub query_sql: String,
    pub data_source_info: serde_json::Value,
    pub chart_config: Option<ChartConfig>,
    pub result_tsv: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overwrite: Option<Overwrite>,
}

/// Bdash Server answer to a create or update.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BdashServerResponse {
    /// New remote identity; may be absent on update.
    #[serde(default)]
    pub id: Option<String>,
    pub html_url: String,
}

/// Creates or updates shared queries on a Bdash Server.
#[async_trait]
pub trait BdashServerClient: Send + Sync {
    async fn publish(
        &self,
        base_url: &Url,
        token: &str,
        request: &BdashServerQueryRequest,
    ) -> Result<BdashServerResponse>;
}

/// Publishes queries to Gist and Bdash Server.
#[derive(Clone)]
pub struct SharingService {
    gist: Arc<dyn GistClient>,
    bdash_server: Arc<dyn BdashServerClient>,
}

impl SharingService {
    pub fn new(gist: Arc<dyn GistClient>, bdash_server: Arc<dyn BdashServerClient>) -> Self {
        Self { gist, bdash_server }
    }

    /// Service backed by the real HTTP clients.
    pub fn http() -> Result<Self> {
        Ok(Self::new(
            Arc::new(GistHttpClient::new()?),
            Arc::new(BdashServerHttpClient::new()?),
        ))
    }

    /// Publishes the query as a new gist and returns the gist URL.
    ///
    /// Every call creates a new gist.
    pub async fn share_on_gist(
        &self,
        query: &Query,
        chart: Option<&Chart>,
        setting: &Setting,
        data_source: Option<&DataSource>,
        format: ResultFormat,
    ) -> Result<String> {
        let token = setting
            .github
            .token()
            .ok_or(ValidationError::MissingToken { service: "GitHub" })?;
        let data_source = data_source.ok_or(ValidationError::MissingDataSource)?;
        let api_url = parse_url(
            setting.github.api_url.as_deref().unwrap_or(GITHUB_API_URL),
            "github.api_url",
        )?;

        let request = gist_request(query, chart, data_source, format, setting.github.public)?;
        info!(query_id = %query.id, format = %format, "Sharing query on Gist");

        let url = self.gist.create_gist(&api_url, token, &request).await?;
        info!(query_id = %query.id, url = %url, "Gist created");
        Ok(url)
    }

    /// Publishes the query to Bdash Server.
    ///
    /// With `overwrite` the remote record `overwrite.id_hash` is updated;
    /// without it the server allocates a new one. The caller persists a
    /// returned `id` as the query's `bdash_server_query_id`.
    pub async fn share_on_bdash_server(
        &self,
        query: &Query,
        chart: Option<&Chart>,
        setting: &Setting,
        data_source: Option<&DataSource>,
        overwrite: Option<Overwrite>,
    ) -> Result<BdashServerResponse> {
        let token = setting
            .bdash_server
            .token()
            .ok_or(ValidationError::MissingToken {
                service: "Bdash Server",
            })?;
        let data_source = data_source.ok_or(ValidationError::MissingDataSource)?;
        let base_url = setting
            .bdash_server
            .base_url()
            .ok_or_else(|| BdashError::config("Set your Bdash Server URL"))?;
        let base_url = parse_url(base_url, "bdash_server.base_url")?;

        let request = bdash_server_request(query, chart, data_source, overwrite)?;
        info!(
            query_id = %query.id,
            update = request.overwrite.is_some(),
            "Sharing query on Bdash Server"
        );

        let response = self
            .bdash_server
            .publish(&base_url, token, &request)
            .await?;
        info!(query_id = %query.id, url = %response.html_url, "Query shared on Bdash Server");
        Ok(response)
    }
}

impl std::fmt::Debug for SharingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharingService").finish_non_exhaustive()
    }
}

/// Builds the gist payload: the SQL, the formatted result and a manifest.
pub fn gist_request(
    query: &Query,
    chart: Option<&Chart>,
    data_source: &DataSource,
    format: ResultFormat,
    public: bool,
) -> Result<GistRequest> {
    let result = tabular_result(query)?;

    let manifest = serde_json::json!({
        "title": query.title,
        "body": query.body,
        "dataSource": data_source.info(),
        "chart": chart.map(|c| &c.config),
    });
    let manifest = serde_json::to_string_pretty(&manifest)
        .map_err(|e| BdashError::internal(format!("failed to serialize manifest: {e}")))?;

    let mut files = BTreeMap::new();
    // Gists reject files with empty content.
    if !query.body.trim().is_empty() {
        files.insert(
            "query.sql".to_string(),
            GistFile {
                content: query.body.clone(),
            },
        );
    }
    let formatted = ResultFormatter::format(result, format)?;
    if !formatted.is_empty() {
        files.insert(
            format!("result.{}", format.extension()),
            GistFile { content: formatted },
        );
    }
    files.insert("manifest.json".to_string(), GistFile { content: manifest });

    Ok(GistRequest {
        description: query.title.clone(),
        public,
        files,
    })
}

/// Builds the Bdash Server payload.
pub fn bdash_server_request(
    query: &Query,
    chart: Option<&Chart>,
    data_source: &DataSource,
    overwrite: Option<Overwrite>,
) -> Result<BdashServerQueryRequest> {
    let result = tabular_result(query)?;

    Ok(BdashServerQueryRequest {
        title: query.title.clone(),
        description: String::new(),
        query_sql: query.body.clone(),
        data_source_info: data_source.info(),
        chart_config: chart.map(|c| c.config.clone()),
        result_tsv: ResultFormatter::format(result, ResultFormat::Tsv)?,
        overwrite,
    })
}

fn tabular_result(query: &Query) -> Result<&QueryResult> {
    query
        .rows()
        .ok_or_else(|| ValidationError::NoResult.into())
}

fn parse_url(raw: &str, key: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| BdashError::config(format!("invalid {key} '{raw}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(BdashError::config(format!(
            "invalid {key} '{raw}': expected an http or https URL"
        )));
    }
    Ok(url)
}
