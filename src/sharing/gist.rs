//! GitHub Gist client.
//!
//! Implements [`GistClient`] against the GitHub REST API (`POST /gists`).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::{GistClient, GistRequest};
use crate::error::{BdashError, Result};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// GitHub requires a User-Agent on every request.
const USER_AGENT: &str = concat!("bdash/", env!("CARGO_PKG_VERSION"));

/// HTTP client for creating gists.
#[derive(Debug, Clone)]
pub struct GistHttpClient {
    client: Client,
}

impl GistHttpClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    pub fn with_timeout(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| BdashError::transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// `{api_url}/gists`, keeping any path prefix (GitHub Enterprise).
    fn endpoint(api_url: &Url) -> Result<Url> {
        let mut url = api_url.clone();
        url.path_segments_mut()
            .map_err(|_| BdashError::config(format!("invalid GitHub API URL '{}'", api_url)))?
            .pop_if_empty()
            .push("gists");
        Ok(url)
    }

    fn parse_error(status: reqwest::StatusCode, body: &str) -> BdashError {
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return BdashError::transport("Authentication failed. Check your GitHub access token.");
        }

        if status == reqwest::StatusCode::FORBIDDEN || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return BdashError::transport("GitHub refused the request (rate limited or missing gist scope).");
        }

        if let Ok(error_response) = serde_json::from_str::<GithubErrorResponse>(body) {
            return BdashError::transport(format!("GitHub API error: {}", error_response.message));
        }

        BdashError::transport(format!("GitHub API error ({}): {}", status, body))
    }
}

#[async_trait]
impl GistClient for GistHttpClient {
    async fn create_gist(&self, api_url: &Url, token: &str, request: &GistRequest) -> Result<String> {
        let endpoint = Self::endpoint(api_url)?;

        let response = self
            .client
            .post(endpoint)
            .header("Authorization", format!("token {}", token))
            .header("Accept", "application/vnd.github+json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BdashError::transport("Request to GitHub timed out. Try again.")
                } else if e.is_connect() {
                    BdashError::transport("Failed to connect to GitHub. Check your network.")
                } else {
                    BdashError::transport(format!("Request failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BdashError::transport(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Self::parse_error(status, &body));
        }

        let gist: GistResponse = serde_json::from_str(&body)
            .map_err(|e| BdashError::transport(format!("Failed to parse response: {}", e)))?;

        Ok(gist.html_url)
    }
}

#[derive(Debug, Deserialize)]
struct GistResponse {
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct GithubErrorResponse {
    message: String,
}
