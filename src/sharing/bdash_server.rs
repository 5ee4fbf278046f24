//! Bdash Server client.
//!
//! Creates shared queries with `POST {base}/api/queries` and updates an
//! existing record with `PATCH {base}/api/queries/{idHash}`.

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::{BdashServerClient, BdashServerQueryRequest, BdashServerResponse};
use crate::error::{BdashError, Result};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

const USER_AGENT: &str = concat!("bdash/", env!("CARGO_PKG_VERSION"));

/// HTTP client for a Bdash Server instance.
#[derive(Debug, Clone)]
pub struct BdashServerHttpClient {
    client: Client,
}

impl BdashServerHttpClient {
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

    /// Method and URL for a request; an overwrite targets the existing record.
    fn route(base_url: &Url, request: &BdashServerQueryRequest) -> Result<(Method, Url)> {
        let mut url = base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                BdashError::config(format!("invalid Bdash Server URL '{}'", base_url))
            })?;
            segments.pop_if_empty().extend(["api", "queries"]);
            if let Some(overwrite) = &request.overwrite {
                segments.push(&overwrite.id_hash);
            }
        }

        let method = if request.overwrite.is_some() {
            Method::PATCH
        } else {
            Method::POST
        };
        Ok((method, url))
    }

    fn parse_error(status: reqwest::StatusCode, body: &str) -> BdashError {
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return BdashError::transport("Authentication failed. Check your Bdash Server access token.");
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return BdashError::transport("Bdash Server could not find the shared query to update.");
        }

        if let Ok(error_response) = serde_json::from_str::<BdashServerErrorResponse>(body) {
            return BdashError::transport(format!("Bdash Server error: {}", error_response.message));
        }

        BdashError::transport(format!("Bdash Server error ({}): {}", status, body))
    }
}

#[async_trait]
impl BdashServerClient for BdashServerHttpClient {
    async fn publish(
        &self,
        base_url: &Url,
        token: &str,
        request: &BdashServerQueryRequest,
    ) -> Result<BdashServerResponse> {
        let (method, url) = Self::route(base_url, request)?;

        let response = self
            .client
            .request(method, url)
            .header("Authorization", format!("token {}", token))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BdashError::transport("Request to Bdash Server timed out. Try again.")
                } else if e.is_connect() {
                    BdashError::transport("Failed to connect to Bdash Server. Check your network.")
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

        serde_json::from_str(&body)
            .map_err(|e| BdashError::transport(format!("Failed to parse response: {}", e)))
    }
}

#[derive(Debug, Deserialize)]
struct BdashServerErrorResponse {
    message: String,
}
