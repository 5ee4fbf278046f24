//! Recording sharing clients for testing.
//!
//! Capture every request and answer with canned responses, so sharing flows
//! can be exercised without network access.

use async_trait::async_trait;
use std::sync::Mutex;
use url::Url;

use super::{BdashServerClient, BdashServerQueryRequest, BdashServerResponse, GistClient, GistRequest};
use crate::error::{BdashError, Result};

/// Recorded gist call: API URL, token, request.
pub type GistCall = (String, String, GistRequest);

/// Recorded Bdash Server call: base URL, token, request.
pub type BdashServerCall = (String, String, BdashServerQueryRequest);

/// Gist client that records requests and returns sequential gist URLs.
#[derive(Debug, Default)]
pub struct MockGistClient {
    failure: Option<String>,
    requests: Mutex<Vec<GistCall>>,
}

impl MockGistClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every call with a transport error.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    pub fn requests(&self) -> Vec<GistCall> {
        self.requests
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl GistClient for MockGistClient {
    async fn create_gist(&self, api_url: &Url, token: &str, request: &GistRequest) -> Result<String> {
        let count = match self.requests.lock() {
            Ok(mut requests) => {
                requests.push((api_url.to_string(), token.to_string(), request.clone()));
                requests.len()
            }
            Err(_) => return Err(BdashError::internal("mock gist client poisoned")),
        };

        match &self.failure {
            Some(message) => Err(BdashError::transport(message.clone())),
            None => Ok(format!("https://gist.github.com/mock/{}", count)),
        }
    }
}

/// Bdash Server client that records requests.
///
/// Creates allocate `mock-<n>` ids; updates answer without an id, like a
/// server that keeps the existing identity.
#[derive(Debug, Default)]
pub struct MockBdashServerClient {
    failure: Option<String>,
    requests: Mutex<Vec<BdashServerCall>>,
}

impl MockBdashServerClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every call with a transport error.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    pub fn requests(&self) -> Vec<BdashServerCall> {
        self.requests
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl BdashServerClient for MockBdashServerClient {
    async fn publish(
        &self,
        base_url: &Url,
        token: &str,
        request: &BdashServerQueryRequest,
    ) -> Result<BdashServerResponse> {
        let count = match self.requests.lock() {
            Ok(mut requests) => {
                requests.push((base_url.to_string(), token.to_string(), request.clone()));
                requests.len()
            }
            Err(_) => return Err(BdashError::internal("mock Bdash Server client poisoned")),
        };

        if let Some(message) = &self.failure {
            return Err(BdashError::transport(message.clone()));
        }

        let base = base_url.as_str().trim_end_matches('/');
        Ok(match &request.overwrite {
            Some(overwrite) => BdashServerResponse {
                id: None,
                html_url: format!("{}/queries/{}", base, overwrite.id_hash),
            },
            None => {
                let id = format!("mock-{}", count);
                BdashServerResponse {
                    html_url: format!("{}/queries/{}", base, id),
                    id: Some(id),
                }
            }
        })
    }
}
