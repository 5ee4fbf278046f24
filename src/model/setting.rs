//! User settings consumed by sharing and query creation.

use serde::{Deserialize, Serialize};

use super::DataSourceId;

/// GitHub credentials used for Gist sharing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubSetting {
    #[serde(default)]
    pub token: Option<String>,
    /// API base URL, for GitHub Enterprise installs.
    #[serde(default)]
    pub api_url: Option<String>,
    /// Whether created gists are public.
    #[serde(default)]
    pub public: bool,
}

impl GithubSetting {
    /// Returns the token if set and non-empty.
    pub fn token(&self) -> Option<&str> {
        non_empty(self.token.as_deref())
    }
}

/// Bdash Server credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BdashServerSetting {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl BdashServerSetting {
    /// Returns the token if set and non-empty.
    pub fn token(&self) -> Option<&str> {
        non_empty(self.token.as_deref())
    }

    pub fn base_url(&self) -> Option<&str> {
        non_empty(self.base_url.as_deref())
    }
}

/// Read-only settings input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    #[serde(default)]
    pub default_data_source_id: Option<DataSourceId>,
    #[serde(default)]
    pub github: GithubSetting,
    #[serde(default)]
    pub bdash_server: BdashServerSetting,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
