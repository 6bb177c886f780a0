//! Channel records, one per downstream backend service.

use crate::route::RecordStatus;
use serde::{Deserialize, Serialize};

/// A logical tenant/backend mapping to one downstream service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Unique canonical name; also the first path segment on the downstream.
    pub name: String,
    /// Downstream base URL, e.g. `https://core.example.com/api`.
    pub base_url: String,
    /// Downstream authentication URL (carried for completeness, not used by
    /// the GET proxy itself).
    #[serde(default)]
    pub auth_url: String,
    /// Credential sent verbatim in the downstream `Authorization` header.
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub status: RecordStatus,
}

impl Channel {
    /// Create an active channel.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            auth_url: String::new(),
            api_key: api_key.into(),
            status: RecordStatus::Active,
        }
    }

    /// Builder: set the auth URL.
    pub fn with_auth_url(mut self, auth_url: impl Into<String>) -> Self {
        self.auth_url = auth_url.into();
        self
    }

    /// Builder: override the status.
    pub fn with_status(mut self, status: RecordStatus) -> Self {
        self.status = status;
        self
    }
}

/// Downstream connection metadata produced by a successful channel resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    /// Canonical channel name.
    pub name: String,
    /// Base URL with any trailing `/` removed.
    pub base_url: String,
    pub api_key: String,
    pub auth_url: String,
}

impl From<&Channel> for ChannelInfo {
    fn from(channel: &Channel) -> Self {
        Self {
            name: channel.name.clone(),
            base_url: channel.base_url.trim_end_matches('/').to_string(),
            api_key: channel.api_key.clone(),
            auth_url: channel.auth_url.clone(),
        }
    }
}

impl ChannelInfo {
    /// Downstream URL for `request_path` (which starts with `/`):
    /// `{base_url}/{name}{request_path}`.
    pub fn downstream_url(&self, request_path: &str) -> String {
        format!("{}/{}{}", self.base_url, self.name, request_path)
    }
}
