//! Transport configuration shared by every provider.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use chunksync_common::{Error, Result};

/// Default remote folder holding the chunk objects.
pub const DEFAULT_SYNC_PATH: &str = "/chunksync";

/// Default per-operation timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings for a remote transport.
///
/// Serialized in camelCase so it can live in the same JSON document as the
/// rest of the sync configuration. Fields irrelevant to a provider are ignored
/// by it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportConfig {
    /// Registered provider name ("webdav", "local", "memory").
    pub provider: String,
    /// WebDAV endpoint URL.
    #[serde(default)]
    pub url: String,
    /// Basic-auth user name.
    #[serde(default)]
    pub username: Option<String>,
    /// Basic-auth password.
    #[serde(default)]
    pub password: Option<String>,
    /// Folder under the endpoint (or root) holding the chunk objects.
    #[serde(default = "default_sync_path")]
    pub sync_path: String,
    /// Whether to verify the server's TLS certificate.
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
    /// Per-operation timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base directory for the "local" provider.
    #[serde(default)]
    pub root: Option<String>,
}

fn default_sync_path() -> String {
    DEFAULT_SYNC_PATH.to_string()
}

fn default_verify_tls() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl TransportConfig {
    /// WebDAV configuration for the given endpoint.
    pub fn webdav(url: impl Into<String>) -> Self {
        Self {
            provider: "webdav".to_string(),
            url: url.into(),
            ..Self::default()
        }
    }

    /// Local-directory configuration rooted at `root`.
    pub fn local(root: impl Into<String>) -> Self {
        Self {
            provider: "local".to_string(),
            root: Some(root.into()),
            ..Self::default()
        }
    }

    /// Set basic-auth credentials.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the sync path.
    pub fn with_sync_path(mut self, sync_path: impl Into<String>) -> Self {
        self.sync_path = sync_path.into();
        self
    }

    /// Per-operation timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Check the settings the selected provider depends on.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(Error::Config("Transport timeout must be positive".to_string()));
        }
        match self.provider.as_str() {
            "webdav" => {
                let url = url::Url::parse(&self.url)
                    .map_err(|e| Error::Config(format!("Invalid WebDAV URL '{}': {}", self.url, e)))?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(Error::Config(format!(
                        "Unsupported WebDAV scheme: {}",
                        url.scheme()
                    )));
                }
                Ok(())
            }
            "local" => match self.root.as_deref() {
                Some(root) if !root.is_empty() => Ok(()),
                _ => Err(Error::Config("Local provider requires 'root' path".to_string())),
            },
            _ => Ok(()),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            provider: "memory".to_string(),
            url: String::new(),
            username: None,
            password: None,
            sync_path: default_sync_path(),
            verify_tls: default_verify_tls(),
            timeout_secs: default_timeout_secs(),
            root: None,
        }
    }
}
