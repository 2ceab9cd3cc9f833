//! WebDAV transport implementation.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use chunksync_common::{Error, Result};

use super::client::WebDavClient;
use crate::config::TransportConfig;
use crate::transport::{check_object_name, ObjectInfo, RemoteTransport};

/// WebDAV transport.
///
/// Implements the RemoteTransport trait over a WebDAV collection.
pub struct WebDavTransport {
    client: WebDavClient,
}

impl WebDavTransport {
    /// Create a new WebDAV transport.
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn new(config: &TransportConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            client: WebDavClient::new(config)?,
        })
    }

    /// Underlying HTTP client.
    pub fn client(&self) -> &WebDavClient {
        &self.client
    }
}

#[async_trait]
impl RemoteTransport for WebDavTransport {
    fn name(&self) -> &str {
        "webdav"
    }

    async fn check_connection(&self) -> Result<()> {
        self.client.ensure_collection().await
    }

    async fn list(&self) -> Result<Vec<ObjectInfo>> {
        let entries = self.client.list_collection().await?;
        debug!("WebDAV collection holds {} objects", entries.len());

        Ok(entries
            .into_iter()
            .filter_map(|entry| {
                let name = entry.file_name()?.to_string();
                Some(ObjectInfo {
                    name,
                    size: entry.size,
                    modified: entry.modified,
                    etag: entry.etag,
                })
            })
            .collect())
    }

    async fn get(&self, name: &str) -> Result<Vec<u8>> {
        check_object_name(name)?;
        self.client.get(name).await
    }

    async fn put(&self, name: &str, data: Vec<u8>) -> Result<ObjectInfo> {
        check_object_name(name)?;
        let size = data.len() as u64;
        let etag = self.client.put(name, data).await?;

        Ok(ObjectInfo {
            name: name.to_string(),
            size: Some(size),
            modified: Some(Utc::now()),
            etag,
        })
    }

    async fn delete(&self, name: &str) -> Result<()> {
        check_object_name(name)?;
        self.client.delete(name).await
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        check_object_name(name)?;
        self.client.exists(name).await
    }
}

/// Create a WebDAV transport from JSON configuration.
pub fn create_webdav_transport(config: serde_json::Value) -> Result<Arc<dyn RemoteTransport>> {
    let config: TransportConfig = serde_json::from_value(config)
        .map_err(|e| Error::Config(format!("Invalid WebDAV config: {}", e)))?;
    Ok(Arc::new(WebDavTransport::new(&config)?))
}
