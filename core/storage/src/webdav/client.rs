//! WebDAV HTTP client.

use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use chunksync_common::{Error, Result};

use super::multistatus::{self, DavEntry};
use crate::config::TransportConfig;

/// Properties requested by every PROPFIND.
const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:resourcetype/>
    <d:getcontentlength/>
    <d:getlastmodified/>
    <d:getetag/>
  </d:prop>
</d:propfind>"#;

/// Low-level WebDAV client bound to one sync collection.
pub struct WebDavClient {
    http: Client,
    /// Endpoint URL as configured.
    endpoint: Url,
    /// Sync path segments below the endpoint.
    collection: Vec<String>,
    username: Option<String>,
    password: Option<String>,
}

impl WebDavClient {
    /// Create a new WebDAV client.
    ///
    /// # Errors
    /// - Invalid endpoint URL
    /// - HTTP client construction failure
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.url)
            .map_err(|e| Error::Config(format!("Invalid WebDAV URL '{}': {}", config.url, e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(Error::Config(format!("WebDAV URL cannot be a base: {}", config.url)));
        }

        let http = Client::builder()
            .user_agent("chunksync/0.1")
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        let collection = config
            .sync_path
            .split('/')
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect();

        Ok(Self {
            http,
            endpoint,
            collection,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// URL of the sync collection (with trailing slash).
    pub fn collection_url(&self) -> Url {
        self.url_for(&self.collection, None)
    }

    /// URL of one object in the sync collection.
    pub fn object_url(&self, name: &str) -> Url {
        self.url_for(&self.collection, Some(name))
    }

    fn url_for(&self, collection: &[String], object: Option<&str>) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            segments.extend(collection);
            match object {
                Some(name) => {
                    segments.push(name);
                }
                None => {
                    segments.push("");
                }
            }
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.username {
            Some(user) => builder.basic_auth(user, self.password.as_deref()),
            None => builder,
        }
    }

    /// Ensure every collection on the sync path exists, creating missing ones.
    pub async fn ensure_collection(&self) -> Result<()> {
        // The endpoint itself must answer
        self.propfind(self.url_for(&[], None), 0).await?.ok_or_else(|| {
            Error::NotFound(format!("WebDAV endpoint not found: {}", self.endpoint))
        })?;

        for depth in 1..=self.collection.len() {
            let url = self.url_for(&self.collection[..depth], None);
            if self.propfind(url.clone(), 0).await?.is_none() {
                info!("Creating WebDAV collection {}", url);
                self.mkcol(url).await?;
            }
        }

        Ok(())
    }

    /// List the direct children of the sync collection.
    pub async fn list_collection(&self) -> Result<Vec<DavEntry>> {
        let url = self.collection_url();
        let body = self
            .propfind(url.clone(), 1)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Sync collection not found: {}", url)))?;

        let own_path = url.path().trim_end_matches('/').to_string();
        let own_path = percent_encoding::percent_decode_str(&own_path)
            .decode_utf8_lossy()
            .into_owned();

        Ok(multistatus::parse(&body)
            .into_iter()
            .filter(|e| !e.is_collection && e.path.trim_end_matches('/') != own_path)
            .collect())
    }

    /// Issue a PROPFIND; `None` when the resource does not exist.
    pub async fn propfind(&self, url: Url, depth: u8) -> Result<Option<String>> {
        let method = Method::from_bytes(b"PROPFIND")
            .map_err(|e| Error::Network(format!("Invalid method: {}", e)))?;

        debug!("PROPFIND {} (depth {})", url, depth);
        let response = self
            .request(method, url)
            .header("Depth", depth.to_string())
            .header(header::CONTENT_TYPE, "application/xml; charset=utf-8")
            .body(PROPFIND_BODY)
            .send()
            .await
            .map_err(|e| send_error("PROPFIND", e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = self.handle_response(response).await?;
        response
            .text()
            .await
            .map(Some)
            .map_err(|e| Error::Network(format!("Failed to read PROPFIND response: {}", e)))
    }

    /// Create a collection.
    pub async fn mkcol(&self, url: Url) -> Result<()> {
        let method = Method::from_bytes(b"MKCOL")
            .map_err(|e| Error::Network(format!("Invalid method: {}", e)))?;

        let response = self
            .request(method, url)
            .send()
            .await
            .map_err(|e| send_error("MKCOL", e))?;

        // 405: the collection already exists
        if response.status() == StatusCode::METHOD_NOT_ALLOWED {
            return Ok(());
        }
        self.handle_response(response).await.map(|_| ())
    }

    /// Download object content.
    pub async fn get(&self, name: &str) -> Result<Vec<u8>> {
        let response = self
            .request(Method::GET, self.object_url(name))
            .send()
            .await
            .map_err(|e| send_error("GET", e))?;

        let response = self.handle_response(response).await?;
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| Error::Network(format!("Failed to read download response: {}", e)))
    }

    /// Upload object content, replacing any existing object.
    pub async fn put(&self, name: &str, data: Vec<u8>) -> Result<Option<String>> {
        let response = self
            .request(Method::PUT, self.object_url(name))
            .header(header::CONTENT_TYPE, "application/json")
            .body(data)
            .send()
            .await
            .map_err(|e| send_error("PUT", e))?;

        let response = self.handle_response(response).await?;
        Ok(response
            .headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string()))
    }

    /// Delete an object.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE, self.object_url(name))
            .send()
            .await
            .map_err(|e| send_error("DELETE", e))?;

        self.handle_response(response).await.map(|_| ())
    }

    /// Check if an object exists.
    pub async fn exists(&self, name: &str) -> Result<bool> {
        let response = self
            .request(Method::HEAD, self.object_url(name))
            .send()
            .await
            .map_err(|e| send_error("HEAD", e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        self.handle_response(response).await.map(|_| true)
    }

    /// Map non-success statuses onto the common error taxonomy.
    async fn handle_response(&self, response: Response) -> Result<Response> {
        let status = response.status();

        if status.is_success() {
            Ok(response)
        } else if status == StatusCode::NOT_FOUND {
            Err(Error::NotFound(format!("Resource not found: {}", response.url())))
        } else if status == StatusCode::UNAUTHORIZED {
            Err(Error::Authentication("Invalid WebDAV credentials".to_string()))
        } else if status == StatusCode::FORBIDDEN {
            Err(Error::PermissionDenied(format!("Access denied: {}", response.url())))
        } else if status == StatusCode::REQUEST_TIMEOUT {
            Err(Error::Timeout(format!("Server timed out: {}", response.url())))
        } else if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
            // Rejected requests fail the same way on every attempt
            let body = response.text().await.unwrap_or_default();
            Err(Error::Storage(format!("WebDAV request rejected: {} - {}", status, body)))
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(Error::Network(format!("WebDAV error: {} - {}", status, body)))
        }
    }
}

fn send_error(operation: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout(format!("{} timed out: {}", operation, err))
    } else {
        Error::Network(format!("{} failed: {}", operation, err))
    }
}
