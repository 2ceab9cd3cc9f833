//! WebDAV transport for chunksync.
//!
//! This module provides a remote backend speaking plain WebDAV with:
//! - HTTP basic authentication
//! - Automatic creation of the sync collection (MKCOL)
//! - Depth-1 PROPFIND enumeration of the sync collection
//! - Full RemoteTransport trait implementation

pub mod client;
pub mod multistatus;
pub mod transport;

pub use client::WebDavClient;
pub use transport::{create_webdav_transport, WebDavTransport};
