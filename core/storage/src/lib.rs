//! Remote transport abstraction for chunksync.
//!
//! This module provides a trait-based interface over the flat remote namespace
//! the sync engine reconciles against (WebDAV, a shared directory, memory) and
//! a registry for resolving transports from configuration.
//!
//! # Design Principles
//! - Transport isolation: no sync logic lives here, only object I/O
//! - Async operations: all I/O operations are async
//! - Unified error semantics: consistent error types across transports

pub mod config;
pub mod local;
pub mod memory;
pub mod registry;
pub mod transport;
pub mod webdav;

pub use config::TransportConfig;
pub use local::LocalTransport;
pub use memory::MemoryTransport;
pub use registry::{create_default_registry, TransportFactory, TransportRegistry};
pub use transport::{ObjectInfo, RemoteTransport};
pub use webdav::{WebDavClient, WebDavTransport};
