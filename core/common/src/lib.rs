//! Common utilities and types shared across chunksync crates.
//!
//! This module provides the error taxonomy used by every layer of the sync
//! stack and the identifier types that travel inside chunk metadata.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{validate_chunk_id, DeviceId};
