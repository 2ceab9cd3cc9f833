//! Per-installation device identity.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use chunksync_common::{DeviceId, Result};

/// File name of the persisted identity inside the data directory.
const DEVICE_ID_FILE: &str = "device_id";

/// Stable identifier of this installation.
///
/// Persisted outside the sync engine's lifecycle and never regenerated once
/// written. When persistence is unavailable the identity is ephemeral: sync
/// still works, but write attribution resets on every run.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    id: DeviceId,
    persistent: bool,
}

impl DeviceIdentity {
    /// Default location: `<data dir>/chunksync/device_id`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("chunksync").join(DEVICE_ID_FILE))
    }

    /// Load the identity stored at `path`, creating it on first use.
    ///
    /// Never fails: any I/O problem yields an ephemeral identity and a warning.
    pub async fn load_or_create(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::try_load_or_create(path).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(
                    "Device id cannot be persisted at {} ({}); using an ephemeral id",
                    path.display(),
                    e
                );
                Self::ephemeral()
            }
        }
    }

    /// Load from the default location, or fall back to an ephemeral identity.
    pub async fn load_default() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_or_create(path).await,
            None => {
                warn!("No platform data directory; using an ephemeral device id");
                Self::ephemeral()
            }
        }
    }

    async fn try_load_or_create(path: &Path) -> Result<Self> {
        if fs::try_exists(path).await? {
            let content = fs::read_to_string(path).await?;
            let id = DeviceId::new(content.trim())?;
            debug!("Loaded device id {}", id);
            return Ok(Self { id, persistent: true });
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let id = DeviceId::generate();
        fs::write(path, id.as_str()).await?;
        info!("Generated device id {}", id);

        Ok(Self { id, persistent: true })
    }

    /// Identity valid for the current process only.
    pub fn ephemeral() -> Self {
        Self {
            id: DeviceId::generate(),
            persistent: false,
        }
    }

    /// Wrap a known id (e.g. supplied by the host application).
    pub fn fixed(id: DeviceId) -> Self {
        Self { id, persistent: true }
    }

    /// The device id.
    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    /// Whether the id survives restarts.
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }
}
