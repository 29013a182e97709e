//! Optional per-node persisted settings (§4.7). Only nodes that opt in by
//! supplying a [`SettingsStore`] are byte-for-byte persisted across
//! restarts; a missing file on read is logged and treated as "use
//! defaults", not an error, matching the original `NodeBase::readSettings`
//! behavior recovered in `original_source`.

use octf_proto::NodePath;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error("failed to parse persisted settings: {0}")]
    Parse(String),
}

/// A node's persistable state. `to_bytes`/`load` operate on raw bytes
/// rather than a concrete `prost::Message` so the trait stays object-safe;
/// implementations typically wrap a generated message type.
pub trait SettingsStore: Send + Sync {
    fn to_bytes(&self) -> Vec<u8>;
    fn load(&self, bytes: &[u8]) -> Result<(), SettingsError>;
}

pub(crate) async fn load_settings(store: &dyn SettingsStore, dir: &Path, path: &NodePath) {
    let file = dir.join(path.basename());
    match tokio::fs::read(&file).await {
        Ok(bytes) => {
            if let Err(err) = store.load(&bytes) {
                tracing::warn!(node = %path, %err, "failed to parse persisted settings, using defaults");
            }
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(node = %path, "no persisted settings on disk, using defaults");
        }
        Err(err) => {
            tracing::warn!(node = %path, %err, "failed to read persisted settings, using defaults");
        }
    }
}

pub(crate) async fn write_settings(store: &dyn SettingsStore, dir: &Path, path: &NodePath) {
    let file = dir.join(path.basename());
    let tmp = dir.join(format!("{}.tmp", path.basename()));
    let bytes = store.to_bytes();

    let result: std::io::Result<()> = async {
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &file).await
    }
    .await;

    if let Err(err) = result {
        tracing::warn!(node = %path, %err, "failed to persist settings");
    }
}

/// Idempotent: a node that was never persisted has no settings file, and
/// removing it anyway is not an error (`NodeBase::removeSettings`).
pub async fn remove_settings(dir: &Path, path: &NodePath) {
    let file = dir.join(path.basename());
    match tokio::fs::remove_file(&file).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(node = %path, %err, "failed to remove persisted settings"),
    }
}
