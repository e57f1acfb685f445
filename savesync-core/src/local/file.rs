/*!
Local filesystem save store.
*/

use super::LocalSaveStore;
use crate::{Result, SyncError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// File extension used for every stored key
pub const SAVE_FILE_EXTENSION: &str = "sav";

/// Filesystem-backed save store
///
/// Each key becomes one file `<base_dir>/<sanitized key>.sav` holding the
/// raw bytes. The base directory is created on first write.
///
/// # Example
/// ```rust,no_run
/// use savesync_core::local::{LocalFileStore, LocalSaveStore};
///
/// # async fn run() -> savesync_core::Result<()> {
/// let store = LocalFileStore::new("/var/lib/emulator/saves");
/// store.save("POKEMON EMER", &[0u8; 16]).await?;
/// let loaded = store.load("POKEMON EMER").await?;
/// assert_eq!(loaded.map(|v| v.len()), Some(16));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    base_dir: PathBuf,
}

impl LocalFileStore {
    /// Create a store rooted at `base_dir`
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of the file backing `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}.{SAVE_FILE_EXTENSION}", sanitize_key(key)))
    }

    async fn ensure_base_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.base_dir).await.map_err(|e| {
            SyncError::local_adapter(format!(
                "Failed to create directory {}: {}",
                self.base_dir.display(),
                e
            ))
        })
    }
}

/// Map a key onto a portable file stem
///
/// ASCII letters, digits, `-` and `_` are kept, as are `.` and space when
/// they are neither the first nor the last byte. Every other byte, `%`
/// included, becomes `%XX`, so distinct keys always map to distinct files.
/// The empty key maps to `%`.
pub fn sanitize_key(key: &str) -> String {
    if key.is_empty() {
        return "%".to_string();
    }
    let last = key.len() - 1;
    let mut stem = String::with_capacity(key.len());
    for (i, b) in key.bytes().enumerate() {
        let keep = b.is_ascii_alphanumeric()
            || matches!(b, b'-' | b'_')
            || (matches!(b, b'.' | b' ') && i != 0 && i != last);
        if keep {
            stem.push(char::from(b));
        } else {
            stem.push_str(&format!("%{b:02X}"));
        }
    }
    stem
}

#[async_trait]
impl LocalSaveStore for LocalFileStore {
    async fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.ensure_base_dir().await?;
        let full_path = self.path_for(key);

        fs::write(&full_path, bytes).await.map_err(|e| {
            SyncError::local_adapter(format!(
                "Failed to write save to {}: {}",
                full_path.display(),
                e
            ))
        })?;

        debug!(key = %key, path = %full_path.display(), size = bytes.len(), "Wrote local save");
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u32>>> {
        let full_path = self.path_for(key);

        match fs::read(&full_path).await {
            Ok(bytes) => Ok(Some(bytes.into_iter().map(u32::from).collect())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(key = %key, path = %full_path.display(), "No local save");
                Ok(None)
            }
            Err(e) => Err(SyncError::local_adapter(format!(
                "Failed to read save from {}: {}",
                full_path.display(),
                e
            ))),
        }
    }
}
