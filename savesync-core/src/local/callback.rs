/*!
Bridge from callback-style save handlers to [`LocalSaveStore`].
*/

use super::LocalSaveStore;
use crate::{Result, SyncError};
use async_trait::async_trait;
use futures::channel::oneshot;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Called once with the stored value (`None` when nothing is stored)
pub type LoadSuccess = Box<dyn FnOnce(Option<Vec<u32>>) + Send>;

/// Called once when the handler cannot read the key
pub type LoadFailure = Box<dyn FnOnce() + Send>;

/// Callback-based local save handler supplied by the host
///
/// `load` must eventually invoke exactly one of its callbacks. It may do so
/// synchronously or from another thread.
pub trait SaveHandler: Send + Sync {
    /// Persist `bytes` under `key`
    fn save(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Start reading `key`, reporting through one of the callbacks
    fn load(&self, key: &str, on_success: LoadSuccess, on_failure: LoadFailure);
}

enum LoadOutcome {
    Loaded(Option<Vec<u32>>),
    Failed,
}

/// Exposes a [`SaveHandler`] as an async [`LocalSaveStore`]
///
/// # Example
/// ```rust
/// use savesync_core::local::{CallbackStore, LoadFailure, LoadSuccess, SaveHandler};
///
/// struct NullHandler;
///
/// impl SaveHandler for NullHandler {
///     fn save(&self, _key: &str, _bytes: &[u8]) -> savesync_core::Result<()> {
///         Ok(())
///     }
///
///     fn load(&self, _key: &str, on_success: LoadSuccess, _on_failure: LoadFailure) {
///         on_success(None);
///     }
/// }
///
/// let store = CallbackStore::new(NullHandler);
/// ```
#[derive(Debug, Clone)]
pub struct CallbackStore<H> {
    handler: H,
}

impl<H: SaveHandler> CallbackStore<H> {
    pub fn new(handler: H) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }
}

#[async_trait]
impl<H: SaveHandler> LocalSaveStore for CallbackStore<H> {
    async fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.handler.save(key, bytes)
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u32>>> {
        let (tx, rx) = oneshot::channel();
        // Shared so whichever callback runs first completes the load.
        let slot = Arc::new(Mutex::new(Some(tx)));

        let on_success: LoadSuccess = {
            let slot = Arc::clone(&slot);
            Box::new(move |value| complete(&slot, LoadOutcome::Loaded(value)))
        };
        let on_failure: LoadFailure = {
            let slot = Arc::clone(&slot);
            Box::new(move || complete(&slot, LoadOutcome::Failed))
        };
        drop(slot);

        debug!(key = %key, "Issuing local load");
        self.handler.load(key, on_success, on_failure);

        match rx.await {
            Ok(LoadOutcome::Loaded(value)) => Ok(value),
            Ok(LoadOutcome::Failed) => Err(SyncError::local_adapter(format!(
                "save handler failed to load '{key}'"
            ))),
            Err(oneshot::Canceled) => Err(SyncError::local_adapter(format!(
                "save handler dropped both callbacks for '{key}'"
            ))),
        }
    }
}

fn complete(slot: &Mutex<Option<oneshot::Sender<LoadOutcome>>>, outcome: LoadOutcome) {
    let sender = slot
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take();
    if let Some(sender) = sender {
        let _ = sender.send(outcome);
    }
}
