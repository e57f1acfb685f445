/*!
Save synchronization coordinator.

This module contains the logic that decides whether a save or load may run,
routes it to the local store or the remote client, and keeps the status
register's settled flag consistent across every outcome.
*/

use crate::{
    config::CloudConfig,
    local::LocalSaveStore,
    record::{save_type_key, RemoteId, RemoteSaveRecord},
    remote::{HttpTransport, RemoteClient},
    status::StatusRegister,
    Result,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[cfg(feature = "metrics")]
use crate::observability::SyncMetrics;

/// Save entry points of the execution core (the emulator)
///
/// The core owns the save memory; the coordinator only moves bytes in and
/// out of it.
pub trait SaveCore: Send + Sync {
    /// Identifier of the loaded content, empty when nothing is loaded
    fn game_name(&self) -> String;

    /// Current save memory, if the content has any
    fn export_save(&self) -> Option<Vec<u8>>;

    /// Save memory format of the loaded content
    fn export_save_type(&self) -> Option<u8>;

    /// Replace the save memory
    fn import_save(&self, data: Vec<u8>, save_type: u8);
}

impl<C: SaveCore + ?Sized> SaveCore for Arc<C> {
    fn game_name(&self) -> String {
        (**self).game_name()
    }

    fn export_save(&self) -> Option<Vec<u8>> {
        (**self).export_save()
    }

    fn export_save_type(&self) -> Option<u8> {
        (**self).export_save_type()
    }

    fn import_save(&self, data: Vec<u8>, save_type: u8) {
        (**self).import_save(data, save_type)
    }
}

/// Mask every loaded element to 8 bits
pub fn normalize_save_bytes(values: &[u32]) -> Vec<u8> {
    values.iter().map(|&v| (v & 0xFF) as u8).collect()
}

/// Decode the stored save type array; anything but one element means type 0
pub fn decode_save_type(values: &[u32]) -> u8 {
    match values {
        [tag] => (tag & 0xFF) as u8,
        _ => 0,
    }
}

/// Coordinates save export and import across the local and remote backends
///
/// # Example
/// ```rust
/// use std::sync::Arc;
/// use savesync_core::{
///     CloudConfig, Lifecycle, MemoryStore, RemoteClient, SaveCoordinator, SaveCore,
///     StatusRegister,
/// };
/// use savesync_core::remote::MemoryTransport;
///
/// struct Cartridge;
///
/// impl SaveCore for Cartridge {
///     fn game_name(&self) -> String { "POKEMON EMER".to_string() }
///     fn export_save(&self) -> Option<Vec<u8>> { Some(vec![1, 2, 3]) }
///     fn export_save_type(&self) -> Option<u8> { Some(2) }
///     fn import_save(&self, _data: Vec<u8>, _save_type: u8) {}
/// }
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let status = Arc::new(StatusRegister::new());
/// let mut coordinator = SaveCoordinator::new(
///     Cartridge,
///     Arc::clone(&status),
///     RemoteClient::new(MemoryTransport::new()),
///     CloudConfig::disabled(),
/// )
/// .with_local_store(MemoryStore::new());
///
/// status.set_lifecycle(Lifecycle::Running);
/// coordinator.enable_cloud();
/// coordinator.set_auth_token("ghp_token");
///
/// let remote_id = coordinator.export_save(true).await?;
/// assert!(remote_id.is_some());
/// assert!(coordinator.import_save(None).await?);
/// # Ok::<(), savesync_core::SyncError>(())
/// # }).unwrap();
/// ```
pub struct SaveCoordinator<C, T>
where
    C: SaveCore,
    T: HttpTransport,
{
    core: C,
    status: Arc<StatusRegister>,
    remote: RemoteClient<T>,
    local: Option<Arc<dyn LocalSaveStore>>,
    config: CloudConfig,
}

impl<C, T> SaveCoordinator<C, T>
where
    C: SaveCore,
    T: HttpTransport,
{
    /// Create a coordinator with no local store registered
    ///
    /// # Arguments
    /// * `core` - The execution core that owns save memory
    /// * `status` - Status register shared with the host
    /// * `remote` - Client for the remote backend
    /// * `config` - Initial cloud configuration
    pub fn new(
        core: C,
        status: Arc<StatusRegister>,
        remote: RemoteClient<T>,
        config: CloudConfig,
    ) -> Self {
        Self {
            core,
            status,
            remote,
            local: None,
            config,
        }
    }

    /// Register a local store while building the coordinator
    pub fn with_local_store<S: LocalSaveStore + 'static>(mut self, store: S) -> Self {
        self.local = Some(Arc::new(store));
        self
    }

    /// Register (or replace) the local store
    pub fn register_local_store(&mut self, store: Arc<dyn LocalSaveStore>) {
        self.local = Some(store);
    }

    /// Remove the local store, returning the previous one
    pub fn unregister_local_store(&mut self) -> Option<Arc<dyn LocalSaveStore>> {
        self.local.take()
    }

    pub fn has_local_store(&self) -> bool {
        self.local.is_some()
    }

    /// Turn cloud saves on. Does not supply a token.
    pub fn enable_cloud(&mut self) {
        self.config.enabled = true;
    }

    /// Replace the auth token; an empty token blocks remote calls
    pub fn set_auth_token<S: Into<String>>(&mut self, token: S) {
        self.config.auth_token = token.into();
    }

    pub fn cloud_config(&self) -> &CloudConfig {
        &self.config
    }

    pub fn status(&self) -> &Arc<StatusRegister> {
        &self.status
    }

    pub fn core(&self) -> &C {
        &self.core
    }

    pub fn remote(&self) -> &RemoteClient<T> {
        &self.remote
    }

    /// Export the current save locally and, optionally, to the remote backend
    ///
    /// The blob is written under the game identifier and the type tag under
    /// `TYPE_<game>`. These two writes are independent and are not rolled back
    /// if the remote step fails.
    ///
    /// # Arguments
    /// * `use_cloud` - Also create a remote object when cloud saves are enabled
    ///
    /// # Returns
    /// The new remote identifier, or `None` when nothing was sent remotely
    ///
    /// # Errors
    /// * `SyncError::LocalAdapter` - A local write failed (remote step skipped)
    /// * `SyncError::Remote` - The remote create failed
    pub async fn export_save(&self, use_cloud: bool) -> Result<Option<RemoteId>> {
        let result = self.export_inner(use_cloud).await;
        if let Err(e) = &result {
            error!(error = %e, use_cloud, "Save export failed");
        }
        result
    }

    async fn export_inner(&self, use_cloud: bool) -> Result<Option<RemoteId>> {
        let Some(store) = self.local.as_ref() else {
            debug!("No local save store registered, skipping export");
            return Ok(None);
        };
        if !self.status.is_running() {
            debug!(lifecycle = ?self.status.lifecycle(), "Not running, skipping export");
            return Ok(None);
        }

        let game = self.core.game_name();
        if game.is_empty() {
            debug!("No content loaded, skipping export");
            return Ok(None);
        }
        let (Some(data), Some(save_type)) = (self.core.export_save(), self.core.export_save_type())
        else {
            debug!(game = %game, "Execution core has no save to export");
            return Ok(None);
        };

        store.save(&game, &data).await?;
        store.save(&save_type_key(&game), &[save_type]).await?;
        info!(game = %game, size = data.len(), save_type, "Exported save to local store");

        #[cfg(feature = "metrics")]
        SyncMetrics::global().record_save_size(data.len());

        if !use_cloud || !self.config.enabled {
            return Ok(None);
        }
        let Some(token) = self.config.remote_token() else {
            warn!(game = %game, "Cloud saves not configured: no auth token set");
            return Ok(None);
        };

        let record = RemoteSaveRecord::new(game, data, save_type);
        let remote_id = self.remote.create(&record, token).await?;
        Ok(Some(remote_id))
    }

    /// Import a save from the remote backend or the local store
    ///
    /// With a non-empty `remote_id` and cloud saves enabled the save is
    /// fetched remotely; otherwise it is read from the local store. The
    /// settled flag is cleared for the duration of the call and set again
    /// before the result is returned, whatever the outcome.
    ///
    /// # Returns
    /// `true` when a save was handed to the execution core
    ///
    /// # Errors
    /// * `SyncError::LocalAdapter` - The local store failed to read
    /// * `SyncError::Remote` - The remote fetch failed or returned bad data
    pub async fn import_save(&self, remote_id: Option<&str>) -> Result<bool> {
        let _settled = self.status.begin_import();

        if !self.status.is_running() {
            debug!(lifecycle = ?self.status.lifecycle(), "Not running, skipping import");
            return Ok(false);
        }

        let result = match remote_id.and_then(RemoteId::new) {
            Some(id) if self.config.enabled => self.import_remote(&id).await,
            _ => self.import_local().await,
        };
        if let Err(e) = &result {
            error!(error = %e, "Save import failed");
        }
        result
    }

    async fn import_remote(&self, remote_id: &RemoteId) -> Result<bool> {
        let Some(token) = self.config.remote_token() else {
            warn!(remote_id = %remote_id, "Cloud saves not configured: no auth token set");
            return Ok(false);
        };

        let record = self.remote.fetch(remote_id, token).await?;
        if !self.status.is_running() {
            warn!(remote_id = %remote_id, "Stopped running while fetching, discarding remote save");
            return Ok(false);
        }

        let game = self.core.game_name();
        if record.game != game {
            warn!(
                remote_id = %remote_id,
                remote_game = %record.game,
                loaded_game = %game,
                "Remote save belongs to different content"
            );
        }

        info!(
            remote_id = %remote_id,
            game = %record.game,
            size = record.data.len(),
            save_type = record.save_type,
            "Importing remote save"
        );
        self.core.import_save(record.data, record.save_type);
        Ok(true)
    }

    async fn import_local(&self) -> Result<bool> {
        let Some(store) = self.local.as_ref() else {
            debug!("No local save store registered, skipping import");
            return Ok(false);
        };
        let game = self.core.game_name();
        if game.is_empty() {
            debug!("No content loaded, skipping import");
            return Ok(false);
        }

        let Some(save) = store.load(&game).await? else {
            debug!(game = %game, "No local save stored");
            return Ok(false);
        };
        let Some(save_type) = store.load(&save_type_key(&game)).await? else {
            debug!(game = %game, "No local save type stored");
            return Ok(false);
        };

        if !self.status.is_running() {
            warn!(game = %game, "Stopped running while loading, discarding local save");
            return Ok(false);
        }
        if save.is_empty() {
            debug!(game = %game, "Local save is empty");
            return Ok(false);
        }

        let data = normalize_save_bytes(&save);
        let save_type = decode_save_type(&save_type);
        info!(game = %game, size = data.len(), save_type, "Importing local save");
        self.core.import_save(data, save_type);
        Ok(true)
    }
}

/// Convenience function to create a coordinator talking to the public gist API
///
/// Cloud configuration is read from the environment (see
/// [`CloudConfig::from_env`]); no local store is registered.
#[cfg(feature = "reqwest-transport")]
pub fn create_default_coordinator<C: SaveCore>(
    core: C,
    status: Arc<StatusRegister>,
) -> Result<SaveCoordinator<C, crate::remote::ReqwestTransport>> {
    let transport = crate::remote::ReqwestTransport::new()?;
    Ok(SaveCoordinator::new(
        core,
        status,
        RemoteClient::new(transport),
        CloudConfig::from_env(),
    ))
}
