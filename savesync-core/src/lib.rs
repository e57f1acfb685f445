/*!
# SaveSync Core

Save synchronization coordinator for an emulator host.

This crate moves the save memory of a running game between the execution
core, a local key-value store, and a remote snippet-storage service:

- Export writes the save blob and its type tag locally, then optionally
  creates a remote object holding a JSON save record
- Import restores a save from the remote object or the local store and
  hands it to the execution core
- A shared status register gates every operation on the host lifecycle
  and reports when an import attempt has settled

## Architecture

The coordinator sits between three ports:
- [`SaveCore`] is implemented by the execution core
- [`LocalSaveStore`] is implemented by the host's persistent store
  ([`LocalFileStore`], [`MemoryStore`], or a callback-style handler wrapped
  in [`local::CallbackStore`])
- [`remote::HttpTransport`] sends requests built by [`RemoteClient`]

## Usage

```rust,no_run
use std::sync::Arc;
use savesync_core::{create_default_coordinator, LocalFileStore, SaveCore, StatusRegister};

# struct Core;
# impl SaveCore for Core {
#     fn game_name(&self) -> String { String::new() }
#     fn export_save(&self) -> Option<Vec<u8>> { None }
#     fn export_save_type(&self) -> Option<u8> { None }
#     fn import_save(&self, _data: Vec<u8>, _save_type: u8) {}
# }
# async fn run() -> savesync_core::Result<()> {
let status = Arc::new(StatusRegister::new());
let coordinator = create_default_coordinator(Core, Arc::clone(&status))?
    .with_local_store(LocalFileStore::new("./saves"));

// Save locally and to the cloud when configured
let remote_id = coordinator.export_save(true).await?;

// Restore from the remote object, falling back to the local store
let imported = coordinator
    .import_save(remote_id.as_ref().map(|id| id.as_str()))
    .await?;
# let _ = imported;
# Ok(())
# }
```
*/

pub mod config;
pub mod coordinator;
pub mod error;
pub mod local;
pub mod observability;
pub mod record;
pub mod remote;
pub mod status;


pub use config::CloudConfig;
#[cfg(feature = "reqwest-transport")]
pub use coordinator::create_default_coordinator;
pub use coordinator::{decode_save_type, normalize_save_bytes, SaveCoordinator, SaveCore};
pub use error::{RemoteError, Result, SyncError};
pub use local::{LocalFileStore, LocalSaveStore, MemoryStore};
pub use record::{save_type_key, RemoteId, RemoteSaveRecord};
pub use remote::{HttpTransport, MemoryTransport, RemoteClient};
pub use status::{Lifecycle, StatusRegister};
