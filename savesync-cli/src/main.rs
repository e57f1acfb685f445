/*!
SaveSync CLI - Command-line host for the SaveSync coordinator.

This CLI exports and imports a game's save file through the local save store
and, when a token is configured, a remote gist.
*/

use clap::{Parser, Subcommand};
use savesync_core::observability::init_observability_with_level;
use savesync_core::{
    remote::ReqwestTransport, CloudConfig, Lifecycle, LocalFileStore, RemoteClient, RemoteId,
    RemoteSaveRecord, SaveCoordinator, SaveCore, StatusRegister,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tabled::{Table, Tabled};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "savesync")]
#[command(about = "CLI for SaveSync save synchronization")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// Directory of the local save store
    #[arg(short, long, global = true, default_value = "./saves")]
    store_dir: PathBuf,

    /// Auth token for the remote backend
    #[arg(long, global = true, env = "SAVESYNC_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Alternate remote API endpoint
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a save file to the local store and optionally to the cloud
    Export {
        /// Game identifier the save belongs to
        #[arg(short, long)]
        game: String,
        /// Save file to export
        save_file: PathBuf,
        /// Save memory format tag
        #[arg(short = 't', long, default_value_t = 0)]
        save_type: u8,
        /// Also create a remote gist
        #[arg(short, long)]
        cloud: bool,
    },
    /// Import a save from the cloud or the local store into a save file
    Import {
        /// Game identifier the save belongs to
        #[arg(short, long)]
        game: String,
        /// Save file to write
        save_file: PathBuf,
        /// Remote gist identifier; the local store is used when omitted
        #[arg(short, long)]
        remote_id: Option<String>,
    },
    /// Show the save record stored in a remote gist
    Show {
        /// Remote gist identifier
        remote_id: String,
    },
}

#[derive(Tabled)]
struct RecordInfo {
    #[tabled(rename = "Game")]
    game: String,
    #[tabled(rename = "Type")]
    save_type: u8,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Created")]
    timestamp: String,
}

/// Execution core backed by a save file held in memory
struct FileCore {
    game: String,
    save: Mutex<Option<(Vec<u8>, u8)>>,
}

impl FileCore {
    fn empty(game: &str) -> Self {
        Self {
            game: game.to_string(),
            save: Mutex::new(None),
        }
    }

    fn with_save(game: &str, data: Vec<u8>, save_type: u8) -> Self {
        Self {
            game: game.to_string(),
            save: Mutex::new(Some((data, save_type))),
        }
    }

    fn take_save(&self) -> Option<(Vec<u8>, u8)> {
        self.lock().take()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<(Vec<u8>, u8)>> {
        self.save.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SaveCore for FileCore {
    fn game_name(&self) -> String {
        self.game.clone()
    }

    fn export_save(&self) -> Option<Vec<u8>> {
        self.lock().as_ref().map(|(data, _)| data.clone())
    }

    fn export_save_type(&self) -> Option<u8> {
        self.lock().as_ref().map(|(_, save_type)| *save_type)
    }

    fn import_save(&self, data: Vec<u8>, save_type: u8) {
        *self.lock() = Some((data, save_type));
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { "debug" } else { "info" };
    init_observability_with_level(cli.json, level)?;

    let config = create_cloud_config(CloudConfig::from_env(), cli.token.as_deref());

    match &cli.command {
        Commands::Export {
            game,
            save_file,
            save_type,
            cloud,
        } => export_save(&cli, config, game, save_file, *save_type, *cloud).await?,
        Commands::Import {
            game,
            save_file,
            remote_id,
        } => import_save(&cli, config, game, save_file, remote_id.as_deref()).await?,
        Commands::Show { remote_id } => show_record(&cli, &config, remote_id).await?,
    }

    Ok(())
}

/// Apply the `--token` override; an unusable token is dropped with a
/// warning so local operations keep working
fn create_cloud_config(mut config: CloudConfig, token: Option<&str>) -> CloudConfig {
    if let Some(token) = token {
        config.enabled = true;
        config.auth_token = token.to_string();
    }
    if let Err(e) = config.validate() {
        warn!("{}; cloud saves will be skipped", e);
        config.auth_token.clear();
    }
    config
}

fn create_remote_client(cli: &Cli) -> Result<RemoteClient<ReqwestTransport>, anyhow::Error> {
    let client = RemoteClient::new(ReqwestTransport::new()?);
    match &cli.api_url {
        Some(url) => Ok(client.with_base_url(url)?),
        None => Ok(client),
    }
}

fn create_coordinator(
    cli: &Cli,
    core: FileCore,
    config: CloudConfig,
) -> Result<SaveCoordinator<FileCore, ReqwestTransport>, anyhow::Error> {
    let status = Arc::new(StatusRegister::new());
    status.set_lifecycle(Lifecycle::Running);

    Ok(SaveCoordinator::new(core, status, create_remote_client(cli)?, config)
        .with_local_store(LocalFileStore::new(&cli.store_dir)))
}

async fn export_save(
    cli: &Cli,
    config: CloudConfig,
    game: &str,
    save_file: &Path,
    save_type: u8,
    cloud: bool,
) -> Result<(), anyhow::Error> {
    info!("Exporting save for {} from {}", game, save_file.display());

    let data = tokio::fs::read(save_file).await?;
    let size = data.len() as u64;
    let coordinator = create_coordinator(cli, FileCore::with_save(game, data, save_type), config)?;

    if cloud && !coordinator.cloud_config().is_ready() {
        warn!("No auth token configured, saving locally only");
    }

    match coordinator.export_save(cloud).await {
        Ok(Some(remote_id)) => {
            println!("✓ Save exported ({})", format_size(size));
            println!("  Remote ID: {remote_id}");
        }
        Ok(None) => {
            println!("✓ Save exported locally ({})", format_size(size));
        }
        Err(e) => {
            error!("Failed to export save: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}

async fn import_save(
    cli: &Cli,
    config: CloudConfig,
    game: &str,
    save_file: &Path,
    remote_id: Option<&str>,
) -> Result<(), anyhow::Error> {
    info!("Importing save for {} into {}", game, save_file.display());

    let coordinator = create_coordinator(cli, FileCore::empty(game), config)?;

    let imported = match coordinator.import_save(remote_id).await {
        Ok(imported) => imported,
        Err(e) => {
            error!("Failed to import save: {}", e);
            return Err(e.into());
        }
    };

    match coordinator.core().take_save() {
        Some((data, save_type)) if imported => {
            tokio::fs::write(save_file, &data).await?;
            println!("✓ Save imported ({})", format_size(data.len() as u64));
            println!("  Type: {save_type}");
        }
        _ => {
            println!("No save found for {game}");
        }
    }

    Ok(())
}

async fn show_record(
    cli: &Cli,
    config: &CloudConfig,
    remote_id: &str,
) -> Result<(), anyhow::Error> {
    info!("Showing remote save: {}", remote_id);

    let token = config
        .remote_token()
        .ok_or_else(|| anyhow::anyhow!("An auth token is required (--token or SAVESYNC_TOKEN)"))?;
    let id = RemoteId::new(remote_id).ok_or_else(|| anyhow::anyhow!("Remote ID is empty"))?;

    let record = create_remote_client(cli)?.fetch(&id, token).await?;
    println!("{}", Table::new([record_info(&record)]));

    Ok(())
}

fn record_info(record: &RemoteSaveRecord) -> RecordInfo {
    RecordInfo {
        game: record.game.clone(),
        save_type: record.save_type,
        size: format_size(record.data.len() as u64),
        timestamp: format_timestamp(record),
    }
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

fn format_timestamp(record: &RemoteSaveRecord) -> String {
    record
        .timestamp
        .with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
