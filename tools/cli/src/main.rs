//! chunksync CLI - command line interface for chunk store sync.
//!
//! Keeps a directory-backed chunk store on this machine and reconciles it
//! with the remote configured in a JSON config file.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use chunksync_storage::{create_default_registry, RemoteTransport, TransportConfig};
use chunksync_sync::chunk::{chunk_id_from_object, object_name};
use chunksync_sync::{
    ConflictStrategy, DeviceIdentity, FileChunkStore, SyncConfig, SyncDirection, SyncEvent,
    SyncOrchestrator, SyncResult, SyncState,
};

#[derive(Parser)]
#[command(name = "chunksync")]
#[command(about = "chunksync - bidirectional chunk store sync")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Sync configuration file.
    #[arg(short, long, global = true, default_value = "chunksync.json")]
    config: PathBuf,

    /// Directory holding the local chunk store and sync state.
    #[arg(short, long, global = true, default_value = ".chunksync")]
    data_dir: PathBuf,

    /// Device id file (default: platform data directory).
    #[arg(long, global = true)]
    device_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a new configuration file.
    Init {
        /// Transport provider: "webdav", "local" or "memory".
        #[arg(short, long, default_value = "webdav")]
        provider: String,

        /// WebDAV endpoint URL.
        #[arg(short, long)]
        url: Option<String>,

        /// Base directory for the local provider.
        #[arg(short, long)]
        root: Option<String>,

        /// Basic-auth user name.
        #[arg(long)]
        username: Option<String>,

        /// Basic-auth password.
        #[arg(long)]
        password: Option<String>,

        /// Remote folder holding the chunk objects.
        #[arg(long)]
        sync_path: Option<String>,

        /// Sync direction: "bidirectional", "upload-only" or "download-only".
        #[arg(long, default_value = "bidirectional")]
        direction: String,

        /// Conflict strategy: "local", "remote", "manual" or "timestamp".
        #[arg(long, default_value = "timestamp")]
        strategy: String,

        /// Overwrite an existing configuration file.
        #[arg(long)]
        force: bool,
    },

    /// Save a chunk to the local store.
    Put {
        /// Chunk id.
        id: String,

        /// Payload as JSON.
        json: String,

        /// Payload type tag.
        #[arg(short = 't', long = "type", default_value = "json")]
        data_type: String,
    },

    /// Print a chunk's payload.
    Get {
        /// Chunk id.
        id: String,
    },

    /// Delete a chunk (propagates on next sync).
    Rm {
        /// Chunk id.
        id: String,
    },

    /// List local chunks.
    Ls,

    /// Run one sync cycle.
    Sync,

    /// Sync periodically until interrupted.
    Watch {
        /// Override the configured interval, in seconds.
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Show the state of the last sync cycle.
    Status,

    /// Show this installation's device id.
    Device,

    /// List chunk objects on the remote.
    RemoteLs,

    /// Delete a chunk object from the remote.
    RemoteRm {
        /// Chunk id.
        id: String,
    },

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match &cli.command {
        Commands::Init {
            provider,
            url,
            root,
            username,
            password,
            sync_path,
            direction,
            strategy,
            force,
        } => {
            let mut transport = TransportConfig {
                provider: provider.clone(),
                url: url.clone().unwrap_or_default(),
                root: root.clone(),
                username: username.clone(),
                password: password.clone(),
                ..TransportConfig::default()
            };
            if let Some(sync_path) = sync_path {
                transport.sync_path = sync_path.clone();
            }
            let config = SyncConfig {
                direction: direction.parse::<SyncDirection>()?,
                conflict_resolution: strategy.parse::<ConflictStrategy>()?,
                ..SyncConfig::new(transport)
            };
            cmd_init(&cli.config, config, *force).await
        }

        Commands::Put { id, json, data_type } => cmd_put(&cli, id, json, data_type).await,

        Commands::Get { id } => cmd_get(&cli, id).await,

        Commands::Rm { id } => cmd_rm(&cli, id).await,

        Commands::Ls => cmd_ls(&cli).await,

        Commands::Sync => cmd_sync(&cli).await,

        Commands::Watch { interval } => cmd_watch(&cli, *interval).await,

        Commands::Status => cmd_status(&cli).await,

        Commands::Device => cmd_device(&cli).await,

        Commands::RemoteLs => cmd_remote_ls(&cli).await,

        Commands::RemoteRm { id } => cmd_remote_rm(&cli, id).await,

        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "chunksync", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn state_path(data_dir: &Path) -> PathBuf {
    data_dir.join("state.json")
}

async fn load_config(path: &Path) -> Result<SyncConfig> {
    SyncConfig::load(path)
        .await
        .with_context(|| format!("Failed to load config {} (run `chunksync init`)", path.display()))
}

async fn load_device(cli: &Cli) -> DeviceIdentity {
    match &cli.device_file {
        Some(path) => DeviceIdentity::load_or_create(path).await,
        None => DeviceIdentity::load_default().await,
    }
}

fn resolve_transport(config: &SyncConfig) -> Result<Arc<dyn RemoteTransport>> {
    create_default_registry()
        .resolve_config(&config.transport)
        .context("Failed to create transport")
}

/// Build an orchestrator over the local store and configured remote.
async fn open_orchestrator(cli: &Cli, config: SyncConfig) -> Result<SyncOrchestrator> {
    let store = FileChunkStore::open(cli.data_dir.join("chunks"))
        .await
        .context("Failed to open chunk store")?;
    let transport = resolve_transport(&config)?;
    let device = load_device(cli).await;

    let orchestrator = SyncOrchestrator::new(config, Arc::new(store), transport, device)
        .context("Failed to create sync orchestrator")?
        .with_state_file(state_path(&cli.data_dir))
        .await
        .context("Failed to load sync state")?;
    Ok(orchestrator)
}

/// Open against the config file, or defaults when there is none yet.
async fn open_local(cli: &Cli) -> Result<SyncOrchestrator> {
    let config = if tokio::fs::try_exists(&cli.config).await.unwrap_or(false) {
        load_config(&cli.config).await?
    } else {
        SyncConfig::default()
    };
    open_orchestrator(cli, config).await
}

fn print_result(result: &SyncResult) {
    println!("Sync {}", result.status);
    println!("  Uploaded:   {}", result.uploaded_chunks);
    println!("  Downloaded: {}", result.downloaded_chunks);
    println!("  Deleted:    {}", result.deleted_chunks);
    println!("  Skipped:    {}", result.skipped_chunks);
    if !result.conflicts.is_empty() {
        println!("  Conflicts:  {}", result.conflicts.join(", "));
    }
    if let Some(error) = &result.error {
        println!("  Error:      {}", error);
    }
    let elapsed = result.end_time - result.start_time;
    println!("  Duration:   {} ms", elapsed.num_milliseconds());
}

/// Write a configuration file.
async fn cmd_init(path: &Path, config: SyncConfig, force: bool) -> Result<()> {
    if !force && tokio::fs::try_exists(path).await.unwrap_or(false) {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    config.validate().context("Invalid configuration")?;
    config
        .save(path)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Configuration written to {}", path.display());
    println!("  Provider:  {}", config.transport.provider);
    println!("  Direction: {}", config.direction);
    println!("  Conflicts: {}", config.conflict_resolution);
    Ok(())
}

/// Save a chunk.
async fn cmd_put(cli: &Cli, id: &str, json: &str, data_type: &str) -> Result<()> {
    let payload: serde_json::Value =
        serde_json::from_str(json).context("Payload is not valid JSON")?;
    let orchestrator = open_local(cli).await?;

    let meta = orchestrator
        .save_chunk(id, &payload, data_type)
        .await
        .context("Failed to save chunk")?;

    println!("Saved {} v{} ({} bytes)", meta.id, meta.version, meta.size);
    Ok(())
}

/// Print a chunk.
async fn cmd_get(cli: &Cli, id: &str) -> Result<()> {
    let orchestrator = open_local(cli).await?;
    let chunk = orchestrator
        .get_chunk::<serde_json::Value>(id)
        .await
        .context("Failed to read chunk")?
        .with_context(|| format!("Chunk not found: {}", id))?;

    info!(
        "{} v{} ({}) by {}",
        chunk.meta.id, chunk.meta.version, chunk.meta.data_type, chunk.meta.device_id
    );
    println!("{}", serde_json::to_string_pretty(&chunk.data)?);
    Ok(())
}

/// Delete a chunk.
async fn cmd_rm(cli: &Cli, id: &str) -> Result<()> {
    let orchestrator = open_local(cli).await?;
    let tombstone = orchestrator
        .delete_chunk(id)
        .await
        .context("Failed to delete chunk")?;

    println!("Deleted {} (tombstone v{})", id, tombstone.version);
    Ok(())
}

/// List local chunks.
async fn cmd_ls(cli: &Cli) -> Result<()> {
    let orchestrator = open_local(cli).await?;
    let chunks = orchestrator.list_chunks().await?;

    if chunks.is_empty() {
        println!("No chunks.");
        return Ok(());
    }

    println!("{:<32} {:>7} {:>9}  {:<12} {}", "ID", "VERSION", "SIZE", "TYPE", "UPDATED");
    for meta in chunks {
        println!(
            "{:<32} {:>7} {:>9}  {:<12} {}",
            meta.id,
            meta.version,
            meta.size,
            meta.data_type,
            meta.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

/// Run one sync cycle.
async fn cmd_sync(cli: &Cli) -> Result<()> {
    let config = load_config(&cli.config).await?;
    let orchestrator = open_orchestrator(cli, config).await?;

    let result = orchestrator.sync().await.context("Sync did not start")?;
    print_result(&result);

    if !result.success {
        anyhow::bail!("Sync failed");
    }
    Ok(())
}

/// Sync periodically until Ctrl-C.
async fn cmd_watch(cli: &Cli, interval: Option<u64>) -> Result<()> {
    let mut config = load_config(&cli.config).await?;
    config.auto_sync = true;
    if let Some(secs) = interval {
        config.auto_sync_interval_secs = secs;
    }
    let period = config.auto_sync_interval_secs;
    let orchestrator = open_orchestrator(cli, config).await?;

    let _subscription = orchestrator.add_event_listener(|event| match event {
        SyncEvent::Conflict { id } => println!("Conflict on {}", id),
        SyncEvent::Error { error } => eprintln!("Sync error: {}", error),
        SyncEvent::Completed(result) => print_result(result),
        _ => {}
    });

    // Sync once up front, then on the timer
    let result = orchestrator.sync().await?;
    print_result(&result);

    orchestrator.start()?;
    println!("Watching; syncing every {}s. Press Ctrl-C to stop.", period);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    orchestrator.destroy();
    println!("Stopped.");
    Ok(())
}

/// Show the last sync state.
async fn cmd_status(cli: &Cli) -> Result<()> {
    let state = SyncState::load(state_path(&cli.data_dir))
        .await
        .context("Failed to load sync state")?;

    println!("Status: {}", state.status);
    match state.last_sync_time {
        Some(time) => println!("Last sync: {}", time.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("Last sync: never"),
    }
    if let Some(error) = &state.last_error {
        println!("Last error: {}", error);
    }
    println!("Pending uploads: {}", state.pending_uploads);
    println!("Pending downloads: {}", state.pending_downloads);
    if !state.conflicts.is_empty() {
        println!("Conflicts: {}", state.conflicts.join(", "));
    }
    Ok(())
}

/// Show the device id.
async fn cmd_device(cli: &Cli) -> Result<()> {
    let device = load_device(cli).await;
    println!("Device: {}", device.id());
    if !device.is_persistent() {
        println!("  (ephemeral: the id could not be persisted)");
    }
    Ok(())
}

/// List chunk objects on the remote.
async fn cmd_remote_ls(cli: &Cli) -> Result<()> {
    let config = load_config(&cli.config).await?;
    let transport = resolve_transport(&config)?;
    transport
        .check_connection()
        .await
        .context("Remote is unreachable")?;

    let objects = transport.list().await.context("Failed to list remote")?;
    let mut count = 0;
    for object in objects {
        let Some(id) = chunk_id_from_object(&object.name) else {
            continue;
        };
        let size = object.size.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string());
        let modified = object
            .modified
            .map(|m| m.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        println!("{:<32} {:>9}  {}", id, size, modified);
        count += 1;
    }
    println!("{} chunk objects on {}", count, transport.name());
    Ok(())
}

/// Delete a chunk object from the remote.
async fn cmd_remote_rm(cli: &Cli, id: &str) -> Result<()> {
    let config = load_config(&cli.config).await?;
    let transport = resolve_transport(&config)?;

    transport
        .delete(&object_name(id))
        .await
        .with_context(|| format!("Failed to delete remote chunk {}", id))?;

    println!("Removed remote object for {}", id);
    Ok(())
}
