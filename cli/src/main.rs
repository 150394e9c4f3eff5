// bluechat: proximity chat demo and local data maintenance
//
// Drives the in-process mesh simulator and manages what this device keeps
// on disk.

mod config;
mod history;

use anyhow::{bail, Context, Result};
use bluechat_core::mesh::simulator::DEMO_ROSTER;
use bluechat_core::store::{node_namespace, DEFAULT_NAMESPACE};
use bluechat_core::types::now_millis;
use bluechat_core::validation::validate_username;
use bluechat_core::{LocalStore, Mesh, SledStorage, StorageBackend, StorageInfo, User};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser)]
#[command(name = "bluechat")]
#[command(about = "BlueChat: serverless proximity chat", long_about = None)]
#[command(version)]
struct Cli {
    /// Write daily rolling logs to this directory instead of stderr
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the identity of this device
    Init {
        #[arg(short, long)]
        username: String,
    },
    /// Show the stored identity
    Identity,
    /// Run a simulated mesh with demo peers
    Demo {
        /// How long to stay in the room
        #[arg(short, long, default_value = "30")]
        seconds: u64,
        /// Name of the room to host
        #[arg(short, long)]
        room: Option<String>,
        /// Join a demo peer's room instead of hosting one
        #[arg(short, long)]
        join: bool,
    },
    /// Print the local history of a room
    History { room_id: String },
    /// Show local storage usage
    Storage,
    /// Apply the retention policy to local data
    Prune,
    /// Erase everything this device stored
    Wipe,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::load()?;

    let log_dir = cli
        .log_dir
        .clone()
        .or_else(|| config.log_dir.as_ref().map(PathBuf::from));
    let _guard = init_logging(log_dir);
    info!("bluechat {} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Init { username } => cmd_init(config, username),
        Commands::Identity => cmd_identity(&config),
        Commands::Demo {
            seconds,
            room,
            join,
        } => cmd_demo(&config, seconds, room, join).await,
        Commands::History { room_id } => cmd_history(&config, &room_id),
        Commands::Storage => cmd_storage(&config),
        Commands::Prune => cmd_prune(&config),
        Commands::Wipe => cmd_wipe(&config),
    }
}

fn init_logging(log_dir: Option<PathBuf>) -> Option<WorkerGuard> {
    let Some(dir) = log_dir else {
        bluechat_core::init_tracing("warn");
        return None;
    };

    let appender = tracing_appender::rolling::daily(dir, "bluechat.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = tracing_subscriber::fmt()
        .with_env_filter(bluechat_core::env_filter("info"))
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
    Some(guard)
}

fn open_backend(config: &config::Config) -> Result<Arc<dyn StorageBackend>> {
    let path = config.storage_dir()?;
    let backend = SledStorage::open(&path)
        .with_context(|| format!("Failed to open storage at {}", path.display()))?;
    Ok(Arc::new(backend))
}

fn device_store(backend: &Arc<dyn StorageBackend>) -> LocalStore {
    LocalStore::new(backend.clone(), DEFAULT_NAMESPACE)
}

fn require_identity(store: &LocalStore) -> Result<User> {
    match store.load_identity() {
        Some(user) => Ok(user),
        None => bail!(
            "No identity found. Run {} first",
            "bluechat init --username <name>".bright_green()
        ),
    }
}

/// The device store plus the mesh store of the user and of every demo peer
fn all_stores(backend: &Arc<dyn StorageBackend>, user: Option<&User>) -> Vec<LocalStore> {
    let mut stores = vec![device_store(backend)];
    if let Some(user) = user {
        stores.push(LocalStore::new(backend.clone(), node_namespace(&user.id)));
    }
    for (id, _) in DEMO_ROSTER {
        stores.push(LocalStore::new(backend.clone(), node_namespace(id)));
    }
    stores
}

fn cmd_init(mut config: config::Config, username: String) -> Result<()> {
    if let Err(reason) = validate_username(&username) {
        bail!("Invalid username: {}", reason);
    }

    println!("{}", "Initializing BlueChat...".bold());
    println!();

    let backend = open_backend(&config)?;
    let store = device_store(&backend);

    let user = User::new(username.clone());
    store.save_identity(Some(&user));
    let mut settings = store.load_app_settings();
    settings.username = Some(username.clone());
    settings.last_active = Some(now_millis());
    store.save_app_settings(&settings);
    store.flush();
    info!("Identity created: {} ({})", user.username, user.id);
    println!("  {} Identity created", "✓".green());

    config.username = Some(username);
    config.save()?;
    println!("  {} Configuration", "✓".green());
    println!();

    println!("{}", "Identity Information:".bold());
    println!("  ID:       {}", user.id.bright_cyan());
    println!("  Username: {}", user.username.bright_yellow());
    println!();
    println!("{}", "Next steps:".bold());
    println!("  • Try the mesh: {}", "bluechat demo".bright_green());

    Ok(())
}

fn cmd_identity(config: &config::Config) -> Result<()> {
    let backend = open_backend(config)?;
    let user = require_identity(&device_store(&backend))?;

    println!("{}", "Identity Information".bold());
    println!("  ID:         {}", user.id.bright_cyan());
    println!("  Username:   {}", user.username.bright_yellow());
    println!("  Created:    {}", history::formatted_time(user.created_at));
    println!("  Last seen:  {}", history::formatted_time(user.last_seen));
    if let Some(room_id) = &user.current_room_id {
        println!("  Last room:  {}", room_id.bright_blue());
    }
    Ok(())
}

async fn cmd_demo(
    config: &config::Config,
    seconds: u64,
    room_name: Option<String>,
    join: bool,
) -> Result<()> {
    let backend = open_backend(config)?;
    let device = device_store(&backend);
    let user = require_identity(&device)?;

    let mesh = Mesh::new(config.mesh.clone(), backend.clone()).context("Invalid mesh settings")?;
    mesh.start_simulation();
    let client = mesh.initialize_node(user.clone());

    println!("{}", "Scanning for nearby devices...".bold());
    let nearby = device.clone();
    client.start_discovery(move |report| {
        println!("{}", history::render_report(&report));
        nearby.upsert_nearby(report);
    });

    let room = if join {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(seconds);
        loop {
            if let Some(room) = client.list_available_rooms().into_iter().find(|r| !r.is_full()) {
                break client.join_room(&room.id).context("Failed to join room")?;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!("No joinable room appeared within {}s", seconds);
                mesh.cleanup();
                bail!("No rooms showed up within {}s", seconds);
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    } else {
        let name = room_name.unwrap_or_else(|| format!("{} Room", user.username));
        client.create_room(&name).context("Failed to create room")?
    };

    println!();
    println!(
        "{} {} ({}), {} member(s)",
        "Joined".bold(),
        room.name.bright_yellow(),
        room.id.bright_blue(),
        room.member_count
    );
    println!();

    let mut inbox = client.subscribe(&room.id)?;
    let hello = client
        .send_message(&room.id, &format!("Hello from {}!", user.username))
        .await
        .context("Failed to send message")?;
    println!("{}", history::render_message(&hello, &user.id));

    let until = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(until);
    loop {
        tokio::select! {
            _ = &mut until => break,
            received = inbox.recv() => match received {
                Some(message) => println!("{}", history::render_message(&message, &user.id)),
                None => break,
            },
        }
    }

    client.stop_discovery();
    mesh.cleanup();
    client.store().flush();
    info!("Demo finished in room {}", room.id);

    println!();
    println!(
        "Left the mesh. Room history: {}",
        format!("bluechat history {}", room.id).bright_green()
    );
    Ok(())
}

fn cmd_history(config: &config::Config, room_id: &str) -> Result<()> {
    let backend = open_backend(config)?;
    let user = require_identity(&device_store(&backend))?;
    let store = LocalStore::new(backend, node_namespace(&user.id));

    let messages = store.load_room_messages(room_id);
    if messages.is_empty() {
        println!("{}", "No messages stored for this room".dimmed());
        return Ok(());
    }

    println!("{} {}", "History of".bold(), room_id.bright_blue());
    for message in &messages {
        println!("{}", history::render_message(message, &user.id));
    }
    println!();
    println!("{} message(s)", messages.len());
    Ok(())
}

fn cmd_storage(config: &config::Config) -> Result<()> {
    let backend = open_backend(config)?;
    let user = device_store(&backend).load_identity();

    let total = all_stores(&backend, user.as_ref())
        .iter()
        .map(LocalStore::storage_info)
        .fold(StorageInfo::default(), |acc, info| StorageInfo {
            total_size: acc.total_size + info.total_size,
            message_count: acc.message_count + info.message_count,
            room_count: acc.room_count + info.room_count,
        });

    println!("{}", "Local Storage".bold());
    println!("  Location: {}", config.storage_dir()?.display().to_string().bright_cyan());
    println!("  Size:     {} bytes", total.total_size);
    println!("  Rooms:    {}", total.room_count);
    println!("  Messages: {}", total.message_count);
    Ok(())
}

fn cmd_prune(config: &config::Config) -> Result<()> {
    let backend = open_backend(config)?;
    let user = device_store(&backend).load_identity();
    let policy = config.mesh.retention;

    let (mut sightings, mut messages) = (0, 0);
    for store in all_stores(&backend, user.as_ref()) {
        let report = store.prune_expired(policy);
        sightings += report.nearby_removed;
        messages += report.messages_removed;
        store.flush();
    }
    info!("Pruned {} sighting(s) and {} message(s)", sightings, messages);

    println!(
        "  {} Pruned {} sighting(s) older than {}h and {} message(s) beyond {} per room",
        "✓".green(),
        sightings,
        policy.max_age_hours,
        messages,
        policy.max_messages_per_room
    );
    Ok(())
}

fn cmd_wipe(config: &config::Config) -> Result<()> {
    let backend = open_backend(config)?;
    let user = device_store(&backend).load_identity();

    for store in all_stores(&backend, user.as_ref()) {
        store.clear_all();
    }
    info!("Local data wiped");

    println!("  {} Local data erased", "✓".green());
    Ok(())
}
