//! msi-handler - Maritime Safety Information handler
//!
//! Runs the MSI coordinator against a JSON feed file, taking own-ship fixes
//! and operator commands from stdin.
//!
//! # Usage
//!
//! ```bash
//! # Poll feed.json, persist to the configured store, read fixes from a GPS bridge
//! gps-bridge | msi-handler run --feed feed.json --routes routes.json
//!
//! # Print the persisted store
//! msi-handler inspect --visible-only
//! ```
//!
//! # Environment Variables
//!
//! - `MSI_CONFIG`: path to the settings TOML (default: ./msi_config.toml)
//! - `RUST_LOG`: logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use msi_handler::config::watcher::{run_settings_watcher, SettingsEvent};
use msi_handler::config::{self, defaults, MsiSettings};
use msi_handler::console::ConsoleCommand;
use msi_handler::{
    FileShoreClient, InMemoryRoutes, MessageStore, MessageView, MsiHandler, Route, SystemClock,
};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "msi-handler")]
#[command(about = "Maritime Safety Information store and handler")]
#[command(version)]
struct CliArgs {
    /// Settings file (TOML). Watched for changes while running.
    #[arg(long, env = "MSI_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Run the handler: poll the feed, read fixes and commands from stdin
    Run {
        /// JSON array of safety messages served as the shore feed
        #[arg(long)]
        feed: PathBuf,
        /// Store file (overrides storage.path in the settings)
        #[arg(long)]
        store: Option<PathBuf>,
        /// JSON array of routes known to the route manager
        #[arg(long)]
        routes: Option<PathBuf>,
    },
    /// Print the persisted store. Read-only: a damaged file is reported, not removed
    Inspect {
        /// Store file (overrides storage.path in the settings)
        #[arg(long)]
        store: Option<PathBuf>,
        /// Only messages currently visible
        #[arg(long)]
        visible_only: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let settings = load_settings(args.config.as_deref())?;

    match args.command {
        SubCommand::Run { feed, store, routes } => {
            run(settings, args.config, feed, store, routes).await
        }
        SubCommand::Inspect {
            store,
            visible_only,
        } => inspect(settings, store, visible_only),
    }
}

fn load_settings(path: Option<&Path>) -> Result<MsiSettings> {
    match path {
        Some(p) => MsiSettings::load_from_file(p)
            .with_context(|| format!("Failed to load settings from {}", p.display())),
        None => Ok(MsiSettings::load()),
    }
}

fn load_routes(path: Option<&Path>) -> Result<Vec<Route>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read routes from {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("Invalid routes file {}", path.display()))
}

// ============================================================================
// run
// ============================================================================

async fn run(
    settings: MsiSettings,
    config_path: Option<PathBuf>,
    feed: PathBuf,
    store_path: Option<PathBuf>,
    routes_path: Option<PathBuf>,
) -> Result<()> {
    let store_path = store_path.unwrap_or_else(|| settings.storage.path.clone());
    let routes = Arc::new(InMemoryRoutes::new(load_routes(routes_path.as_deref())?));
    let shared = config::shared(settings);
    let clock = Arc::new(SystemClock);

    let store = Arc::new(MessageStore::load(&store_path, shared.clone(), clock.clone()));
    let handler = Arc::new(MsiHandler::new(
        store,
        Arc::new(FileShoreClient::new(&feed)),
        routes.clone(),
        shared,
        clock,
    ));

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  MSI Handler");
    info!("  feed: {}", feed.display());
    info!("  store: {}", store_path.display());
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // Weak reference so the listener does not keep the handler alive
    let weak: Weak<MsiHandler> = Arc::downgrade(&handler);
    handler.add_listener(move || {
        if let Some(h) = weak.upgrade() {
            info!(
                messages = h.store().len(),
                unacknowledged = h.unacknowledged_count(),
                alert = h.has_unacknowledged_relevant(),
                "MSI list changed"
            );
        }
    });

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, shutting down");
        shutdown.cancel();
    });

    let worker = handler.spawn(cancel.clone());

    let watched = config_path.unwrap_or_else(|| PathBuf::from(defaults::CONFIG_FILE_NAME));
    if watched.exists() {
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(run_settings_watcher(watched, tx));
        tokio::spawn(apply_settings_events(Arc::clone(&handler), rx));
    }

    read_console(&handler, &routes, &cancel).await;

    cancel.cancel();
    if let Err(e) = worker.await {
        warn!(error = %e, "MSI handler task ended abnormally");
    }
    handler
        .store()
        .persist()
        .context("Failed to persist MSI store on shutdown")?;

    info!("MSI handler shutdown complete");
    Ok(())
}

async fn apply_settings_events(handler: Arc<MsiHandler>, mut rx: mpsc::Receiver<SettingsEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            SettingsEvent::Reloaded(settings) => {
                handler.update_settings(*settings);
            }
            SettingsEvent::Error(e) => warn!(error = %e, "Ignoring invalid settings file"),
        }
    }
}

/// Read stdin until EOF or cancellation.
async fn read_console(handler: &MsiHandler, routes: &InMemoryRoutes, cancel: &CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            () = cancel.cancelled() => return,
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("stdin closed — waiting for Ctrl+C");
                cancel.cancelled().await;
                return;
            }
            Err(e) => {
                warn!(error = %e, "stdin read failed");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<ConsoleCommand>() {
            Ok(cmd) => execute(handler, routes, cmd).await,
            Err(e) => warn!(input = %line.trim(), error = %e, "Unrecognized command"),
        }
    }
}

async fn execute(handler: &MsiHandler, routes: &InMemoryRoutes, cmd: ConsoleCommand) {
    match cmd {
        ConsoleCommand::Position(pos) => {
            handler.on_position(pos);
        }
        ConsoleCommand::Acknowledge(id) => {
            if !handler.acknowledge(id) {
                warn!(id, "Nothing to acknowledge");
            }
        }
        ConsoleCommand::Delete(id) => {
            if !handler.delete(id) {
                warn!(id, "No such message");
            }
        }
        ConsoleCommand::Activate(id) => match routes.activate(id) {
            Some(event) => {
                handler.on_route_event(event);
            }
            None => warn!(route = id, "Unknown route"),
        },
        ConsoleCommand::Deactivate => {
            handler.on_route_event(routes.deactivate());
        }
        ConsoleCommand::ShowRoute(id) | ConsoleCommand::HideRoute(id) => {
            let visible = matches!(cmd, ConsoleCommand::ShowRoute(_));
            match routes.set_visible(id, visible) {
                Some(event) => {
                    handler.on_route_event(event);
                }
                None => warn!(route = id, "Unknown route"),
            }
        }
        ConsoleCommand::Poll => {
            handler.poll_now().await;
        }
        ConsoleCommand::List => print_views(&handler.visible_snapshot()),
        ConsoleCommand::Status => {
            let status = handler.link_status();
            println!(
                "link: {} | last update: {} | failures: {}",
                status.health,
                status
                    .last_success
                    .map_or_else(|| "never".to_string(), |t| t.to_rfc3339()),
                status.consecutive_failures
            );
        }
    }
}

// ============================================================================
// inspect
// ============================================================================

fn inspect(settings: MsiSettings, store_path: Option<PathBuf>, visible_only: bool) -> Result<()> {
    let path = store_path.unwrap_or_else(|| settings.storage.path.clone());
    let store = MessageStore::open(&path, config::shared(settings), Arc::new(SystemClock))
        .with_context(|| format!("Cannot read MSI store {}", path.display()))?;

    let views = if visible_only {
        store.visible_snapshot()
    } else {
        store.snapshot()
    };
    println!(
        "{} message(s), last sequence {}, unacknowledged relevant: {}",
        views.len(),
        store.last_sequence(),
        store.unacknowledged_count()
    );
    print_views(&views);
    Ok(())
}

fn print_views(views: &[MessageView]) {
    for v in views {
        println!(
            "{:>6}  {:<9}  {}{}{}{}  {}",
            v.message.id,
            v.message.priority.to_string(),
            if v.acknowledged { 'A' } else { '-' },
            if v.visible_by_position { 'P' } else { '-' },
            if v.visible_by_route { 'R' } else { '-' },
            if v.relevant_to_active_route { '*' } else { '-' },
            v.message.title.as_deref().unwrap_or(&v.message.content),
        );
    }
}
