#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for managing ticket case folders over IMAP

use anyhow::{Context, bail};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use ticket_folder_sync::{
    Action, CancellationToken, Dispatcher, DisplayedFolder, FileStore, Folder, FolderResolver,
    ImapConfig, ImapProvider, Response, SETTINGS_KEY, Settings, SettingsStore, SyncScheduler,
    TicketSync, call_timeout_from_env, settings_path_from_env,
};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, reload};

const SETTINGS_FIELDS: &[&str] = &[
    "ticketURL",
    "openedFolder",
    "closedFolder",
    "syncFolders",
    "openFoldersAutoSync",
    "autoSyncTime",
    "debugMode",
];

type FilterHandle = reload::Handle<EnvFilter, Registry>;

#[derive(Parser)]
#[command(name = "ticket-sync")]
#[command(about = "Keep ticket case folders in sync with incoming mail")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Settings file (default: $TICKETS_SETTINGS or tickets-settings.json)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Check whether a folder path resolves
    Check {
        /// Folder path, full or as a suffix (e.g. "Tickets/Open")
        path: String,
    },

    /// Create a folder path, segment by segment, in the default account
    Create { path: String },

    /// Move mail for one case folder's ticket into it
    Sync {
        /// The case folder to sync
        #[arg(long)]
        folder: String,
    },

    /// Sync every case folder under the opened and closed roots
    SyncAll,

    /// Move a case folder from the opened to the closed root
    Archive {
        #[arg(long)]
        folder: String,
    },

    /// Move a case folder from the closed back to the opened root
    Restore {
        #[arg(long)]
        folder: String,
    },

    /// Print the ticket ID found in a message subject
    CaseId { subject: String },

    /// Print the ticket URL for a message subject
    TicketUrl { subject: String },

    /// Handle a raw JSON action request
    Request {
        /// e.g. '{"action": "checkFolderExists", "folderPath": "INBOX"}'
        json: String,
    },

    /// Run the periodic auto-sync until interrupted
    Watch,

    /// Show or change the ticket settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
}

#[derive(Subcommand)]
enum SettingsCommand {
    /// Print the stored settings
    Show,

    /// Set one field
    Set {
        /// One of: ticketURL, openedFolder, closedFolder, syncFolders,
        /// openFoldersAutoSync, autoSyncTime, debugMode
        key: String,
        value: String,
    },

    /// Remove all settings
    Reset,
}

/// The folder named on the command line, resolved when asked for.
struct NamedFolder {
    path: Option<String>,
    provider: Arc<ImapProvider>,
}

#[async_trait]
impl DisplayedFolder for NamedFolder {
    async fn displayed_folder(&self) -> ticket_folder_sync::Result<Option<Folder>> {
        match &self.path {
            Some(path) => Ok(FolderResolver::new(self.provider.as_ref())
                .resolve(path)
                .await),
            None => Ok(None),
        }
    }
}

fn log_filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let args = Args::parse();
    let settings_path = args.settings.clone().unwrap_or_else(settings_path_from_env);
    let store = Arc::new(
        FileStore::open(&settings_path)
            .with_context(|| format!("opening {}", settings_path.display()))?,
    );

    let debug = Settings::load(store.as_ref()).is_ok_and(|s| s.debug_mode);
    let (filter, filter_handle) = reload::Layer::new(log_filter(debug));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let (action, folder) = match &args.command {
        Command::Settings { command } => {
            return cmd_settings(store.as_ref(), &args, command).await;
        }
        Command::Watch => return cmd_watch(store, filter_handle).await,
        Command::Check { path } => (
            Action::CheckFolderExists {
                folder_path: path.clone(),
            },
            None,
        ),
        Command::Create { path } => (
            Action::CreateCaseFolder {
                folder_path: path.clone(),
            },
            None,
        ),
        Command::Sync { folder } => (Action::SyncFolderMails, Some(folder.clone())),
        Command::SyncAll => (Action::SyncAllFolders, None),
        Command::Archive { folder } => (Action::CloseCaseFolder, Some(folder.clone())),
        Command::Restore { folder } => (Action::RestoreArchivedFolder, Some(folder.clone())),
        Command::CaseId { subject } => (
            Action::GetCaseId {
                subject: subject.clone(),
            },
            None,
        ),
        Command::TicketUrl { subject } => (
            Action::OpenTicketUrl {
                subject: subject.clone(),
            },
            None,
        ),
        Command::Request { json } => (
            serde_json::from_str(json).context("parsing action request")?,
            None,
        ),
    };

    let dispatcher = dispatcher(store, folder)?;
    let response = dispatcher.dispatch(action.clone()).await;
    print_response(&args, &action, &response)?;

    if !response.success {
        bail!(response.error.unwrap_or_else(|| "request failed".into()));
    }
    Ok(())
}

fn scheduler(
    store: Arc<FileStore>,
    folder: Option<String>,
) -> anyhow::Result<Arc<SyncScheduler>> {
    let provider = Arc::new(ImapProvider::new(ImapConfig::from_env()?));
    let displayed = Arc::new(NamedFolder {
        path: folder,
        provider: Arc::clone(&provider),
    });
    let sync = TicketSync::new(provider, displayed, store)
        .with_call_timeout(call_timeout_from_env()?);
    Ok(Arc::new(SyncScheduler::new(Arc::new(sync))))
}

fn dispatcher(store: Arc<FileStore>, folder: Option<String>) -> anyhow::Result<Dispatcher> {
    Ok(Dispatcher::new(scheduler(store, folder)?))
}

async fn cmd_watch(store: Arc<FileStore>, filter: FilterHandle) -> anyhow::Result<()> {
    let scheduler = scheduler(Arc::clone(&store), None)?;
    let shutdown = CancellationToken::new();

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, stopping.");
            }
            shutdown.cancel();
        }
    });

    #[cfg(unix)]
    tokio::spawn({
        let store = Arc::clone(&store);
        async move {
            use tokio::signal::unix::{SignalKind, signal};
            let Ok(mut hangups) = signal(SignalKind::hangup()) else {
                warn!("Cannot listen for SIGHUP; settings reload disabled.");
                return;
            };
            while hangups.recv().await.is_some() {
                if let Err(e) = store.reload() {
                    warn!("Settings reload failed: {e}");
                }
            }
        }
    });

    tokio::spawn({
        let mut changes = store.subscribe(SETTINGS_KEY);
        let store = Arc::clone(&store);
        async move {
            while changes.changed().await.is_ok() {
                let debug = Settings::load(store.as_ref()).is_ok_and(|s| s.debug_mode);
                if let Err(e) = filter.modify(|f| *f = log_filter(debug)) {
                    warn!("Cannot update log filter: {e}");
                }
            }
        }
    });

    info!("Watching {} for ticket mail.", store.path().display());
    scheduler.run(shutdown).await;
    Ok(())
}

async fn cmd_settings(
    store: &FileStore,
    args: &Args,
    command: &SettingsCommand,
) -> anyhow::Result<()> {
    match command {
        SettingsCommand::Show => {
            let raw = store.get(SETTINGS_KEY).unwrap_or_else(|| Value::Object(Map::new()));
            if args.json {
                println!("{}", serde_json::to_string_pretty(&raw)?);
            } else {
                let settings = Settings::from_value(&raw)?;
                print_settings(&settings);
                print_root_status(&settings).await;
            }
        }
        SettingsCommand::Set { key, value } => {
            if !SETTINGS_FIELDS.contains(&key.as_str()) {
                bail!(
                    "Unknown setting '{key}'. Known settings: {}",
                    SETTINGS_FIELDS.join(", ")
                );
            }
            let mut map = match store.get(SETTINGS_KEY) {
                Some(Value::Object(map)) => map,
                _ => Map::new(),
            };
            let value = if key == "debugMode" {
                Value::Bool(value == "true")
            } else {
                Value::String(value.trim().to_string())
            };
            map.insert(key.clone(), value);
            let updated = Value::Object(map);
            Settings::from_value(&updated)?;
            store.set(SETTINGS_KEY, updated)?;
            info!("Setting '{key}' saved.");
        }
        SettingsCommand::Reset => {
            store.remove(SETTINGS_KEY)?;
            info!("Settings reset.");
        }
    }
    Ok(())
}

fn print_settings(settings: &Settings) {
    let enabled = |on: bool| if on { "Enabled" } else { "Disabled" };
    println!(
        "Ticket URL:      {}",
        settings.ticket_url_template.as_deref().unwrap_or("-")
    );
    println!(
        "Opened folder:   {}",
        settings.opened_folder_path.as_deref().unwrap_or("-")
    );
    println!(
        "Closed folder:   {}",
        settings.closed_folder_path.as_deref().unwrap_or("-")
    );
    println!("Sync folders:    {}", settings.sync_folder_paths.join(", "));
    println!("Auto-sync:       {}", enabled(settings.auto_sync_enabled));
    match settings.period_minutes() {
        Ok(minutes) => println!("Auto-sync every: {minutes} min"),
        Err(e) => println!("Auto-sync every: invalid ({e})"),
    }
    println!("Debug mode:      {}", enabled(settings.debug_mode));
}

/// Whether the opened and closed roots exist on the server.
async fn print_root_status(settings: &Settings) {
    let provider = match ImapConfig::from_env() {
        Ok(config) => ImapProvider::new(config),
        Err(e) => {
            warn!("Folder status unavailable: {e}");
            return;
        }
    };
    let resolver = FolderResolver::new(&provider);
    let roots = [
        ("Opened", settings.opened_folder_path.as_deref()),
        ("Closed", settings.closed_folder_path.as_deref()),
    ];
    println!();
    for (label, path) in roots {
        let Some(path) = path else {
            println!("{label} folder status: not configured");
            continue;
        };
        match resolver.check(path).await.folder {
            Some(folder) => println!("{label} folder status: found at {}", folder.path),
            None => println!(
                "{label} folder status: \"{path}\" not found (create it with `ticket-sync create \"{path}\"`)"
            ),
        }
    }
}

fn print_response(args: &Args, action: &Action, response: &Response) -> anyhow::Result<()> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(response)?);
        return Ok(());
    }
    if !response.success {
        return Ok(());
    }

    match action {
        Action::CheckFolderExists { folder_path } => match &response.folder {
            Some(folder) => println!("{folder_path}: {} ({})", folder.path, folder.account_id),
            None => println!("{folder_path}: not found"),
        },
        Action::CreateCaseFolder { .. } => {
            if let Some(folder) = &response.folder {
                println!("{} ({})", folder.path, folder.account_id);
            }
        }
        Action::SyncFolderMails => println!(
            "Moved {} mail(s) to the folder.",
            response.messages_count.unwrap_or(0)
        ),
        Action::SyncAllFolders => println!(
            "Synced {} mail(s) across all folders.",
            response.messages_count.unwrap_or(0)
        ),
        Action::CloseCaseFolder => println!(
            "{} archived successfully.",
            response.folder_name.as_deref().unwrap_or_default()
        ),
        Action::RestoreArchivedFolder => println!(
            "{} restored successfully.",
            response.folder_name.as_deref().unwrap_or_default()
        ),
        Action::OpenTicketUrl { .. } => {
            println!("{}", response.url.as_deref().unwrap_or_default());
        }
        Action::GetCaseId { .. } => match response.case_id.as_ref().and_then(Option::as_ref) {
            Some(id) => println!("{id}"),
            None => println!("No ticket ID found."),
        },
    }
    Ok(())
}
