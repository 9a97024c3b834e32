//! Jot CLI - offline-first notes from the terminal
//!
//! A thin consumer of the `jot-core` repository boundary: capture and edit
//! notes locally, sync against the remote service when configured.

use std::env;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use jot_core::auth::{AuthClient, TokenManager, TokenPair, TokenStore};
use jot_core::db::{LibSqlStore, LocalDataSource};
use jot_core::remote::{HttpRemoteClient, OfflineRemote, RemoteDataSource};
use jot_core::sync::{NoopScheduler, SyncCoordinator, SyncEngine};
use jot_core::{Note, NoteId};
use thiserror::Error;

const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Parser)]
#[command(name = "jot")]
#[command(about = "Capture notes offline, sync when you can")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    db_path: Option<PathBuf>,

    /// Base URL of the sync service (or set JOT_API_URL)
    #[arg(long, global = true, value_name = "URL")]
    api_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new note
    #[command(alias = "new")]
    Add {
        /// Note title
        title: String,
        /// Note content
        content: Vec<String>,
    },
    /// List notes, most recently edited first
    List {
        /// Page to show (1-indexed)
        #[arg(long, default_value = "1")]
        page: u32,
        /// Notes per page
        #[arg(short, long, default_value = "20")]
        limit: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an existing note
    Edit {
        /// Note ID
        id: String,
        /// New title
        #[arg(long)]
        title: Option<String>,
        /// New content
        #[arg(long)]
        content: Option<String>,
    },
    /// Delete an existing note
    Delete {
        /// Note ID
        id: String,
    },
    /// Push queued changes and pull the latest notes
    Sync,
    /// Create an account on the sync service
    Register {
        /// Account email
        email: String,
    },
    /// Sign in to the sync service
    Login {
        /// Account email
        email: String,
    },
    /// Sign out and forget stored tokens
    Logout,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] jot_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Note title cannot be empty")]
    EmptyTitle,
    #[error("Password cannot be empty")]
    EmptyPassword,
    #[error("Note not found: {0}")]
    NoteNotFound(String),
    #[error("Nothing to change; pass --title and/or --content")]
    NothingToEdit,
    #[error("Sync is not configured. Pass --api-url or set JOT_API_URL.")]
    SyncNotConfigured,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jot=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    let api_url = resolve_api_url(cli.api_url);
    let token_store = FileTokenStore::new(token_file_path());

    match cli.command {
        Commands::Register { email } => run_register(&email, api_url.as_deref(), &token_store).await,
        Commands::Login { email } => run_login(&email, api_url.as_deref(), &token_store).await,
        Commands::Logout => run_logout(&token_store),
        command => run_notes(command, &db_path, api_url, token_store).await,
    }
}

async fn run_notes(
    command: Commands,
    db_path: &Path,
    api_url: Option<String>,
    token_store: FileTokenStore,
) -> Result<(), CliError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = Arc::new(LibSqlStore::open(db_path).await?);

    match api_url {
        Some(url) => {
            tracing::info!("Sync enabled against {url}");
            let tokens = Arc::new(TokenManager::new(token_store, AuthClient::new(&url)?));
            let remote = Arc::new(HttpRemoteClient::new(&url, tokens)?);
            let engine = Arc::new(SyncEngine::new(store, remote));
            let coordinator = SyncCoordinator::new(Arc::clone(&engine), NoopScheduler);
            execute(command, &coordinator, &engine, true).await
        }
        None => {
            tracing::info!("Running in local-only mode (no sync service configured)");
            let engine = Arc::new(SyncEngine::new(store, Arc::new(OfflineRemote)));
            let coordinator = SyncCoordinator::new(Arc::clone(&engine), NoopScheduler);
            execute(command, &coordinator, &engine, false).await
        }
    }
}

async fn execute<R: RemoteDataSource + 'static>(
    command: Commands,
    coordinator: &SyncCoordinator<LibSqlStore, R, NoopScheduler>,
    engine: &Arc<SyncEngine<LibSqlStore, R>>,
    sync_enabled: bool,
) -> Result<(), CliError> {
    match command {
        Commands::Add { title, content } => {
            let title = normalize_title(&title)?;
            let note = coordinator
                .create_note(Note::new(title, content.join(" ")))
                .await?;
            println!("{}", note.id);
            Ok(())
        }
        Commands::List { page, limit, json } => {
            let notes = coordinator.get_notes(page, limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&notes)?);
            } else {
                for line in format_note_lines(&notes) {
                    println!("{line}");
                }
            }
            Ok(())
        }
        Commands::Edit { id, title, content } => {
            if title.is_none() && content.is_none() {
                return Err(CliError::NothingToEdit);
            }
            let note_id: NoteId = id.parse().map_err(CliError::Core)?;
            let mut note = engine
                .local()
                .get_note_by_id(&note_id)
                .await?
                .ok_or(CliError::NoteNotFound(id))?;

            if let Some(title) = title {
                note.title = normalize_title(&title)?;
            }
            if let Some(content) = content {
                note.content = content;
            }
            note.touch();

            let updated = coordinator.update_note(note).await?;
            println!("{}", updated.id);
            Ok(())
        }
        Commands::Delete { id } => {
            let note_id: NoteId = id.parse().map_err(CliError::Core)?;
            coordinator.delete_note(&note_id).await?;
            println!("{note_id}");
            Ok(())
        }
        Commands::Sync => {
            if !sync_enabled {
                return Err(CliError::SyncNotConfigured);
            }
            let report = coordinator.sync_pending_notes().await;
            println!(
                "Pushed {}, deleted {}, purged {}, still queued {}",
                report.pushed, report.deleted, report.purged, report.deferred
            );
            match engine.refresh_page(1, DEFAULT_PAGE_SIZE).await {
                Ok(merged) => println!("Pulled {merged} note(s)"),
                Err(error) => println!("Pull failed: {error}"),
            }
            Ok(())
        }
        // Account commands are handled before the database is opened
        Commands::Register { .. } | Commands::Login { .. } | Commands::Logout => Ok(()),
    }
}

async fn run_register(
    email: &str,
    api_url: Option<&str>,
    token_store: &FileTokenStore,
) -> Result<(), CliError> {
    let client = AuthClient::new(api_url.ok_or(CliError::SyncNotConfigured)?)?;
    let password = read_password()?;
    let tokens = client.register(email, &password).await?;
    token_store.save_tokens(&tokens)?;
    println!("Registered and signed in as {email}");
    Ok(())
}

async fn run_login(
    email: &str,
    api_url: Option<&str>,
    token_store: &FileTokenStore,
) -> Result<(), CliError> {
    let client = AuthClient::new(api_url.ok_or(CliError::SyncNotConfigured)?)?;
    let password = read_password()?;
    let tokens = client.login(email, &password).await?;
    token_store.save_tokens(&tokens)?;
    println!("Signed in as {email}");
    Ok(())
}

fn run_logout(token_store: &FileTokenStore) -> Result<(), CliError> {
    token_store.clear_tokens()?;
    println!("Signed out");
    Ok(())
}

/// Token pair persisted as JSON under the user config dir.
///
/// Plain-file storage; encrypting credentials at rest is the platform
/// keystore's job and out of scope here.
struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    const fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl TokenStore for FileTokenStore {
    fn load_tokens(&self) -> jot_core::Result<Option<TokenPair>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|error| jot_core::Error::Auth(format!("corrupt token file: {error}"))),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(jot_core::Error::Auth(format!(
                "failed to read token file: {error}"
            ))),
        }
    }

    fn save_tokens(&self, tokens: &TokenPair) -> jot_core::Result<()> {
        let write = || -> io::Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let raw = serde_json::to_string_pretty(tokens)?;
            std::fs::write(&self.path, raw)
        };
        write().map_err(|error| jot_core::Error::Auth(format!("failed to save tokens: {error}")))
    }

    fn clear_tokens(&self) -> jot_core::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(jot_core::Error::Auth(format!(
                "failed to clear tokens: {error}"
            ))),
        }
    }
}

fn normalize_title(title: &str) -> Result<String, CliError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(CliError::EmptyTitle);
    }
    Ok(trimmed.to_string())
}

fn read_password() -> Result<String, CliError> {
    if let Ok(password) = env::var("JOT_PASSWORD") {
        let trimmed = password.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }

    eprint!("Password: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(CliError::EmptyPassword);
    }
    Ok(trimmed.to_string())
}

fn format_note_lines(notes: &[Note]) -> Vec<String> {
    let now = Utc::now();
    notes
        .iter()
        .map(|note| {
            let id = note.id.to_string();
            let short_id = id.chars().take(8).collect::<String>();
            let title = truncate(&note.title, 40);
            let age = format_relative_time(
                now.signed_duration_since(note.last_edited_at).num_milliseconds(),
            );
            format!("{short_id:<8}  {title:<40}  {age}")
        })
        .collect()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut truncated = text
            .chars()
            .take(max_chars.saturating_sub(3))
            .collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

fn format_relative_time(diff_ms: i64) -> String {
    let diff = diff_ms.max(0);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("JOT_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jot")
        .join("jot.db")
}

fn resolve_api_url(cli_api_url: Option<String>) -> Option<String> {
    cli_api_url
        .or_else(|| env::var("JOT_API_URL").ok())
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
}

fn token_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jot")
        .join("tokens.json")
}
