//! `mailevents` command-line entry point.
//!
//! Every command prints an `ApiResponse` JSON envelope on stdout; logs go to
//! stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use serde::Serialize;
use tokio::sync::broadcast;

use mailevents::config::{load_settings, seed_if_empty, settings_path_from_env, Settings};
use mailevents::{
    init_tracing, AdminApi, ApiResponse, Database, EmailEventProcessor, MailboxConfigUpdate,
    PollScheduler, SqliteConfigStore,
};

#[derive(Parser)]
#[command(name = "mailevents", version)]
#[command(about = "Turns event notification emails into calendar events")]
#[command(
    after_help = "Environment:\n  MAILEVENTS_CONFIG       Settings file (JSON)\n  MAILEVENTS_SECRET_KEY   64 hex chars; encrypts the stored mailbox password\n  RUST_LOG                Log filter (default: info)"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one mailbox pass
    Process,
    /// Run passes every poll_interval_secs until Ctrl-C
    Poll,
    /// Show processing history, most recent first
    History {
        /// Page size, clamped to 10..=100
        limit: Option<i64>,
        /// Records to skip
        offset: Option<i64>,
    },
    /// Show record counts and recent events
    Stats,
    /// Show the mailbox configuration (password masked)
    Config,
    /// Merge a partial configuration update given as JSON
    SetConfig {
        #[arg(value_name = "JSON", value_parser = parse_update)]
        update: MailboxConfigUpdate,
    },
    /// Check that the configured mailbox can be opened
    TestConnection,
    /// Extract and create an event from a message file
    Upload { file: PathBuf },
}

fn parse_update(json: &str) -> Result<MailboxConfigUpdate, String> {
    serde_json::from_str(json).map_err(|e| format!("invalid configuration JSON: {}", e))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match settings_path_from_env() {
        Some(path) => match load_settings(&path) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Failed to load settings from {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => Settings::default(),
    };

    init_tracing(settings.log_format);
    info!("mailevents v{}", env!("CARGO_PKG_VERSION"));

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let processor = match build_processor(&settings) {
        Ok(processor) => Arc::new(processor),
        Err(message) => {
            error!("{}", message);
            return print(&ApiResponse::<()>::err("configuration error"));
        }
    };

    if matches!(cli.command, Command::Poll) {
        return poll(processor, &settings);
    }

    let api = AdminApi::new(processor);
    runtime.block_on(run_command(&api, cli.command))
}

fn build_processor(settings: &Settings) -> Result<EmailEventProcessor, String> {
    let path: PathBuf = settings
        .resolved_database_path()
        .ok_or_else(|| "Cannot determine database path (no home directory)".to_string())?;
    let db = Database::open(&path).map_err(|e| format!("Failed to open database: {}", e))?;

    if let Some(seed) = &settings.mailbox {
        let store = SqliteConfigStore::from_env(db.clone())
            .map_err(|e| format!("Failed to open config store: {}", e))?;
        match seed_if_empty(&store, seed) {
            Ok(true) => info!("Stored mailbox configuration from settings file"),
            Ok(false) => {}
            Err(e) => warn!("Ignoring mailbox seed: {}", e),
        }
    }

    EmailEventProcessor::from_database(db, settings)
        .map_err(|e| format!("Failed to build processor: {}", e))
}

async fn run_command(api: &AdminApi, command: Command) -> ExitCode {
    match command {
        Command::Process => print(&api.process_inbox().await),
        Command::History { limit, offset } => print(&api.get_processing_history(limit, offset)),
        Command::Stats => print(&api.processing_stats().await),
        Command::Config => print(&api.get_configuration()),
        Command::SetConfig { update } => print(&api.update_configuration(&update)),
        Command::TestConnection => print(&api.test_connection().await),
        Command::Upload { file } => match tokio::fs::read(&file).await {
            Ok(content) => print(&api.process_email_content(&content).await),
            Err(e) => {
                warn!("Failed to read {}: {}", file.display(), e);
                print(&ApiResponse::<()>::err("unreadable file"))
            }
        },
        // Handled before the runtime is entered.
        Command::Poll => ExitCode::SUCCESS,
    }
}

fn poll(processor: Arc<EmailEventProcessor>, settings: &Settings) -> ExitCode {
    let interval = Duration::from_secs(settings.poll_interval_secs);
    let scheduler = Arc::new(PollScheduler::new(processor, interval));
    let (trigger_tx, trigger_rx) = broadcast::channel(4);

    let handle = match scheduler.start(trigger_rx) {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to start poller: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let stopper = Arc::clone(&scheduler);
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Stopping after the current message");
        stopper.stop();
        // Wake the loop so it sees the shutdown flag.
        let _ = trigger_tx.send(());
    }) {
        error!("Failed to install Ctrl-C handler: {}", e);
        scheduler.stop();
    }

    info!("Polling every {}s, Ctrl-C to stop", interval.as_secs());
    if handle.join().is_err() {
        error!("Poll thread panicked");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn print<T: Serialize>(response: &ApiResponse<T>) -> ExitCode {
    match serde_json::to_string_pretty(response) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            return ExitCode::FAILURE;
        }
    }
    if response.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
