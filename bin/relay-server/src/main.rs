//! relay-server – entry point.
//!
//! `relay-server [serve]` startup order:
//! 1. Parse configuration (defaults, YAML file, environment) and validate it.
//! 2. Initialise structured tracing (JSON when `RELAY_LOG_JSON=1`).
//! 3. Connect the spreadsheet client and the configured channel adapters.
//! 4. Open the database and run pending migrations.
//! 5. Build the agent: system prompt, tool registry, completion backend.
//! 6. Build the Axum router and start the HTTP server with graceful shutdown.
//!
//! `relay-server follow-up` runs steps 1–3, sends follow-up reminders once
//! and exits.

mod channels;
mod config;
mod entities;
mod error;
mod followup;
mod middleware;
mod price_sheet;
mod relay;
mod routes;
mod schemas;
mod sheets;
mod state;
#[cfg(test)]
mod testing;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use relay_agent::prompt::render_system_prompt;
use relay_agent::{AgentFactory, OpenAiBackend, ToolRegistry};
use tracing::{info, warn};

use crate::channels::{LineChannel, MessengerChannel};
use crate::config::Config;
use crate::entities::AnyStore;
use crate::followup::FollowUpJob;
use crate::relay::Relay;
use crate::sheets::client::TokenSource;
use crate::sheets::{contacts, ContactSheet, ProfileDirectory, SettingsSheet, SheetBackend, SheetsClient};
use crate::state::AppState;

/// LINE / Messenger customer-service relay.
#[derive(Parser)]
#[command(name = "relay-server", version)]
#[command(about = "Relay LINE and Messenger chats to a language-model operator")]
struct Cli {
    /// YAML config file (defaults to ./config.yml when present)
    #[arg(long, env = "RELAY_CONFIG_FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, Subcommand)]
enum Commands {
    /// Run the webhook server (default)
    Serve,

    /// Send follow-up reminders to stale contacts once, then exit
    FollowUp,
}

/// Spreadsheet, profile directory and settings sheet shared by both commands.
struct Sheets {
    backend: Arc<dyn SheetBackend>,
    profiles: ProfileDirectory,
    settings: SettingsSheet,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cfg = Config::load(cli.config.as_deref())?;

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    init_tracing(&cfg);
    info!(version = env!("CARGO_PKG_VERSION"), "relay-server starting");

    let command = cli.command.unwrap_or(Commands::Serve);
    match command {
        Commands::Serve => cfg.validate_serve(),
        Commands::FollowUp => cfg.validate(),
    }
    .context("invalid configuration")?;
    let tz = cfg.tz()?;

    // ── 3. Spreadsheet and channels ────────────────────────────────────────────
    let sheets = open_sheets(&cfg, tz).await?;
    let line = cfg.line_enabled().then(|| Arc::new(line_channel(&cfg)));
    let messenger = cfg.messenger_enabled().then(|| Arc::new(messenger_channel(&cfg)));
    info!(line = line.is_some(), messenger = messenger.is_some(), "channels configured");

    match command {
        Commands::FollowUp => {
            let mut job = FollowUpJob::new(sheets.profiles, cfg.follow_up_days)
                .with_settings(sheets.settings);
            if let Some(line) = line {
                job = job.with_channel(line);
            }
            if let Some(messenger) = messenger {
                job = job.with_channel(messenger);
            }
            let report = job.run().await?;
            info!(sent = report.sent, failed = report.failed, skipped = report.skipped, "follow-up complete");
            Ok(())
        }
        Commands::Serve => serve(cfg, tz, sheets, line, messenger).await,
    }
}

async fn serve(
    cfg: Config,
    tz: chrono_tz::Tz,
    sheets: Sheets,
    line: Option<Arc<LineChannel>>,
    messenger: Option<Arc<MessengerChannel>>,
) -> anyhow::Result<()> {
    // ── 4. Database ────────────────────────────────────────────────────────────
    let store = AnyStore::connect(&cfg.database_url, cfg.database_max_connections).await?;
    info!(database_url = %cfg.database_url, "database ready");

    // ── 5. Agent ───────────────────────────────────────────────────────────────
    let api_key = cfg.openai_api_key()?;
    let backend = OpenAiBackend::with_base_url(api_key, cfg.openai_base_url.clone());

    let mut tools = ToolRegistry::new();
    tools
        .register_from_file(
            &cfg.tool_schema_path,
            contacts::TOOL_NAME,
            Arc::new(ContactSheet::new(sheets.backend.clone(), cfg.contact_sheet.clone())),
        )
        .with_context(|| format!("loading tool schema from {}", cfg.tool_schema_path.display()))?;

    let system_prompt = load_system_prompt(&cfg)?;
    let agents = AgentFactory::new(Arc::new(backend), Arc::new(tools), cfg.model.clone(), cfg.temperature)
        .with_system_prompt(system_prompt);
    info!(model = %cfg.model, temperature = cfg.temperature, "agent ready");

    let store = Arc::new(store);
    let relay = Relay::new(store.clone(), agents, sheets.profiles, tz)
        .with_working_hours(cfg.working_hours()?)
        .with_settings(sheets.settings);

    // ── 6. HTTP server with graceful shutdown ──────────────────────────────────
    let addr: SocketAddr = cfg.bind_address.parse()?;
    let state = Arc::new(AppState {
        config: Arc::new(cfg),
        store,
        relay,
        line,
        messenger,
    });

    let app = routes::build(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("relay-server stopped");
    Ok(())
}

fn init_tracing(cfg: &Config) {
    // Build the log-level filter, warning loudly if the configured value is
    // not a valid tracing filter expression.
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: RELAY_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true);

    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

async fn open_sheets(cfg: &Config, tz: chrono_tz::Tz) -> anyhow::Result<Sheets> {
    let token = TokenSource::resolve(
        cfg.google_access_token.as_deref(),
        cfg.google_credentials_path.as_deref(),
    )
    .await
    .context("resolving Google Sheets credentials")?;
    let backend: Arc<dyn SheetBackend> = Arc::new(SheetsClient::new(cfg.spreadsheet_id()?, token));
    Ok(Sheets {
        profiles: ProfileDirectory::new(backend.clone(), cfg.profile_sheet.clone(), tz),
        settings: SettingsSheet::new(backend.clone(), cfg.settings_sheet.clone()),
        backend,
    })
}

fn line_channel(cfg: &Config) -> LineChannel {
    LineChannel::new(
        cfg.line_channel_access_token.clone().unwrap_or_default(),
        cfg.line_channel_secret.clone().unwrap_or_default(),
    )
}

fn messenger_channel(cfg: &Config) -> MessengerChannel {
    MessengerChannel::new(
        cfg.messenger_page_access_token.clone().unwrap_or_default(),
        cfg.messenger_verify_token.clone().unwrap_or_default(),
        cfg.messenger_app_secret.clone(),
    )
}

fn load_system_prompt(cfg: &Config) -> anyhow::Result<String> {
    let template = std::fs::read_to_string(&cfg.system_prompt_path)
        .with_context(|| format!("reading system prompt {}", cfg.system_prompt_path.display()))?;
    let price_sheet = cfg
        .price_sheet_path
        .as_deref()
        .map(price_sheet::load_price_sheet)
        .transpose()?;
    Ok(render_system_prompt(&template, price_sheet.as_deref())?)
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
