//! # Lockwarden — weekly smart-lock scheduler
//!
//! Unlocks a TTLock device at the configured open time each weekday, retries
//! failed attempts with backoff and escalates to Telegram and email.
//!
//! Usage:
//!   lockwarden                      # Run scheduler + Telegram bot
//!   lockwarden unlock               # One manual unlock through the retry engine
//!   lockwarden status --json        # Current state as JSON
//!   lockwarden check-config         # Load everything and report fallbacks

mod app;
mod bot;
mod conversation;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use lockwarden_core::AppConfig;
use lockwarden_core::schedule::ConfigWarning;
use lockwarden_core::traits::LockApi;
use lockwarden_scheduler::{CancelSignal, ControlCommand, ControlReply, EngineState};
use tracing_subscriber::EnvFilter;

use crate::app::Runtime;
use crate::bot::Bot;

#[derive(Parser)]
#[command(
    name = "lockwarden",
    version,
    about = "🔐 Lockwarden — scheduled TTLock unlocking with retry escalation"
)]
struct Cli {
    /// Config file (default ~/.lockwarden/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// JSON log output
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler and the Telegram bot (default)
    Run,
    /// Unlock now through the retry engine
    Unlock,
    /// Lock now through the retry engine
    Lock,
    /// Show lock, schedule and recent actions
    Status {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// List locks visible to the TTLock account
    Locks,
    /// Load config, schedule and notification target and report problems
    CheckConfig,
}

fn init_tracing(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "info" };
    let default = ["lockwarden", "lockwarden_core", "lockwarden_ttlock", "lockwarden_channels", "lockwarden_scheduler"]
        .iter()
        .map(|c| format!("{c}={level}"))
        .collect::<Vec<_>>()
        .join(",");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn load_config(path: Option<&str>) -> Result<(AppConfig, Vec<ConfigWarning>)> {
    let mut config = match path {
        Some(p) => {
            let expanded = shellexpand::tilde(p).to_string();
            AppConfig::load_from(Path::new(&expanded))
                .with_context(|| format!("Failed to load config from {expanded}"))?
        }
        None => AppConfig::load().context("Failed to load config")?,
    };
    config.apply_env();
    let warnings = config.normalize();
    Ok((config, warnings))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json);

    let (config, warnings) = load_config(cli.config.as_deref())?;
    for warning in &warnings {
        tracing::warn!("⚠️ config {warning}");
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Unlock => manual(config, ControlCommand::UnlockNow).await,
        Command::Lock => manual(config, ControlCommand::LockNow).await,
        Command::Status { json } => status(config, json).await,
        Command::Locks => locks(config).await,
        Command::CheckConfig => check_config(config, &warnings),
    }
}

async fn run(config: AppConfig) -> Result<()> {
    let runtime = Runtime::build(config)?;
    tracing::info!(
        "🔐 Lockwarden v{} starting, data in {}",
        env!("CARGO_PKG_VERSION"),
        runtime.config.storage.data_dir().display()
    );

    let (shutdown, signal) = CancelSignal::pair();
    let scheduler = runtime.scheduler().spawn(signal.clone());

    let bot = if runtime.config.telegram.bot_enabled && runtime.telegram.is_configured() {
        match runtime.telegram.get_me().await {
            Ok(me) => tracing::info!("🤖 Telegram bot @{} ready", me.username.as_deref().unwrap_or("?")),
            Err(e) => tracing::warn!("⚠️ Telegram getMe failed: {e}"),
        }
        let bot = Arc::new(Bot::new(runtime.telegram.clone(), runtime.surface.clone()));
        Some(tokio::spawn(
            bot.run(runtime.config.telegram.poll_timeout_secs, signal.clone()),
        ))
    } else {
        tracing::info!("🤖 Telegram bot disabled");
        None
    };

    if runtime.config.scheduler.announce_startup {
        runtime.announce_startup().await;
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("👋 Shutting down");
    shutdown.cancel();
    if let Err(e) = scheduler.await {
        tracing::warn!("Scheduler task ended abnormally: {e}");
    }
    if let Some(bot) = bot
        && let Err(e) = bot.await
    {
        tracing::warn!("Bot task ended abnormally: {e}");
    }
    Ok(())
}

async fn manual(config: AppConfig, command: ControlCommand) -> Result<()> {
    let runtime = Runtime::build(config)?;
    let reply = runtime.surface.handle("cli", command).await?;
    println!("{}", bot::html_to_plain(&bot::render_reply(&reply)));
    match reply {
        ControlReply::ActionFinished(summary) if summary.state != EngineState::Success => {
            bail!("{} did not succeed ({})", summary.kind, summary.state)
        }
        _ => Ok(()),
    }
}

async fn status(config: AppConfig, json: bool) -> Result<()> {
    let runtime = Runtime::build(config)?;
    let report = runtime.surface.status().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", bot::html_to_plain(&bot::render_status(&report)));
    }
    Ok(())
}

async fn locks(config: AppConfig) -> Result<()> {
    let runtime = Runtime::build(config)?;
    let token = runtime.lock_api.authenticate().await?;
    let locks = runtime.lock_api.list_locks(&token).await?;
    if locks.is_empty() {
        println!("No locks on this account.");
    }
    for lock in locks {
        let battery = lock
            .battery_pct
            .map(|b| format!("{b}%"))
            .unwrap_or_else(|| "?".into());
        println!(
            "{}\t{}\tbattery {battery}",
            lock.lock_id,
            lock.alias.or(lock.name).unwrap_or_default()
        );
    }
    Ok(())
}

fn check_config(config: AppConfig, warnings: &[ConfigWarning]) -> Result<()> {
    let runtime = Runtime::build(config)?;
    let mut problems = warnings.len();

    let (_, schedule_warnings) = runtime.store.load_schedule();
    for warning in &schedule_warnings {
        println!("⚠️  schedule.json {warning}");
    }
    problems += schedule_warnings.len();
    let (target, target_warnings) = runtime.store.load_target();
    for warning in &target_warnings {
        println!("⚠️  {warning}");
    }
    problems += target_warnings.len();
    for warning in warnings {
        println!("⚠️  config {warning}");
    }

    let yes_no = |ok: bool| if ok { "✅" } else { "❌" };
    let ttlock = &runtime.config.ttlock;
    println!("TTLock account:   {}", yes_no(!ttlock.client_id.is_empty() && !ttlock.username.is_empty()));
    println!("Lock id:          {}", ttlock.lock_id.as_deref().unwrap_or("auto (first listed)"));
    println!("Telegram bot:     {}", yes_no(runtime.telegram.is_configured()));
    println!("Alert chat:       {}", yes_no(target.has_chat()));
    println!("Alert email:      {}", yes_no(target.has_email()));
    println!("Journal:          {}", yes_no(runtime.journal.is_some()));
    println!("Schedule file:    {}", runtime.store.schedule_path().display());
    println!("{problems} problem(s) found; all fall back to defaults.");
    Ok(())
}
