mod activity_log;
mod agent;
mod catalog;
mod config;
mod executors;
mod profiles;
mod schedule;
mod setup;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use clap::Parser;
use dotenvy::dotenv;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::agent::events::{AgentEvent, EventPublisher};
use crate::agent::scheduler::Scheduler;
use crate::agent::session::ActivitySession;
use crate::agent::{ShutdownTrigger, shutdown_channel};
use crate::executors::Executor;
use crate::executors::dry_run::DryRunExecutor;
use crate::executors::shell::ShellExecutor;
use crate::profiles::file_repository::FileProfileRepository;
use crate::profiles::repository::ProfileRepository;
use crate::schedule::{classify, parse_time_of_day};

#[derive(Parser)]
#[command(name = "activity-agent", about = "Simulates a user working in desktop applications during office hours")]
enum Cli {
    /// Start the agent (default when no subcommand is given)
    Run {
        /// Profile name to load, e.g. `alice` for alice.json
        #[arg(long)]
        config: Option<String>,
        /// Log actions instead of running them
        #[arg(long)]
        dry_run: bool,
        /// Emit JSON logs for a service manager
        #[arg(long)]
        daemon: bool,
    },
    /// Show the schedule state and applications for a profile
    Check {
        #[arg(long)]
        config: Option<String>,
        /// Time of day to evaluate (HH:MM), defaults to now
        #[arg(long)]
        at: Option<String>,
    },
    /// Write a sample profile to edit
    SampleConfig {
        #[arg(long)]
        name: Option<String>,
    },
    /// List profiles found in the search directories
    ListConfigs,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // No subcommand means run, but --help and --version still work.
    let args: Vec<String> = std::env::args().collect();
    let cli = if args.len() <= 1 {
        Cli::Run {
            config: None,
            dry_run: false,
            daemon: false,
        }
    } else {
        Cli::parse()
    };

    init_tracing(matches!(cli, Cli::Run { daemon: true, .. }));

    let config = config::Config::from_env();
    let repo = FileProfileRepository::standard(config.config_dir.clone());

    match cli {
        Cli::Run {
            config: profile,
            dry_run,
            ..
        } => run_agent(&config, &repo, profile.as_deref(), dry_run).await,
        Cli::Check { config: profile, at } => check(&repo, profile.as_deref(), at.as_deref()).await,
        Cli::SampleConfig { name } => setup::run(&repo, name).await,
        Cli::ListConfigs => list_configs(&repo).await,
    }
}

fn init_tracing(daemon: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("activity_agent=info"));

    let tree = (!daemon).then(|| {
        tracing_tree::HierarchicalLayer::new(2)
            .with_targets(true)
            .with_bracketed_fields(false)
    });
    let json = daemon.then(|| tracing_subscriber::fmt::layer().json().with_current_span(false));

    tracing_subscriber::registry().with(filter).with(tree).with(json).init();
}

async fn run_agent(
    config: &config::Config,
    repo: &dyn ProfileRepository,
    profile_name: Option<&str>,
    dry_run: bool,
) -> Result<()> {
    let loaded = repo.load(profile_name).await.context("failed to load agent profile")?;
    let profile = loaded.config;
    tracing::info!(
        source = %loaded.source,
        username = %profile.username,
        role = %profile.role,
        dry_run,
        "Profile loaded"
    );

    let catalog = Arc::new(profile.catalog());
    for app in profile.unknown_applications(&catalog) {
        tracing::warn!(app, "No profile for application, it will be skipped");
    }

    let executor: Arc<dyn Executor> = if dry_run {
        Arc::new(DryRunExecutor::new())
    } else {
        Arc::new(
            ShellExecutor::new(profile.run_as.clone()).with_timeout(profile.timing.command_timeout()),
        )
    };

    let (events_tx, _) = tokio::sync::broadcast::channel::<AgentEvent>(256);
    let log_writer = match activity_log::open_log(&config.log_dir, &activity_log::temp_fallback_dir()) {
        Ok((path, file)) => {
            tracing::info!(path = %path.display(), "Writing activity log");
            Some(activity_log::spawn_writer(events_tx.subscribe(), file))
        }
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "Activity log disabled");
            None
        }
    };

    let (trigger, signal) = shutdown_channel();
    tokio::spawn(stop_on_signal(trigger));

    let session = ActivitySession::new(
        profile.applications_used.clone(),
        catalog,
        executor,
        profile.timing.clone(),
        EventPublisher::new(profile.username.clone(), Some(events_tx.clone())),
        signal,
    )?;
    let mut scheduler = Scheduler::new(profile.work_schedule.clone(), session);
    let result = scheduler.run().await;

    // Close the channel so the log writer drains and exits.
    drop(scheduler);
    drop(events_tx);
    if let Some(writer) = log_writer {
        if tokio::time::timeout(Duration::from_secs(5), writer).await.is_err() {
            tracing::warn!("Activity log writer did not finish in time");
        }
    }

    result.context("activity agent stopped with an error")
}

/// Fire `trigger` on Ctrl-C or SIGTERM.
async fn stop_on_signal(trigger: ShutdownTrigger) {
    wait_for_stop_signal().await;
    tracing::info!("Received stop signal, shutting down...");
    trigger.trigger();
}

#[cfg(unix)]
async fn wait_for_stop_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGTERM handler, only Ctrl-C will stop the agent");
            wait_for_ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = wait_for_ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_stop_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
}

async fn check(repo: &dyn ProfileRepository, profile_name: Option<&str>, at: Option<&str>) -> Result<()> {
    let loaded = repo.load(profile_name).await.context("failed to load agent profile")?;
    let profile = loaded.config;

    let when = resolve_check_time(Local::now().naive_local(), at)?;
    let state = classify(when, &profile.work_schedule);
    let catalog = profile.catalog();

    println!("Profile:      {}", loaded.source);
    println!("User:         {} ({}, {})", profile.username, profile.full_name, profile.role);
    println!(
        "Work hours:   {}-{}",
        profile.work_schedule.start_time.format("%H:%M"),
        profile.work_schedule.end_time.format("%H:%M")
    );
    for b in &profile.work_schedule.breaks {
        println!("Break:        {} for {} min", b.start.format("%H:%M"), b.duration_minutes);
    }
    println!("At {}:     {}", when.format("%H:%M"), state);
    println!("Catalog:      {}", catalog.names().join(", "));
    println!("Applications:");
    for app in &profile.applications_used {
        if catalog.contains(app) {
            println!("  {app}");
        } else {
            println!("  {app} (no profile, skipped)");
        }
    }
    Ok(())
}

/// The moment `check` evaluates: `now`, or today's date at the `--at` time.
fn resolve_check_time(now: NaiveDateTime, at: Option<&str>) -> Result<NaiveDateTime> {
    match at {
        Some(raw) => {
            let time = parse_time_of_day(raw)
                .with_context(|| format!("invalid time of day '{raw}', expected HH:MM"))?;
            Ok(now.date().and_time(time))
        }
        None => Ok(now),
    }
}

async fn list_configs(repo: &FileProfileRepository) -> Result<()> {
    println!("Search directories:");
    for dir in repo.search_dirs() {
        let marker = if dir.is_dir() { "" } else { " (missing)" };
        println!("  {}{marker}", dir.display());
    }
    println!();

    let entries = repo.list().await;
    if entries.is_empty() {
        println!("No profiles found. Create one with `activity-agent sample-config`.");
        return Ok(());
    }
    println!("Profiles:");
    for entry in entries {
        println!("  {:<24} {:>8} B  {}", entry.name, entry.size_bytes, entry.path.display());
    }
    Ok(())
}
