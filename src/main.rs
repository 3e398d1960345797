use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use channel_reaper::config::{MAX_WINDOW_DAYS, ReaperConfig};
use channel_reaper::flagger::Flagger;
use channel_reaper::lifecycle::{LifecycleEngine, RunReport};
use channel_reaper::policy::Policy;
use channel_reaper::report::report_sink_for;
use channel_reaper::transport::{ChatTransport, SlackClient, SlackSettings};

#[derive(Debug, Parser)]
#[command(
    name = "channel-reaper",
    version,
    about = "Warn and archive stale Slack channels"
)]
struct Cli {
    /// JSON policy file. Defaults apply to anything it leaves out.
    #[arg(long, global = true, env = "REAPER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Archive stale channels that pass the readiness checks.
    Archive,
    /// Warn stale channels that have not been warned yet.
    Warn {
        /// Warn even if a warning is already in the window.
        #[arg(long)]
        force: bool,
    },
    /// Post well-reacted messages to the configured output channels.
    Flag,
    /// List stale channels without touching them.
    Stale {
        /// Lookback window; defaults to the warn threshold.
        #[arg(
            long,
            value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_WINDOW_DAYS))
        )]
        days: Option<u32>,
    },
}

fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match std::env::var("REAPER_LOG_DIR")
        .ok()
        .filter(|dir| !dir.trim().is_empty())
    {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "channel-reaper.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_tracing();

    let config = ReaperConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let policy = Arc::new(Policy::compile(&config).context("Invalid policy")?);

    let settings = SlackSettings::from_env()?;
    let transport: Arc<dyn ChatTransport> =
        Arc::new(SlackClient::new(&settings).context("Failed to build Slack client")?);
    let report = report_sink_for(&policy, transport.clone());

    info!(
        activated = policy.activated,
        warn_days = policy.warn_threshold_days,
        archive_days = policy.archive_threshold_days,
        earliest_archive_date = %policy.earliest_archive_date,
        "channel-reaper v{}",
        env!("CARGO_PKG_VERSION")
    );

    let run: RunReport = match cli.command {
        Command::Archive => {
            LifecycleEngine::new(transport, policy, report)
                .safe_archive_all()
                .await?
        }
        Command::Warn { force } => {
            LifecycleEngine::new(transport, policy, report)
                .warn_all(force)
                .await?
        }
        Command::Flag => Flagger::new(transport, policy, report).flag().await?,
        Command::Stale { days } => {
            let days = days.unwrap_or(policy.warn_threshold_days);
            let run = LifecycleEngine::new(transport, policy, report)
                .stale_channels(days)
                .await?;
            println!("{}", run.summary());
            run
        }
    };

    if run.has_failures() {
        info!(
            failures = run.failures.len(),
            "Run finished with skipped channels"
        );
    } else {
        info!(channels = run.outcomes.len(), "Run finished");
    }
    Ok(())
}
