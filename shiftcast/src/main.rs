use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use shiftcast::clock::{Clock, SystemClock};
use shiftcast::command::CommandBuilder;
use shiftcast::config::{
    ChannelEntry, ConfigSnapshot, ConfigSource, DEFAULT_CHANNELS_FILE, DEFAULT_FFMPEG_PATH,
    DEFAULT_LOG_DIR, DEFAULT_MEDIA_ROOT, DEFAULT_PLAYBACK_WINDOW_SECS, DEFAULT_POLL_INTERVAL_SECS,
    DEFAULT_PRUNE_INTERVAL_SECS, DEFAULT_SCRATCH_DIR, DEFAULT_SHUTDOWN_GRACE_SECS,
    DEFAULT_STOP_GRACE_SECS, EnforcerConfig, JsonFileSource,
};
use shiftcast::domain::{ChannelConfig, JobPurpose};
use shiftcast::enforcer::{Enforcer, is_desired};
use shiftcast::logging;
use shiftcast::process::{RunOutcome, SpawnSpec, TokioProcessManager, run_to_completion};
use shiftcast::recording::{PruneStats, RetentionPruner, SegmentIndex};
use shiftcast::schedule::{DEFAULT_TAIL_SEARCH_DAYS, last_schedule_end};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log filter directive, e.g. "shiftcast=debug"
    #[arg(long, global = true)]
    log_filter: Option<String>,

    /// JSON channel document
    #[arg(long, global = true, env = "SHIFTCAST_CHANNELS", default_value = DEFAULT_CHANNELS_FILE)]
    channels: PathBuf,

    /// Root for recordings, playlists and ffmpeg logs
    #[arg(long, global = true, env = "SHIFTCAST_MEDIA_ROOT", default_value = DEFAULT_MEDIA_ROOT)]
    media_root: PathBuf,

    #[arg(long, global = true, env = "FFMPEG_PATH", default_value = DEFAULT_FFMPEG_PATH)]
    ffmpeg: String,

    #[arg(long, global = true, env = "SHIFTCAST_POLL_INTERVAL_SECS", default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    poll_interval_secs: u64,

    #[arg(long, global = true, env = "SHIFTCAST_PRUNE_INTERVAL_SECS", default_value_t = DEFAULT_PRUNE_INTERVAL_SECS)]
    prune_interval_secs: u64,

    /// How far back a time-shift playlist may reach
    #[arg(long, global = true, env = "SHIFTCAST_PLAYBACK_WINDOW_SECS", default_value_t = DEFAULT_PLAYBACK_WINDOW_SECS)]
    playback_window_secs: u64,

    #[arg(long, global = true, env = "SHIFTCAST_STOP_GRACE_SECS", default_value_t = DEFAULT_STOP_GRACE_SECS)]
    stop_grace_secs: u64,

    #[arg(long, global = true, env = "SHIFTCAST_SHUTDOWN_GRACE_SECS", default_value_t = DEFAULT_SHUTDOWN_GRACE_SECS)]
    shutdown_grace_secs: u64,

    /// Days searched backward for the last schedule end
    #[arg(long, global = true, env = "SHIFTCAST_TAIL_SEARCH_DAYS", default_value_t = DEFAULT_TAIL_SEARCH_DAYS)]
    tail_search_days: u32,

    /// Restart record jobs whose command changed
    #[arg(long, global = true, env = "SHIFTCAST_RECORD_DRIFT_RESTART")]
    record_drift_restart: bool,

    /// Playlist scratch directory, relative to the media root
    #[arg(long, global = true, env = "SHIFTCAST_SCRATCH_DIR", default_value = DEFAULT_SCRATCH_DIR)]
    scratch_dir: PathBuf,

    /// Directory for the service's own logs
    #[arg(long, global = true, env = "SHIFTCAST_LOG_DIR", default_value = DEFAULT_LOG_DIR)]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the enforcer until interrupted
    Run,
    /// Print the ffmpeg command a channel would run now
    ShowCmd {
        /// Channel id or name
        channel: String,
        #[arg(long, value_parser = parse_purpose, default_value = "record")]
        purpose: JobPurpose,
    },
    /// Build one job now and run it in the foreground until it exits
    RunJob {
        /// Channel id or name
        channel: String,
        #[arg(long, value_parser = parse_purpose, default_value = "record")]
        purpose: JobPurpose,
    },
    /// Print whether a channel's jobs are active
    Schedule {
        /// Channel id or name
        channel: String,
        /// Local time to evaluate, e.g. 2025-03-10T08:30:00
        #[arg(long, value_parser = parse_local_datetime)]
        at: Option<NaiveDateTime>,
    },
    /// Run one retention pass
    Prune {
        /// Channel id or name; all channels when omitted
        channel: Option<String>,
        /// Report what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the self-test channel as JSON
    TestChannel {
        #[arg(long, default_value_t = 9999)]
        id: i64,
        #[arg(long, default_value = "udp://127.0.0.1:5002")]
        output: String,
    },
}

impl Args {
    fn enforcer_config(&self) -> EnforcerConfig {
        EnforcerConfig {
            channels_file: self.channels.clone(),
            media_root: self.media_root.clone(),
            ffmpeg_path: self.ffmpeg.clone(),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            prune_interval: Duration::from_secs(self.prune_interval_secs),
            playback_window: Duration::from_secs(self.playback_window_secs),
            stop_grace: Duration::from_secs(self.stop_grace_secs),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
            tail_search_days: self.tail_search_days,
            record_drift_restart: self.record_drift_restart,
            scratch_dir: self.scratch_dir.clone(),
            log_dir: self.log_dir.clone(),
        }
    }
}

fn parse_purpose(s: &str) -> Result<JobPurpose, String> {
    JobPurpose::parse(s).ok_or_else(|| format!("unknown purpose '{s}', expected record or playback"))
}

fn parse_local_datetime(s: &str) -> Result<NaiveDateTime, String> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s.trim(), fmt).ok())
        .ok_or_else(|| format!("invalid local date-time '{s}'"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let config = args.enforcer_config();
    config.validate()?;

    match &args.command {
        Commands::Run => run(config, args.log_filter.as_deref()).await,
        Commands::ShowCmd { channel, purpose } => {
            logging::init_console_logging(args.log_filter.as_deref())?;
            show_cmd(&config, channel, *purpose).await
        }
        Commands::RunJob { channel, purpose } => {
            logging::init_console_logging(args.log_filter.as_deref())?;
            run_job(&config, channel, *purpose).await
        }
        Commands::Schedule { channel, at } => {
            logging::init_console_logging(args.log_filter.as_deref())?;
            schedule(&config, channel, *at).await
        }
        Commands::Prune { channel, dry_run } => {
            logging::init_console_logging(args.log_filter.as_deref())?;
            prune(&config, channel.as_deref(), *dry_run).await
        }
        Commands::TestChannel { id, output } => test_channel(*id, output),
    }
}

async fn run(config: EnforcerConfig, log_filter: Option<&str>) -> anyhow::Result<()> {
    let (logging_config, _guard) = logging::init_logging(&config.log_dir)?;
    if let Some(directive) = log_filter {
        logging_config.set_filter(directive)?;
    }
    info!(
        filter = %logging_config.get_filter(),
        log_dir = %logging_config.log_dir().display(),
        "Logging initialised"
    );

    let token = CancellationToken::new();
    logging_config.start_retention_cleanup(token.clone());

    let source = Arc::new(JsonFileSource::new(&config.channels_file));
    let enforcer = Enforcer::new(
        config,
        source,
        Arc::new(TokioProcessManager::new()),
        Arc::new(SystemClock),
    )?;

    let signal_token = token.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    let result = enforcer.run(token.clone()).await;
    token.cancel();
    result.context("enforcer stopped")
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn load_snapshot(config: &EnforcerConfig) -> anyhow::Result<ConfigSnapshot> {
    let source = JsonFileSource::new(&config.channels_file);
    Ok(source.snapshot().await?)
}

fn find_channel<'a>(
    snapshot: &'a ConfigSnapshot,
    selector: &str,
) -> anyhow::Result<&'a ChannelEntry> {
    match snapshot.find(selector) {
        Some(entry) => Ok(entry),
        None => bail!("no valid channel matches '{selector}'"),
    }
}

async fn show_cmd(
    config: &EnforcerConfig,
    selector: &str,
    purpose: JobPurpose,
) -> anyhow::Result<()> {
    let snapshot = load_snapshot(config).await?;
    let entry = find_channel(&snapshot, selector)?;
    let builder = CommandBuilder::new(config.command_settings());

    let command = builder.build(&entry.channel, entry.profile(), purpose, SystemClock.now())?;
    println!("{}", command.to_shell_string());
    Ok(())
}

async fn run_job(
    config: &EnforcerConfig,
    selector: &str,
    purpose: JobPurpose,
) -> anyhow::Result<()> {
    let snapshot = load_snapshot(config).await?;
    let entry = find_channel(&snapshot, selector)?;
    let builder = CommandBuilder::new(config.command_settings());

    let command =
        builder.build_and_prepare(&entry.channel, entry.profile(), purpose, SystemClock.now())?;
    info!(channel = %entry.channel.label(), %purpose, command = %command.to_shell_string(), "Running job");

    let spec = SpawnSpec {
        argv: command.argv,
        log_path: builder.log_path(&entry.channel, purpose),
    };

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    let manager = TokioProcessManager::new();
    match run_to_completion(&manager, &spec, &cancel, config.poll_interval, config.stop_grace)
        .await?
    {
        RunOutcome::Exited(Some(0)) | RunOutcome::Stopped => Ok(()),
        RunOutcome::Exited(code) => bail!(
            "{} exited with {}; see {}",
            spec.argv.first().map(String::as_str).unwrap_or("process"),
            code.map_or_else(|| "a signal".to_string(), |c| format!("status {c}")),
            spec.log_path.display()
        ),
    }
}

async fn schedule(
    config: &EnforcerConfig,
    selector: &str,
    at: Option<NaiveDateTime>,
) -> anyhow::Result<()> {
    let snapshot = load_snapshot(config).await?;
    let entry = find_channel(&snapshot, selector)?;
    let now = at.unwrap_or_else(|| SystemClock.now());

    println!("channel:  {}", entry.channel.label());
    println!("at:       {now}");
    for purpose in JobPurpose::ALL {
        let active = is_desired(entry, purpose, now, config.tail_search_days);
        println!("{:<9} {}", format!("{purpose}:"), if active { "active" } else { "inactive" });
    }
    match last_schedule_end(&entry.channel.schedule, now, config.tail_search_days) {
        Some(end) => println!("last end: {end}"),
        None => println!("last end: none within {} days", config.tail_search_days),
    }
    Ok(())
}

async fn prune(
    config: &EnforcerConfig,
    selector: Option<&str>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let snapshot = load_snapshot(config).await?;
    let entries: Vec<&ChannelEntry> = match selector {
        Some(selector) => vec![find_channel(&snapshot, selector)?],
        None => snapshot.channels.iter().collect(),
    };

    let pruner = RetentionPruner::new(
        SegmentIndex::new(config.media_root.clone()),
        config.playback_window_delta(),
    );
    let now = SystemClock.now();
    let mut total = PruneStats::default();

    for entry in entries {
        match pruner.prune(&entry.channel, entry.profile(), now, dry_run) {
            Ok(stats) => {
                println!(
                    "{}: scanned {}, {} {}, protected {}, failed {}",
                    entry.channel.label(),
                    stats.scanned,
                    if dry_run { "would delete" } else { "deleted" },
                    stats.deleted,
                    stats.skipped_protected,
                    stats.failed
                );
                total += stats;
            }
            Err(e) => warn!(channel = %entry.channel.name, error = %e, "Pruning failed"),
        }
    }

    println!(
        "total: scanned {}, deleted {}, protected {}, failed {}",
        total.scanned, total.deleted, total.skipped_protected, total.failed
    );
    Ok(())
}

fn test_channel(id: i64, output: &str) -> anyhow::Result<()> {
    let today = SystemClock.now().date();
    let entry = ChannelEntry::new(
        ChannelConfig::test_channel(id, output, today),
        Some(ChannelConfig::test_channel_profile()),
    );
    println!("{}", serde_json::to_string_pretty(&entry)?);
    Ok(())
}
