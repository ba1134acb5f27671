//! marksman - range session daemon
//!
//! Subcommands:
//! - `marksman run` - run the daemon with the console harness (default);
//!   `--live-view <PATH>` keeps the aimed camera picture in one JPEG file
//! - `marksman config` - print the effective configuration and its sources
//!
//! The console harness reads `press` / `release` or JSON commands from stdin
//! and writes session events to stdout as JSON lines. Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use marksconf::RangeConfig;
use marksman::console::{self, ConsoleConnector, ConsoleHarness, TestPatternCamera};
use marksman::{
    ChannelSink, Devices, FanoutSink, FileFrameSink, FrameSink, FsShotArchive, NoTargets,
    RangeDaemon, ReconnectPolicy, ReconnectingTrigger, SessionEvent, ShotArchive, SilentCue,
    Supervisor, TracingSink, TriggerBinding,
};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "marksman")]
#[command(about = "Live target-shooting session daemon")]
#[command(version)]
struct Cli {
    /// Config file used in place of ./marksman.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon, driven from the console
    Run {
        /// Do not write shot images to the captures directory
        #[arg(long)]
        no_archive: bool,

        /// Keep the latest live-view JPEG at this path
        #[arg(long, value_name = "PATH")]
        live_view: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = cli.command.unwrap_or(Commands::Run {
        no_archive: false,
        live_view: None,
    });
    match command {
        Commands::Config => {
            let (config, sources) = RangeConfig::load_with_sources_from(cli.config.as_deref())
                .context("Failed to load configuration")?;
            for file in &sources.files {
                println!("# loaded: {}", file.display());
            }
            for var in &sources.env_overrides {
                println!("# env override: {}", var);
            }
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Commands::Run {
            no_archive,
            live_view,
        } => {
            let config = RangeConfig::load_from(cli.config.as_deref())
                .context("Failed to load configuration")?;
            run(config, no_archive, live_view).await
        }
    }
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

async fn run(config: RangeConfig, no_archive: bool, live_view: Option<PathBuf>) -> Result<()> {
    init_tracing(&config.telemetry.log_level)?;
    info!("Marksman {} starting", env!("CARGO_PKG_VERSION"));

    config.validate().context("Invalid configuration")?;
    let binding = TriggerBinding::resolve(&config.trigger.key_name)
        .context("Trigger key is not mappable, refusing to start")?;

    let (channel_sink, events) = ChannelSink::new();
    let sink = Arc::new(
        FanoutSink::new()
            .with(Arc::new(TracingSink))
            .with(Arc::new(channel_sink)),
    );

    let camera = Arc::new(TestPatternCamera::new(
        config.camera.capture_width,
        config.camera.capture_height,
    ));
    let archive: Option<Arc<dyn ShotArchive>> = if no_archive {
        None
    } else {
        let archive = FsShotArchive::new(&config.paths.captures_dir);
        info!("Archiving shots under {}", archive.root().display());
        Some(Arc::new(archive))
    };
    let live_view: Option<Arc<dyn FrameSink>> = live_view.map(|path| {
        info!(
            "Live view at {} fps into {}",
            config.camera.fps,
            path.display()
        );
        Arc::new(FileFrameSink::new(path)) as Arc<dyn FrameSink>
    });
    let devices = Devices {
        camera,
        audio: Arc::new(SilentCue),
        detector: Arc::new(NoTargets),
        archive,
        sink,
        live_view,
    };

    let (connector, keys) = ConsoleConnector::new(format!("{} (console)", config.trigger.device_name));
    let trigger = ReconnectingTrigger::new(
        connector,
        config.trigger.device_name.clone(),
        binding,
        ReconnectPolicy::from(&config.trigger),
    );
    let trigger_connected = trigger.connection_flag();

    let mut supervisor = Supervisor::new();
    let shutdown_token = supervisor.token();
    supervisor.spawn("events", move |token| write_events(events, token));

    let daemon = RangeDaemon::new(config, devices);
    let running = daemon.spawn_with(supervisor, trigger, trigger_connected);

    let harness = ConsoleHarness::new(running.commands().clone(), keys, binding);
    let console_done = tokio::spawn(harness.run(console::spawn_stdin_reader(), shutdown_token.clone()));

    wait_for_shutdown(console_done).await;

    let report = running.shutdown().await;
    if !report.is_clean() {
        warn!("Workers failed during run: {:?}", report.failed);
    }
    info!("Shutdown complete");
    Ok(())
}

/// Block until Ctrl-C, SIGTERM, or the console input closes.
async fn wait_for_shutdown(console_done: tokio::task::JoinHandle<()>) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C), shutting down");
        }
        _ = sigterm() => {
            info!("Received SIGTERM, shutting down");
        }
        _ = console_done => {
            info!("Console closed, shutting down");
        }
    }
}

#[cfg(unix)]
async fn sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(e) => {
            warn!("SIGTERM handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn sigterm() {
    std::future::pending::<()>().await;
}

/// Forward session events to stdout, one JSON object per line.
async fn write_events(mut events: mpsc::UnboundedReceiver<SessionEvent>, shutdown: CancellationToken) {
    let mut stdout = tokio::io::stdout();
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                warn!("Cannot serialize {} event: {}", event.name(), e);
                continue;
            }
        };
        let written = async {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await
        };
        if let Err(e) = written.await {
            warn!("Stdout closed, events will only be logged: {}", e);
            break;
        }
    }
}
