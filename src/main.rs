//! mindstream - live synthetic telemetry in the terminal
//!
//! Usage:
//!   mindstream --duration 30 --level info --export-dir ./exports
//!   mindstream --seed 7 --format jsonl --quiet --export-dir /tmp/ms
//!   mindstream --dump-config > mindstream.toml
//!
//! Runs the engine for `--duration` seconds (or until the run completes on
//! its own), streams matching log entries to stdout, then prints the
//! filtered view summary and optionally writes export artifacts.

use anyhow::{bail, Context};
use clap::Parser;
use mindstream_core::filter::{self, FilterState};
use mindstream_core::{ComponentFilter, ExportFormat, LevelFilter, LogEntry};
use mindstream_engine::{EngineConfig, EngineEvent, RunState, StreamEngine};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "mindstream", about = "Bounded synthetic log and metric streams")]
struct Cli {
    /// Path to config file (TOML). Missing file means defaults.
    #[arg(long, default_value = "mindstream.toml")]
    config: PathBuf,

    /// Seed every random source for a reproducible run.
    #[arg(long)]
    seed: Option<u64>,

    /// Seconds to run before completing.
    #[arg(long, default_value_t = 10.0)]
    duration: f64,

    /// Level filter: all, debug, info, warning, error, consciousness.
    #[arg(long, default_value = "all")]
    level: LevelFilter,

    /// Only show entries from this component.
    #[arg(long)]
    component: Option<String>,

    /// Case-insensitive substring to match in message or component.
    #[arg(long, default_value = "")]
    search: String,

    /// Export format: json or jsonl.
    #[arg(long, default_value = "json")]
    format: ExportFormat,

    /// Write the filtered logs and metric history here when the run ends.
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Don't stream entries while running; print the summary only.
    #[arg(long)]
    quiet: bool,

    /// Dump default config as TOML and exit.
    #[arg(long)]
    dump_config: bool,

    /// Also write tracing output to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.dump_config {
        println!("{}", EngineConfig::default().to_toml());
        return Ok(());
    }

    let _log_guard = init_tracing(cli.log_file.as_deref())?;

    if !(cli.duration.is_finite() && cli.duration > 0.0) {
        bail!("--duration must be a positive number of seconds");
    }

    let mut config = EngineConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }

    let filter = FilterState {
        level: cli.level,
        component: cli.component.clone().map(ComponentFilter::from).unwrap_or_default(),
        search: cli.search.clone(),
    };

    let mut engine = StreamEngine::new(config)?;
    let mut events = engine.subscribe();
    engine.start()?;
    info!(
        "Run {} started for {:.1}s (filter: level={}, component={}, search={:?})",
        engine.run().id,
        cli.duration,
        filter.level,
        String::from(filter.component.clone()),
        filter.search
    );

    let deadline = tokio::time::sleep(Duration::from_secs_f64(cli.duration));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                if engine.state() == RunState::Running {
                    engine.complete()?;
                }
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted");
                if !engine.state().is_terminal() {
                    engine.fail("interrupted")?;
                }
                break;
            }
            event = events.recv() => match event {
                Ok(EngineEvent::Log(entry)) => {
                    if !cli.quiet && filter.matches(&entry) {
                        println!("{}", render(&entry));
                    }
                }
                Ok(EngineEvent::Metric(_)) => {}
                Ok(EngineEvent::Progress { progress, .. }) => {
                    if !cli.quiet {
                        println!("-- progress {:.1}%", progress);
                    }
                }
                Ok(EngineEvent::State { state, .. }) => {
                    if state.is_terminal() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("Terminal fell behind, skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            },
        }
    }
    engine.shutdown().await;

    print_summary(&engine, &filter)?;

    if let Some(dir) = &cli.export_dir {
        let logs = engine.export_logs(&filter, cli.format)?;
        let path = logs.write_to(dir)?;
        println!("Wrote {}", path.display());
        let metrics = engine.export_metrics()?;
        let path = metrics.write_to(dir)?;
        println!("Wrote {}", path.display());
    }

    Ok(())
}

fn render(entry: &LogEntry) -> String {
    format!(
        "{} #{:<5} {:<13} {:<14} {}",
        entry.timestamp.with_timezone(&chrono::Local).format("%H:%M:%S%.3f"),
        entry.id,
        entry.level.as_str().to_uppercase(),
        entry.component,
        entry.message
    )
}

fn print_summary(engine: &StreamEngine, filter: &FilterState) -> anyhow::Result<()> {
    let all = engine.all_logs();
    let view = engine.logs(filter);

    println!();
    println!("Run: {}", serde_json::to_string(&engine.run())?);
    println!("Logs: {} buffered, {} match the filter", all.len(), view.len());
    for (level, count) in filter::level_counts(&view) {
        println!("  {:<13} {}", level.as_str(), count);
    }
    println!("Components: {}", filter::components(&view).join(", "));
    println!("Metrics:");
    for sample in engine.metrics() {
        println!("  {:<22} {:>10.3}", sample.name, sample.value);
    }
    Ok(())
}

/// stderr always; a non-blocking file writer too when `log_file` is set.
/// The returned guard must live until exit so buffered lines are flushed.
fn init_tracing(
    log_file: Option<&Path>,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let name = path
                .file_name()
                .with_context(|| format!("--log-file {} has no file name", path.display()))?;
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            let layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mindstream=info,mindstream_engine=info,mindstream_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(guard)
}
