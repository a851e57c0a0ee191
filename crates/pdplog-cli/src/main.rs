//! pdplog CLI: record and inspect power distribution current logs on the bench.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pdplog_core::{
    decode_record, ChannelLayout, FixedIdentifier, HostnameIdentifier, IdentifierProvider,
    LoggerConfig, SamplingEngine, SessionEnd, SimulatedPanel, PDP_CHANNELS,
};

#[derive(Parser)]
#[command(
    name = "pdplog",
    about = "Power distribution current logger",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a session from the simulated panel
    Record {
        /// Directory for the log file (default: first of /U, /V)
        #[arg(long, short)]
        dir: Option<PathBuf>,
        /// YAML logger configuration
        #[arg(long, short)]
        config: Option<PathBuf>,
        /// Polling period in milliseconds (minimum 25)
        #[arg(long, short)]
        period: Option<u64>,
        /// File name prefix (default: host name)
        #[arg(long)]
        identifier: Option<String>,
        /// Stop after this many seconds (default: run until Ctrl-C)
        #[arg(long)]
        duration: Option<u64>,
        /// Number of simulated channels
        #[arg(long, default_value_t = PDP_CHANNELS)]
        channels: usize,
        /// Omit channel 0, like the legacy robot logger
        #[arg(long)]
        legacy_layout: bool,
    },
    /// Summarize the channels of a recorded log
    Inspect {
        /// Path to a *current.csv log file
        file: PathBuf,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
        /// The file was written with channel 0 omitted
        #[arg(long)]
        legacy_layout: bool,
    },
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Record {
            dir,
            config,
            period,
            identifier,
            duration,
            channels,
            legacy_layout,
        } => {
            let mut logger = match config {
                Some(path) => LoggerConfig::from_yaml_file(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                None => LoggerConfig::default(),
            };
            if dir.is_some() {
                logger.directory = dir;
            }
            if let Some(p) = period {
                logger.period_ms = p;
            }
            if legacy_layout {
                logger.channels = ChannelLayout::SkipFirst;
            }
            let panel = SimulatedPanel::new(channels);
            let duration = duration.map(Duration::from_secs);
            match identifier {
                Some(id) => cmd_record(logger, panel, FixedIdentifier::new(id), duration)?,
                None => cmd_record(logger, panel, HostnameIdentifier, duration)?,
            }
        }
        Commands::Inspect {
            file,
            json,
            legacy_layout,
        } => {
            cmd_inspect(file, json, legacy_layout)?;
        }
    }

    Ok(())
}

// ─── Command implementations ──────────────────────────────────────────────────

fn cmd_record<I: IdentifierProvider + 'static>(
    config: LoggerConfig,
    panel: SimulatedPanel,
    identifier: I,
    duration: Option<Duration>,
) -> Result<()> {
    let engine = SamplingEngine::new(config, panel, identifier)?;

    // The engine runs its own runtime; this one only waits for a reason to stop.
    let waiter = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let started = waiter.block_on(async {
        // The handler is installed on first poll, which must precede start().
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        tokio::select! {
            biased;

            _ = &mut ctrl_c => {
                info!("interrupted before recording started");
                return anyhow::Ok(false);
            }
            _ = std::future::ready(()) => {}
        }

        engine.start()?;
        if let Some(path) = engine.session_path() {
            println!("Recording to {}", path.display());
        }

        let limit = async {
            match duration {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(limit);
        let mut health = tokio::time::interval(Duration::from_millis(250));

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("interrupted");
                    break;
                }
                _ = &mut limit => break,
                _ = health.tick() => {
                    if !engine.is_running() {
                        warn!("logging session ended on its own");
                        break;
                    }
                }
            }
        }
        anyhow::Ok(true)
    })?;
    if !started {
        return Ok(());
    }

    match engine.stop()? {
        Some(summary) => {
            println!(
                "Wrote {} records to {}",
                summary.records,
                summary.path.display()
            );
            if let SessionEnd::Failed(e) = summary.end {
                anyhow::bail!("session failed: {}", e);
            }
        }
        None => println!("No session was running."),
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct ChannelStats {
    channel: usize,
    samples: usize,
    min: f64,
    mean: f64,
    max: f64,
}

#[derive(Debug, Serialize)]
struct LogSummary {
    records: usize,
    skipped: usize,
    first: Option<String>,
    last: Option<String>,
    channels: Vec<ChannelStats>,
}

fn cmd_inspect(file: PathBuf, json: bool, legacy_layout: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("Log file not found: {}", file.display());
    }
    let content = fs::read_to_string(&file)?;
    let first_channel = if legacy_layout {
        ChannelLayout::SkipFirst.first_channel()
    } else {
        ChannelLayout::All.first_channel()
    };
    let summary = summarize(&content, first_channel);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Log: {}", file.display());
    println!("Records: {}", summary.records);
    if summary.skipped > 0 {
        println!("Skipped: {} malformed line(s)", summary.skipped);
    }
    if let (Some(first), Some(last)) = (&summary.first, &summary.last) {
        println!("Span: {} .. {}", first, last);
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(["Channel", "Samples", "Min (A)", "Mean (A)", "Max (A)"]);
    for stats in &summary.channels {
        table.add_row([
            stats.channel.to_string(),
            stats.samples.to_string(),
            format!("{:.3}", stats.min),
            format!("{:.3}", stats.mean),
            format!("{:.3}", stats.max),
        ]);
    }
    println!("{}", table);
    Ok(())
}

// ─── Utilities ────────────────────────────────────────────────────────────────

fn summarize(content: &str, first_channel: usize) -> LogSummary {
    let mut records = 0;
    let mut skipped = 0;
    let mut first = None;
    let mut last = None;
    let mut sums: Vec<(usize, f64, f64, f64)> = Vec::new();

    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        let record = match decode_record(line) {
            Ok(record) => record,
            Err(e) => {
                warn!("{}", e);
                skipped += 1;
                continue;
            }
        };
        records += 1;
        let stamp = record.timestamp.to_string();
        first.get_or_insert_with(|| stamp.clone());
        last = Some(stamp);

        if sums.len() < record.values.len() {
            sums.resize(record.values.len(), (0, f64::INFINITY, 0.0, f64::NEG_INFINITY));
        }
        for (slot, value) in sums.iter_mut().zip(&record.values) {
            slot.0 += 1;
            slot.1 = slot.1.min(*value);
            slot.2 += *value;
            slot.3 = slot.3.max(*value);
        }
    }

    let channels = sums
        .into_iter()
        .enumerate()
        .map(|(i, (samples, min, sum, max))| ChannelStats {
            channel: i + first_channel,
            samples,
            min,
            mean: sum / samples as f64,
            max,
        })
        .collect();

    LogSummary {
        records,
        skipped,
        first,
        last,
        channels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "\"2024-01-01:00:00:01\",\"1.0\",\"2.0\"\n\
                       \"2024-01-01:00:00:02\",\"3.0\",\"4.0\"\n\
                       \"2024-01-01:00:00:0";

    #[test]
    fn summarize_skips_truncated_tail() {
        let summary = summarize(LOG, 0);
        assert_eq!(summary.records, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.channels.len(), 2);
        assert_eq!(summary.channels[0].mean, 2.0);
        assert_eq!(summary.channels[1].min, 2.0);
        assert_eq!(summary.channels[1].max, 4.0);
        assert_eq!(summary.first.as_deref(), Some("2024-01-01 00:00:01"));
        assert_eq!(summary.last.as_deref(), Some("2024-01-01 00:00:02"));
    }

    #[test]
    fn legacy_logs_start_at_channel_one() {
        let summary = summarize(LOG, 1);
        assert_eq!(summary.channels[0].channel, 1);
        assert_eq!(summary.channels[1].channel, 2);
    }
}
