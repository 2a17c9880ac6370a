//! HRV Sensor Agent CLI
//!
//! Records heart-rate variability from a sensor trace and hands the
//! record to a bonded peer when the session ends.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hrv_sensor_agent::{
    audit::PersistedStats,
    power::{LogWakeLock, PowerLease},
    sensor::ReplayFeed,
    transfer::{TcpRadio, ThreadSleeper, TransferCandidate},
    transfer_record, Agent, Config, TransferError, TransferReport, VERSION,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "hrv-agent")]
#[command(version = VERSION)]
#[command(about = "Wearable heart-rate variability recorder", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a session from a sensor trace, then send the record
    Run {
        /// JSON Lines trace of heart-rate and accelerometer readings
        #[arg(long)]
        trace: PathBuf,

        /// Replay speed multiplier
        #[arg(long, default_value = "1.0")]
        speed: f64,

        /// Bonded peer as name=host:port (repeatable, tried in order)
        #[arg(long = "peer", value_parser = parse_peer)]
        peers: Vec<TransferCandidate>,
    },

    /// Send an existing record to the bonded peers
    Send {
        /// Record file (defaults to the configured record path)
        #[arg(long, short)]
        file: Option<PathBuf>,

        /// Bonded peer as name=host:port (repeatable, tried in order)
        #[arg(long = "peer", value_parser = parse_peer)]
        peers: Vec<TransferCandidate>,
    },

    /// Show record and cumulative session statistics
    Status,

    /// Show configuration
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            trace,
            speed,
            peers,
        } => cmd_run(trace, speed, peers),
        Commands::Send { file, peers } => cmd_send(file, peers),
        Commands::Status => {
            cmd_status();
            Ok(())
        }
        Commands::Config => {
            cmd_config();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn cmd_run(trace: PathBuf, speed: f64, peers: Vec<TransferCandidate>) -> Result<()> {
    println!("HRV Sensor Agent v{VERSION}");
    println!();

    let config = with_peers(Config::load().unwrap_or_default(), peers);
    config
        .ensure_directories()
        .context("creating data directory")?;

    let feed = ReplayFeed::from_file(&trace, speed)
        .with_context(|| format!("loading trace {trace:?}"))?;
    if feed.is_empty() {
        bail!("trace {trace:?} contains no readings");
    }
    let finished = feed.finished_flag();

    println!("Starting session...");
    println!("  Trace: {:?} ({} readings, {}x)", trace, feed.len(), speed);
    println!("  Record: {:?}", config.record_path());
    println!("  Write interval: {}s", config.write_interval.as_secs());
    println!("  Bonded peers: {}", config.bonded_peers.len());
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let radio = TcpRadio::new(config.bonded_peers.clone(), config.connect_timeout);
    let agent = Agent::start(
        config,
        Box::new(feed),
        Box::new(radio),
        Arc::new(LogWakeLock),
    )
    .context("starting agent")?;

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    let mut last_status = Instant::now();
    while running.load(Ordering::SeqCst) && !finished.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));

        if last_status.elapsed() >= Duration::from_secs(5) {
            let snapshot = agent.snapshot();
            println!(
                "[{}] HR: {} | RMSSD: {} | Stress: {}",
                chrono::Local::now().format("%H:%M:%S"),
                snapshot
                    .heart_rate
                    .map_or_else(|| "-".to_string(), |bpm| format!("{bpm:.0}")),
                snapshot
                    .rmssd
                    .map_or_else(|| "-".to_string(), |v| format!("{v:.1}ms")),
                snapshot.stress.map_or("-", |s| s.label()),
            );
            last_status = Instant::now();
        }
    }

    println!();
    if running.load(Ordering::SeqCst) {
        println!("Trace finished, tearing down...");
    } else {
        println!("Stopping session...");
    }

    let audit = agent.state().audit.clone();
    let report = agent.teardown();

    println!();
    println!("Record: {:?}", report.record);
    println!("Rows written: {}", report.rows_written);
    if !report.final_write_ok {
        eprintln!("Warning: final row could not be written");
    }
    print_transfer(&report.transfer);

    println!();
    println!("{}", audit.summary());
    Ok(())
}

fn cmd_send(file: Option<PathBuf>, peers: Vec<TransferCandidate>) -> Result<()> {
    let config = with_peers(Config::load().unwrap_or_default(), peers);
    let record = file.unwrap_or_else(|| config.record_path());

    println!("Sending {record:?} to {} peer(s)...", config.bonded_peers.len());

    let radio = TcpRadio::new(config.bonded_peers.clone(), config.connect_timeout);
    let lease = PowerLease::new(Arc::new(LogWakeLock));
    let result = transfer_record(
        &record,
        &radio,
        config.transfer.clone(),
        &lease,
        config.transfer_lease,
        &ThreadSleeper,
    );
    print_transfer(&result);

    result.map(|_| ()).map_err(Into::into)
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("HRV Sensor Agent Status");
    println!("=======================");
    println!();

    println!("Configuration:");
    println!("  Write interval: {}s", config.write_interval.as_secs());
    println!("  Bonded peers: {}", config.bonded_peers.len());
    for peer in &config.bonded_peers {
        println!("    - {peer}");
    }
    println!();

    let record = config.record_path();
    match std::fs::metadata(&record) {
        Ok(meta) => println!("Record: {:?} ({} bytes)", record, meta.len()),
        Err(_) => println!("Record: none at {record:?}"),
    }
    println!();

    let stats_path = config.audit_path();
    let stats = std::fs::read_to_string(&stats_path)
        .ok()
        .and_then(|content| serde_json::from_str::<PersistedStats>(&content).ok());
    match stats {
        Some(stats) => {
            println!("Cumulative Statistics:");
            println!("  Heart-rate ticks: {}", stats.heart_rate_ticks);
            println!("  Acceleration samples: {}", stats.acceleration_samples);
            println!("  Readings dropped: {}", stats.dropped_readings);
            println!("  Rows written: {}", stats.rows_written);
            println!("  Write failures: {}", stats.write_failures);
            println!("  Transfers completed: {}", stats.transfers_completed);
            println!("  Transfers failed: {}", stats.transfers_failed);
            println!("  Bytes transferred: {}", stats.bytes_transferred);
            println!(
                "  Last updated: {}",
                stats.last_updated.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        None => println!("No previous session data found."),
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn print_transfer(result: &Result<TransferReport, TransferError>) {
    match result {
        Ok(report) => {
            println!(
                "Transfer: {} bytes sent to {} (attempts: {}, peers tried: {})",
                report.bytes_sent, report.peer, report.connect_attempts, report.peers_tried
            );
        }
        Err(TransferError::AllPeersExhausted { failures }) => {
            eprintln!("Transfer failed; record kept on local storage.");
            for failure in failures {
                eprintln!("  {}: {}", failure.peer, failure.reason);
            }
        }
        Err(e) => eprintln!("Transfer skipped: {e}"),
    }
}

/// Peers given on the command line replace the configured list.
fn with_peers(mut config: Config, peers: Vec<TransferCandidate>) -> Config {
    if !peers.is_empty() {
        config.bonded_peers = peers;
    }
    config
}

fn parse_peer(value: &str) -> Result<TransferCandidate, String> {
    match value.split_once('=') {
        Some((name, address)) if !name.is_empty() && !address.is_empty() => {
            Ok(TransferCandidate::new(name, address))
        }
        _ => Err(format!("expected name=host:port, got '{value}'")),
    }
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("setting Ctrl+C handler")
}
