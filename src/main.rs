//! Irrigation Monitor CLI
//!
//! Pump-state prediction over a rotating sensor feed.

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use irrigation_monitor::{
    activity::{read_snapshot, ActivityLog, SharedActivityLog},
    config::Config,
    core::{Frame, FrameBuilder},
    ingest::Features,
    model::PumpClassifier,
    session::{Session, TickOutcome},
    VERSION,
};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "irrigation-monitor")]
#[command(version = VERSION)]
#[command(about = "Pump-state prediction over a rotating sensor feed", long_about = None)]
struct Cli {
    /// Reference dataset (overrides config)
    #[arg(long, global = true)]
    reference: Option<PathBuf>,

    /// Persisted model file (overrides config)
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the feed over HTTP
    Serve {
        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,

        /// Seconds between feed ticks
        #[arg(long)]
        tick_secs: Option<u64>,
    },

    /// Show the feed in the terminal
    Watch {
        /// CSV file of readings; more paths can be typed on stdin
        file: Option<PathBuf>,

        /// Seconds between feed ticks
        #[arg(long)]
        tick_secs: Option<u64>,

        /// Stop after this many ticks
        #[arg(long)]
        ticks: Option<u64>,
    },

    /// Train the classifier from the reference dataset and save it
    Train {
        /// Where to write the model (overrides config)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Predict the pump state for one set of readings
    Predict {
        /// Soil moisture (Ohm)
        #[arg(long)]
        soil: f64,

        /// Temperature (°C)
        #[arg(long)]
        temperature: f64,

        /// Air humidity (%)
        #[arg(long)]
        humidity: f64,
    },

    /// Show activity statistics
    Status {
        /// Zero the saved totals
        #[arg(long)]
        reset: bool,
    },

    /// Show configuration
    Config {
        /// Write the effective configuration (including overrides) to the config file
        #[arg(long)]
        save: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            std::process::exit(1);
        }
    };
    if let Some(reference) = cli.reference {
        config.reference_data_path = reference;
    }
    if let Some(model) = cli.model {
        config.model_path = model;
    }

    let result = match cli.command {
        Commands::Serve { port, tick_secs } => cmd_serve(config, port, tick_secs),
        Commands::Watch {
            file,
            tick_secs,
            ticks,
        } => cmd_watch(config, file, tick_secs, ticks),
        Commands::Train { output } => {
            if let Some(output) = output {
                config.model_path = output;
            }
            cmd_train(&config)
        }
        Commands::Predict {
            soil,
            temperature,
            humidity,
        } => cmd_predict(&config, Features::new(soil, temperature, humidity)),
        Commands::Status { reset } => cmd_status(&config, reset),
        Commands::Config { save } => cmd_config(&config, save),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

/// Load the persisted classifier or train one. Failure is fatal.
fn load_classifier(config: &Config) -> anyhow::Result<Arc<PumpClassifier>> {
    if let Err(e) = config.ensure_directories() {
        tracing::warn!("Could not create directories: {e}");
    }
    let classifier = PumpClassifier::load_or_train(&config.model_path, &config.reference_data_path)
        .context("classifier unavailable; check the reference dataset or model file")?;
    Ok(Arc::new(classifier))
}

fn apply_tick_override(config: &mut Config, tick_secs: Option<u64>) -> anyhow::Result<()> {
    if let Some(secs) = tick_secs {
        config.tick_interval = Duration::from_secs(secs);
    }
    config.validate()?;
    Ok(())
}

#[cfg(feature = "server")]
fn cmd_serve(mut config: Config, port: Option<u16>, tick_secs: Option<u64>) -> anyhow::Result<()> {
    use irrigation_monitor::server::{run, ServerConfig};

    apply_tick_override(&mut config, tick_secs)?;
    if let Some(port) = port {
        config.port = port;
    }

    let classifier = load_classifier(&config)?;
    let activity = Arc::new(ActivityLog::persistent(config.activity_path()));

    let server_config = ServerConfig::new(config.port, config.tick_interval)
        .with_series_mode(config.series_mode)
        .with_parcels(config.parcels.clone())
        .with_max_upload_bytes(config.max_upload_bytes);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let (addr, shutdown_tx) = run(server_config, classifier, activity.clone()).await?;
        println!("Irrigation Monitor v{VERSION}");
        println!("  Listening on http://{addr}");
        println!("  Tick interval: {}s", config.tick_interval.as_secs());
        println!();
        println!("Press Ctrl+C to stop");

        tokio::signal::ctrl_c().await?;
        let _ = shutdown_tx.send(());
        anyhow::Ok(())
    })?;

    save_activity(&activity);
    println!();
    println!("{}", activity.summary());
    Ok(())
}

#[cfg(not(feature = "server"))]
fn cmd_serve(_config: Config, _port: Option<u16>, _tick_secs: Option<u64>) -> anyhow::Result<()> {
    anyhow::bail!("serve requires the `server` feature")
}

/// Events delivered to the watch loop.
enum WatchEvent {
    Upload(PathBuf),
    Clear,
}

impl WatchEvent {
    /// A line typed on stdin: `clear` drops the dataset, anything else is a path.
    fn from_line(line: &str) -> Option<Self> {
        match line.trim() {
            "" => None,
            "clear" => Some(WatchEvent::Clear),
            path => Some(WatchEvent::Upload(PathBuf::from(path))),
        }
    }
}

fn cmd_watch(
    mut config: Config,
    file: Option<PathBuf>,
    tick_secs: Option<u64>,
    max_ticks: Option<u64>,
) -> anyhow::Result<()> {
    apply_tick_override(&mut config, tick_secs)?;

    let classifier = load_classifier(&config)?;
    let activity = Arc::new(ActivityLog::persistent(config.activity_path()));
    let builder = FrameBuilder::new(config.parcels.clone(), config.series_mode);
    let mut session = Session::new(classifier, activity.clone());

    println!("Irrigation Monitor v{VERSION}");
    println!("  Tick interval: {}s", config.tick_interval.as_secs());
    println!("  Type a CSV path and press Enter to load another file, or `clear` to unload.");
    println!("  Press Ctrl+C to stop");
    println!();

    if let Some(path) = file {
        upload_file(&mut session, &path);
    }
    if !session.is_ready() {
        println!("Please upload a CSV file.");
    }

    // Uploads arrive from stdin independently of the tick timer.
    let (sender, receiver) = crossbeam_channel::unbounded::<WatchEvent>();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let Some(event) = WatchEvent::from_line(&line) else {
                continue;
            };
            if sender.send(event).is_err() {
                break;
            }
        }
    });

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    let mut stdin_open = true;
    let mut ticks_done: u64 = 0;
    let mut next_tick = Instant::now();

    while running.load(Ordering::SeqCst) {
        let wait = next_tick
            .saturating_duration_since(Instant::now())
            .min(Duration::from_millis(100));

        if stdin_open {
            match receiver.recv_timeout(wait) {
                Ok(WatchEvent::Upload(path)) => {
                    upload_file(&mut session, &path);
                    // Show the new file's first window right away.
                    next_tick = Instant::now();
                }
                Ok(WatchEvent::Clear) => {
                    session.clear();
                    println!("Please upload a CSV file.");
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => stdin_open = false,
            }
        } else {
            thread::sleep(wait);
        }

        if Instant::now() < next_tick {
            continue;
        }

        match session.tick(&builder) {
            Ok(TickOutcome::Rendered(frame)) => print_frame(&frame),
            Ok(TickOutcome::NoInput) => {}
            Err(e) => eprintln!("Warning: {e}"),
        }
        next_tick = Instant::now() + config.tick_interval;

        ticks_done += 1;
        if max_ticks.is_some_and(|max| ticks_done >= max) {
            break;
        }
    }

    save_activity(&activity);
    println!();
    println!("{}", activity.summary());
    Ok(())
}

fn upload_file(session: &mut Session, path: &Path) {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Could not open {}: {e}", path.display());
            return;
        }
    };

    match session.upload(file, Utc::now()) {
        Ok(rows) => println!("Loaded {rows} readings from {}", path.display()),
        Err(e) => eprintln!("Could not load {}: {e}", path.display()),
    }
}

fn print_frame(frame: &Frame) {
    println!(
        "[{}] Irrigation status (rows {}-{} of {})",
        frame.computed_at.format("%H:%M:%S"),
        frame.cursor,
        frame.cursor + 1,
        frame.dataset_len
    );
    println!(
        "  {:<10} {:>20} {:>18} {:>18} {:>10}",
        "Parcel", "Soil Moisture (Ohm)", "Temperature (°C)", "Air Humidity (%)", "Irrigation"
    );
    for parcel in &frame.parcels {
        println!(
            "  {:<10} {:>20} {:>18} {:>18} {:>10}",
            parcel.name,
            parcel.soil_moisture.value,
            parcel.temperature.value,
            parcel.air_humidity.value,
            parcel.irrigation
        );
    }

    let averages: Vec<String> = frame
        .charts
        .iter()
        .map(|chart| {
            let means: Vec<String> = chart
                .series
                .iter()
                .map(|s| match s.mean {
                    Some(mean) => format!("{mean:.2}"),
                    None => "-".to_string(),
                })
                .collect();
            format!("{} avg {} {}", chart.metric.column(), means.join("/"), chart.unit)
        })
        .collect();
    println!("  {}", averages.join(" | "));
    println!();
}

fn cmd_train(config: &Config) -> anyhow::Result<()> {
    if let Err(e) = config.ensure_directories() {
        tracing::warn!("Could not create directories: {e}");
    }

    let classifier =
        PumpClassifier::train_from_file(&config.reference_data_path, &config.model_path)?;

    println!("Trained on {} rows", classifier.training_rows());
    match classifier.holdout_accuracy() {
        Some(accuracy) => println!("Holdout accuracy: {:.1}%", accuracy * 100.0),
        None => println!("Holdout accuracy: n/a (too few rows)"),
    }
    println!("Saved model to {:?}", config.model_path);
    Ok(())
}

fn cmd_predict(config: &Config, features: Features) -> anyhow::Result<()> {
    if let Some(metric) = features.first_non_finite() {
        anyhow::bail!("'{}' must be a finite number", metric.column());
    }

    let classifier = load_classifier(config)?;
    let state = classifier.predict_state(&features)?;

    println!("Pump Data: {}", state.label());
    println!("Irrigation: {state}");
    println!(
        "Probability on: {:.2}",
        classifier.pump_probability(&features)
    );
    Ok(())
}

fn cmd_status(config: &Config, reset: bool) -> anyhow::Result<()> {
    let stats_path = config.activity_path();
    if reset {
        let activity = ActivityLog::persistent(stats_path.clone());
        activity.reset();
        activity.save()?;
        println!("Activity totals reset.");
        println!();
    }

    println!("Irrigation Monitor Status");
    println!("=========================");
    println!();

    println!("Configuration:");
    println!("  Reference data: {:?}", config.reference_data_path);
    println!(
        "  Model: {:?} ({})",
        config.model_path,
        if config.model_path.exists() {
            "saved"
        } else {
            "not trained yet"
        }
    );
    println!("  Tick interval: {}s", config.tick_interval.as_secs());
    println!();

    match read_snapshot(&stats_path)? {
        Some(stats) => {
            println!("Cumulative Statistics:");
            println!("  Uploads accepted: {}", stats.uploads_accepted);
            println!("  Uploads rejected: {}", stats.uploads_rejected);
            println!("  Predictions: {}", stats.predictions);
            println!("  Frames rendered: {}", stats.ticks_rendered);
            println!("  Idle ticks: {}", stats.ticks_idle);
            println!(
                "  Last run: {} ({}s)",
                stats.session_start.format("%Y-%m-%d %H:%M:%S"),
                stats.session_duration_secs
            );
        }
        None => println!("No previous session data found."),
    }
    Ok(())
}

fn cmd_config(config: &Config, save: bool) -> anyhow::Result<()> {
    if save {
        config.validate()?;
        config.save()?;
        println!("Saved configuration to {:?}", Config::config_path());
        println!();
    }

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

fn save_activity(activity: &SharedActivityLog) {
    if let Err(e) = activity.save() {
        eprintln!("Warning: Could not save activity log: {e}");
    }
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl+C handler")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_input_lines() {
        assert!(WatchEvent::from_line("   ").is_none());
        assert!(matches!(WatchEvent::from_line(" clear "), Some(WatchEvent::Clear)));
        match WatchEvent::from_line(" data/readings.csv\n") {
            Some(WatchEvent::Upload(path)) => assert_eq!(path, PathBuf::from("data/readings.csv")),
            _ => panic!("expected an upload"),
        }
    }
}
