//! Command-line interface for note-hammer.
//!
//! Exports Kindle annotations from an Android device over `adb` and converts
//! the exported notebook files to markdown.
//!
//! # Usage
//!
//! ```bash
//! # Export every book in the "To Export" collection
//! note-hammer export
//!
//! # Pick the device and collection, stop after five books
//! note-hammer export -d emulator-5554 -c "Book Club" --max-items 5
//!
//! # App already open on the right screen
//! note-hammer export --no-launch
//!
//! # Convert exported notebooks to markdown, backing them up first
//! note-hammer extract -i ~/OneDrive/Kindle -o ~/vault/books -b ~/backups -y
//!
//! # List attached devices
//! note-hammer devices
//!
//! # Dump the current screen's elements, e.g. when a label changed
//! note-hammer inspect --find export --clickable
//! ```

mod inspect;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use clap::{Parser, Subcommand};
use notehammer_core::adb::{list_devices, resolve_serial, AdbExecutor};
use notehammer_core::config::{delay_from_secs, notehammer_dir, HammerConfig, MAX_EXPORT_DELAY};
use notehammer_core::coordinator::{RunCoordinator, RunError};
use notehammer_core::device::Device;
use notehammer_core::driver::TransportError;
use notehammer_core::stats::{RunReport, RunStatus};
use notehammer_notes::files;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Export Kindle annotations from an Android device and convert them to markdown.
#[derive(Parser)]
#[command(name = "note-hammer")]
#[command(about = "Export Kindle annotations from an Android device and convert them to markdown")]
#[command(version)]
struct Cli {
    /// Settings file to use instead of ~/.notehammer/config.json
    #[arg(long, global = true, env = "NOTEHAMMER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export the annotations of every book in a collection
    Export {
        /// Device serial (required when several devices are attached)
        #[arg(short, long, env = "NOTEHAMMER_DEVICE")]
        device: Option<String>,
        /// Collection whose books are exported
        #[arg(short, long, default_value = "To Export", env = "NOTEHAMMER_COLLECTION")]
        collection: String,
        /// Seconds to wait for each upload to settle (at most 3600)
        #[arg(long, value_parser = parse_delay)]
        delay: Option<Duration>,
        /// Stop after this many books
        #[arg(short, long)]
        max_items: Option<usize>,
        /// Attempts per book
        #[arg(short, long)]
        retries: Option<u32>,
        /// Do not launch the app first
        #[arg(long)]
        no_launch: bool,
        /// Do not write a JSON run report
        #[arg(long)]
        no_report: bool,
    },

    /// Convert exported notebook HTML files to markdown
    Extract {
        /// A notebook .html file or a folder searched recursively
        #[arg(short, long, default_value = ".")]
        input: PathBuf,
        /// Folder the markdown files are written to
        #[arg(short, long, default_value = "export")]
        output: PathBuf,
        /// Folder for a backup of the input; an empty value disables the backup
        #[arg(short, long, default_value = "backup")]
        backup: String,
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// List attached Android devices
    Devices {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the elements on the device's current screen as JSON
    Inspect {
        /// Device serial (required when several devices are attached)
        #[arg(short, long, env = "NOTEHAMMER_DEVICE")]
        device: Option<String>,
        /// Only elements whose text or label contains this (case-insensitive)
        #[arg(short, long)]
        find: Option<String>,
        /// Only clickable elements
        #[arg(long)]
        clickable: bool,
        /// Also save the raw UI dump into this folder
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let default_level = match cli.command {
        Command::Export { .. } => "info",
        _ => "warn",
    };
    let _guard = init_logging(default_level);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

/// Logs to stderr and to a daily file under `~/.notehammer/logs/`.
///
/// The file sink is skipped if the folder cannot be created.
fn init_logging(default_level: &str) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let stderr_layer = fmt::layer().with_writer(io::stderr);

    let log_dir = notehammer_dir().join("logs");
    let (file_layer, guard) = match std::fs::create_dir_all(&log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(&log_dir, "note-hammer.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    guard
}

#[derive(Debug)]
enum CliError {
    /// The run finished but some items failed, or the user declined.
    Failed(String),
    Device(String),
    Navigation(String),
    Io(String),
    Interrupted,
}

impl CliError {
    fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Failed(_) => ExitCode::from(1),
            CliError::Device(_) => ExitCode::from(2),
            CliError::Navigation(_) => ExitCode::from(3),
            CliError::Io(_) => ExitCode::from(4),
            CliError::Interrupted => ExitCode::from(130),
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Failed(msg) => write!(f, "{}", msg),
            CliError::Device(msg) => write!(f, "Device error: {}", msg),
            CliError::Navigation(msg) => write!(f, "{}", msg),
            CliError::Io(msg) => write!(f, "I/O error: {}", msg),
            CliError::Interrupted => write!(f, "Interrupted"),
        }
    }
}

impl From<TransportError> for CliError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Spawn { .. } => {
                CliError::Device(format!("{} (is adb from the Android platform tools on PATH?)", err))
            }
            other => CliError::Device(other.to_string()),
        }
    }
}

impl From<RunError> for CliError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::Interrupted => CliError::Interrupted,
            RunError::Navigation(_) => CliError::Navigation(err.to_string()),
            RunError::Device(_) => CliError::Device(err.to_string()),
        }
    }
}

impl From<notehammer_notes::NotesError> for CliError {
    fn from(err: notehammer_notes::NotesError) -> Self {
        CliError::Io(err.to_string())
    }
}

fn load_config(path: Option<&Path>) -> HammerConfig {
    match path {
        Some(path) => HammerConfig::load_from(path),
        None => HammerConfig::load(),
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(cli.config.as_deref());
    match cli.command {
        Command::Export {
            device,
            collection,
            delay,
            max_items,
            retries,
            no_launch,
            no_report,
        } => {
            let options = ExportOptions {
                device,
                collection,
                delay,
                max_items,
                retries,
                no_launch,
                no_report,
            };
            export(&config, options).await
        }
        Command::Extract {
            input,
            output,
            backup,
            yes,
        } => extract(&input, &output, &backup, yes),
        Command::Devices { json } => devices(json).await,
        Command::Inspect {
            device,
            find,
            clickable,
            save,
        } => inspect_screen(&config, device.as_deref(), find.as_deref(), clickable, save.as_deref()).await,
    }
}

fn parse_delay(value: &str) -> Result<Duration, String> {
    let secs: f64 = value.trim().parse().map_err(|e| format!("{e}"))?;
    delay_from_secs(secs).ok_or_else(|| {
        format!("expected a number of seconds between 0 and {}", MAX_EXPORT_DELAY.as_secs())
    })
}

struct ExportOptions {
    device: Option<String>,
    collection: String,
    delay: Option<Duration>,
    max_items: Option<usize>,
    retries: Option<u32>,
    no_launch: bool,
    no_report: bool,
}

async fn export(settings: &HammerConfig, options: ExportOptions) -> Result<(), CliError> {
    let mut config = settings.run_config(options.collection.trim());
    if let Some(delay) = options.delay {
        config.export_delay = delay;
    }
    if let Some(retries) = options.retries {
        config.retry_attempts = retries;
    }
    if options.no_launch {
        config.launch_component = None;
    }
    config.max_items = options.max_items;

    let serial = resolve_serial(options.device.as_deref()).await?;
    config.device_serial = Some(serial.clone());
    info!(device = %serial, collection = %config.collection_name, "starting export");

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, stopping after the current command.");
            on_signal.cancel();
        }
    });

    let started = Local::now();
    let collection = config.collection_name.clone();
    let device = Device::for_run(Arc::new(AdbExecutor::new(serial.clone())), &config);
    let mut coordinator = RunCoordinator::new(device, config);
    let result = coordinator.run(&cancel).await;
    let stats = coordinator.stats().clone();

    println!("{}", stats.summary());

    if !options.no_report {
        let (status, error) = match &result {
            Ok(_) => (RunStatus::Completed, None),
            Err(e) => (e.status(), Some(e.to_string())),
        };
        let report = RunReport::new(collection, serial, started, status, error, stats.clone());
        match write_report(&report) {
            Ok(path) => eprintln!("Report written to {}", path.display()),
            Err(e) => warn!(error = %e, "could not write run report"),
        }
    }

    result?;
    if stats.failed() > 0 {
        return Err(CliError::Failed(format!(
            "{} of {} items failed",
            stats.failed(),
            stats.attempted()
        )));
    }
    Ok(())
}

fn write_report(report: &RunReport) -> io::Result<PathBuf> {
    let dir = notehammer_dir().join("reports");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(report.file_name());
    let json = serde_json::to_string_pretty(report).map_err(io::Error::other)?;
    std::fs::write(&path, json)?;
    Ok(path)
}

fn extract(input: &Path, output: &Path, backup: &str, yes: bool) -> Result<(), CliError> {
    if !yes && !confirm(&format!("Process the notes in {}?", input.display()))? {
        return Err(CliError::Failed("Aborted".to_string()));
    }

    if !backup.is_empty() {
        let target = files::backup(input, Path::new(backup), Local::now())?;
        eprintln!("Backed up {} to {}", input.display(), target.display());
    }

    let result = files::extract_kindle_notes(input, output)?;
    println!(
        "Extracted {} notes to {} in {:.2}s",
        result.notes,
        output.display(),
        result.elapsed.as_secs_f64()
    );
    Ok(())
}

/// Asks a yes/no question on stderr. Anything but `y`/`yes` is a no.
fn confirm(question: &str) -> Result<bool, CliError> {
    eprint!("{} [y/N]: ", question);
    io::stderr().flush().map_err(|e| CliError::Io(e.to_string()))?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .map_err(|e| CliError::Io(e.to_string()))?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

async fn devices(json: bool) -> Result<(), CliError> {
    let devices = list_devices().await?;
    if json {
        let out = serde_json::to_string_pretty(&devices).map_err(|e| CliError::Io(e.to_string()))?;
        println!("{}", out);
        return Ok(());
    }
    if devices.is_empty() {
        eprintln!("No devices attached");
        return Ok(());
    }
    for device in &devices {
        let model = device.model.as_deref().unwrap_or("-");
        println!("{}\t{}\t{}", device.serial, device.state, model);
    }
    Ok(())
}

async fn inspect_screen(
    settings: &HammerConfig,
    device: Option<&str>,
    find: Option<&str>,
    clickable: bool,
    save: Option<&Path>,
) -> Result<(), CliError> {
    let serial = resolve_serial(device).await?;
    let device = Device::new(Arc::new(AdbExecutor::new(serial)), settings.timing.clone())
        .with_snapshot_attempts(settings.limits.snapshot_attempts);
    let snapshot = device.snapshot().await.map_err(|e| CliError::Device(e.to_string()))?;

    if let Some(dir) = save {
        std::fs::create_dir_all(dir).map_err(|e| CliError::Io(e.to_string()))?;
        let path = dir.join(format!("ui_dump_{}.xml", Local::now().format("%Y-%m-%d_%H-%M-%S")));
        std::fs::write(&path, snapshot.raw()).map_err(|e| CliError::Io(e.to_string()))?;
        eprintln!("UI dump saved to {}", path.display());
    }

    let elements = inspect::select_elements(&snapshot, find, clickable);
    let out = serde_json::to_string_pretty(&elements).map_err(|e| CliError::Io(e.to_string()))?;
    println!("{}", out);
    if elements.is_empty() {
        eprintln!("No matching elements");
    }
    Ok(())
}
