mod controller;

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    process,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::Local;
use clap::{Args, Parser, Subcommand, ValueEnum};
use env_logger::Builder;
use log::LevelFilter;
use thiserror::Error;

use scan_core::{
    config::{ConfigError, ScannerConfig},
    scan::{CaptureMode, ScanId, ScanIdError},
};
use scan_exporter::{read_ply_header, PlyError};
use scan_parser::{
    storage::PROCESSED_DIR, CropRect, PairSource as _, ScanStore, StorageError,
};
use scan_runner::{
    CaptureController as _, CaptureSequence, ControlError, Orchestrator, Poll,
    ReconstructionService, ScanState, ServiceError, MODEL_FILE,
};

use crate::controller::HttpController;

#[derive(Parser, Debug)]
#[command(
    name = "lscan",
    about = "Reconstructs point clouds from laser-line turntable scans",
    author = "MIERUNE Inc.",
    version = "0.0.1"
)]
struct Cli {
    /// Directory holding the `scan_*` folders
    #[arg(short, long, default_value = "images", value_name = "DIR")]
    root: PathBuf,

    /// JSON configuration file; missing keys use the built-in defaults
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Overrides RUST_LOG
    #[arg(long)]
    log_level: Option<LevelFilter>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Overrides {
    #[arg(long, global = true)]
    step_degrees: Option<f64>,

    #[arg(long, global = true)]
    fan_angle: Option<f64>,

    #[arg(long, global = true)]
    radius: Option<f64>,

    #[arg(long, global = true)]
    vertical_scale: Option<f64>,

    #[arg(long, global = true)]
    blur_kernel: Option<u32>,

    /// Write intermediate rasters next to the scan
    #[arg(long, global = true)]
    diagnostics: bool,

    /// Ignore `cropped/` even when present
    #[arg(long, global = true)]
    no_cropped: bool,

    /// Host of the motor / laser board
    #[arg(long, global = true, value_name = "HOST")]
    controller: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an empty scan directory
    New,
    /// List scans as JSON, newest first
    List,
    /// Delete a scan and everything under it
    Delete { scan_id: String },
    /// Write cropped copies of every image of a scan
    Crop {
        scan_id: String,
        #[arg(long)]
        x: u32,
        #[arg(long)]
        y: u32,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
    },
    /// Store an image file as a captured frame
    Import {
        file: PathBuf,
        #[arg(long, value_enum)]
        phase: Phase,
        #[arg(long)]
        step: u32,
        /// Defaults to the most recent scan
        #[arg(long)]
        scan_id: Option<String>,
    },
    /// Reconstruct a scan, streaming status events as `data:` lines
    Process {
        /// Defaults to the most recent scan
        scan_id: Option<String>,
    },
    /// Show the header of a scan's reconstructed model
    Info { scan_id: String },
    /// Run the motor / laser sequence, emitting one capture request per step
    Capture {
        /// Defaults to a new scan
        scan_id: Option<String>,
    },
    /// Switch the laser on
    LaserOn,
    /// Switch the laser off
    LaserOff,
    /// Start one full turn of the motor
    Step,
    /// Query the motor / laser board
    Status,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Phase {
    On,
    Off,
}

impl From<Phase> for CaptureMode {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::On => CaptureMode::LaserOn,
            Phase::Off => CaptureMode::LaserOff,
        }
    }
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    ScanId(#[from] ScanIdError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Ply(#[from] PlyError),
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error("failed to install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no scans found under {0}")]
    NoScans(PathBuf),
    #[error("reconstruction of {0} failed")]
    Failed(ScanId),
}

fn load_config(path: Option<&Path>, overrides: &Overrides) -> Result<ScannerConfig, ConfigError> {
    let mut config = match path {
        Some(path) => ScannerConfig::from_json_file(path)?,
        None => ScannerConfig::default(),
    };

    let geometry = &mut config.geometry;
    if let Some(v) = overrides.step_degrees {
        geometry.step_degrees = v;
    }
    if let Some(v) = overrides.fan_angle {
        geometry.fan_angle_deg = v;
    }
    if let Some(v) = overrides.radius {
        geometry.cylinder_radius = v;
    }
    if let Some(v) = overrides.vertical_scale {
        geometry.vertical_scale = v;
    }
    if let Some(v) = overrides.blur_kernel {
        config.reconstruction.blur_kernel_size = v;
    }
    if overrides.diagnostics {
        config.reconstruction.save_diagnostics = true;
    }
    if overrides.no_cropped {
        config.reconstruction.prefer_cropped = false;
    }
    if let Some(host) = &overrides.controller {
        config.capture.controller_host = host.clone();
    }

    config.validate()?;
    Ok(config)
}

fn resolve_scan(store: &ScanStore, scan_id: Option<&str>) -> Result<ScanId, AppError> {
    match scan_id {
        Some(id) => Ok(ScanId::parse(id)?),
        None => store
            .latest_scan()?
            .ok_or_else(|| AppError::NoScans(store.root().to_path_buf())),
    }
}

/// Writes one `data:` line to stdout.
fn emit(line: &str) {
    let mut out = std::io::stdout().lock();
    // stdout going away (e.g. a closed pipe) must not stop the run
    let _ = writeln!(out, "data: {line}\n").and_then(|_| out.flush());
}

fn capture(store: &ScanStore, config: &ScannerConfig, scan_id: ScanId) -> Result<(), AppError> {
    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        log::info!("stopping capture after the current step");
        handler_stop.store(true, Ordering::SeqCst);
    })?;

    let controller = HttpController::new(&config.capture);
    let sequence = CaptureSequence::new(config.capture.clone());
    let scan_dir = store.scan_dir(&scan_id);
    log::info!("capturing into {}", scan_dir.display());

    let mut encode_error = None;
    let report = sequence.run(
        &controller,
        &stop,
        |step, mode| {
            log::info!("capture request: step {} ({})", step, mode);
            let request = serde_json::json!({
                "status": "capture_request",
                "scan_id": scan_id,
                "step": step,
                "mode": mode,
                "path": scan_dir.join(mode.dir_name()).join(format!("image_{step}.jpg")),
            });
            emit(&request.to_string());
        },
        |progress| match serde_json::to_string(progress) {
            Ok(line) => emit(&line),
            Err(e) => encode_error = Some(e),
        },
    );
    if let Some(e) = encode_error {
        return Err(e.into());
    }

    let summary = serde_json::json!({
        "status": if report.completed { "scan_completed" } else { "scan_stopped" },
        "scan_id": scan_id,
        "images_requested": report.images_requested,
        "last_step": report.last_step,
    });
    emit(&summary.to_string());
    Ok(())
}

fn reconstruct(store: ScanStore, config: &ScannerConfig, scan_id: ScanId) -> Result<(), AppError> {
    let orchestrator = Orchestrator::new(store, config.geometry, config.reconstruction.clone())?;
    let service = ReconstructionService::new(orchestrator);
    let heartbeat = Duration::from_millis(config.reconstruction.heartbeat_interval_ms);

    let subscription = service.start(scan_id.clone())?;
    loop {
        let line = match subscription.poll(heartbeat) {
            Poll::Event(event) => {
                log::info!("{}", event.message());
                serde_json::to_string(&event)?
            }
            Poll::Heartbeat => r#"{"status":"heartbeat"}"#.to_string(),
            Poll::Closed => break,
        };
        emit(&line);
    }

    match service.wait(&scan_id)? {
        ScanState::Failed => Err(AppError::Failed(scan_id)),
        state => {
            log::info!("{} finished: {:?}", scan_id, state);
            Ok(())
        }
    }
}

fn run(args: Cli) -> Result<(), AppError> {
    let config = load_config(args.config.as_deref(), &args.overrides)?;
    let store =
        ScanStore::new(&args.root)?.with_prefer_cropped(config.reconstruction.prefer_cropped);

    match args.command {
        Command::New => {
            let id = store.create_scan()?;
            println!("{id}");
        }
        Command::List => {
            let scans = store.list_scans()?;
            println!("{}", serde_json::to_string_pretty(&scans)?);
        }
        Command::Delete { scan_id } => {
            store.delete_scan(&ScanId::parse(&scan_id)?)?;
        }
        Command::Crop {
            scan_id,
            x,
            y,
            width,
            height,
        } => {
            let id = ScanId::parse(&scan_id)?;
            let rect = CropRect {
                x,
                y,
                width,
                height,
            };
            let count = store.crop_scan(&id, rect)?;
            log::info!("cropped {} images of {}", count, id);
        }
        Command::Import {
            file,
            phase,
            step,
            scan_id,
        } => {
            let id = resolve_scan(&store, scan_id.as_deref())?;
            let bytes = fs::read(&file).map_err(|source| AppError::Read {
                path: file.clone(),
                source,
            })?;
            let path = store.save_capture(&id, phase.into(), step, &bytes)?;
            println!("{}", path.display());
        }
        Command::Process { scan_id } => {
            let id = resolve_scan(&store, scan_id.as_deref())?;
            log::info!("scan: {}", id);
            log::info!("geometry: {:?}", config.geometry);
            reconstruct(store, &config, id)?;
        }
        Command::Info { scan_id } => {
            let id = ScanId::parse(&scan_id)?;
            let path = store.scan_dir(&id).join(PROCESSED_DIR).join(MODEL_FILE);
            let header = read_ply_header(&path)?;
            println!("{}", path.display());
            println!("format: {}", header.format);
            println!("vertices: {}", header.vertex_count);
            println!("properties: {}", header.properties.join(", "));
        }
        Command::Capture { scan_id } => {
            let id = match scan_id {
                Some(id) => {
                    let id = ScanId::parse(&id)?;
                    if !store.scan_dir(&id).is_dir() {
                        return Err(StorageError::ScanNotFound(id).into());
                    }
                    id
                }
                None => store.create_scan()?,
            };
            capture(&store, &config, id)?;
        }
        Command::LaserOn => HttpController::new(&config.capture).laser_on()?,
        Command::LaserOff => HttpController::new(&config.capture).laser_off()?,
        Command::Step => HttpController::new(&config.capture).step_motor()?,
        Command::Status => {
            let body = HttpController::new(&config.capture).status()?;
            println!("{}", body.trim());
        }
    }
    Ok(())
}

fn main() {
    let args = Cli::parse();

    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, LevelFilter::Info)
        .parse_default_env();
    if let Some(level) = args.log_level {
        builder.filter(None, level);
    }
    builder.init();

    let start = std::time::Instant::now();
    if let Err(e) = run(args) {
        log::error!("{}", e);
        process::exit(1);
    }
    log::debug!("done in {:?}", start.elapsed());
}
