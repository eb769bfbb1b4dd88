//! findfish CLI: calibrate a stereo rig, triangulate matched points and
//! process recorded video pairs.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use findfish::calib::{
    Calibrate, CalibrationConfig, CalibrationPlan, CameraSpec, DotGrid, FsImageLoader,
    GeometricCalibrator, StereoArtifact, StereoUndistorter, STEREO_ARTIFACT,
};
use findfish::{scan_dir, ProcessorConfig, VideoPairCoordinator, IMAGE_EXTENSIONS};
use serde_json::json;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "findfish")]
#[command(about = "Stereo fish-video pipeline: calibration, stream sync and activity events")]
#[command(version)]
struct Cli {
    /// More log output (-v debug, -vv trace). `RUST_LOG` takes precedence in
    /// `tracing` builds.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Emit log events as JSON (builds with the `tracing` feature).
    #[arg(long, global = true)]
    json_log: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Calibrate one camera, or a stereo pair, from dot-grid images.
    Calibrate(CalibrateArgs),

    /// Triangulate matched keypoints with a stereo calibration.
    Triangulate(TriangulateArgs),

    /// Sync, undistort and track every recorded pair in a directory.
    Process(ProcessArgs),
}

#[derive(Debug, Clone, Args)]
struct CalibrateArgs {
    /// Directory of left (or single) camera images.
    #[arg(long)]
    left: PathBuf,

    /// Directory of right camera images. Omit for single-camera calibration.
    #[arg(long)]
    right: Option<PathBuf>,

    /// Dots per row.
    #[arg(long, default_value = "19")]
    cols: usize,

    /// Dots per column.
    #[arg(long, default_value = "11")]
    rows: usize,

    /// Dot spacing in world units.
    #[arg(long, default_value = "13.0")]
    spacing: f64,

    /// Directory for calibration artifacts.
    #[arg(long, default_value = "calib_config")]
    out_dir: PathBuf,

    /// Stereo artifact file name inside the output directory.
    #[arg(long, default_value = STEREO_ARTIFACT)]
    name: String,
}

#[derive(Debug, Clone, Args)]
struct TriangulateArgs {
    /// JSON file with `keypoints_left` and `keypoints_right`.
    #[arg(long)]
    points: PathBuf,

    /// Stereo calibration artifact.
    #[arg(long)]
    calib: PathBuf,

    /// Directory for `object_points.json`.
    #[arg(long, default_value = "calib_config")]
    out_dir: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct ProcessArgs {
    /// Directory holding one subdirectory of frames per recording.
    #[arg(long)]
    videos: PathBuf,

    /// Stereo calibration artifact.
    #[arg(long)]
    calib: PathBuf,

    /// Processor settings (JSON). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for synced frames and event files.
    #[arg(long, default_value = "out")]
    out_dir: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init_logging(&cli) {
        eprintln!("error: {err}");
        return ExitCode::FAILURE;
    }
    let result = match cli.command {
        Commands::Calibrate(args) => run_calibrate(&args),
        Commands::Triangulate(args) => run_triangulate(&args),
        Commands::Process(args) => run_process(&args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(feature = "tracing")]
fn init_logging(cli: &Cli) -> CliResult<()> {
    let level = findfish::level_from_verbosity(cli.verbose, cli.quiet);
    findfish::init_tracing(cli.json_log, level);
    Ok(())
}

#[cfg(not(feature = "tracing"))]
fn init_logging(cli: &Cli) -> CliResult<()> {
    findfish::init_with_level(findfish::level_from_verbosity(cli.verbose, cli.quiet))?;
    if cli.json_log {
        log::warn!("--json-log needs the tracing feature; using plain logs");
    }
    Ok(())
}

fn camera_images(dir: &Path) -> CliResult<CameraSpec> {
    let images = scan_dir(dir, IMAGE_EXTENSIONS)
        .map_err(|e| format!("cannot list {}: {e}", dir.display()))?;
    if images.is_empty() {
        return Err(format!("no images in {}", dir.display()).into());
    }
    Ok(CameraSpec::from_dir(dir, images))
}

fn run_calibrate(args: &CalibrateArgs) -> CliResult<()> {
    let left = camera_images(&args.left)?;
    let plan = match &args.right {
        Some(right) => CalibrationPlan::stereo(left, camera_images(right)?),
        None => CalibrationPlan::single(left),
    };
    let config = CalibrationConfig {
        grid: DotGrid::new(args.cols, args.rows, args.spacing),
        out_dir: args.out_dir.clone(),
        stereo_file: args.name.clone(),
        ..CalibrationConfig::default()
    };
    let mut calib = GeometricCalibrator::new(plan, config);
    calib.find_points(&FsImageLoader)?;
    calib.calibrate()?;

    let result = calib.result();
    let cameras: Vec<_> = result
        .cameras
        .iter()
        .flatten()
        .map(|c| {
            json!({
                "fx": c.camera.k[(0, 0)],
                "fy": c.camera.k[(1, 1)],
                "cx": c.camera.k[(0, 2)],
                "cy": c.camera.k[(1, 2)],
                "rms": c.rms,
                "views": c.poses.len(),
            })
        })
        .collect();
    let (w, h) = calib.image_size();
    let summary = json!({
        "image_size": [w, h],
        "images_used": calib.input().good_images.len(),
        "cameras": cameras,
        "stereo_rms": result.stereo.as_ref().and_then(|s| s.rms),
        "baseline": result.stereo.as_ref().map(|s| s.t.norm()),
        "out_dir": args.out_dir,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn run_triangulate(args: &TriangulateArgs) -> CliResult<()> {
    let plan = CalibrationPlan::stereo(
        CameraSpec::new("left", Vec::new()),
        CameraSpec::new("right", Vec::new()),
    );
    let config = CalibrationConfig {
        out_dir: args.out_dir.clone(),
        ..CalibrationConfig::default()
    };
    let mut calib = GeometricCalibrator::new(plan, config);
    calib.load_point_file(&args.points)?;
    calib.load_stereo_artifact(&args.calib)?;
    let sets = calib.triangulate_points()?;
    let points: usize = sets.iter().map(Vec::len).sum();
    println!(
        "{}",
        json!({
            "sets": sets.len(),
            "points": points,
            "out": args.out_dir.join(findfish::calib::OBJECT_POINTS_FILE),
        })
    );
    Ok(())
}

fn run_process(args: &ProcessArgs) -> CliResult<()> {
    let model = StereoArtifact::load_json(&args.calib)?.decode()?;
    let config = match &args.config {
        Some(path) => ProcessorConfig::load_json(path)?,
        None => ProcessorConfig::default(),
    };
    let undistorter = StereoUndistorter::new(&model.left, &model.right, model.image_size);
    let coordinator = VideoPairCoordinator::new(Arc::new(undistorter), config, &args.out_dir);

    let pairs = coordinator.discover(&args.videos)?;
    if pairs.is_empty() {
        return Err(format!("no recording pairs in {}", args.videos.display()).into());
    }
    let reports = coordinator.run(&pairs);
    let failed: Vec<&str> = reports
        .iter()
        .filter(|r| !r.is_ok())
        .map(|r| r.tag.as_str())
        .collect();
    for report in &reports {
        if let Ok(summary) = &report.result {
            println!(
                "{}",
                json!({
                    "tag": report.tag,
                    "offset": summary.offset,
                    "frames": summary.frames_written,
                    "events": coordinator.events_path(&report.tag),
                })
            );
        }
    }
    if failed.is_empty() {
        Ok(())
    } else {
        Err(format!("{} of {} pairs failed: {}", failed.len(), reports.len(), failed.join(", ")).into())
    }
}
