use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use checkercal_core::{CalibratorConfig, RawImage};
use checkercal_pipeline::{
    CalibrationStatus, DetectionLog, MonoCalibrator, PngArtifactWriter, ReplayDetector,
    StereoCalibrator,
};
use clap::{Args, Parser, Subcommand};
use image::DynamicImage;

const PARAMETERS_FILE: &str = "CameraParameters.json";
const FAILED_PARAMETERS_FILE: &str = "CameraParametersFailed.json";

/// Replays recorded checkerboard detections through a calibration session.
#[derive(Debug, Parser)]
#[command(author, version, about = "Incremental checkerboard camera calibration")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Calibrate a single camera.
    Mono(MonoArgs),
    /// Calibrate a synchronized camera pair.
    Stereo(StereoArgs),
    /// Write the default configuration file.
    WriteConfig {
        #[arg(long, default_value = "CalibratorConfiguration.json")]
        output: PathBuf,
    },
}

#[derive(Debug, Args)]
struct SessionArgs {
    /// JSON configuration; defaults are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory for accepted images and corner overlays.
    #[arg(long)]
    artifacts: Option<PathBuf>,
    /// Directory receiving the parameter file.
    #[arg(long, default_value = ".")]
    output: PathBuf,
}

#[derive(Debug, Args)]
struct MonoArgs {
    #[command(flatten)]
    session: SessionArgs,
    /// Detection log with one entry per image.
    #[arg(long)]
    detections: PathBuf,
    /// Images in submission order.
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

#[derive(Debug, Args)]
struct StereoArgs {
    #[command(flatten)]
    session: SessionArgs,
    #[arg(long)]
    left_detections: PathBuf,
    #[arg(long)]
    right_detections: PathBuf,
    #[arg(long, num_args = 1.., required = true)]
    left: Vec<PathBuf>,
    #[arg(long, num_args = 1.., required = true)]
    right: Vec<PathBuf>,
}

/// Owned pixel data in a layout the calibrators accept.
struct LoadedImage {
    data: Vec<u8>,
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
}

impl LoadedImage {
    fn open(path: &Path) -> Result<Self> {
        let img = image::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let (width, height) = (img.width(), img.height());
        Ok(match img {
            DynamicImage::ImageLuma16(gray) => Self {
                data: gray.as_raw().iter().flat_map(|v| v.to_le_bytes()).collect(),
                width,
                height,
                bytes_per_pixel: 2,
            },
            other => Self {
                data: other.into_luma8().into_raw(),
                width,
                height,
                bytes_per_pixel: 1,
            },
        })
    }

    fn raw(&self) -> RawImage<'_> {
        RawImage::packed(&self.data, self.width, self.height, self.bytes_per_pixel)
    }
}

fn load_config(path: Option<&Path>) -> Result<CalibratorConfig> {
    match path {
        Some(path) => CalibratorConfig::load(path)
            .with_context(|| format!("failed to load configuration {}", path.display())),
        None => Ok(CalibratorConfig::default()),
    }
}

fn load_detector(path: &Path) -> Result<ReplayDetector> {
    let log = DetectionLog::load(path)?;
    log::debug!("{} detections in {}", log.frames.len(), path.display());
    Ok(ReplayDetector::from(log))
}

fn artifact_writer(dir: Option<&Path>) -> Result<Option<PngArtifactWriter>> {
    dir.map(|dir| PngArtifactWriter::new(dir).context("failed to prepare artifact directory"))
        .transpose()
}

fn result_path(output: &Path, calibrated: bool) -> PathBuf {
    output.join(if calibrated {
        PARAMETERS_FILE
    } else {
        FAILED_PARAMETERS_FILE
    })
}

fn run_mono(args: &MonoArgs) -> Result<PathBuf> {
    let config = load_config(args.session.config.as_deref())?;
    let detector = load_detector(&args.detections)?;
    let mut calib = MonoCalibrator::with_default_solver(config, detector)?;
    if let Some(sink) = artifact_writer(args.session.artifacts.as_deref())? {
        calib = calib.with_artifact_sink(sink);
    }
    fs::create_dir_all(&args.session.output)
        .with_context(|| format!("failed to create {}", args.session.output.display()))?;

    let mut calibrated = false;
    for path in &args.images {
        let image = LoadedImage::open(path)?;
        let status = calib.set_image(&image.raw());
        log::info!(
            "{}: {status} ({} accepted, coverage {:.1}%)",
            path.display(),
            calib.accepted_count(),
            100.0 * calib.coverage()
        );
        if status == CalibrationStatus::Calibrated {
            calibrated = true;
            break;
        }
    }
    if !calibrated {
        log::info!("images exhausted, solving with {} accepted", calib.accepted_count());
        calibrated = calib.force_solve() == CalibrationStatus::Calibrated;
    }

    let out = result_path(&args.session.output, calibrated);
    calib.save_parameters(&out)?;
    Ok(out)
}

fn run_stereo(args: &StereoArgs) -> Result<PathBuf> {
    if args.left.len() != args.right.len() {
        bail!(
            "left and right image lists differ in length: {} vs {}",
            args.left.len(),
            args.right.len()
        );
    }
    let config = load_config(args.session.config.as_deref())?;
    let left = load_detector(&args.left_detections)?;
    let right = load_detector(&args.right_detections)?;
    let mut calib = StereoCalibrator::with_default_solver(config, left, right)?;
    if let Some(sink) = artifact_writer(args.session.artifacts.as_deref())? {
        calib = calib.with_artifact_sink(sink);
    }
    fs::create_dir_all(&args.session.output)
        .with_context(|| format!("failed to create {}", args.session.output.display()))?;

    let mut calibrated = false;
    for (left_path, right_path) in args.left.iter().zip(&args.right) {
        let left = LoadedImage::open(left_path)?;
        let right = LoadedImage::open(right_path)?;
        let status = calib.set_image(&left.raw(), &right.raw());
        log::info!(
            "{} | {}: {status} ({} accepted)",
            left_path.display(),
            right_path.display(),
            calib.accepted_count()
        );
        if status == CalibrationStatus::Calibrated {
            calibrated = true;
            break;
        }
    }
    if !calibrated {
        log::info!("images exhausted, solving with {} pairs", calib.accepted_count());
        calibrated = calib.force_solve() == CalibrationStatus::Calibrated;
    }

    let out = result_path(&args.session.output, calibrated);
    calib.save_parameters(&out)?;
    Ok(out)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let written = match &cli.command {
        Command::Mono(args) => run_mono(args)?,
        Command::Stereo(args) => run_stereo(args)?,
        Command::WriteConfig { output } => {
            CalibratorConfig::default().save(output)?;
            output.clone()
        }
    };
    println!("{}", written.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkercal_core::{synthetic, CameraModel};
    use clap::CommandFactory;
    use image::{GrayImage, ImageBuffer, Luma};

    fn write_detections(path: &Path, frames: Vec<Option<Vec<[f64; 2]>>>) {
        let json = serde_json::to_string(&DetectionLog { frames }).unwrap();
        fs::write(path, json).unwrap();
    }

    fn synthetic_frames(n: usize) -> Vec<Option<Vec<[f64; 2]>>> {
        let board = CalibratorConfig::default().board();
        let cam = CameraModel::from_parts(700.0, 700.0, 319.5, 239.5, 0.0);
        synthetic::varied_board_poses(&board, n, 900.0)
            .iter()
            .map(|pose| {
                synthetic::project_board(&cam, pose, &board)
                    .map(|pts| pts.iter().map(|p| [p.x, p.y]).collect())
            })
            .collect()
    }

    fn write_images(dir: &Path, prefix: &str, n: usize) -> Vec<PathBuf> {
        (0..n)
            .map(|i| {
                let path = dir.join(format!("{prefix}{i}.png"));
                GrayImage::new(640, 480).save(&path).unwrap();
                path
            })
            .collect()
    }

    fn session(dir: &Path, config: Option<PathBuf>) -> SessionArgs {
        SessionArgs {
            config,
            artifacts: Some(dir.join("artifacts")),
            output: dir.join("out"),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn mono_run_writes_parameters_and_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let config = CalibratorConfig {
            min_num_images: 4,
            image_batch_size: 4,
            ..CalibratorConfig::default()
        };
        let config_path = dir.path().join("config.json");
        config.save(&config_path).unwrap();

        let mut frames = synthetic_frames(4);
        frames.insert(1, None);
        let detections = dir.path().join("detections.json");
        write_detections(&detections, frames);

        let args = MonoArgs {
            session: session(dir.path(), Some(config_path)),
            detections,
            images: write_images(dir.path(), "img", 5),
        };
        let out = run_mono(&args).unwrap();
        assert_eq!(out, dir.path().join("out").join(PARAMETERS_FILE));

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        let k = value["MonoCameraParameters"]["IntrinsicMatrix"].as_array().unwrap();
        assert!((k[0].as_f64().unwrap() - 700.0).abs() < 5.0);
        assert!(dir.path().join("artifacts").join("Image0004.png").exists());
        assert!(dir.path().join("artifacts").join("Corners_0004.png").exists());
    }

    #[test]
    fn mono_run_without_detections_records_failure() {
        let dir = tempfile::tempdir().unwrap();
        let detections = dir.path().join("detections.json");
        write_detections(&detections, vec![None, None]);
        let args = MonoArgs {
            session: session(dir.path(), None),
            detections,
            images: write_images(dir.path(), "img", 2),
        };
        let out = run_mono(&args).unwrap();
        assert_eq!(out, dir.path().join("out").join(FAILED_PARAMETERS_FILE));
        assert!(out.exists());
    }

    #[test]
    fn sixteen_bit_images_load_as_two_bytes_per_pixel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deep.png");
        let img: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_pixel(3, 2, Luma([0x1234u16]));
        img.save(&path).unwrap();

        let loaded = LoadedImage::open(&path).unwrap();
        assert_eq!(loaded.bytes_per_pixel, 2);
        assert_eq!(loaded.data.len(), 12);
        assert_eq!(&loaded.data[..2], &[0x34, 0x12]);
        let gray = loaded.raw().to_gray(false).unwrap();
        assert_eq!(gray.get_pixel(0, 0)[0], 0x12);
    }

    #[test]
    fn stereo_lists_must_pair_up() {
        let dir = tempfile::tempdir().unwrap();
        let args = StereoArgs {
            session: session(dir.path(), None),
            left_detections: dir.path().join("l.json"),
            right_detections: dir.path().join("r.json"),
            left: write_images(dir.path(), "l", 2),
            right: write_images(dir.path(), "r", 1),
        };
        let err = run_stereo(&args).unwrap_err();
        assert!(err.to_string().contains("differ in length"), "{err}");
    }

    #[test]
    fn stereo_run_calibrates_identical_views() {
        let dir = tempfile::tempdir().unwrap();
        let config = CalibratorConfig {
            min_num_images: 4,
            image_batch_size: 4,
            ..CalibratorConfig::default()
        };
        let config_path = dir.path().join("config.json");
        config.save(&config_path).unwrap();
        let left_detections = dir.path().join("l.json");
        let right_detections = dir.path().join("r.json");
        write_detections(&left_detections, synthetic_frames(4));
        write_detections(&right_detections, synthetic_frames(4));

        let args = StereoArgs {
            session: SessionArgs {
                artifacts: None,
                ..session(dir.path(), Some(config_path))
            },
            left_detections,
            right_detections,
            left: write_images(dir.path(), "l", 4),
            right: write_images(dir.path(), "r", 4),
        };
        let out = run_stereo(&args).unwrap();
        assert_eq!(out.file_name().unwrap(), PARAMETERS_FILE);
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        let t = value["StereoCameraParameters"]["TranslationMatrix"]
            .as_array()
            .unwrap();
        assert!(t.iter().all(|v| v.as_f64().unwrap().abs() < 1e-3));
    }

    #[test]
    fn default_configuration_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        CalibratorConfig::default().save(&path).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap(), CalibratorConfig::default());
        assert!(load_config(Some(&dir.path().join("missing.json"))).is_err());
    }
}
