use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use scenestitch::{
    AssembleOptions, AssemblyReport, Dataset, FfmpegCommandEncoder, FfmpegLogLevel, FrameEncoder,
    JsonDataset, ProgressCallback, ProgressInfo, ResetOptions, ResetReport, SceneVideoAssembler,
    TimestampUnit, TrackOutcome, VideoCodec, camera_sensors, reset_video_field,
};

#[cfg(feature = "libav")]
use scenestitch::LibavEncoder;

const CLI_AFTER_HELP: &str = "Examples:\n  scenestitch inspect drive-0042\n  scenestitch assemble drive-0042 --sensors CAM_FRONT,CAM_BACK --progress\n  scenestitch assemble data/drive.json --fps 12 --overwrite --json\n  scenestitch reset drive-0042 --dry-run\n  scenestitch completions zsh > _scenestitch";

#[derive(Debug, Parser)]
#[command(
    name = "scenestitch",
    version,
    about = "Assemble per-scene sensor videos from multi-sensor image datasets",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show additional logging output.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar.
    #[arg(long, global = true)]
    progress: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Directory holding datasets referenced by name.
    #[arg(long, global = true, env = "SCENESTITCH_ROOT", default_value = "datasets")]
    root: PathBuf,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build one video per scene and camera sensor.
    #[command(
        about = "Assemble scene videos",
        after_help = "Examples:\n  scenestitch assemble drive-0042\n  scenestitch assemble drive-0042 --scene scene-0061 --sensors CAM_FRONT --fps 12"
    )]
    Assemble {
        /// Dataset name or path to a dataset JSON file.
        dataset: String,
        /// Field holding the scene identifier.
        #[arg(long, default_value = "scene_id")]
        scene_id_field: String,
        /// Field holding the frame timestamp.
        #[arg(long, default_value = "timestamp")]
        timestamp_field: String,
        /// Unit of the timestamp field (s, ms, us, ns).
        #[arg(long, default_value = "s")]
        timestamp_unit: String,
        /// Fixed frame rate (1-120). Derived from timestamps when omitted.
        #[arg(long)]
        fps: Option<u32>,
        /// Prefer generated image variants when present.
        #[arg(long)]
        use_generated: bool,
        /// Field holding the generated image path.
        #[arg(long, default_value = "generated_filepath")]
        generated_field: String,
        /// Comma-separated sensors to process. All camera sensors when omitted.
        #[arg(long)]
        sensors: Option<String>,
        /// Field the video path is written to.
        #[arg(long, default_value = "video_path")]
        video_field: String,
        /// Only process this scene (repeatable).
        #[arg(long = "scene")]
        scenes: Vec<String>,
        /// Re-encode videos that already exist.
        #[arg(long)]
        overwrite: bool,
        /// FFmpeg executable.
        #[arg(long, env = "SCENESTITCH_FFMPEG", default_value = "ffmpeg")]
        ffmpeg: String,
        /// Per-video encoder timeout in seconds.
        #[arg(long)]
        timeout: Option<u64>,
        /// Quality (0-51, lower is better).
        #[arg(long, default_value_t = 23)]
        crf: u32,
        /// Video codec (h264, h265, mpeg4).
        #[arg(long, default_value = "h264")]
        codec: String,
        /// Encode in-process through the FFmpeg libraries (needs the `libav` feature).
        #[arg(long)]
        libav: bool,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Remove the video path field and the videos it references.
    #[command(
        about = "Reset assembled videos",
        after_help = "Examples:\n  scenestitch reset drive-0042 --dry-run\n  scenestitch reset drive-0042 --field video_path --keep-videos"
    )]
    Reset {
        /// Dataset name or path to a dataset JSON file.
        dataset: String,
        /// Field to remove.
        #[arg(long, default_value = "video_path")]
        field: String,
        /// Keep the video files; only remove the field.
        #[arg(long)]
        keep_videos: bool,
        /// Report what would change without changing anything.
        #[arg(long)]
        dry_run: bool,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the field schema and sensors of a dataset.
    #[command(about = "Inspect a dataset", visible_alias = "info")]
    Inspect {
        /// Dataset name or path to a dataset JSON file.
        dataset: String,
        /// Field holding the scene identifier.
        #[arg(long, default_value = "scene_id")]
        scene_id_field: String,
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_codec(value: &str) -> Option<VideoCodec> {
    match value.to_ascii_lowercase().as_str() {
        "h264" | "avc" | "x264" | "libx264" => Some(VideoCodec::H264),
        "h265" | "hevc" | "x265" | "libx265" => Some(VideoCodec::H265),
        "mpeg4" => Some(VideoCodec::Mpeg4),
        _ => None,
    }
}

fn parse_sensor_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|sensor| !sensor.is_empty())
        .map(str::to_string)
        .collect()
}

/// A dataset argument is a path when it names a `.json` file or contains a
/// separator, and a name under `root` otherwise.
fn resolve_dataset_path(dataset: &str, root: &Path) -> PathBuf {
    let as_path = Path::new(dataset);
    let is_path = as_path.extension().is_some_and(|ext| ext == "json")
        || as_path.components().count() > 1;
    if is_path {
        as_path.to_path_buf()
    } else {
        root.join(format!("{dataset}.json"))
    }
}

fn open_dataset(
    dataset: &str,
    global: &GlobalOptions,
) -> Result<JsonDataset, Box<dyn std::error::Error>> {
    let path = resolve_dataset_path(dataset, &global.root);
    if !path.is_file() {
        return Err(format!("dataset not found: {}", path.display()).into());
    }
    Ok(JsonDataset::open(&path)?)
}

fn init_logging(global: &GlobalOptions) {
    let default_filter = if global.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn ffmpeg_log_level(global: &GlobalOptions) -> Result<FfmpegLogLevel, Box<dyn std::error::Error>> {
    let Some(level) = &global.log_level else {
        return Ok(FfmpegLogLevel::default());
    };
    let parsed = level
        .parse::<FfmpegLogLevel>()
        .map_err(|_| format!("unsupported --log-level: {level}"))?;
    #[cfg(feature = "libav")]
    scenestitch::set_ffmpeg_log_level(parsed);
    Ok(parsed)
}

#[cfg(feature = "libav")]
fn select_encoder(
    libav: bool,
    command_encoder: FfmpegCommandEncoder,
    codec: VideoCodec,
    crf: u32,
) -> Box<dyn FrameEncoder> {
    if libav {
        Box::new(LibavEncoder::new().codec(codec).crf(crf))
    } else {
        Box::new(command_encoder)
    }
}

#[cfg(not(feature = "libav"))]
fn select_encoder(
    libav: bool,
    command_encoder: FfmpegCommandEncoder,
    _codec: VideoCodec,
    _crf: u32,
) -> Box<dyn FrameEncoder> {
    if libav {
        eprintln!(
            "{} {}",
            "warning:".yellow().bold(),
            "--libav requires building with the `libav` feature".yellow()
        );
    }
    Box::new(command_encoder)
}

/// Renders progress updates on an `indicatif` bar.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new(label: &'static str) -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.green} {prefix} {bar:40.cyan/blue} {pos}/{len} {msg}",
        )?;
        bar.set_style(style.progress_chars("##-"));
        bar.set_prefix(label);
        Ok(Self { bar })
    }
}

impl ProgressCallback for BarProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Some(total) = info.total {
            self.bar.set_length(total);
        }
        self.bar.set_position(info.current);
        if let Some(item) = &info.item {
            self.bar.set_message(item.clone());
        }
        if info.total.is_some_and(|total| info.current >= total) {
            self.bar.finish_with_message("done");
        }
    }
}

fn print_assembly_report(report: &AssemblyReport, verbose: bool) {
    for scene in &report.scenes {
        if let Some(error) = &scene.error {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("scene {}: {error}", scene.scene_id).yellow()
            );
            continue;
        }
        for track in &scene.tracks {
            match &track.outcome {
                TrackOutcome::Created { path } => {
                    println!("{} {}", "created".green().bold(), path.display())
                }
                TrackOutcome::Reused { path } => {
                    println!("{} {}", "reused".cyan().bold(), path.display())
                }
                TrackOutcome::Skipped { reason } if verbose => {
                    eprintln!("skipped scene {} {}: {reason}", scene.scene_id, track.sensor)
                }
                TrackOutcome::Skipped { .. } => {}
                TrackOutcome::Failed { error } => eprintln!(
                    "{} {}",
                    "failed:".red().bold(),
                    format!("scene {} {}: {error}", scene.scene_id, track.sensor).red()
                ),
            }
        }
    }

    println!(
        "{} {}",
        "success:".green().bold(),
        format!(
            "{} video(s) across {} scene(s): {} created, {} reused, {} skipped, {} failed",
            report.total_videos,
            report.scenes_processed,
            report.created,
            report.reused,
            report.skipped,
            report.failed
        )
        .green()
    );
}

fn print_reset_report(report: &ResetReport) {
    let prefix = if report.dry_run { "dry run:" } else { "success:" };
    for failure in &report.deletion_errors {
        eprintln!(
            "{} {}",
            "warning:".yellow().bold(),
            format!("could not delete {}: {}", failure.path.display(), failure.error).yellow()
        );
    }
    let summary = if report.dry_run {
        format!(
            "would reset '{}' on {} sample(s) and {} video file(s)",
            report.field,
            report.affected_samples,
            report.video_files.len()
        )
    } else {
        format!(
            "reset '{}' on {} sample(s); {} file(s) deleted, {} already missing",
            report.field, report.affected_samples, report.deleted_files, report.missing_files
        )
    };
    println!("{} {}", prefix.green().bold(), summary.green());
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(&cli.global);
    let log_level = ffmpeg_log_level(&cli.global)?;

    match cli.command {
        Commands::Assemble {
            dataset,
            scene_id_field,
            timestamp_field,
            timestamp_unit,
            fps,
            use_generated,
            generated_field,
            sensors,
            video_field,
            scenes,
            overwrite,
            ffmpeg,
            timeout,
            crf,
            codec,
            libav,
            json,
        } => {
            let mut dataset = open_dataset(&dataset, &cli.global)?;
            let unit: TimestampUnit = timestamp_unit.parse()?;
            let codec = parse_codec(&codec).ok_or(format!("unsupported --codec: {codec}"))?;

            let mut options = AssembleOptions::new()
                .with_scene_id_field(scene_id_field)
                .with_timestamp_field(timestamp_field)
                .with_timestamp_unit(unit)
                .with_use_generated(use_generated)
                .with_generated_path_field(generated_field)
                .with_video_path_field(video_field)
                .with_scenes(scenes)
                .with_overwrite(overwrite);
            if let Some(fps) = fps {
                options = options.with_fps_override(fps);
            }
            if let Some(sensors) = &sensors {
                options = options.with_target_sensors(parse_sensor_list(sensors));
            }
            if cli.global.progress {
                options = options.with_progress(Arc::new(BarProgress::new("scenes")?));
            }

            let mut command_encoder = FfmpegCommandEncoder::new()
                .program(ffmpeg)
                .codec(codec)
                .crf(crf)
                .log_level(log_level);
            if let Some(seconds) = timeout {
                command_encoder = command_encoder.timeout(Duration::from_secs(seconds));
            }
            let encoder = select_encoder(libav, command_encoder, codec, crf);

            let report =
                SceneVideoAssembler::new(&mut dataset, &*encoder, options)?.assemble_all()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_assembly_report(&report, cli.global.verbose);
            }
            if !report.is_success() {
                return Err(format!("{} track(s) or scene(s) failed", report.failed).into());
            }
        }
        Commands::Reset {
            dataset,
            field,
            keep_videos,
            dry_run,
            json,
        } => {
            let mut dataset = open_dataset(&dataset, &cli.global)?;
            let mut options = ResetOptions::new().field(field).dry_run(dry_run);
            if keep_videos {
                options = options.keep_videos();
            }
            if cli.global.progress {
                options = options.with_progress(Arc::new(BarProgress::new("files")?));
            }

            let report = reset_video_field(&mut dataset, &options)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_reset_report(&report);
            }
            if !report.is_success() {
                return Err(format!(
                    "{} file(s) could not be deleted",
                    report.deletion_errors.len()
                )
                .into());
            }
        }
        Commands::Inspect {
            dataset,
            scene_id_field,
            json,
        } => {
            let dataset = open_dataset(&dataset, &cli.global)?;
            let media_types = dataset.group_media_types();
            let cameras = camera_sensors(&media_types);
            let schema = dataset.field_schema();
            let scene_count = dataset.distinct_values(&scene_id_field).len();

            if json {
                let payload = json!({
                    "name": dataset.name(),
                    "samples": dataset.len(),
                    "scenes": scene_count,
                    "sensors": media_types
                        .iter()
                        .map(|(sensor, media_type)| (sensor.clone(), json!(media_type)))
                        .collect::<serde_json::Map<_, _>>(),
                    "camera_sensors": cameras,
                    "fields": schema
                        .iter()
                        .map(|(field, kind)| (field.clone(), json!(kind)))
                        .collect::<serde_json::Map<_, _>>(),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("{} {}", "dataset".bold(), dataset.name());
                println!("Samples: {}", dataset.len());
                println!("Scenes ({scene_id_field}): {scene_count}");
                println!("{}", "Sensors:".bold());
                for (sensor, media_type) in &media_types {
                    let marker = if cameras.contains(sensor) { " (camera)" } else { "" };
                    println!("  {sensor}: {media_type}{marker}");
                }
                println!("{}", "Fields:".bold());
                for (field, kind) in &schema {
                    println!("  {field}: {kind}");
                }
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "scenestitch", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}
