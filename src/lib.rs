//! # scenestitch
//!
//! Stitch the per-frame camera images of a multi-sensor driving dataset into
//! one video per scene and sensor, and link each video back to the samples it
//! was built from.
//!
//! A recording is a set of samples, each tagged with a scene ID, a sensor
//! (group slice), and a timestamp. For every scene, `scenestitch` groups the
//! camera frames by sensor, orders them by time, derives the capture rate from
//! the timestamps, encodes them into
//! `scene_{scene_id}_{sensor}_generated.mp4` next to the first frame, and
//! writes that path into a configurable field of every contributing sample.
//! [`reset_video_field`] undoes the whole thing.
//!
//! ## Quick Start
//!
//! ### Assemble every scene
//!
//! ```no_run
//! use scenestitch::{AssembleOptions, FfmpegCommandEncoder, JsonDataset, SceneVideoAssembler};
//!
//! let mut dataset = JsonDataset::open("datasets/drive.json").unwrap();
//! let encoder = FfmpegCommandEncoder::new();
//! let report = SceneVideoAssembler::new(&mut dataset, &encoder, AssembleOptions::new())
//!     .unwrap()
//!     .assemble_all()
//!     .unwrap();
//! println!("{} videos", report.total_videos);
//! ```
//!
//! ### Inspect the frames of one scene
//!
//! ```no_run
//! use scenestitch::{AssembleOptions, JsonDataset, collect_scene_frames, resolve_frame_rate};
//!
//! let dataset = JsonDataset::open("datasets/drive.json").unwrap();
//! let options = AssembleOptions::new();
//! let scene = serde_json::json!("scene-0061");
//! for (sensor, track) in collect_scene_frames(&dataset, &scene, &options).unwrap() {
//!     let fps = resolve_frame_rate(&track.timestamps(), None);
//!     println!("{sensor}: {} frames at {fps:.2} fps", track.len());
//! }
//! ```
//!
//! ### Reset
//!
//! ```no_run
//! use scenestitch::{JsonDataset, ResetOptions, reset_video_field};
//!
//! let mut dataset = JsonDataset::open("datasets/drive.json").unwrap();
//! let report = reset_video_field(&mut dataset, &ResetOptions::new().dry_run(true)).unwrap();
//! println!("{} samples would be reset", report.affected_samples);
//! ```
//!
//! ## Features
//!
//! - **Frame inventory** — camera frames per scene and sensor, timestamp
//!   ordered, with optional generated-image substitution
//! - **Frame rate resolution** — mean capture interval, clamped to 1–120 fps,
//!   or a fixed override
//! - **Encoding** — external `ffmpeg` process by default, in-process through
//!   the FFmpeg libraries with the `libav` feature
//! - **Write-back** — produced video paths stored on every contributing sample
//! - **Reuse** — existing videos are linked without re-encoding unless
//!   overwrite is requested
//! - **Reset** — clear the field and delete the produced files, with dry run
//! - **Progress callbacks** for long runs
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `libav` | `LibavEncoder`, in-process encoding via `ffmpeg-next` |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! The default encoder needs an `ffmpeg` executable with `libx264`. The
//! `libav` feature needs the FFmpeg development libraries instead.

pub mod assemble;
pub mod configuration;
pub mod dataset;
pub mod encode;
pub mod error;
pub mod ffmpeg;
pub mod frame_rate;
pub mod inventory;
#[cfg(feature = "libav")]
pub mod libav;
pub mod progress;
pub mod reset;
pub mod store;
mod utilities;

pub use assemble::{
    AssemblyReport, SceneReport, SceneVideoAssembler, TrackOutcome, TrackReport,
    assemble_scene_videos,
};
pub use configuration::{AssembleOptions, ResetOptions, TimestampUnit};
pub use dataset::{
    Dataset, FieldKind, FieldValue, MediaType, RESERVED_FIELDS, Sample, SampleId, camera_sensors,
    is_camera_sensor,
};
pub use encode::{FfmpegCommandEncoder, FrameEncoder, VideoCodec, probe_frames};
pub use error::{ErrorKind, StitchError};
#[cfg(feature = "libav")]
pub use ffmpeg::set_ffmpeg_log_level;
pub use ffmpeg::FfmpegLogLevel;
pub use frame_rate::{
    DEFAULT_FRAME_RATE, FrameIntervalAnalysis, MAX_FRAME_RATE, MIN_FRAME_RATE,
    analyze_frame_intervals, frame_rate_from_timestamps, resolve_frame_rate,
};
pub use inventory::{Frame, SceneInventory, SensorTrack, collect_scene_frames};
#[cfg(feature = "libav")]
pub use libav::LibavEncoder;
pub use progress::{OperationType, ProgressCallback, ProgressInfo};
pub use reset::{DeletionError, ResetReport, reset_video_field};
pub use store::JsonDataset;
pub use utilities::{scene_id_label, scene_video_path};
