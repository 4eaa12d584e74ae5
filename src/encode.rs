//! Video encoding: turn an ordered list of frame images into a video file.
//!
//! The assembler only sees the [`FrameEncoder`] trait. The default
//! implementation, [`FfmpegCommandEncoder`], runs the external `ffmpeg`
//! program over a concat list; with the `libav` feature,
//! [`LibavEncoder`](crate::LibavEncoder) encodes in-process instead.
//!
//! Both encoders write to a hidden sibling of the output path and rename it
//! into place only after a successful encode, so a failed run never leaves a
//! truncated video behind.
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::time::Duration;
//!
//! use scenestitch::{FfmpegCommandEncoder, FrameEncoder, StitchError};
//!
//! let frames: Vec<PathBuf> = (0..40)
//!     .map(|i| PathBuf::from(format!("frames/{i:04}.jpg")))
//!     .collect();
//! FfmpegCommandEncoder::new()
//!     .crf(20)
//!     .timeout(Duration::from_secs(300))
//!     .encode(&frames, "frames/clip.mp4".as_ref(), 12.0)?;
//! # Ok::<(), StitchError>(())
//! ```

use std::fs;
use std::io::{ErrorKind as IoErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;

use crate::error::StitchError;
use crate::ffmpeg::FfmpegLogLevel;
use crate::utilities::{
    container_format, diagnostic_tail, escape_concat_path, even_dimension, partial_output_path,
};

const DIAGNOSTIC_LINES: usize = 20;
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Encodes an ordered frame list into a video file.
///
/// Implementations must keep the frame order, which is the temporal order of
/// the video, and must not leave a partial file at `output` on failure.
pub trait FrameEncoder {
    /// Encode `frames` at `fps` frames per second into `output`, replacing
    /// any existing file.
    ///
    /// # Errors
    ///
    /// [`StitchError::NoFrames`] for an empty list; otherwise any encoding or
    /// I/O error.
    fn encode(&self, frames: &[PathBuf], output: &Path, fps: f64) -> Result<(), StitchError>;
}

impl<E: FrameEncoder + ?Sized> FrameEncoder for &E {
    fn encode(&self, frames: &[PathBuf], output: &Path, fps: f64) -> Result<(), StitchError> {
        (**self).encode(frames, output, fps)
    }
}

impl<E: FrameEncoder + ?Sized> FrameEncoder for Box<E> {
    fn encode(&self, frames: &[PathBuf], output: &Path, fps: f64) -> Result<(), StitchError> {
        (**self).encode(frames, output, fps)
    }
}

/// Supported output video codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoCodec {
    /// H.264 / AVC. This is the default.
    #[default]
    H264,
    /// H.265 / HEVC.
    H265,
    /// MPEG-4 Part 2.
    Mpeg4,
}

impl VideoCodec {
    /// Name of the FFmpeg encoder implementing this codec.
    pub fn encoder_name(self) -> &'static str {
        match self {
            VideoCodec::H264 => "libx264",
            VideoCodec::H265 => "libx265",
            VideoCodec::Mpeg4 => "mpeg4",
        }
    }
}

/// Check that every frame exists and return the dimensions of the first.
///
/// Only the first image's header is decoded; the output is sized from it and
/// later frames are scaled to match.
///
/// # Errors
///
/// - [`StitchError::NoFrames`] for an empty list.
/// - [`StitchError::MissingFrame`] for the first path that does not exist.
/// - [`StitchError::ImageError`] if the first frame is not a readable image.
pub fn probe_frames(frames: &[PathBuf]) -> Result<(u32, u32), StitchError> {
    let first = frames.first().ok_or(StitchError::NoFrames)?;
    if let Some(missing) = frames.iter().find(|path| !path.is_file()) {
        return Err(StitchError::MissingFrame(missing.clone()));
    }
    Ok(image::image_dimensions(first)?)
}

/// Remove a leftover partial output, ignoring a file that is already gone.
pub(crate) fn discard_partial(partial: &Path) {
    match fs::remove_file(partial) {
        Ok(()) => log::debug!("Removed partial output {:?}", partial),
        Err(error) if error.kind() == IoErrorKind::NotFound => {}
        Err(error) => log::warn!("Could not remove partial output {:?}: {error}", partial),
    }
}

/// Encodes by running the external `ffmpeg` program.
///
/// Frames are fed through FFmpeg's concat demuxer with a per-frame duration of
/// `1 / fps`, so the video lasts about `frames.len() / fps` seconds.
#[derive(Debug, Clone)]
pub struct FfmpegCommandEncoder {
    program: String,
    codec: VideoCodec,
    crf: u32,
    timeout: Option<Duration>,
    log_level: FfmpegLogLevel,
}

impl Default for FfmpegCommandEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegCommandEncoder {
    /// Create an encoder running `ffmpeg` from `PATH` with H.264 at CRF 23.
    pub fn new() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            codec: VideoCodec::H264,
            crf: 23,
            timeout: None,
            log_level: FfmpegLogLevel::Error,
        }
    }

    /// Use a different FFmpeg executable.
    #[must_use]
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Set the codec.
    #[must_use]
    pub fn codec(mut self, codec: VideoCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Set the CRF quality value (0-51, lower is better).
    #[must_use]
    pub fn crf(mut self, crf: u32) -> Self {
        self.crf = crf.min(51);
        self
    }

    /// Kill the encoder after this much wall-clock time.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set FFmpeg's own log level.
    #[must_use]
    pub fn log_level(mut self, level: FfmpegLogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Write the concat list for `frames`.
    ///
    /// The concat demuxer resolves relative entries against the list's own
    /// directory, so every frame is written as an absolute path.
    fn write_concat_list(&self, frames: &[PathBuf], fps: f64) -> Result<NamedTempFile, StitchError> {
        let mut list = tempfile::Builder::new()
            .prefix("scenestitch-")
            .suffix(".ffconcat")
            .tempfile()?;
        let duration = 1.0 / fps;
        writeln!(list, "ffconcat version 1.0")?;
        let mut last = None;
        for frame in frames {
            let entry = escape_concat_path(&std::path::absolute(frame)?);
            writeln!(list, "file {entry}")?;
            writeln!(list, "duration {duration:.6}")?;
            last = Some(entry);
        }
        // The concat demuxer ignores the duration of the final entry unless
        // the last file is listed again.
        if let Some(last) = last {
            writeln!(list, "file {last}")?;
        }
        list.flush()?;
        Ok(list)
    }

    fn build_command(
        &self,
        list: &Path,
        partial: &Path,
        output: &Path,
        dimensions: (u32, u32),
        fps: f64,
    ) -> Command {
        let (width, height) = (even_dimension(dimensions.0), even_dimension(dimensions.1));
        let mut command = Command::new(&self.program);
        command
            .arg("-hide_banner")
            .arg("-nostdin")
            .args(["-loglevel", self.log_level.as_cli_arg()])
            .arg("-y")
            .args(["-f", "concat", "-safe", "0"])
            .arg("-i")
            .arg(list)
            .arg("-vf")
            .arg(format!("scale={width}:{height},format=yuv420p"))
            .args(["-c:v", self.codec.encoder_name()])
            .arg("-crf")
            .arg(self.crf.to_string())
            .args(["-pix_fmt", "yuv420p"])
            .arg("-r")
            .arg(format!("{fps:.6}"))
            .args(["-f", container_format(output)])
            .arg(partial);
        command
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus, StitchError> {
        let Some(limit) = self.timeout else {
            return Ok(child.wait()?);
        };
        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if started.elapsed() >= limit {
                log::warn!("Encoder exceeded {:?}, killing it", limit);
                child.kill().ok();
                child.wait().ok();
                return Err(StitchError::EncoderTimeout(limit));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn run(
        &self,
        frames: &[PathBuf],
        partial: &Path,
        output: &Path,
        fps: f64,
    ) -> Result<(), StitchError> {
        let dimensions = probe_frames(frames)?;
        let list = self.write_concat_list(frames, fps)?;

        // stderr goes to a file so a chatty encoder can never block on a full pipe.
        let mut diagnostics = tempfile::tempfile()?;
        let mut command = self.build_command(list.path(), partial, output, dimensions, fps);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(diagnostics.try_clone()?));

        log::debug!("Running {:?}", command);
        let mut child = command
            .spawn()
            .map_err(|error| StitchError::EncoderUnavailable {
                program: self.program.clone(),
                reason: error.to_string(),
            })?;
        let status = self.wait(&mut child)?;

        if status.success() && partial.is_file() {
            return Ok(());
        }

        let mut captured = String::new();
        diagnostics.seek(SeekFrom::Start(0))?;
        diagnostics.read_to_string(&mut captured).ok();
        Err(StitchError::EncoderFailed {
            status,
            diagnostics: diagnostic_tail(&captured, DIAGNOSTIC_LINES),
        })
    }
}

impl FrameEncoder for FfmpegCommandEncoder {
    fn encode(&self, frames: &[PathBuf], output: &Path, fps: f64) -> Result<(), StitchError> {
        log::info!(
            "Encoding {} frames to {:?} (codec={:?}, fps={:.3})",
            frames.len(),
            output,
            self.codec,
            fps,
        );
        if frames.is_empty() {
            return Err(StitchError::NoFrames);
        }

        let partial = partial_output_path(output);
        match self.run(frames, &partial, output, fps) {
            Ok(()) => {
                fs::rename(&partial, output).inspect_err(|_| discard_partial(&partial))?;
                Ok(())
            }
            Err(error) => {
                discard_partial(&partial);
                Err(error)
            }
        }
    }
}
