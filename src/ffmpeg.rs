//! FFmpeg log level configuration.
//!
//! FFmpeg has its own logging, separate from the Rust
//! [`log`](https://crates.io/crates/log) crate. [`FfmpegLogLevel`] controls
//! it for both encoders: it becomes the `-loglevel` argument of
//! [`FfmpegCommandEncoder`](crate::FfmpegCommandEncoder) and, with the `libav`
//! feature, the process-wide level of the linked libraries.
//!
//! # Note
//!
//! This controls **FFmpeg's own output**, not the Rust-side diagnostic
//! messages emitted via the `log` crate. To configure those, install a `log`
//! backend such as `env_logger`.

use std::str::FromStr;

use crate::error::StitchError;

/// FFmpeg log verbosity level.
///
/// # Ordering (most verbose → most quiet)
///
/// `Trace` > `Debug` > `Verbose` > `Info` > `Warning` > `Error` > `Fatal` > `Panic` > `Quiet`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FfmpegLogLevel {
    /// Print no output at all.
    Quiet,
    /// Only log conditions that abort the process.
    Panic,
    /// Only log unrecoverable errors.
    Fatal,
    /// Log recoverable errors. This is the default, so failures carry
    /// diagnostics without progress noise.
    #[default]
    Error,
    /// Log warnings.
    Warning,
    /// Log informational messages.
    Info,
    /// Log verbose informational messages.
    Verbose,
    /// Log debugging messages.
    Debug,
    /// Extremely verbose tracing output.
    Trace,
}

impl FfmpegLogLevel {
    /// The value FFmpeg's `-loglevel` option expects.
    pub fn as_cli_arg(self) -> &'static str {
        match self {
            FfmpegLogLevel::Quiet => "quiet",
            FfmpegLogLevel::Panic => "panic",
            FfmpegLogLevel::Fatal => "fatal",
            FfmpegLogLevel::Error => "error",
            FfmpegLogLevel::Warning => "warning",
            FfmpegLogLevel::Info => "info",
            FfmpegLogLevel::Verbose => "verbose",
            FfmpegLogLevel::Debug => "debug",
            FfmpegLogLevel::Trace => "trace",
        }
    }

    #[cfg(feature = "libav")]
    fn to_ffmpeg_level(self) -> ffmpeg_next::util::log::Level {
        use ffmpeg_next::util::log::Level;

        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Panic => Level::Panic,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Verbose => Level::Verbose,
            FfmpegLogLevel::Debug => Level::Debug,
            FfmpegLogLevel::Trace => Level::Trace,
        }
    }
}

impl FromStr for FfmpegLogLevel {
    type Err = StitchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "quiet" => Ok(FfmpegLogLevel::Quiet),
            "panic" => Ok(FfmpegLogLevel::Panic),
            "fatal" => Ok(FfmpegLogLevel::Fatal),
            "error" => Ok(FfmpegLogLevel::Error),
            "warning" | "warn" => Ok(FfmpegLogLevel::Warning),
            "info" => Ok(FfmpegLogLevel::Info),
            "verbose" => Ok(FfmpegLogLevel::Verbose),
            "debug" => Ok(FfmpegLogLevel::Debug),
            "trace" => Ok(FfmpegLogLevel::Trace),
            other => Err(StitchError::InvalidConfiguration(format!(
                "unknown FFmpeg log level '{other}'"
            ))),
        }
    }
}

/// Set the log level of the linked FFmpeg libraries.
///
/// Only affects [`LibavEncoder`](crate::LibavEncoder); the external encoder
/// takes its level per invocation.
#[cfg(feature = "libav")]
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
}
