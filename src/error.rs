//! Error types for the `scenestitch` crate.
//!
//! This module defines [`StitchError`], the unified error type returned by all
//! fallible operations in the crate. Errors carry enough context (field names,
//! scene IDs, frame paths, encoder diagnostics) to be reported per track
//! without additional logging at the call site.

use std::{io::Error as IoError, path::PathBuf, process::ExitStatus, time::Duration};

use image::ImageError;
use serde_json::Error as JsonError;
use thiserror::Error;

/// Coarse classification of a [`StitchError`].
///
/// Only [`ErrorKind::Configuration`] aborts a run; every other kind is
/// recorded against the scene or track it occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input for one scene or track (no frames, unknown scene).
    Input,
    /// The encoder failed or could not be started.
    Encoding,
    /// Filesystem or image access failed.
    Io,
    /// A setup mistake affecting the whole run.
    Configuration,
    /// The dataset collaborator rejected a read or write.
    Dataset,
}

/// The unified error type for all `scenestitch` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StitchError {
    /// An option value is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A configured field name does not exist in the dataset schema.
    #[error("Field '{field}' not found in dataset schema (available: {available})")]
    UnknownField {
        /// The configured field name.
        field: String,
        /// Comma-separated list of the fields the dataset does have.
        available: String,
    },

    /// A frame rate outside the accepted range was supplied.
    #[error("Invalid frame rate {0}: must be between 1 and 120")]
    InvalidFrameRate(f64),

    /// No sample carries the requested scene ID.
    #[error("Scene {0} not found in dataset")]
    SceneNotFound(String),

    /// The encoder was asked to encode an empty frame list.
    #[error("No frames to encode")]
    NoFrames,

    /// A frame image does not exist on disk.
    #[error("Frame image missing: {}", .0.display())]
    MissingFrame(PathBuf),

    /// The external encoder program could not be started.
    #[error("Encoder '{program}' unavailable: {reason}")]
    EncoderUnavailable {
        /// Program that was spawned.
        program: String,
        /// Underlying reason the spawn failed.
        reason: String,
    },

    /// The external encoder exited unsuccessfully.
    #[error("Encoder exited with {status}: {diagnostics}")]
    EncoderFailed {
        /// Exit status reported by the process.
        status: ExitStatus,
        /// Tail of the encoder's diagnostic output.
        diagnostics: String,
    },

    /// The external encoder exceeded its wall-clock limit and was killed.
    #[error("Encoder timed out after {0:?}")]
    EncoderTimeout(Duration),

    /// In-process encoding failed.
    #[error("Video encoding error: {0}")]
    EncodeError(String),

    /// The dataset collaborator rejected an operation.
    #[error("Dataset error: {0}")]
    DatasetError(String),

    /// A dataset document could not be parsed or serialized.
    #[error("Dataset format error: {0}")]
    DatasetFormat(#[from] JsonError),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// A frame could not be decoded by the `image` crate.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),

    /// An error originating from the FFmpeg libraries.
    #[cfg(feature = "libav")]
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),
}

impl StitchError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StitchError::InvalidConfiguration(_)
            | StitchError::UnknownField { .. }
            | StitchError::InvalidFrameRate(_) => ErrorKind::Configuration,
            StitchError::SceneNotFound(_) | StitchError::NoFrames => ErrorKind::Input,
            StitchError::EncoderUnavailable { .. }
            | StitchError::EncoderFailed { .. }
            | StitchError::EncoderTimeout(_)
            | StitchError::EncodeError(_) => ErrorKind::Encoding,
            StitchError::MissingFrame(_) | StitchError::IoError(_) | StitchError::ImageError(_) => {
                ErrorKind::Io
            }
            StitchError::DatasetError(_) | StitchError::DatasetFormat(_) => ErrorKind::Dataset,
            #[cfg(feature = "libav")]
            StitchError::FfmpegError(_) => ErrorKind::Encoding,
        }
    }

    /// Returns `true` if this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }
}

#[cfg(feature = "libav")]
impl From<ffmpeg_next::Error> for StitchError {
    fn from(error: ffmpeg_next::Error) -> Self {
        StitchError::FfmpegError(error.to_string())
    }
}
