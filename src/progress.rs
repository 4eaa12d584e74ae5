//! Progress reporting.
//!
//! Long runs over many scenes report through a [`ProgressCallback`]. The
//! assembler fires once per processed scene and the reset tool once per
//! handled video file.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use scenestitch::{
//!     AssembleOptions, FfmpegCommandEncoder, JsonDataset, ProgressCallback, ProgressInfo,
//!     SceneVideoAssembler, StitchError,
//! };
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         if let Some(pct) = info.percentage {
//!             println!("[{:?}] {pct:.1}% complete", info.operation);
//!         }
//!     }
//! }
//!
//! let mut dataset = JsonDataset::open("datasets/drive.json")?;
//! let encoder = FfmpegCommandEncoder::new();
//! let options = AssembleOptions::new().with_progress(Arc::new(PrintProgress));
//! let report = SceneVideoAssembler::new(&mut dataset, &encoder, options)?.assemble_all()?;
//! println!("{} videos", report.total_videos);
//! # Ok::<(), StitchError>(())
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

/// The kind of operation currently in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationType {
    /// Assembling scene videos.
    SceneAssembly,
    /// Removing video fields and files.
    Reset,
}

/// A snapshot of progress.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// What kind of work is being performed.
    pub operation: OperationType,
    /// How many items (scenes / files) have been processed so far.
    pub current: u64,
    /// Total items expected, if known ahead of time.
    pub total: Option<u64>,
    /// Completion percentage (0.0 – 100.0), if `total` is known.
    pub percentage: Option<f32>,
    /// Wall-clock time elapsed since the operation started.
    pub elapsed: Duration,
    /// Estimated time remaining, based on current throughput.
    pub estimated_remaining: Option<Duration>,
    /// Label of the item just finished (scene ID or file path).
    pub item: Option<String>,
}

/// Trait for receiving progress updates.
///
/// Progress callbacks are **infallible**; they observe but cannot halt the
/// operation.
pub trait ProgressCallback: Send + Sync {
    /// Called after each processed item.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards all progress notifications. This is the default.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Internal helper that tracks progress timing and emits callbacks.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    operation: OperationType,
    total: Option<u64>,
    current: u64,
    start_time: Instant,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        operation: OperationType,
        total: Option<u64>,
    ) -> Self {
        Self {
            callback,
            operation,
            total,
            current: 0,
            start_time: Instant::now(),
        }
    }

    /// Record one completed item and fire the callback.
    pub(crate) fn advance(&mut self, item: Option<String>) {
        self.current += 1;
        self.report(item);
    }

    fn report(&self, item: Option<String>) {
        let elapsed = self.start_time.elapsed();

        let percentage = self
            .total
            .filter(|&t| t > 0)
            .map(|t| (self.current as f32 / t as f32) * 100.0);

        let estimated_remaining = if self.current > 0 {
            self.total.map(|t| {
                let remaining = t.saturating_sub(self.current);
                let per_item = elapsed / self.current as u32;
                per_item * remaining as u32
            })
        } else {
            None
        };

        let info = ProgressInfo {
            operation: self.operation,
            current: self.current,
            total: self.total,
            percentage,
            elapsed,
            estimated_remaining,
            item,
        };

        self.callback.on_progress(&info);
    }
}
