//! Frame rate resolution.
//!
//! A sensor track is encoded at either a fixed, operator-supplied rate or a
//! rate derived from the spacing of its frame timestamps. Everything here is
//! a pure function over numbers.
//!
//! # Example
//!
//! ```
//! use scenestitch::resolve_frame_rate;
//!
//! let timestamps: Vec<f64> = (0..10).map(|i| i as f64 / 15.0).collect();
//! assert!((resolve_frame_rate(&timestamps, None) - 15.0).abs() < 1e-9);
//! assert_eq!(resolve_frame_rate(&timestamps, Some(24.0)), 24.0);
//! ```

/// Rate used when timestamps cannot determine one.
pub const DEFAULT_FRAME_RATE: f64 = 30.0;
/// Lowest rate a derived value is clamped to.
pub const MIN_FRAME_RATE: f64 = 1.0;
/// Highest rate a derived value is clamped to.
pub const MAX_FRAME_RATE: f64 = 120.0;

/// Timing statistics for a sequence of frame timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameIntervalAnalysis {
    /// Whether the intervals vary enough to call the track variable-rate.
    ///
    /// `true` when the standard deviation of the kept intervals exceeds 10%
    /// of their mean.
    pub is_variable_frame_rate: bool,
    /// Mean of the kept intervals, in seconds.
    pub mean_interval: f64,
    /// Standard deviation of the kept intervals, in seconds.
    pub interval_stddev: f64,
    /// Number of positive intervals used.
    pub intervals_used: usize,
    /// Number of zero or negative intervals discarded.
    pub intervals_discarded: usize,
}

impl FrameIntervalAnalysis {
    /// Unclamped rate implied by the mean interval.
    pub fn mean_frames_per_second(&self) -> f64 {
        1.0 / self.mean_interval
    }
}

/// Analyze consecutive timestamp differences.
///
/// Differences that are zero, negative, or not finite (duplicate or
/// out-of-order timestamps) are discarded. Returns `None` when fewer than two
/// timestamps are given or nothing survives the filter.
pub fn analyze_frame_intervals(timestamps: &[f64]) -> Option<FrameIntervalAnalysis> {
    if timestamps.len() < 2 {
        return None;
    }

    let differences: Vec<f64> = timestamps.windows(2).map(|w| w[1] - w[0]).collect();
    let intervals: Vec<f64> = differences
        .iter()
        .copied()
        .filter(|d| d.is_finite() && *d > 0.0)
        .collect();

    if intervals.is_empty() {
        return None;
    }

    let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
    let variance =
        intervals.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / intervals.len() as f64;
    let stddev = variance.sqrt();

    Some(FrameIntervalAnalysis {
        is_variable_frame_rate: (stddev / mean) > 0.10,
        mean_interval: mean,
        interval_stddev: stddev,
        intervals_used: intervals.len(),
        intervals_discarded: differences.len() - intervals.len(),
    })
}

/// Derive a frame rate from timestamps in seconds.
///
/// Returns `1 / mean(interval)` clamped to
/// [`MIN_FRAME_RATE`]..=[`MAX_FRAME_RATE`], or [`DEFAULT_FRAME_RATE`] when
/// no positive interval exists.
pub fn frame_rate_from_timestamps(timestamps: &[f64]) -> f64 {
    match analyze_frame_intervals(timestamps) {
        Some(analysis) => {
            if analysis.intervals_discarded > 0 {
                log::debug!(
                    "Discarded {} non-positive timestamp intervals",
                    analysis.intervals_discarded
                );
            }
            if analysis.is_variable_frame_rate {
                log::debug!(
                    "Irregular frame spacing (mean {:.4}s, stddev {:.4}s)",
                    analysis.mean_interval,
                    analysis.interval_stddev
                );
            }
            analysis
                .mean_frames_per_second()
                .clamp(MIN_FRAME_RATE, MAX_FRAME_RATE)
        }
        None => DEFAULT_FRAME_RATE,
    }
}

/// Pick the frame rate for a track.
///
/// An override is returned unchanged; it is expected to have been validated
/// already (see [`AssembleOptions::validate`](crate::AssembleOptions::validate)).
pub fn resolve_frame_rate(timestamps: &[f64], override_fps: Option<f64>) -> f64 {
    match override_fps {
        Some(fps) => fps,
        None => frame_rate_from_timestamps(timestamps),
    }
}
