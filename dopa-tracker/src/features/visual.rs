//! Visual feature extraction
//!
//! Per tick, from the current frame and the previous one:
//! - **Saturation**: mean of `(max(r,g,b) - min(r,g,b)) / max(r,g,b)` over a
//!   strided pixel sample (0 for black pixels)
//! - **Motion**: mean per-pixel channel difference against the previous
//!   frame over the same stride, normalised to 0.0-1.0
//! - **Scene cut**: motion above [`CUT_THRESHOLD`], gated by
//!   [`CUT_COOLDOWN_MS`] so one real cut spanning several high-motion ticks
//!   is counted once

use super::frame::FrameBuffer;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

/// Every Nth pixel is sampled
pub const SAMPLE_STRIDE: usize = 10;

/// Motion above this registers a scene cut
pub const CUT_THRESHOLD: f64 = 0.4;

/// Minimum spacing between registered cuts
pub const CUT_COOLDOWN_MS: i64 = 500;

/// Visual features for one tick
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VisualFeatures {
    pub saturation: f64,
    pub motion: f64,
    pub cut_detected: bool,
}

/// Stateful visual extractor
///
/// Holds the previous valid frame as the motion baseline and the time of the
/// last registered cut.
#[derive(Debug)]
pub struct VisualExtractor {
    previous: Option<FrameBuffer>,
    last_cut: Option<DateTime<Utc>>,
    stride: usize,
    cut_threshold: f64,
    cut_cooldown: Duration,
}

impl VisualExtractor {
    pub fn new() -> Self {
        Self {
            previous: None,
            last_cut: None,
            stride: SAMPLE_STRIDE,
            cut_threshold: CUT_THRESHOLD,
            cut_cooldown: Duration::milliseconds(CUT_COOLDOWN_MS),
        }
    }

    /// Process one tick's frame
    ///
    /// Missing or invalid frames yield zeroed features and leave the motion
    /// baseline untouched. A frame whose dimensions differ from the baseline
    /// reports zero motion and becomes the new baseline.
    pub fn process(&mut self, frame: Option<FrameBuffer>, now: DateTime<Utc>) -> VisualFeatures {
        let frame = match frame {
            Some(frame) if frame.is_valid() => frame,
            Some(frame) => {
                debug!(
                    "Ignoring invalid frame ({}x{}, {} bytes)",
                    frame.width(),
                    frame.height(),
                    frame.pixels().len()
                );
                return VisualFeatures::default();
            }
            None => return VisualFeatures::default(),
        };

        let saturation = saturation(&frame, self.stride);
        let motion = match &self.previous {
            Some(previous) if previous.same_dimensions(&frame) => {
                motion(previous, &frame, self.stride)
            }
            _ => 0.0,
        };
        self.previous = Some(frame);

        let cut_detected = motion > self.cut_threshold && self.cooldown_elapsed(now);
        if cut_detected {
            self.last_cut = Some(now);
            debug!("Scene cut registered (motion {:.3})", motion);
        }

        VisualFeatures {
            saturation,
            motion,
            cut_detected,
        }
    }

    fn cooldown_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.last_cut
            .map_or(true, |last| now - last >= self.cut_cooldown)
    }
}

impl Default for VisualExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Mean saturation over every `stride`-th pixel of a valid frame
pub fn saturation(frame: &FrameBuffer, stride: usize) -> f64 {
    let mut total = 0.0;
    let mut samples = 0usize;

    for index in (0..frame.pixel_count()).step_by(stride.max(1)) {
        let (r, g, b) = frame.rgb(index);
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        if max > 0 {
            total += (max - min) as f64 / max as f64;
        }
        samples += 1;
    }

    if samples == 0 {
        0.0
    } else {
        total / samples as f64
    }
}

/// Normalised motion between two same-sized valid frames
///
/// Per sampled pixel the three channel differences are averaged, then the
/// mean over samples is divided by 255.
pub fn motion(previous: &FrameBuffer, current: &FrameBuffer, stride: usize) -> f64 {
    let mut diff_sum = 0.0;
    let mut samples = 0usize;

    for index in (0..current.pixel_count()).step_by(stride.max(1)) {
        let (r0, g0, b0) = previous.rgb(index);
        let (r1, g1, b1) = current.rgb(index);
        let diff = r0.abs_diff(r1) as f64 + g0.abs_diff(g1) as f64 + b0.abs_diff(b1) as f64;
        diff_sum += diff / 3.0;
        samples += 1;
    }

    if samples == 0 {
        0.0
    } else {
        (diff_sum / samples as f64) / 255.0
    }
}
