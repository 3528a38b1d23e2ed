//! Audio feature extraction
//!
//! Per tick, from one spectrum snapshot:
//! - **Loudness**: mean magnitude over all bins
//! - **Beat**: mean of the lowest [`BASS_BINS`] bins above
//!   [`BEAT_THRESHOLD`], gated by [`BEAT_COOLDOWN_MS`] (at most 240 beats
//!   per minute can register)
//!
//! This is a deterministic energy gate, not musicological beat tracking.

use super::frame::SpectrumSnapshot;
use chrono::{DateTime, Duration, Utc};

/// Number of lowest bins treated as the bass band
pub const BASS_BINS: usize = 10;

/// Bass band mean above this registers a beat
pub const BEAT_THRESHOLD: f64 = 140.0;

/// Minimum spacing between registered beats
pub const BEAT_COOLDOWN_MS: i64 = 250;

/// Audio features for one tick
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AudioFeatures {
    pub loudness: f64,
    pub beat_detected: bool,
}

/// Stateful audio extractor (remembers the last registered beat)
#[derive(Debug)]
pub struct AudioExtractor {
    last_beat: Option<DateTime<Utc>>,
    bass_bins: usize,
    beat_threshold: f64,
    beat_cooldown: Duration,
}

impl AudioExtractor {
    pub fn new() -> Self {
        Self {
            last_beat: None,
            bass_bins: BASS_BINS,
            beat_threshold: BEAT_THRESHOLD,
            beat_cooldown: Duration::milliseconds(BEAT_COOLDOWN_MS),
        }
    }

    /// Process one tick's spectrum
    ///
    /// No spectrum (or an empty one) yields zero loudness and no beat.
    pub fn process(
        &mut self,
        spectrum: Option<&SpectrumSnapshot>,
        now: DateTime<Utc>,
    ) -> AudioFeatures {
        let spectrum = match spectrum {
            Some(spectrum) if !spectrum.is_empty() => spectrum,
            _ => return AudioFeatures::default(),
        };

        let loudness = spectrum.mean();
        let bass = spectrum.low_band_mean(self.bass_bins);

        let beat_detected = bass > self.beat_threshold && self.cooldown_elapsed(now);
        if beat_detected {
            self.last_beat = Some(now);
        }

        AudioFeatures {
            loudness,
            beat_detected,
        }
    }

    fn cooldown_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.last_beat
            .map_or(true, |last| now - last >= self.beat_cooldown)
    }
}

impl Default for AudioExtractor {
    fn default() -> Self {
        Self::new()
    }
}
