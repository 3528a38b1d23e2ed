//! Feature aggregation over a trailing 60 s window
//!
//! Keeps the timestamps of registered cut and beat events, prunes those older
//! than the window every tick, and merges the counts with the instantaneous
//! features into a `FeatureSnapshot`.
//!
//! `bpm` is the number of beat events in the trailing window. It approximates
//! beats per minute only as far as the energy gate tracks real beats.

use super::audio::AudioFeatures;
use super::visual::VisualFeatures;
use chrono::{DateTime, Duration, Utc};
use dopa_common::events::FeatureSnapshot;
use std::collections::VecDeque;

/// Sliding window length
pub const WINDOW_SECS: i64 = 60;

#[derive(Debug)]
pub struct FeatureAggregator {
    cuts: VecDeque<DateTime<Utc>>,
    beats: VecDeque<DateTime<Utc>>,
    window: Duration,
}

impl FeatureAggregator {
    pub fn new() -> Self {
        Self {
            cuts: VecDeque::new(),
            beats: VecDeque::new(),
            window: Duration::seconds(WINDOW_SECS),
        }
    }

    /// Record this tick's events and emit the combined snapshot
    pub fn tick(
        &mut self,
        visual: &VisualFeatures,
        audio: &AudioFeatures,
        now: DateTime<Utc>,
    ) -> FeatureSnapshot {
        if visual.cut_detected {
            self.cuts.push_back(now);
        }
        if audio.beat_detected {
            self.beats.push_back(now);
        }

        prune(&mut self.cuts, now, self.window);
        prune(&mut self.beats, now, self.window);

        FeatureSnapshot {
            saturation: visual.saturation,
            motion: visual.motion,
            loudness: audio.loudness,
            cuts_per_minute: self.cuts.len() as u32,
            bpm: self.beats.len() as u32,
            timestamp: now,
        }
    }
}

impl Default for FeatureAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Remove events older than `window` (events arrive in time order)
fn prune(events: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>, window: Duration) {
    while let Some(&oldest) = events.front() {
        if now - oldest > window {
            events.pop_front();
        } else {
            break;
        }
    }
}
