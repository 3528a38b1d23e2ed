//! Capture sources
//!
//! The pipeline pulls at most one frame and one spectrum per tick. A source
//! that has nothing new returns None and the tick proceeds with zeroed
//! features for that half.

use crate::features::{FrameBuffer, SpectrumSnapshot};
use std::sync::Mutex;

/// Non-blocking provider of raw capture data
pub trait CaptureSource: Send + Sync {
    /// Latest unconsumed frame, if any
    fn frame(&self) -> Option<FrameBuffer>;

    /// Latest unconsumed spectrum, if any
    fn spectrum(&self) -> Option<SpectrumSnapshot>;
}

/// Latest-value slots filled by an external producer
///
/// Each push overwrites the previous value; each pull takes it. A stalled
/// producer therefore shows up as "unavailable" ticks rather than the same
/// stale frame being analysed over and over.
#[derive(Debug, Default)]
pub struct PushCaptureSource {
    frame: Mutex<Option<FrameBuffer>>,
    spectrum: Mutex<Option<SpectrumSnapshot>>,
}

impl PushCaptureSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_frame(&self, frame: FrameBuffer) {
        *lock(&self.frame) = Some(frame);
    }

    pub fn push_spectrum(&self, spectrum: SpectrumSnapshot) {
        *lock(&self.spectrum) = Some(spectrum);
    }

    /// Drop anything not yet consumed
    pub fn clear(&self) {
        lock(&self.frame).take();
        lock(&self.spectrum).take();
    }
}

impl CaptureSource for PushCaptureSource {
    fn frame(&self) -> Option<FrameBuffer> {
        lock(&self.frame).take()
    }

    fn spectrum(&self) -> Option<SpectrumSnapshot> {
        lock(&self.spectrum).take()
    }
}

fn lock<T>(slot: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    // Slots hold plain values; a poisoned lock still holds a usable one
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
