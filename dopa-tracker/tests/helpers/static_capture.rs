//! Capture source that never runs dry

use dopa_tracker::capture::CaptureSource;
use dopa_tracker::features::{FrameBuffer, SpectrumSnapshot};

/// Returns the same frame and spectrum on every pull
#[derive(Debug, Clone, Default)]
pub struct StaticCapture {
    pub frame: Option<FrameBuffer>,
    pub spectrum: Option<SpectrumSnapshot>,
}

impl StaticCapture {
    /// Silent, black source
    pub fn idle() -> Self {
        Self::default()
    }

    /// Source with constant loud audio and no video
    pub fn loud(magnitude: u8) -> Self {
        Self {
            frame: None,
            spectrum: Some(SpectrumSnapshot::flat(64, magnitude)),
        }
    }
}

impl CaptureSource for StaticCapture {
    fn frame(&self) -> Option<FrameBuffer> {
        self.frame.clone()
    }

    fn spectrum(&self) -> Option<SpectrumSnapshot> {
        self.spectrum.clone()
    }
}
