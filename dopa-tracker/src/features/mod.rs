//! Feature extraction
//!
//! Turns raw capture data into the per-tick `FeatureSnapshot`:
//! - `visual`: saturation, motion and scene cuts from successive frames
//! - `audio`: loudness and beat events from spectrum snapshots
//! - `aggregator`: 60 s sliding windows over cut/beat events
//!
//! None of these stages can fail. Missing or malformed capture data yields a
//! zeroed feature for that tick.

pub mod aggregator;
pub mod audio;
pub mod frame;
pub mod visual;

pub use aggregator::FeatureAggregator;
pub use audio::{AudioExtractor, AudioFeatures};
pub use frame::{FrameBuffer, SpectrumSnapshot};
pub use visual::{VisualExtractor, VisualFeatures};
