//! Raw capture data types

/// Downsampled video frame (RGBA8, row-major)
///
/// Ephemeral: overwritten every sampling tick. The extractor keeps the
/// previous one only to compute a frame-to-frame difference.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl FrameBuffer {
    /// Bytes per pixel (R, G, B, A)
    pub const CHANNELS: usize = 4;

    /// Wrap a pixel buffer without validating it
    ///
    /// Use [`FrameBuffer::is_valid`] before trusting the contents.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Frame filled with a single opaque colour
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let count = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(count * Self::CHANNELS);
        for _ in 0..count {
            pixels.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
        Self::new(width, height, pixels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA bytes
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Number of pixels the dimensions describe
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Non-empty and the buffer length matches the dimensions
    pub fn is_valid(&self) -> bool {
        self.pixel_count() > 0 && self.pixels.len() == self.pixel_count() * Self::CHANNELS
    }

    /// True if both frames describe the same grid
    pub fn same_dimensions(&self, other: &FrameBuffer) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// RGB components of the pixel at `index`
    ///
    /// Caller guarantees `index < pixel_count()` on a valid frame.
    pub fn rgb(&self, index: usize) -> (u8, u8, u8) {
        let offset = index * Self::CHANNELS;
        (
            self.pixels[offset],
            self.pixels[offset + 1],
            self.pixels[offset + 2],
        )
    }

    /// Packed RGB8 copy (alpha dropped)
    pub fn to_rgb(&self) -> Vec<u8> {
        self.pixels
            .chunks_exact(Self::CHANNELS)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect()
    }
}

/// Frequency-bin magnitudes (0-255) for one audio analysis window
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpectrumSnapshot {
    bins: Vec<u8>,
}

impl SpectrumSnapshot {
    pub fn new(bins: Vec<u8>) -> Self {
        Self { bins }
    }

    /// Spectrum with every bin at `magnitude`
    pub fn flat(bin_count: usize, magnitude: u8) -> Self {
        Self::new(vec![magnitude; bin_count])
    }

    pub fn bins(&self) -> &[u8] {
        &self.bins
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Mean magnitude over all bins (0.0 when empty)
    pub fn mean(&self) -> f64 {
        mean_of(&self.bins)
    }

    /// Mean magnitude over the lowest `count` bins
    ///
    /// Uses every bin when the spectrum is shorter than `count`.
    pub fn low_band_mean(&self, count: usize) -> f64 {
        let end = count.min(self.bins.len());
        mean_of(&self.bins[..end])
    }
}

fn mean_of(bins: &[u8]) -> f64 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: u64 = bins.iter().map(|&b| b as u64).sum();
    sum as f64 / bins.len() as f64
}
