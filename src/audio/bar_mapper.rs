use rustfft::num_complex::Complex;

use super::sanitize;

/// Turns spectral bins into per-bar target heights.
///
/// Bar `i` reads bin `i` directly; low bars are the lowest frequency bins.
/// There is no logarithmic grouping of bins.
#[derive(Debug, Clone)]
pub struct BarMapper {
    bar_count: usize,
    gain: f32,
    compression: f32,
    max_extent: f32,
}

impl BarMapper {
    pub fn new(bar_count: usize, gain: f32, compression: f32, max_extent: f32) -> Self {
        Self {
            bar_count,
            gain,
            compression,
            max_extent,
        }
    }

    pub fn bar_count(&self) -> usize {
        self.bar_count
    }

    pub fn max_extent(&self) -> f32 {
        self.max_extent
    }

    /// Height for a single magnitude: gain, log10 compression, then clamp.
    pub fn target_height(&self, magnitude: f32) -> f32 {
        let amplified = sanitize(magnitude) * self.gain;
        let compressed = if amplified > 0.0 {
            (1.0 + amplified).log10() * self.compression
        } else {
            0.0
        };
        sanitize(compressed).min(self.max_extent)
    }

    /// Fills `targets` with one height per bar. Bars without a matching bin get 0.
    pub fn map_into(&self, spectrum: &[Complex<f32>], targets: &mut Vec<f32>) {
        targets.clear();
        targets.extend((0..self.bar_count).map(|i| {
            spectrum
                .get(i)
                .map(|bin| self.target_height((bin.re * bin.re + bin.im * bin.im).sqrt()))
                .unwrap_or(0.0)
        }));
    }

    pub fn map(&self, spectrum: &[Complex<f32>]) -> Vec<f32> {
        let mut targets = Vec::with_capacity(self.bar_count);
        self.map_into(spectrum, &mut targets);
        targets
    }
}
