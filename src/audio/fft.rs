use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use super::ConfigError;

// Hamming coefficients. The bar mapper's gain and compression constants are
// calibrated against exactly this pair.
const WINDOW_ALPHA: f64 = 0.54;
const WINDOW_BETA: f64 = 0.46;

/// Windowed forward FFT over one sample frame.
///
/// The plan, window table and work buffers are built once; `analyze` runs on
/// every full frame and does not allocate.
pub struct SpectralAnalyzer {
    fft_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    scale: f32,
}

impl SpectralAnalyzer {
    pub fn new(fft_size: usize) -> Result<Self, ConfigError> {
        if !fft_size.is_power_of_two() {
            return Err(ConfigError::FrameLength(fft_size));
        }

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        log::debug!(
            "Planned {}-point FFT ({} stages)",
            fft_size,
            fft_size.trailing_zeros()
        );

        Ok(Self {
            fft_size,
            fft,
            window: Self::hamming_window(fft_size),
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch,
            scale: 1.0 / fft_size as f32,
        })
    }

    fn hamming_window(size: usize) -> Vec<f32> {
        (0..size)
            .map(|i| {
                let phase = 2.0 * std::f64::consts::PI * i as f64 / size as f64;
                (WINDOW_ALPHA - WINDOW_BETA * phase.cos()) as f32
            })
            .collect()
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Bins below Nyquist; the upper half mirrors them for real input.
    pub fn unique_bins(&self) -> usize {
        self.fft_size / 2
    }

    pub fn window(&self) -> &[f32] {
        &self.window
    }

    /// Transforms one frame and returns all `fft_size` bins, scaled by 1/N.
    ///
    /// Short frames are zero padded and samples beyond `fft_size` are ignored.
    /// Non-finite samples are not filtered and show up as non-finite bins.
    pub fn analyze(&mut self, frame: &[f32]) -> &[Complex<f32>] {
        self.load_windowed(frame);
        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        let scale = self.scale;
        for bin in self.buffer.iter_mut() {
            *bin *= scale;
        }

        &self.buffer
    }

    fn load_windowed(&mut self, frame: &[f32]) {
        let len = self.fft_size.min(frame.len());

        for (slot, (&sample, &weight)) in self
            .buffer
            .iter_mut()
            .zip(frame[..len].iter().zip(self.window.iter()))
        {
            *slot = Complex::new(sample * weight, 0.0);
        }
        for slot in self.buffer[len..].iter_mut() {
            *slot = Complex::new(0.0, 0.0);
        }
    }
}
