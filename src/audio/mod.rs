pub mod sample_buffer;
pub mod fft;
pub mod bar_mapper;
pub mod temporal_shaper;
pub mod pipeline;
pub mod driver;
pub mod file_source;
#[cfg(feature = "capture")]
pub mod capture;

pub use sample_buffer::SampleBuffer;
pub use fft::SpectralAnalyzer;
pub use bar_mapper::BarMapper;
pub use temporal_shaper::{BarState, TemporalShaper};
pub use pipeline::{PipelineConfig, SpectrumPipeline};
pub use driver::{OverflowPolicy, OverflowSender, PipelineWorker, WorkerStats};
pub use file_source::FileSource;
#[cfg(feature = "capture")]
pub use capture::CaptureSource;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Colour category of a bar, derived from its displayed height.
///
/// The core never maps tiers to actual colours; renderers do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorTier {
    Low,
    Mid,
    Hot,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BarReading {
    pub height: f32,
    pub tier: ColorTier,
}

/// One animation step: exactly one reading per bar, in bar-index order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderFrame {
    /// Index of the sample frame this was computed from, counted from startup.
    pub sequence: u64,
    /// Display extent the heights were clamped and classified against.
    pub extent: f32,
    pub bars: Vec<BarReading>,
}

impl RenderFrame {
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn heights(&self) -> impl Iterator<Item = f32> + '_ {
        self.bars.iter().map(|bar| bar.height)
    }
}

/// Rejected pipeline configuration. Construction fails rather than
/// producing undefined transform behaviour.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("frame length {0} is not a non-zero power of two")]
    FrameLength(usize),
    #[error("bar count must be at least 1")]
    NoBars,
    #[error("bar count {bars} exceeds the {available} unique bins of a {frame_len}-sample frame")]
    TooManyBars {
        bars: usize,
        available: usize,
        frame_len: usize,
    },
    #[error("{name} must be finite and non-negative, got {value}")]
    NegativeOrNonFinite { name: &'static str, value: f32 },
    #[error("{name} must lie in (0, 1], got {value}")]
    OutOfUnitRange { name: &'static str, value: f32 },
    #[error("display extent must be finite and positive, got {0}")]
    Extent(f32),
}

/// Replaces values that cannot be drawn (NaN, infinities, negatives) with zero.
pub(crate) fn sanitize(value: f32) -> f32 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}
