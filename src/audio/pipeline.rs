use serde::{Deserialize, Serialize};

use super::{BarMapper, ConfigError, RenderFrame, SampleBuffer, SpectralAnalyzer, TemporalShaper};

/// Everything the processing chain needs, fixed for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Samples per analysed frame; must be a power of two.
    pub frame_len: usize,
    pub bar_count: usize,
    /// Linear gain applied to bin magnitudes before compression.
    pub gain: f32,
    /// Multiplier applied after `log10(1 + m)`.
    pub compression: f32,
    /// Exponential smoothing factor: lower is slower, higher is snappier.
    pub smoothing: f32,
    /// Extra multiplier applied while a bar is falling.
    pub decay: f32,
    pub min_height: f32,
    /// Display extent bar heights are clamped and classified against.
    pub max_extent: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_len: 2048,
            bar_count: 32,
            gain: 8000.0,
            compression: 120.0,
            smoothing: 0.3,
            decay: 0.85,
            min_height: 2.0,
            max_extent: 300.0,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.frame_len.is_power_of_two() {
            return Err(ConfigError::FrameLength(self.frame_len));
        }
        if self.bar_count == 0 {
            return Err(ConfigError::NoBars);
        }
        let available = self.frame_len / 2;
        if self.bar_count > available {
            return Err(ConfigError::TooManyBars {
                bars: self.bar_count,
                available,
                frame_len: self.frame_len,
            });
        }

        for (name, value) in [
            ("gain", self.gain),
            ("compression", self.compression),
            ("min_height", self.min_height),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::NegativeOrNonFinite { name, value });
            }
        }
        for (name, value) in [("smoothing", self.smoothing), ("decay", self.decay)] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::OutOfUnitRange { name, value });
            }
        }
        if !(self.max_extent.is_finite() && self.max_extent > 0.0) {
            return Err(ConfigError::Extent(self.max_extent));
        }

        Ok(())
    }
}

/// Buffer, analyse, map and shape, run synchronously each time a frame fills.
pub struct SpectrumPipeline {
    buffer: SampleBuffer,
    analyzer: SpectralAnalyzer,
    mapper: BarMapper,
    shaper: TemporalShaper,
    targets: Vec<f32>,
    frames_processed: u64,
}

impl SpectrumPipeline {
    pub fn new(config: &PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            buffer: SampleBuffer::new(config.frame_len),
            analyzer: SpectralAnalyzer::new(config.frame_len)?,
            mapper: BarMapper::new(
                config.bar_count,
                config.gain,
                config.compression,
                config.max_extent,
            ),
            shaper: TemporalShaper::new(
                config.bar_count,
                config.smoothing,
                config.decay,
                config.min_height,
                config.max_extent,
            ),
            targets: Vec::with_capacity(config.bar_count),
            frames_processed: 0,
        })
    }

    pub fn bar_count(&self) -> usize {
        self.shaper.bar_count()
    }

    pub fn frame_len(&self) -> usize {
        self.buffer.frame_len()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn pending_samples(&self) -> usize {
        self.buffer.pending()
    }

    pub fn shaper(&self) -> &TemporalShaper {
        &self.shaper
    }

    /// Feeds one sample; yields a render frame when it completes a sample frame.
    pub fn push_sample(&mut self, sample: f32) -> Option<RenderFrame> {
        let frame = self.buffer.push(sample)?;
        Some(Self::process_frame(
            frame,
            &mut self.analyzer,
            &self.mapper,
            &mut self.shaper,
            &mut self.targets,
            &mut self.frames_processed,
        ))
    }

    /// Feeds a batch, handing each completed render frame to `on_frame` in order.
    pub fn push_samples<F>(&mut self, samples: &[f32], mut on_frame: F) -> usize
    where
        F: FnMut(RenderFrame),
    {
        let Self {
            buffer,
            analyzer,
            mapper,
            shaper,
            targets,
            frames_processed,
        } = self;

        buffer.push_slice(samples, |frame| {
            on_frame(Self::process_frame(
                frame,
                analyzer,
                mapper,
                shaper,
                targets,
                frames_processed,
            ))
        })
    }

    /// Drops any partial frame, as on shutdown. Returns the discarded sample count.
    pub fn discard_partial(&mut self) -> usize {
        self.buffer.clear()
    }

    fn process_frame(
        frame: &[f32],
        analyzer: &mut SpectralAnalyzer,
        mapper: &BarMapper,
        shaper: &mut TemporalShaper,
        targets: &mut Vec<f32>,
        frames_processed: &mut u64,
    ) -> RenderFrame {
        let unique_bins = analyzer.unique_bins();
        let spectrum = analyzer.analyze(frame);
        mapper.map_into(&spectrum[..unique_bins], targets);
        *frames_processed += 1;
        shaper.shape(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            frame_len: 256,
            bar_count: 16,
            ..PipelineConfig::default()
        }
    }

    fn tone(len: usize, bin: usize, frame_len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                0.5 * (2.0 * std::f32::consts::PI * bin as f32 * i as f32 / frame_len as f32).sin()
            })
            .collect()
    }

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(PipelineConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_construction_rejects_bad_config() {
        let cases = [
            (
                PipelineConfig { frame_len: 2047, ..PipelineConfig::default() },
                ConfigError::FrameLength(2047),
            ),
            (
                PipelineConfig { frame_len: 0, ..PipelineConfig::default() },
                ConfigError::FrameLength(0),
            ),
            (
                PipelineConfig { bar_count: 0, ..PipelineConfig::default() },
                ConfigError::NoBars,
            ),
            (
                PipelineConfig { frame_len: 64, bar_count: 33, ..PipelineConfig::default() },
                ConfigError::TooManyBars { bars: 33, available: 32, frame_len: 64 },
            ),
            (
                PipelineConfig { smoothing: 0.0, ..PipelineConfig::default() },
                ConfigError::OutOfUnitRange { name: "smoothing", value: 0.0 },
            ),
            (
                PipelineConfig { decay: 1.5, ..PipelineConfig::default() },
                ConfigError::OutOfUnitRange { name: "decay", value: 1.5 },
            ),
            (
                PipelineConfig { gain: -1.0, ..PipelineConfig::default() },
                ConfigError::NegativeOrNonFinite { name: "gain", value: -1.0 },
            ),
            (
                PipelineConfig { max_extent: 0.0, ..PipelineConfig::default() },
                ConfigError::Extent(0.0),
            ),
        ];

        for (config, expected) in cases {
            assert_eq!(SpectrumPipeline::new(&config).err(), Some(expected));
        }
    }

    #[test]
    fn test_frames_emitted_every_frame_len_samples() {
        let config = small_config();
        let mut pipeline = SpectrumPipeline::new(&config).unwrap();

        let mut emitted = 0;
        for (i, sample) in tone(config.frame_len * 3 + 10, 4, config.frame_len).into_iter().enumerate() {
            if let Some(frame) = pipeline.push_sample(sample) {
                emitted += 1;
                assert_eq!((i + 1) % config.frame_len, 0);
                assert_eq!(frame.len(), config.bar_count);
            }
        }

        assert_eq!(emitted, 3);
        assert_eq!(pipeline.frames_processed(), 3);
        assert_eq!(pipeline.pending_samples(), 10);
    }

    #[test]
    fn test_bar_count_stable_across_run() {
        let config = small_config();
        let mut pipeline = SpectrumPipeline::new(&config).unwrap();

        let mut signal = tone(config.frame_len * 40, 3, config.frame_len);
        signal[1000] = f32::NAN;
        signal[5000] = f32::INFINITY;

        let mut sequences = Vec::new();
        let emitted = pipeline.push_samples(&signal, |frame| {
            assert_eq!(frame.len(), config.bar_count);
            assert!(frame.heights().all(|h| h.is_finite() && h >= config.min_height));
            sequences.push(frame.sequence);
        });

        assert_eq!(emitted, 40);
        assert_eq!(sequences, (0..40).collect::<Vec<u64>>());
    }

    #[test]
    fn test_tone_lifts_its_bar() {
        let config = PipelineConfig {
            max_extent: 1000.0,
            ..small_config()
        };
        let mut pipeline = SpectrumPipeline::new(&config).unwrap();

        let mut last = None;
        pipeline.push_samples(&tone(config.frame_len * 20, 6, config.frame_len), |frame| {
            last = Some(frame)
        });
        let frame = last.unwrap();

        let loudest = frame
            .bars
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.height.total_cmp(&b.1.height))
            .map(|(i, _)| i);
        assert_eq!(loudest, Some(6));
        assert!(frame.bars[6].height > frame.bars[12].height);
    }

    #[test]
    fn test_silence_rests_on_floor() {
        let config = small_config();
        let mut pipeline = SpectrumPipeline::new(&config).unwrap();

        pipeline.push_samples(&vec![0.0; config.frame_len * 2], |frame| {
            assert!(frame.heights().all(|h| h == config.min_height));
        });
    }

    #[test]
    fn test_discard_partial() {
        let config = small_config();
        let mut pipeline = SpectrumPipeline::new(&config).unwrap();

        pipeline.push_samples(&[0.1; 100], |_| panic!("no frame expected"));
        assert_eq!(pipeline.discard_partial(), 100);
        assert_eq!(pipeline.pending_samples(), 0);
    }
}
