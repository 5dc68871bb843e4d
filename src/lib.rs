//! Real-time spectrum bars: samples in, smoothly animated bar heights out.
//!
//! Samples are collected into power-of-two frames, Hamming windowed and
//! transformed, one bin per bar is gained and log compressed, and the
//! resulting heights are eased and decayed across frames before being
//! classified into colour tiers.

pub mod audio;
pub mod config;
pub mod render;

pub use audio::{
    BarReading, ColorTier, ConfigError, OverflowPolicy, PipelineConfig, RenderFrame,
    SpectrumPipeline,
};
pub use config::AppConfig;
