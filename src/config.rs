use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::audio::{OverflowPolicy, PipelineConfig};

/// Settings for a whole run, loadable from a JSON file.
///
/// Every field has a default, so a file only needs the values it changes:
///
/// ```json
/// { "pipeline": { "bar_count": 48, "smoothing": 0.2 }, "render": { "rows": 30 } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub queue: QueueConfig,
    pub render: RenderConfig,
}

/// Sizes and overflow behaviour of the two channels around the pipeline worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Sample batches waiting for the pipeline.
    pub sample_capacity: usize,
    pub sample_policy: OverflowPolicy,
    /// Render frames waiting for the renderer.
    pub frame_capacity: usize,
    pub frame_policy: OverflowPolicy,
    /// Samples per batch when replaying a file.
    pub batch_len: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            sample_capacity: 64,
            sample_policy: OverflowPolicy::DropOldest,
            frame_capacity: 4,
            frame_policy: OverflowPolicy::DropOldest,
            batch_len: 480,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub rows: usize,
    pub colour: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            rows: 24,
            colour: true,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }
}
