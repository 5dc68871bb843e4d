use super::{sanitize, BarReading, ColorTier, RenderFrame};

const HOT_FRACTION: f32 = 0.7;
const MID_FRACTION: f32 = 0.4;

/// Per-bar animation state carried from one frame to the next.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BarState {
    pub smoothed: f32,
    pub previous_target: f32,
}

impl BarState {
    /// Advances the bar by one frame.
    ///
    /// Rising or steady signal is eased towards the target. Falling signal is
    /// eased the same way and then decayed, so bars drop visibly faster than
    /// they rise.
    pub fn advance(&mut self, target: f32, smoothing: f32, decay: f32) {
        let target = sanitize(target);
        let falling = target < self.smoothed;

        self.smoothed = self.smoothed * (1.0 - smoothing) + target * smoothing;
        if falling {
            self.smoothed *= decay;
        }
        self.smoothed = sanitize(self.smoothed);
        self.previous_target = target;
    }
}

/// Classifies a displayed height against the display extent.
pub fn classify(height: f32, extent: f32) -> ColorTier {
    if height > extent * HOT_FRACTION {
        ColorTier::Hot
    } else if height >= extent * MID_FRACTION {
        ColorTier::Mid
    } else {
        ColorTier::Low
    }
}

/// Owns the bar states and turns raw target heights into render frames.
pub struct TemporalShaper {
    bars: Vec<BarState>,
    smoothing: f32,
    decay: f32,
    min_height: f32,
    extent: f32,
    sequence: u64,
}

impl TemporalShaper {
    pub fn new(bar_count: usize, smoothing: f32, decay: f32, min_height: f32, extent: f32) -> Self {
        Self {
            bars: vec![BarState::default(); bar_count],
            smoothing,
            decay,
            min_height,
            extent,
            sequence: 0,
        }
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn bars(&self) -> &[BarState] {
        &self.bars
    }

    pub fn extent(&self) -> f32 {
        self.extent
    }

    /// Applies one frame of targets. Missing targets count as silence and
    /// surplus targets are ignored, so the frame always has one entry per bar.
    pub fn shape(&mut self, targets: &[f32]) -> RenderFrame {
        let (smoothing, decay) = (self.smoothing, self.decay);
        for (i, bar) in self.bars.iter_mut().enumerate() {
            bar.advance(targets.get(i).copied().unwrap_or(0.0), smoothing, decay);
        }

        let frame = RenderFrame {
            sequence: self.sequence,
            extent: self.extent,
            bars: self.bars.iter().map(|bar| self.reading(bar)).collect(),
        };
        self.sequence += 1;
        frame
    }

    fn reading(&self, bar: &BarState) -> BarReading {
        let height = bar.smoothed.max(self.min_height);
        BarReading {
            height,
            tier: classify(height, self.extent),
        }
    }
}
