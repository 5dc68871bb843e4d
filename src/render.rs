use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::io::Write;

use crate::audio::{BarReading, ColorTier, RenderFrame};

/// Consumer of render frames.
pub trait RenderSink {
    fn render(&mut self, frame: &RenderFrame) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

const RESET: &str = "\x1B[0m";
const BLUE: &str = "\x1B[34m";
const CYAN: &str = "\x1B[36m";

// Lower 30% of a bar is blue, the body cyan, the top cell carries the tier.
const BASE_FRACTION: f32 = 0.3;

fn tier_colour(tier: ColorTier) -> &'static str {
    match tier {
        ColorTier::Low => "\x1B[32m",
        ColorTier::Mid => "\x1B[33m",
        ColorTier::Hot => "\x1B[31m",
    }
}

fn tier_glyph(tier: ColorTier) -> char {
    match tier {
        ColorTier::Low => '-',
        ColorTier::Mid => '=',
        ColorTier::Hot => '#',
    }
}

/// Number of text rows a bar covers. Every bar covers at least one row.
pub fn filled_rows(bar: &BarReading, extent: f32, rows: usize) -> usize {
    if rows == 0 {
        return 0;
    }
    let fraction = (bar.height / extent).clamp(0.0, 1.0);
    ((fraction * rows as f32).round() as usize).clamp(1, rows)
}

/// Lays a frame out as `rows` lines of text, top line first.
///
/// Without colour each bar is drawn with a glyph per tier
/// (`-` low, `=` mid, `#` hot) so the tiers stay readable.
pub fn frame_to_text(frame: &RenderFrame, rows: usize, colour: bool) -> String {
    let heights: Vec<usize> = frame
        .bars
        .iter()
        .map(|bar| filled_rows(bar, frame.extent, rows))
        .collect();
    let base_rows = (rows as f32 * BASE_FRACTION).round() as usize;

    let mut text = String::new();
    for row in (1..=rows).rev() {
        for (bar, &height) in frame.bars.iter().zip(heights.iter()) {
            if height < row {
                text.push(' ');
            } else if !colour {
                text.push(tier_glyph(bar.tier));
            } else {
                let shade = if row == height {
                    tier_colour(bar.tier)
                } else if row <= base_rows {
                    BLUE
                } else {
                    CYAN
                };
                let _ = write!(text, "{shade}\u{2588}{RESET}");
            }
        }
        text.push('\n');
    }
    text
}

/// Redraws the whole bar display in place on every frame.
pub struct TerminalRenderer<W: Write> {
    out: W,
    rows: usize,
    colour: bool,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W, rows: usize, colour: bool) -> Self {
        Self {
            out,
            rows: rows.max(1),
            colour,
        }
    }
}

impl<W: Write> RenderSink for TerminalRenderer<W> {
    fn render(&mut self, frame: &RenderFrame) -> Result<()> {
        let text = frame_to_text(frame, self.rows, self.colour);
        writeln!(self.out, "\x1B[2J\x1B[1;1H{}frame {}", text, frame.sequence)
            .context("Failed to draw frame")?;
        self.out.flush().context("Failed to flush terminal")
    }
}

/// Writes every frame as one JSON object per line.
pub struct JsonLinesRenderer<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RenderSink for JsonLinesRenderer<W> {
    fn render(&mut self, frame: &RenderFrame) -> Result<()> {
        serde_json::to_writer(&mut self.out, frame).context("Failed to serialize frame")?;
        self.out.write_all(b"\n").context("Failed to write frame")
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush().context("Failed to flush frame output")
    }
}
