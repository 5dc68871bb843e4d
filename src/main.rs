use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::thread;

use barscope::audio::driver::overflow_channel;
use barscope::audio::{FileSource, OverflowPolicy, PipelineWorker, RenderFrame, SpectrumPipeline};
use barscope::config::AppConfig;
use barscope::render::{JsonLinesRenderer, RenderSink, TerminalRenderer};

#[derive(Parser, Debug)]
#[command(name = "barscope", about = "Real-time audio spectrum bars in the terminal")]
struct Cli {
    /// Audio file to visualize (WAV, FLAC, OGG, MP3, M4A)
    input: Option<PathBuf>,

    /// Listen to the default input device instead of a file
    #[arg(long)]
    capture: bool,

    /// JSON config file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Samples per analysed frame (power of two)
    #[arg(long)]
    frame_len: Option<usize>,

    /// Number of bars
    #[arg(short, long)]
    bars: Option<usize>,

    /// Linear gain applied before log compression
    #[arg(long)]
    gain: Option<f32>,

    /// Multiplier applied after log compression
    #[arg(long)]
    compression: Option<f32>,

    /// Smoothing factor (0-1]; smaller is slower
    #[arg(long)]
    smoothing: Option<f32>,

    /// Extra decay applied while bars fall (0-1]
    #[arg(long)]
    decay: Option<f32>,

    /// Height every bar keeps at silence
    #[arg(long)]
    min_height: Option<f32>,

    /// Display extent bar heights are clamped to
    #[arg(long)]
    extent: Option<f32>,

    /// What the capture side does when the pipeline falls behind
    #[arg(long, value_enum)]
    overflow: Option<OverflowPolicy>,

    /// Terminal rows used for the bars
    #[arg(long)]
    rows: Option<usize>,

    /// Plain glyphs instead of ANSI colours
    #[arg(long)]
    no_colour: bool,

    /// Emit frames as JSON lines instead of drawing them
    #[arg(long)]
    json: bool,

    /// Replay the file as fast as possible instead of in real time
    #[arg(long)]
    no_pace: bool,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn effective_config(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let config = AppConfig::load(path)?;
                info!("Loaded config from {}", path.display());
                config
            }
            None => AppConfig::default(),
        };

        let pipeline = &mut config.pipeline;
        if let Some(v) = self.frame_len { pipeline.frame_len = v; }
        if let Some(v) = self.bars { pipeline.bar_count = v; }
        if let Some(v) = self.gain { pipeline.gain = v; }
        if let Some(v) = self.compression { pipeline.compression = v; }
        if let Some(v) = self.smoothing { pipeline.smoothing = v; }
        if let Some(v) = self.decay { pipeline.decay = v; }
        if let Some(v) = self.min_height { pipeline.min_height = v; }
        if let Some(v) = self.extent { pipeline.max_extent = v; }
        if let Some(v) = self.overflow { config.queue.sample_policy = v; }
        if let Some(v) = self.rows { config.render.rows = v; }
        if self.no_colour { config.render.colour = false; }

        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config = cli.effective_config()?;

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let pipeline = SpectrumPipeline::new(&config.pipeline).context("Invalid pipeline configuration")?;
    info!(
        "barscope: {} bars, {}-sample frames, extent {}",
        config.pipeline.bar_count, config.pipeline.frame_len, config.pipeline.max_extent
    );

    let (sample_tx, sample_rx) = overflow_channel(config.queue.sample_capacity, config.queue.sample_policy);
    let (frame_tx, frame_rx) = overflow_channel::<RenderFrame>(config.queue.frame_capacity, config.queue.frame_policy);
    let worker = PipelineWorker::spawn(pipeline, sample_rx, frame_tx)?;

    // Held until rendering ends; dropping it stops the device callback.
    #[cfg(feature = "capture")]
    let mut _capture = None;

    let producer = if cli.capture {
        #[cfg(feature = "capture")]
        {
            let source = barscope::audio::CaptureSource::start(sample_tx)?;
            info!(
                "Listening on {} at {}Hz ({:.1}ms per frame), Ctrl+C to stop",
                source.device_name(),
                source.sample_rate(),
                config.pipeline.frame_len as f32 * 1000.0 / source.sample_rate() as f32
            );
            _capture = Some(source);
            None
        }
        #[cfg(not(feature = "capture"))]
        {
            bail!("This build has no capture support; rebuild with `--features capture`");
        }
    } else {
        let input = cli.input.as_ref().context("An input audio file or --capture is required")?;
        if !input.exists() {
            bail!("Input file not found: {}", input.display());
        }

        let source = FileSource::open(input)?;
        info!(
            "Playing {} ({:.1}s at {}Hz)",
            input.display(),
            source.duration().as_secs_f32(),
            source.sample_rate()
        );

        let batch_len = config.queue.batch_len;
        let pace = !cli.no_pace;
        let handle = thread::Builder::new()
            .name("file-source".to_string())
            .spawn(move || source.stream(&sample_tx, batch_len, pace))
            .context("Failed to spawn file source thread")?;
        Some(handle)
    };

    let mut sink: Box<dyn RenderSink> = if cli.json {
        Box::new(JsonLinesRenderer::new(std::io::stdout().lock()))
    } else {
        Box::new(TerminalRenderer::new(
            std::io::stdout().lock(),
            config.render.rows,
            config.render.colour,
        ))
    };

    let mut last_sequence = None;
    for frame in frame_rx.iter() {
        if let Some(previous) = last_sequence {
            if frame.sequence != previous + 1 {
                log::debug!("Skipped {} frames", frame.sequence - previous - 1);
            }
        }
        last_sequence = Some(frame.sequence);

        if let Err(e) = sink.render(&frame) {
            warn!("Render error: {:#}", e);
            break;
        }
    }
    sink.finish()?;
    drop(frame_rx);

    if let Some(handle) = producer {
        match handle.join() {
            Ok(discarded) if discarded > 0 => {
                warn!("{} sample batches were dropped before analysis", discarded)
            }
            Ok(_) => {}
            Err(_) => warn!("File source thread panicked"),
        }
    }

    let stats = worker.join()?;
    info!(
        "Done: {} frames rendered from {} samples",
        stats.frames_emitted.saturating_sub(stats.frames_dropped),
        stats.samples
    );

    Ok(())
}
