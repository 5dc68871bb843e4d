use anyhow::{Context, Result};
use log::{info, warn};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::driver::{Delivery, OverflowSender};

/// A decoded audio file, downmixed to mono, replayed into the pipeline as if
/// it were a capture stream.
pub struct FileSource {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl FileSource {
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open audio file: {}", path.display()))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .context("Failed to probe audio format")?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .context("No audio tracks found")?;
        let track_id = track.id;
        let channels = track.codec_params.channels.map_or(1, |c| c.count()).max(1);
        let sample_rate = track.codec_params.sample_rate.context("Unknown sample rate")?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .context("Failed to create audio decoder")?;

        let mut mono = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => return Err(e.into()),
            };
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(msg)) => {
                    warn!("Skipping undecodable packet: {}", msg);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let mut interleaved = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
            interleaved.copy_interleaved_ref(decoded);
            downmix_into(interleaved.samples(), channels, &mut mono);
        }

        info!(
            "Decoded {}: {} samples, {}Hz, {:.1}s",
            path.display(),
            mono.len(),
            sample_rate,
            mono.len() as f32 / sample_rate as f32
        );

        Ok(Self::from_samples(mono, sample_rate))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate.max(1) as f64)
    }

    /// Sends the file in `batch_len` chunks. With `pace` set, batches are
    /// released at the file's sample rate, like a live device would.
    ///
    /// Returns the number of batches the sender discarded. Stops early if
    /// the pipeline side hangs up.
    pub fn stream(&self, sender: &OverflowSender<Vec<f32>>, batch_len: usize, pace: bool) -> u64 {
        let batch_len = batch_len.max(1);
        let started = Instant::now();
        let mut sent_samples = 0usize;
        let mut discarded = 0u64;

        for chunk in self.samples.chunks(batch_len) {
            if pace {
                let due = Duration::from_secs_f64(sent_samples as f64 / self.sample_rate.max(1) as f64);
                if let Some(wait) = due.checked_sub(started.elapsed()) {
                    thread::sleep(wait);
                }
            }

            match sender.send(chunk.to_vec()) {
                Ok(Delivery::Discarded) | Ok(Delivery::Replaced) => discarded += 1,
                Ok(Delivery::Queued) => {}
                Err(_) => {
                    info!("Pipeline closed, stopping file playback");
                    break;
                }
            }
            sent_samples += chunk.len();
        }

        discarded
    }
}

/// Averages interleaved frames down to one channel.
pub fn downmix_into(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels <= 1 {
        out.extend_from_slice(interleaved);
    } else {
        out.extend(
            interleaved
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );
    }
}
