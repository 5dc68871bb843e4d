use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use log::{info, warn};

use super::driver::{Delivery, OverflowSender};
use super::file_source::downmix_into;

/// Live input from the default capture device.
///
/// The device callback only downmixes and enqueues; all processing happens
/// on the pipeline worker. Keep this value alive for as long as samples
/// should flow.
pub struct CaptureSource {
    #[allow(dead_code)]
    stream: Stream,
    sample_rate: u32,
    device_name: String,
}

impl CaptureSource {
    pub fn start(sender: OverflowSender<Vec<f32>>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow!("No input device available"))?;

        let config = device
            .default_input_config()
            .map_err(|e| anyhow!("Failed to get default input config: {}", e))?;

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio device: {}", device_name);
        info!("Audio config: {:?}", config);

        let sample_rate = config.sample_rate().0;
        let stream = Self::create_input_stream(&device, &config.into(), sender)?;
        stream.play()?;

        Ok(Self {
            stream,
            sample_rate,
            device_name,
        })
    }

    fn create_input_stream(
        device: &Device,
        config: &StreamConfig,
        sender: OverflowSender<Vec<f32>>,
    ) -> Result<Stream> {
        let channels = config.channels as usize;
        info!(
            "Creating input stream with {} channels at {} Hz ({:?} on overflow)",
            channels,
            config.sample_rate.0,
            sender.policy()
        );

        let stream = device.build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mut mono = Vec::with_capacity(data.len() / channels.max(1));
                downmix_into(data, channels, &mut mono);

                match sender.send(mono) {
                    Ok(Delivery::Queued) => {}
                    Ok(_) => {
                        let dropped = sender.dropped();
                        if dropped.is_power_of_two() {
                            warn!("Pipeline falling behind, {} capture batches dropped", dropped);
                        }
                    }
                    Err(_) => warn!("Failed to send audio data"),
                }
            },
            |err| {
                warn!("Audio stream error: {}", err);
            },
            None,
        )?;

        Ok(stream)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}
