use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{Receiver, RecvError, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

use super::{RenderFrame, SpectrumPipeline};

/// What a sender does when its bounded queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Wait until the consumer makes room.
    Block,
    /// Throw away the item being sent.
    DropNewest,
    /// Evict the oldest queued item to make room. Keeps the display current.
    #[default]
    DropOldest,
}

/// How a single `send` was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// Queued after evicting an older item.
    Replaced,
    /// The queue was full and the item was thrown away.
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("receiving side of the channel has been dropped")]
pub struct Disconnected;

/// Bounded channel whose sender applies an [`OverflowPolicy`].
pub fn overflow_channel<T>(
    capacity: usize,
    policy: OverflowPolicy,
) -> (OverflowSender<T>, OverflowReceiver<T>) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    let closed = Arc::new(AtomicBool::new(false));

    let sender = OverflowSender {
        tx,
        evict: (policy == OverflowPolicy::DropOldest).then(|| rx.clone()),
        policy,
        dropped: Arc::new(AtomicU64::new(0)),
        closed: Arc::clone(&closed),
    };
    (sender, OverflowReceiver { rx, closed })
}

pub struct OverflowSender<T> {
    tx: Sender<T>,
    evict: Option<Receiver<T>>,
    policy: OverflowPolicy,
    dropped: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl<T> Clone for OverflowSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            evict: self.evict.clone(),
            policy: self.policy,
            dropped: Arc::clone(&self.dropped),
            closed: Arc::clone(&self.closed),
        }
    }
}

impl<T> OverflowSender<T> {
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Items thrown away by this sender and its clones.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn send(&self, item: T) -> Result<Delivery, Disconnected> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Disconnected);
        }

        match self.policy {
            OverflowPolicy::Block => self
                .tx
                .send(item)
                .map(|_| Delivery::Queued)
                .map_err(|_| Disconnected),
            OverflowPolicy::DropNewest => match self.tx.try_send(item) {
                Ok(()) => Ok(Delivery::Queued),
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    Ok(Delivery::Discarded)
                }
                Err(TrySendError::Disconnected(_)) => Err(Disconnected),
            },
            OverflowPolicy::DropOldest => self.send_evicting(item),
        }
    }

    fn send_evicting(&self, mut item: T) -> Result<Delivery, Disconnected> {
        let mut evicted = false;
        loop {
            match self.tx.try_send(item) {
                Ok(()) => {
                    return Ok(if evicted {
                        Delivery::Replaced
                    } else {
                        Delivery::Queued
                    })
                }
                Err(TrySendError::Full(returned)) => {
                    item = returned;
                    // The consumer may have emptied the slot in between; just retry then.
                    if let Some(oldest) = self.evict.as_ref().and_then(|rx| rx.try_recv().ok()) {
                        drop(oldest);
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        evicted = true;
                    }
                }
                Err(TrySendError::Disconnected(_)) => return Err(Disconnected),
            }
        }
    }
}

/// Consuming end of [`overflow_channel`]. Dropping it disconnects every sender,
/// whatever their policy.
pub struct OverflowReceiver<T> {
    rx: Receiver<T>,
    closed: Arc<AtomicBool>,
}

impl<T> OverflowReceiver<T> {
    pub fn recv(&self) -> Result<T, RecvError> {
        self.rx.recv()
    }

    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        self.rx.try_recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    /// Blocks for each item until every sender is gone.
    pub fn iter(&self) -> crossbeam_channel::Iter<'_, T> {
        self.rx.iter()
    }

    pub fn try_iter(&self) -> crossbeam_channel::TryIter<'_, T> {
        self.rx.try_iter()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl<T> Drop for OverflowReceiver<T> {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub batches: u64,
    pub samples: u64,
    pub frames_emitted: u64,
    /// Render frames thrown away because the render queue was full.
    pub frames_dropped: u64,
    /// Samples of the incomplete frame left over at shutdown.
    pub discarded_samples: usize,
}

/// Runs the pipeline on its own thread: sample batches in, render frames out.
///
/// The worker stops once every sample sender has been dropped (remaining
/// batches are still processed) or the render consumer goes away. The partial
/// frame is discarded, never flushed.
pub struct PipelineWorker {
    handle: JoinHandle<WorkerStats>,
}

impl PipelineWorker {
    pub fn spawn(
        pipeline: SpectrumPipeline,
        samples: OverflowReceiver<Vec<f32>>,
        frames: OverflowSender<RenderFrame>,
    ) -> Result<Self> {
        let handle = thread::Builder::new()
            .name("spectrum-pipeline".to_string())
            .spawn(move || Self::run(pipeline, samples, frames))
            .context("Failed to spawn pipeline worker thread")?;

        Ok(Self { handle })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn join(self) -> Result<WorkerStats> {
        self.handle
            .join()
            .map_err(|_| anyhow!("Pipeline worker panicked"))
    }

    fn run(
        mut pipeline: SpectrumPipeline,
        samples: OverflowReceiver<Vec<f32>>,
        frames: OverflowSender<RenderFrame>,
    ) -> WorkerStats {
        info!(
            "Pipeline worker started: {} bars from {}-sample frames",
            pipeline.bar_count(),
            pipeline.frame_len()
        );

        let mut stats = WorkerStats::default();
        let mut consumer_gone = false;

        for batch in samples.iter() {
            stats.batches += 1;
            stats.samples += batch.len() as u64;

            stats.frames_emitted += pipeline.push_samples(&batch, |frame| {
                if consumer_gone {
                    return;
                }
                match frames.send(frame) {
                    Ok(Delivery::Discarded) | Ok(Delivery::Replaced) => {
                        debug!("Render queue full, frame dropped");
                    }
                    Ok(Delivery::Queued) => {}
                    Err(Disconnected) => consumer_gone = true,
                }
            }) as u64;

            if consumer_gone {
                info!("Render consumer disconnected, stopping pipeline worker");
                break;
            }

            if stats.batches % 512 == 0 {
                debug!(
                    "Pipeline: {} batches, {} samples, {} frames",
                    stats.batches, stats.samples, stats.frames_emitted
                );
            }
        }

        stats.discarded_samples = pipeline.discard_partial();
        stats.frames_dropped = frames.dropped();
        if stats.frames_dropped > 0 {
            warn!(
                "{} of {} render frames were dropped by the render queue",
                stats.frames_dropped, stats.frames_emitted
            );
        }
        info!(
            "Pipeline worker stopped: {} frames from {} samples ({} partial samples discarded)",
            stats.frames_emitted, stats.samples, stats.discarded_samples
        );

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::PipelineConfig;

    #[test]
    fn test_drop_newest_discards_incoming() {
        let (tx, rx) = overflow_channel(2, OverflowPolicy::DropNewest);

        assert_eq!(tx.send(1), Ok(Delivery::Queued));
        assert_eq!(tx.send(2), Ok(Delivery::Queued));
        assert_eq!(tx.send(3), Ok(Delivery::Discarded));
        assert_eq!(tx.dropped(), 1);

        drop(tx);
        assert_eq!(rx.iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_drop_oldest_evicts_queued() {
        let (tx, rx) = overflow_channel(2, OverflowPolicy::DropOldest);

        tx.send(1).unwrap();
        tx.send(2).unwrap();
        assert_eq!(tx.send(3), Ok(Delivery::Replaced));
        assert_eq!(tx.send(4), Ok(Delivery::Replaced));
        assert_eq!(tx.dropped(), 2);

        drop(tx);
        assert_eq!(rx.iter().collect::<Vec<_>>(), vec![3, 4]);
    }

    #[test]
    fn test_block_waits_for_consumer() {
        let (tx, rx) = overflow_channel(1, OverflowPolicy::Block);

        let consumer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            rx.iter().collect::<Vec<_>>()
        });
        for i in 0..5 {
            assert_eq!(tx.send(i), Ok(Delivery::Queued));
        }
        assert_eq!(tx.dropped(), 0);
        drop(tx);

        assert_eq!(consumer.join().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_send_fails_once_receiver_dropped() {
        for policy in [
            OverflowPolicy::Block,
            OverflowPolicy::DropNewest,
            OverflowPolicy::DropOldest,
        ] {
            let (tx, rx) = overflow_channel::<u8>(1, policy);
            drop(rx);
            assert_eq!(tx.send(7), Err(Disconnected), "{policy:?}");
        }
    }

    #[test]
    fn test_clones_share_drop_counter() {
        let (tx, _rx) = overflow_channel(1, OverflowPolicy::DropNewest);
        let other = tx.clone();

        tx.send(1).unwrap();
        other.send(2).unwrap();
        assert_eq!(tx.dropped(), 1);
        assert_eq!(other.dropped(), 1);
    }

    #[test]
    fn test_worker_processes_batches_in_order() {
        let config = PipelineConfig {
            frame_len: 256,
            bar_count: 16,
            ..PipelineConfig::default()
        };
        let pipeline = SpectrumPipeline::new(&config).unwrap();
        let (sample_tx, sample_rx) = overflow_channel(4, OverflowPolicy::Block);
        let (frame_tx, frame_rx) = overflow_channel(64, OverflowPolicy::Block);

        let worker = PipelineWorker::spawn(pipeline, sample_rx, frame_tx).unwrap();
        for _ in 0..10 {
            sample_tx.send(vec![0.25; 300]).unwrap();
        }
        drop(sample_tx);

        let frames: Vec<RenderFrame> = frame_rx.iter().collect();
        let stats = worker.join().unwrap();

        assert_eq!(frames.len(), 11);
        assert!(frames.iter().all(|f| f.len() == 16));
        assert_eq!(
            frames.iter().map(|f| f.sequence).collect::<Vec<_>>(),
            (0..11).collect::<Vec<u64>>()
        );
        assert_eq!(
            stats,
            WorkerStats {
                batches: 10,
                samples: 3000,
                frames_emitted: 11,
                frames_dropped: 0,
                discarded_samples: 3000 - 11 * 256,
            }
        );
    }

    #[test]
    fn test_worker_stops_when_consumer_leaves() {
        let config = PipelineConfig {
            frame_len: 64,
            bar_count: 8,
            ..PipelineConfig::default()
        };
        let pipeline = SpectrumPipeline::new(&config).unwrap();
        let (sample_tx, sample_rx) = overflow_channel(16, OverflowPolicy::Block);
        let (frame_tx, frame_rx) = overflow_channel::<RenderFrame>(4, OverflowPolicy::Block);
        drop(frame_rx);

        let worker = PipelineWorker::spawn(pipeline, sample_rx, frame_tx).unwrap();
        sample_tx.send(vec![0.0; 64]).unwrap();

        let stats = worker.join().unwrap();
        assert_eq!(stats.batches, 1);
        assert_eq!(stats.frames_emitted, 1);
    }
}
