/// Collects a stream of single samples into fixed-length frames.
///
/// A completed frame is lent to the caller straight from the internal
/// storage, so it must be consumed before the next sample is pushed.
pub struct SampleBuffer {
    frame: Vec<f32>,
    offset: usize,
}

impl SampleBuffer {
    pub fn new(frame_len: usize) -> Self {
        Self {
            frame: vec![0.0; frame_len],
            offset: 0,
        }
    }

    pub fn frame_len(&self) -> usize {
        self.frame.len()
    }

    /// Samples held in the current, incomplete frame.
    pub fn pending(&self) -> usize {
        self.offset
    }

    /// Appends one sample. Returns the filled frame when this sample completes it.
    pub fn push(&mut self, sample: f32) -> Option<&[f32]> {
        self.frame[self.offset] = sample;
        self.offset += 1;

        if self.offset >= self.frame.len() {
            self.offset = 0;
            Some(&self.frame)
        } else {
            None
        }
    }

    /// Pushes a whole batch, handing every frame it completes to `on_frame` in order.
    pub fn push_slice<F>(&mut self, samples: &[f32], mut on_frame: F) -> usize
    where
        F: FnMut(&[f32]),
    {
        let mut completed = 0;
        for &sample in samples {
            if let Some(frame) = self.push(sample) {
                on_frame(frame);
                completed += 1;
            }
        }
        completed
    }

    /// Drops the partial frame. Returns how many samples were discarded.
    pub fn clear(&mut self) -> usize {
        std::mem::replace(&mut self.offset, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_emitted_on_last_sample() {
        let mut buffer = SampleBuffer::new(4);

        assert!(buffer.push(1.0).is_none());
        assert!(buffer.push(2.0).is_none());
        assert!(buffer.push(3.0).is_none());
        assert_eq!(buffer.pending(), 3);

        let frame = buffer.push(4.0).expect("fourth sample fills the frame");
        assert_eq!(frame, &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn test_next_frame_starts_fresh() {
        let mut buffer = SampleBuffer::new(2);
        buffer.push(1.0);
        buffer.push(2.0);

        assert!(buffer.push(3.0).is_none());
        assert_eq!(buffer.push(4.0).unwrap(), &[3.0, 4.0]);
    }

    #[test]
    fn test_push_slice_reports_frames_in_order() {
        let mut buffer = SampleBuffer::new(3);
        let samples: Vec<f32> = (0..8).map(|i| i as f32).collect();

        let mut frames = Vec::new();
        let completed = buffer.push_slice(&samples, |frame| frames.push(frame.to_vec()));

        assert_eq!(completed, 2);
        assert_eq!(frames, vec![vec![0.0, 1.0, 2.0], vec![3.0, 4.0, 5.0]]);
        assert_eq!(buffer.pending(), 2);
    }

    #[test]
    fn test_non_finite_samples_pass_through() {
        let mut buffer = SampleBuffer::new(2);
        buffer.push(f32::NAN);

        let frame = buffer.push(f32::INFINITY).unwrap();
        assert!(frame[0].is_nan());
        assert_eq!(frame[1], f32::INFINITY);
    }

    #[test]
    fn test_clear_discards_partial_frame() {
        let mut buffer = SampleBuffer::new(4);
        buffer.push(0.5);
        buffer.push(0.5);

        assert_eq!(buffer.clear(), 2);
        assert_eq!(buffer.pending(), 0);
    }
}
