use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::engine::CHANNELS;
use crate::render::AudioSink;

/// Thread-safe FIFO of interleaved stereo i16 between the render loop and the
/// output callback. Writes accept whole frames only.
#[derive(Debug)]
pub struct PcmRingBuffer {
    samples: Mutex<VecDeque<i16>>,
    capacity_frames: usize,
    sample_rate: u32,
    underruns: AtomicUsize,
}

impl PcmRingBuffer {
    pub fn new(capacity_frames: usize, sample_rate: u32) -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity_frames * CHANNELS)),
            capacity_frames,
            sample_rate,
            underruns: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<i16>> {
        self.samples.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn capacity_frames(&self) -> usize {
        self.capacity_frames
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the number of frames available for reading
    pub fn available_read_frames(&self) -> usize {
        self.lock().len() / CHANNELS
    }

    /// Get the number of frames available for writing
    pub fn available_write_frames(&self) -> usize {
        self.capacity_frames
            .saturating_sub(self.available_read_frames())
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Queue as many whole frames of `data` as fit; returns frames written
    pub fn write(&self, data: &[i16]) -> usize {
        let mut samples = self.lock();
        let free = self.capacity_frames.saturating_sub(samples.len() / CHANNELS);
        let frames = (data.len() / CHANNELS).min(free);
        samples.extend(&data[..frames * CHANNELS]);
        frames
    }

    /// Fill `out` from the queue, zero-padding on underrun.
    /// Returns the number of samples that came from the queue.
    pub fn read(&self, out: &mut [i16]) -> usize {
        let mut samples = self.lock();
        let count = out.len().min(samples.len());
        for (slot, sample) in out.iter_mut().zip(samples.drain(..count)) {
            *slot = sample;
        }
        drop(samples);

        out[count..].fill(0);
        if count < out.len() && count > 0 {
            self.underruns.fetch_add(1, Ordering::Relaxed);
        }
        count
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Fill level as a fraction (0.0 to 1.0)
    pub fn fill_level(&self) -> f32 {
        if self.capacity_frames == 0 {
            return 0.0;
        }
        self.available_read_frames() as f32 / self.capacity_frames as f32
    }

    /// Play time currently queued
    pub fn buffered_duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.available_read_frames() as f64 / self.sample_rate as f64)
    }

    /// Reads that ran dry part way through
    pub fn underrun_count(&self) -> usize {
        self.underruns.load(Ordering::Relaxed)
    }
}

impl AudioSink for PcmRingBuffer {
    fn free_frames(&self) -> usize {
        self.available_write_frames()
    }

    fn write(&self, samples: &[i16]) -> usize {
        PcmRingBuffer::write(self, samples)
    }
}
