//! Streaming linear rate conversion for interleaved stereo `i16` PCM.
//!
//! Decoded files arrive at their own rate; the engine renders at the output
//! rate. The converter keeps one frame of history so consecutive packets join
//! without clicks.

use std::collections::VecDeque;

use super::CHANNELS;

#[derive(Debug, Clone)]
pub struct StereoResampler {
    src_rate: u32,
    dst_rate: u32,
    /// Source frames advanced per output frame
    step: f64,
    /// Read position relative to `history`
    phase: f64,
    history: Option<[i16; CHANNELS]>,
}

impl StereoResampler {
    pub fn new(src_rate: u32, dst_rate: u32) -> Self {
        let mut resampler = Self {
            src_rate,
            dst_rate,
            step: 1.0,
            phase: 0.0,
            history: None,
        };
        resampler.set_rates(src_rate, dst_rate);
        resampler
    }

    pub fn set_rates(&mut self, src_rate: u32, dst_rate: u32) {
        self.src_rate = src_rate;
        self.dst_rate = dst_rate;
        self.step = if dst_rate == 0 {
            0.0
        } else {
            src_rate as f64 / dst_rate as f64
        };
        self.reset();
    }

    /// Drop history, e.g. after a seek
    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.history = None;
    }

    pub fn is_passthrough(&self) -> bool {
        self.src_rate == self.dst_rate
    }

    pub fn rates(&self) -> (u32, u32) {
        (self.src_rate, self.dst_rate)
    }

    /// Convert `input` and append the result to `out`
    pub fn process_into(&mut self, input: &[i16], out: &mut VecDeque<i16>) {
        if self.is_passthrough() {
            out.extend(input.iter().copied());
            return;
        }
        if self.src_rate == 0 || self.dst_rate == 0 {
            return;
        }

        let frames = input.len() / CHANNELS;
        if frames == 0 {
            return;
        }
        let frame_at = |index: usize, history: &Option<[i16; CHANNELS]>| -> [i16; CHANNELS] {
            match (history, index) {
                (Some(prev), 0) => *prev,
                (Some(_), i) => [input[(i - 1) * CHANNELS], input[(i - 1) * CHANNELS + 1]],
                (None, i) => [input[i * CHANNELS], input[i * CHANNELS + 1]],
            }
        };
        let available = frames + usize::from(self.history.is_some());

        while self.phase + 1.0 <= (available - 1) as f64 {
            let index = self.phase.floor() as usize;
            let frac = (self.phase - index as f64) as f32;
            let a = frame_at(index, &self.history);
            let b = frame_at(index + 1, &self.history);
            for c in 0..CHANNELS {
                let s = a[c] as f32 + (b[c] as f32 - a[c] as f32) * frac;
                out.push_back(s.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16);
            }
            self.phase += self.step;
        }

        self.phase = (self.phase - (available - 1) as f64).max(0.0);
        self.history = Some(frame_at(available - 1, &self.history));
    }
}
