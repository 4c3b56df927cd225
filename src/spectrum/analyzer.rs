use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Samples kept for each transform
pub const FFT_SIZE: usize = 1024;

/// Raw magnitudes of the most recent `FFT_SIZE` mono samples.
///
/// Fed with every rendered stereo buffer; `magnitudes` windows the ring with a
/// Hann window and returns `FFT_SIZE / 2` linear magnitudes.
pub struct MagnitudeAnalyzer {
    ring: Vec<f32>,
    write_idx: usize,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    fft: Arc<dyn Fft<f32>>,
}

impl Default for MagnitudeAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl MagnitudeAnalyzer {
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);
        let window = (0..FFT_SIZE)
            .map(|i| {
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (FFT_SIZE - 1) as f32).cos())
            })
            .collect();
        Self {
            ring: vec![0.0; FFT_SIZE],
            write_idx: 0,
            window,
            scratch: vec![Complex::new(0.0, 0.0); FFT_SIZE],
            fft,
        }
    }

    /// Push interleaved stereo PCM as `(L + R) / 65536` mono
    pub fn feed(&mut self, stereo: &[i16]) {
        for frame in stereo.chunks_exact(2) {
            self.ring[self.write_idx] = (frame[0] as f32 + frame[1] as f32) / 65536.0;
            self.write_idx = (self.write_idx + 1) % FFT_SIZE;
        }
    }

    pub fn clear(&mut self) {
        self.ring.fill(0.0);
        self.write_idx = 0;
    }

    pub fn magnitudes(&mut self) -> Vec<f32> {
        for i in 0..FFT_SIZE {
            let sample = self.ring[(self.write_idx + i) % FFT_SIZE];
            self.scratch[i] = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);
        self.scratch[..FFT_SIZE / 2].iter().map(|c| c.norm()).collect()
    }
}
