//! Spectrum visualization data.
//!
//! `MagnitudeAnalyzer` turns rendered PCM into raw FFT magnitudes;
//! `SpectrumProcessor` folds those into a small number of log-spaced,
//! peak-held and smoothed bins; `layout` maps the bins to drawable sizes.

pub mod analyzer;
pub mod layout;

pub use analyzer::MagnitudeAnalyzer;

/// Default number of output bins
pub const DEFAULT_BINS: usize = 32;

/// Weight kept from the previous smoothed value
pub const SMOOTHING: f32 = 0.8;

/// Octaves spanned by the bin ranges
const OCTAVES: f32 = 7.0;

/// Raw magnitudes of one buffer fill, one per FFT bin
pub type SpectrumFrame = Vec<f32>;

#[derive(Debug, Clone)]
pub struct SpectrumProcessor {
    bins: usize,
    smoothed: Vec<f32>,
}

impl Default for SpectrumProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_BINS)
    }
}

impl SpectrumProcessor {
    pub fn new(bins: usize) -> Self {
        Self {
            bins: bins.max(1),
            smoothed: Vec::new(),
        }
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Change the output bin count; smoothing restarts on the next frame
    pub fn set_bins(&mut self, bins: usize) {
        self.bins = bins.max(1);
    }

    /// Last smoothed output, empty before the first frame
    pub fn output(&self) -> &[f32] {
        &self.smoothed
    }

    pub fn reset(&mut self) {
        self.smoothed.clear();
    }

    /// Fold one raw frame into the smoothed bins and return them.
    ///
    /// An empty frame leaves the previous output untouched.
    pub fn process(&mut self, magnitudes: &[f32]) -> &[f32] {
        if magnitudes.is_empty() {
            return &self.smoothed;
        }

        let raw: Vec<f32> = (0..self.bins)
            .map(|i| {
                let (start, end) = bin_range(i, self.bins, magnitudes.len());
                magnitudes[start..end]
                    .iter()
                    .copied()
                    .fold(0.0f32, f32::max)
            })
            .collect();

        if self.smoothed.len() != raw.len() {
            self.smoothed = raw;
        } else {
            for (prev, value) in self.smoothed.iter_mut().zip(raw) {
                *prev = *prev * SMOOTHING + value * (1.0 - SMOOTHING);
            }
        }
        &self.smoothed
    }
}

fn edge(i: usize, bins: usize) -> f32 {
    (2.0f32.powf(i as f32 * OCTAVES / bins as f32) - 1.0).floor()
}

/// Input index range `[start, end)` covered by output bin `i`, never empty
pub fn bin_range(i: usize, bins: usize, input_len: usize) -> (usize, usize) {
    if input_len == 0 {
        return (0, 0);
    }
    let last = input_len - 1;
    let start = (edge(i, bins).max(0.0) as usize).min(last);
    let end = (edge(i + 1, bins).max(0.0) as usize).min(input_len);
    (start, end.max(start + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_frames_give_zero_bins() {
        let mut processor = SpectrumProcessor::default();
        let out = processor.process(&vec![0.0; 512]).to_vec();
        assert_eq!(out.len(), 32);
        assert!(out.iter().all(|&v| v == 0.0));
        let out = processor.process(&vec![0.0; 512]);
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_repeated_frames_converge_geometrically() {
        let mut processor = SpectrumProcessor::default();
        processor.process(&vec![0.0; 512]);

        let frame = vec![10.0f32; 512];
        let mut previous_gap = 10.0f32;
        for _ in 0..20 {
            let out = processor.process(&frame);
            for &value in out {
                let gap = 10.0 - value;
                assert!((gap - previous_gap * SMOOTHING).abs() < 1e-3);
            }
            previous_gap *= SMOOTHING;
        }
        assert!(previous_gap < 0.2);
    }

    #[test]
    fn test_first_frame_is_unsmoothed() {
        let mut processor = SpectrumProcessor::new(8);
        let frame: Vec<f32> = (0..512).map(|i| i as f32).collect();
        let out = processor.process(&frame).to_vec();
        for (i, value) in out.iter().enumerate() {
            let (_, end) = bin_range(i, 8, 512);
            assert_eq!(*value, (end - 1) as f32);
        }
    }

    #[test]
    fn test_bin_count_change_resets_smoothing() {
        let mut processor = SpectrumProcessor::new(32);
        processor.process(&vec![0.0; 512]);
        processor.set_bins(16);
        let out = processor.process(&vec![4.0; 512]);
        assert_eq!(out.len(), 16);
        assert!(out.iter().all(|&v| v == 4.0));
    }

    #[test]
    fn test_empty_frame_is_ignored() {
        let mut processor = SpectrumProcessor::default();
        assert!(processor.process(&[]).is_empty());
        processor.process(&vec![2.0; 512]);
        let out = processor.process(&[]);
        assert_eq!(out.len(), 32);
        assert!(out.iter().all(|&v| v == 2.0));
    }

    #[test]
    fn test_peak_hold_picks_maximum() {
        let mut frame = vec![0.0f32; 512];
        let (start, end) = bin_range(31, 32, 512);
        frame[start] = 1.0;
        frame[end - 1] = 7.0;
        let mut processor = SpectrumProcessor::default();
        assert_eq!(processor.process(&frame)[31], 7.0);
    }

    #[test]
    fn test_ranges_are_monotonic_and_non_empty() {
        for len in [1usize, 8, 64, 512] {
            let mut last_start = 0;
            for i in 0..32 {
                let (start, end) = bin_range(i, 32, len);
                assert!(start < end, "empty range for bin {} len {}", i, len);
                assert!(end <= len.max(start + 1));
                assert!(start >= last_start);
                last_start = start;
            }
        }
        assert_eq!(bin_range(31, 32, 512).1, 127);
    }
}
