//! Numeric layouts for the two visualizer styles.
//!
//! Both divide a smoothed bin by a fixed empirical divisor and clamp. Nothing
//! here draws; the results are sizes in the caller's units.

/// Divisor mapping raw FFT magnitude to a full-height bar
pub const BAR_DIVISOR: f32 = 40.0;

/// Divisor for the radial style, whose spokes saturate sooner
pub const SPOKE_DIVISOR: f32 = 30.0;

/// One bar in the mirrored layout, centred vertically
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub index: usize,
    /// Extent above and below the centre line
    pub half_height: f32,
}

/// Symmetric bars: bins run from the centre outwards on both sides.
///
/// Returns `2 * bins.len()` bars left to right.
pub fn mirrored_bars(bins: &[f32], max_height: f32) -> Vec<Bar> {
    let heights: Vec<f32> = bins
        .iter()
        .map(|&v| (v / BAR_DIVISOR * max_height).clamp(0.0, max_height) / 2.0)
        .collect();
    heights
        .iter()
        .rev()
        .chain(heights.iter())
        .enumerate()
        .map(|(index, &half_height)| Bar { index, half_height })
        .collect()
}

/// A spoke of the radial layout
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spoke {
    /// Radians, 0 pointing right, counter-clockwise
    pub angle: f32,
    pub length: f32,
}

/// Kaleidoscope: the bins repeated around a circle `symmetry` times, every
/// other copy reversed so neighbouring segments mirror each other.
pub fn radial_spokes(bins: &[f32], max_length: f32, symmetry: usize) -> Vec<Spoke> {
    if bins.is_empty() || symmetry == 0 {
        return Vec::new();
    }
    let total = bins.len() * symmetry;
    let step = std::f32::consts::TAU / total as f32;
    (0..total)
        .map(|k| {
            let segment = k / bins.len();
            let offset = k % bins.len();
            let bin = if segment % 2 == 0 {
                offset
            } else {
                bins.len() - 1 - offset
            };
            Spoke {
                angle: k as f32 * step,
                length: (bins[bin] / SPOKE_DIVISOR * max_length).clamp(0.0, max_length),
            }
        })
        .collect()
}
