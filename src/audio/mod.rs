//! Audio output: a PCM queue and the cpal stream that drains it.

pub mod buffer;
pub mod output;

// Re-export buffer and output types
pub use buffer::PcmRingBuffer;
pub use output::{list_output_devices, CpalSink};
