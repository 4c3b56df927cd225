pub mod gateway;
pub mod resample;
pub mod symphonia_engine;
pub mod tags;
pub mod timing;

use std::path::Path;

use crate::error::EngineError;
use crate::models::EffectToggles;

pub use gateway::{EngineGateway, PcmChunk, RenderChunk};
pub use symphonia_engine::SymphoniaEngine;
pub use tags::Tags;

/// Unity gain for per-device volumes
pub const DEVICE_VOLUME_UNITY: u32 = 0x100;

/// Output channel count of every engine: interleaved stereo
pub const CHANNELS: usize = 2;

/// The single stateful decoding/emulation resource.
///
/// Implementations are not expected to be reentrant; the gateway guarantees that
/// no two methods ever run at the same time.
pub trait NativeEngine: Send + 'static {
    /// Output rate used for rendering and for every sample count
    fn set_sample_rate(&mut self, rate: u32);

    /// Directory searched for ROM/BIOS images and other companion files
    fn set_asset_search_path(&mut self, path: &Path);

    /// Load `path` as the active track, replacing any previous one.
    ///
    /// On error the engine must be left as if `close` had been called.
    fn open(&mut self, path: &Path) -> Result<(), EngineError>;

    fn close(&mut self);

    fn play(&mut self);

    fn stop(&mut self);

    /// True when the active track finished, or when nothing is open
    fn is_ended(&self) -> bool;

    fn total_samples(&self) -> i64;

    fn current_sample(&self) -> i64;

    fn seek(&mut self, sample: i64);

    /// Render up to `frames` stereo frames into `out` (`frames * 2` samples).
    /// Returns the number of frames written.
    fn fill_buffer(&mut self, out: &mut [i16], frames: usize) -> usize;

    /// Eleven `|||`-separated fields, see [`tags`]
    fn raw_tags(&self) -> String;

    /// Length of `path` in samples without touching the active track
    fn probe_length(&mut self, path: &Path) -> Result<i64, EngineError>;

    fn device_count(&self) -> usize;

    fn device_name(&self, id: u32) -> String;

    fn device_volume(&self, id: u32) -> u32;

    fn set_device_volume(&mut self, id: u32, volume: u32);

    /// Choose a tune inside a multi-tune container after `open`
    fn select_subtrack(&mut self, index: u32) -> bool {
        index == 0
    }

    fn set_effects(&mut self, _effects: EffectToggles) {}
}

/// A sound chip (or PCM stream) reported by the active track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipDevice {
    pub id: u32,
    pub name: String,
    pub volume: u32,
}
