//! Serialized access to the native engine.
//!
//! Every operation takes the one engine lock, runs its native call(s) on the
//! blocking pool and releases the lock when the call returns. Callers suspend
//! while waiting for the lock; the async executor never blocks on a native call.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::Mutex;

use super::{ChipDevice, NativeEngine, Tags, CHANNELS};
use crate::error::EngineError;
use crate::models::EffectToggles;

/// PCM produced by one buffer fill
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PcmChunk {
    pub frames: usize,
    /// Interleaved stereo, `frames * 2` samples
    pub samples: Vec<i16>,
}

impl PcmChunk {
    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }
}

/// Result of one render cycle: fill, end check and position read taken under a
/// single lock acquisition
#[derive(Debug, Clone)]
pub struct RenderChunk {
    pub pcm: PcmChunk,
    pub requested: usize,
    pub ended: bool,
    pub position: i64,
    /// Engine epoch the values were observed in
    pub epoch: u64,
}

impl RenderChunk {
    /// Fewer frames than requested: possibly the end of the track
    pub fn is_short(&self) -> bool {
        self.pcm.frames < self.requested
    }
}

struct EngineSlot {
    engine: Box<dyn NativeEngine>,
    /// Bumped on every successful open, every close and every seek
    epoch: u64,
    open_path: Option<PathBuf>,
}

impl EngineSlot {
    fn reset(&mut self) {
        self.engine.close();
        self.open_path = None;
        self.epoch += 1;
    }
}

/// Mutual-exclusion boundary around the single native engine
#[derive(Clone)]
pub struct EngineGateway {
    slot: Arc<Mutex<EngineSlot>>,
}

impl EngineGateway {
    pub fn new<E: NativeEngine>(engine: E) -> Self {
        Self::from_boxed(Box::new(engine))
    }

    pub fn from_boxed(engine: Box<dyn NativeEngine>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(EngineSlot {
                engine,
                epoch: 0,
                open_path: None,
            })),
        }
    }

    async fn call<R, F>(&self, operation: &'static str, f: F) -> Result<R, EngineError>
    where
        F: FnOnce(&mut EngineSlot) -> R + Send + 'static,
        R: Send + 'static,
    {
        let mut guard = Arc::clone(&self.slot).lock_owned().await;
        tokio::task::spawn_blocking(move || f(&mut guard))
            .await
            .map_err(|err| {
                let reason = if err.is_panic() {
                    panic_message(err.into_panic())
                } else {
                    "native call cancelled".to_string()
                };
                warn!("Native call '{}' failed: {}", operation, reason);
                EngineError::Crashed { operation, reason }
            })
    }

    pub async fn set_sample_rate(&self, rate: u32) -> Result<(), EngineError> {
        self.call("set_sample_rate", move |slot| slot.engine.set_sample_rate(rate))
            .await
    }

    pub async fn set_asset_search_path(&self, path: impl Into<PathBuf>) -> Result<(), EngineError> {
        let path = path.into();
        self.call("set_asset_search_path", move |slot| {
            slot.engine.set_asset_search_path(&path)
        })
        .await
    }

    /// Open `path` as the active track; false if unreadable or unsupported
    pub async fn open(&self, path: impl AsRef<Path>) -> bool {
        self.try_open(path.as_ref(), None).await.is_ok()
    }

    /// Open `path` (optionally a tune inside it) and start it.
    ///
    /// Returns the new engine epoch. On failure the engine is closed.
    pub async fn try_open(&self, path: &Path, subtrack: Option<u32>) -> Result<u64, EngineError> {
        let path = path.to_path_buf();
        let result = self
            .call("open", move |slot| {
                if let Err(err) = slot.engine.open(&path) {
                    slot.reset();
                    return Err(err);
                }
                if let Some(index) = subtrack {
                    if !slot.engine.select_subtrack(index) {
                        slot.reset();
                        return Err(EngineError::Unsupported {
                            path,
                            reason: format!("no subtrack {}", index),
                        });
                    }
                }
                slot.engine.play();
                slot.open_path = Some(path);
                slot.epoch += 1;
                Ok(slot.epoch)
            })
            .await;

        match result {
            Ok(inner) => inner,
            Err(crashed) => {
                // the engine may hold a half-loaded file after a crash
                let _ = self.close().await;
                Err(crashed)
            }
        }
    }

    pub async fn close(&self) -> Result<(), EngineError> {
        self.call("close", |slot| slot.reset()).await
    }

    pub async fn play(&self) -> Result<(), EngineError> {
        self.call("play", |slot| slot.engine.play()).await
    }

    pub async fn stop(&self) -> Result<(), EngineError> {
        self.call("stop", |slot| slot.engine.stop()).await
    }

    pub async fn is_ended(&self) -> Result<bool, EngineError> {
        self.call("is_ended", |slot| slot.engine.is_ended()).await
    }

    pub async fn total_samples(&self) -> Result<i64, EngineError> {
        self.call("total_samples", |slot| slot.engine.total_samples())
            .await
    }

    pub async fn current_sample(&self) -> Result<i64, EngineError> {
        self.call("current_sample", |slot| slot.engine.current_sample())
            .await
    }

    /// Seek the active track; returns the new engine epoch
    pub async fn seek(&self, sample: i64) -> Result<u64, EngineError> {
        self.call("seek", move |slot| {
            slot.engine.seek(sample);
            slot.epoch += 1;
            slot.epoch
        })
        .await
    }

    pub async fn fill_buffer(&self, frames: usize) -> Result<PcmChunk, EngineError> {
        self.call("fill_buffer", move |slot| fill(slot.engine.as_mut(), frames))
            .await
    }

    /// One render cycle under a single lock acquisition
    pub async fn render(&self, frames: usize) -> Result<RenderChunk, EngineError> {
        self.call("fill_buffer", move |slot| {
            let pcm = fill(slot.engine.as_mut(), frames);
            RenderChunk {
                pcm,
                requested: frames,
                ended: slot.engine.is_ended(),
                position: slot.engine.current_sample(),
                epoch: slot.epoch,
            }
        })
        .await
    }

    pub async fn raw_tags(&self) -> Result<String, EngineError> {
        self.call("raw_tags", |slot| slot.engine.raw_tags()).await
    }

    pub async fn tags(&self) -> Result<Tags, EngineError> {
        let raw = self.raw_tags().await?;
        Ok(Tags::parse(&raw))
    }

    /// Length of `path` in samples without disturbing the active track
    pub async fn probe_length(&self, path: impl AsRef<Path>) -> Result<i64, EngineError> {
        let path = path.as_ref().to_path_buf();
        let length = self
            .call("probe_length", move |slot| slot.engine.probe_length(&path))
            .await??;
        debug!("Probed length: {} samples", length);
        Ok(length)
    }

    pub async fn device_count(&self) -> Result<usize, EngineError> {
        self.call("device_count", |slot| slot.engine.device_count())
            .await
    }

    pub async fn device_name(&self, id: u32) -> Result<String, EngineError> {
        self.call("device_name", move |slot| slot.engine.device_name(id))
            .await
    }

    pub async fn device_volume(&self, id: u32) -> Result<u32, EngineError> {
        self.call("device_volume", move |slot| slot.engine.device_volume(id))
            .await
    }

    pub async fn set_device_volume(&self, id: u32, volume: u32) -> Result<(), EngineError> {
        self.call("set_device_volume", move |slot| {
            slot.engine.set_device_volume(id, volume)
        })
        .await
    }

    /// All devices of the active track with their current volume
    pub async fn devices(&self) -> Result<Vec<ChipDevice>, EngineError> {
        self.call("devices", |slot| {
            (0..slot.engine.device_count() as u32)
                .map(|id| ChipDevice {
                    id,
                    name: slot.engine.device_name(id),
                    volume: slot.engine.device_volume(id),
                })
                .collect()
        })
        .await
    }

    pub async fn set_effects(&self, effects: EffectToggles) -> Result<(), EngineError> {
        self.call("set_effects", move |slot| slot.engine.set_effects(effects))
            .await
    }

    pub async fn epoch(&self) -> u64 {
        self.slot.lock().await.epoch
    }

    /// Path of the active track, if one is open
    pub async fn open_path(&self) -> Option<PathBuf> {
        self.slot.lock().await.open_path.clone()
    }
}

fn fill(engine: &mut dyn NativeEngine, frames: usize) -> PcmChunk {
    if frames == 0 {
        return PcmChunk::default();
    }
    let mut samples = vec![0i16; frames * CHANNELS];
    let written = engine.fill_buffer(&mut samples, frames).min(frames);
    samples.truncate(written * CHANNELS);
    PcmChunk {
        frames: written,
        samples,
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "native call panicked".to_string()
    }
}
