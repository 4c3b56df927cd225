//! Instrumented in-memory engine for tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::engine::{NativeEngine, DEVICE_VOLUME_UNITY};
use crate::error::EngineError;
use crate::models::{EffectToggles, Game, Track};

pub const SCRIPTED_TAGS: &str =
    "Green Hill||||||Sonic the Hedgehog||||||Mega Drive||||||Masato Nakamura||||||1991|||||| ";

#[derive(Debug, Clone, Copy)]
pub struct CallRecord {
    pub operation: &'static str,
    pub enter: Instant,
    pub exit: Instant,
}

/// Shared view into a `ScriptedEngine` after it moved into a gateway
#[derive(Default)]
pub struct EngineProbe {
    busy: AtomicBool,
    overlaps: AtomicUsize,
    calls: Mutex<Vec<CallRecord>>,
    call_delay: Mutex<Duration>,
    fill_stalls: AtomicUsize,
    fill_stall: Mutex<Duration>,
    opens: Mutex<Vec<PathBuf>>,
    seeks: Mutex<Vec<i64>>,
    subtracks: Mutex<Vec<u32>>,
    effects: Mutex<Vec<EffectToggles>>,
}

impl EngineProbe {
    /// Number of native calls that started while another was still running
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls().iter().filter(|c| c.operation == operation).count()
    }

    pub fn opened_paths(&self) -> Vec<PathBuf> {
        self.opens.lock().unwrap().clone()
    }

    pub fn seeks(&self) -> Vec<i64> {
        self.seeks.lock().unwrap().clone()
    }

    /// Tunes requested through `select_subtrack`, in call order
    pub fn selected_subtracks(&self) -> Vec<u32> {
        self.subtracks.lock().unwrap().clone()
    }

    pub fn last_effects(&self) -> Option<EffectToggles> {
        self.effects.lock().unwrap().last().copied()
    }

    /// Make the next `count` buffer fills block for `duration`
    pub fn stall_fills(&self, count: usize, duration: Duration) {
        *self.fill_stall.lock().unwrap() = duration;
        self.fill_stalls.store(count, Ordering::SeqCst);
    }

    fn enter(&self, operation: &'static str) -> CallScope<'_> {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        let scope = CallScope {
            probe: self,
            operation,
            enter: Instant::now(),
        };
        let delay = *self.call_delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        scope
    }
}

struct CallScope<'a> {
    probe: &'a EngineProbe,
    operation: &'static str,
    enter: Instant,
}

impl Drop for CallScope<'_> {
    fn drop(&mut self) {
        let exit = Instant::now();
        self.probe.calls.lock().unwrap().push(CallRecord {
            operation: self.operation,
            enter: self.enter,
            exit,
        });
        self.probe.busy.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
struct ScriptedFile {
    total_samples: i64,
    tags: String,
    subtracks: u32,
}

struct OpenFile {
    total_samples: i64,
    position: i64,
    tags: String,
}

/// Deterministic engine: files are declared up front, PCM is a ramp
pub struct ScriptedEngine {
    probe: Arc<EngineProbe>,
    files: HashMap<PathBuf, ScriptedFile>,
    panicking: Vec<PathBuf>,
    sample_rate: u32,
    asset_path: Option<PathBuf>,
    current: Option<OpenFile>,
    playing: bool,
    device_volumes: [u32; 2],
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            probe: Arc::new(EngineProbe::default()),
            files: HashMap::new(),
            panicking: Vec::new(),
            sample_rate: 44_100,
            asset_path: None,
            current: None,
            playing: false,
            device_volumes: [DEVICE_VOLUME_UNITY; 2],
        }
    }

    pub fn with_file(self, path: impl Into<PathBuf>, total_samples: i64, tags: &str) -> (Self, Arc<EngineProbe>) {
        self.add_file(path, total_samples, tags).split()
    }

    pub fn add_file(mut self, path: impl Into<PathBuf>, total_samples: i64, tags: &str) -> Self {
        self.files.insert(
            path.into(),
            ScriptedFile {
                total_samples,
                tags: tags.to_string(),
                subtracks: 1,
            },
        );
        self
    }

    pub fn add_multi_tune(mut self, path: impl Into<PathBuf>, total_samples: i64, subtracks: u32) -> Self {
        self.files.insert(
            path.into(),
            ScriptedFile {
                total_samples,
                tags: String::new(),
                subtracks,
            },
        );
        self
    }

    pub fn add_panicking_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.panicking.push(path.into());
        self
    }

    pub fn probe(&self) -> Arc<EngineProbe> {
        Arc::clone(&self.probe)
    }

    pub fn split(self) -> (Self, Arc<EngineProbe>) {
        let probe = self.probe();
        (self, probe)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn asset_path(&self) -> Option<&Path> {
        self.asset_path.as_deref()
    }
}

/// Builder chaining on the `(engine, probe)` pair returned by `with_file`
pub trait ScriptedPair: Sized {
    fn with_file(self, path: impl Into<PathBuf>, total_samples: i64, tags: &str) -> Self;
    fn with_multi_tune(self, path: impl Into<PathBuf>, total_samples: i64, subtracks: u32) -> Self;
    fn with_panicking_path(self, path: impl Into<PathBuf>) -> Self;
    fn with_call_delay(self, delay: Duration) -> Self;
}

impl ScriptedPair for (ScriptedEngine, Arc<EngineProbe>) {
    fn with_file(self, path: impl Into<PathBuf>, total_samples: i64, tags: &str) -> Self {
        (self.0.add_file(path, total_samples, tags), self.1)
    }

    fn with_multi_tune(self, path: impl Into<PathBuf>, total_samples: i64, subtracks: u32) -> Self {
        (self.0.add_multi_tune(path, total_samples, subtracks), self.1)
    }

    fn with_panicking_path(self, path: impl Into<PathBuf>) -> Self {
        (self.0.add_panicking_path(path), self.1)
    }

    fn with_call_delay(self, delay: Duration) -> Self {
        *self.1.call_delay.lock().unwrap() = delay;
        self
    }
}

impl NativeEngine for ScriptedEngine {
    fn set_sample_rate(&mut self, rate: u32) {
        let _scope = self.probe.enter("set_sample_rate");
        self.sample_rate = rate;
    }

    fn set_asset_search_path(&mut self, path: &Path) {
        let _scope = self.probe.enter("set_asset_search_path");
        self.asset_path = Some(path.to_path_buf());
    }

    fn open(&mut self, path: &Path) -> Result<(), EngineError> {
        let _scope = self.probe.enter("open");
        self.current = None;
        self.playing = false;
        self.device_volumes = [DEVICE_VOLUME_UNITY; 2];
        if self.panicking.iter().any(|p| p == path) {
            panic!("corrupt chip state in {:?}", path);
        }
        let file = self.files.get(path).cloned().ok_or_else(|| EngineError::Unreadable {
            path: path.to_path_buf(),
            reason: "no such file".to_string(),
        })?;
        self.probe.opens.lock().unwrap().push(path.to_path_buf());
        self.current = Some(OpenFile {
            total_samples: file.total_samples,
            position: 0,
            tags: file.tags,
        });
        Ok(())
    }

    fn close(&mut self) {
        let _scope = self.probe.enter("close");
        self.current = None;
        self.playing = false;
    }

    fn play(&mut self) {
        let _scope = self.probe.enter("play");
        self.playing = self.current.is_some();
    }

    fn stop(&mut self) {
        let _scope = self.probe.enter("stop");
        self.playing = false;
    }

    fn is_ended(&self) -> bool {
        let _scope = self.probe.enter("is_ended");
        self.current
            .as_ref()
            .map_or(true, |f| f.position >= f.total_samples)
    }

    fn total_samples(&self) -> i64 {
        let _scope = self.probe.enter("total_samples");
        self.current.as_ref().map_or(0, |f| f.total_samples)
    }

    fn current_sample(&self) -> i64 {
        let _scope = self.probe.enter("current_sample");
        self.current.as_ref().map_or(0, |f| f.position)
    }

    fn seek(&mut self, sample: i64) {
        let _scope = self.probe.enter("seek");
        self.probe.seeks.lock().unwrap().push(sample);
        if let Some(file) = self.current.as_mut() {
            file.position = sample.clamp(0, file.total_samples);
        }
    }

    fn fill_buffer(&mut self, out: &mut [i16], frames: usize) -> usize {
        let _scope = self.probe.enter("fill_buffer");
        if self.probe.fill_stalls.load(Ordering::SeqCst) > 0 {
            self.probe.fill_stalls.fetch_sub(1, Ordering::SeqCst);
            let stall = *self.probe.fill_stall.lock().unwrap();
            std::thread::sleep(stall);
        }
        let Some(file) = self.current.as_mut() else {
            return 0;
        };
        if !self.playing {
            return 0;
        }
        let remaining = (file.total_samples - file.position).max(0) as usize;
        let written = frames.min(remaining).min(out.len() / 2);
        for i in 0..written {
            let value = (((file.position + i as i64) % 100) as i16 - 50) * 100;
            out[i * 2] = value;
            out[i * 2 + 1] = value;
        }
        file.position += written as i64;
        written
    }

    fn raw_tags(&self) -> String {
        let _scope = self.probe.enter("raw_tags");
        self.current.as_ref().map(|f| f.tags.clone()).unwrap_or_default()
    }

    fn probe_length(&mut self, path: &Path) -> Result<i64, EngineError> {
        let _scope = self.probe.enter("probe_length");
        self.files
            .get(path)
            .map(|f| f.total_samples)
            .ok_or_else(|| EngineError::Unsupported {
                path: path.to_path_buf(),
                reason: "unknown file".to_string(),
            })
    }

    fn device_count(&self) -> usize {
        let _scope = self.probe.enter("device_count");
        2
    }

    fn device_name(&self, id: u32) -> String {
        let _scope = self.probe.enter("device_name");
        match id {
            0 => "YM2612".to_string(),
            1 => "SN76489".to_string(),
            _ => String::new(),
        }
    }

    fn device_volume(&self, id: u32) -> u32 {
        let _scope = self.probe.enter("device_volume");
        self.device_volumes.get(id as usize).copied().unwrap_or(0)
    }

    fn set_device_volume(&mut self, id: u32, volume: u32) {
        let _scope = self.probe.enter("set_device_volume");
        if let Some(slot) = self.device_volumes.get_mut(id as usize) {
            *slot = volume;
        }
    }

    fn select_subtrack(&mut self, index: u32) -> bool {
        let _scope = self.probe.enter("select_subtrack");
        self.probe.subtracks.lock().unwrap().push(index);
        let Some(path) = self.probe.opens.lock().unwrap().last().cloned() else {
            return false;
        };
        self.files.get(&path).map_or(false, |f| index < f.subtracks)
    }

    fn set_effects(&mut self, effects: EffectToggles) {
        let _scope = self.probe.enter("set_effects");
        self.probe.effects.lock().unwrap().push(effects);
    }
}

/// Game with `count` tracks at `/games/<id>/NN.vgm`
pub fn scripted_game(id: i64, count: usize) -> Game {
    let tracks = (0..count)
        .map(|i| {
            Track::new(
                id * 100 + i as i64,
                format!("/games/{}/{:02}.vgm", id, i + 1),
                format!("Track {}", i + 1),
                i as u32 + 1,
            )
        })
        .collect();
    Game::new(id, format!("Game {}", id))
        .with_system("Mega Drive")
        .with_tracks(tracks)
}

/// Engine that knows every track of `game`, each `total_samples` long
pub fn engine_for(game: &Game, total_samples: i64) -> (ScriptedEngine, Arc<EngineProbe>) {
    game.tracks
        .iter()
        .fold(ScriptedEngine::new(), |engine, track| {
            engine.add_file(track.path.clone(), total_samples, SCRIPTED_TAGS)
        })
        .split()
}
