//! The render task: pulls PCM from the gateway while the session is playing,
//! pushes it to the audio sink, feeds the spectrum and reports position and
//! end-of-track back to the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::PlayerConfig;
use crate::engine::{RenderChunk, CHANNELS};
use crate::logging::PlaybackLogger;
use crate::models::PlaybackPhase;
use crate::session::PlaybackSession;
use crate::spectrum::{MagnitudeAnalyzer, SpectrumFrame, SpectrumProcessor, DEFAULT_BINS};

/// Destination of rendered audio: interleaved stereo i16 at the engine rate
pub trait AudioSink: Send + Sync {
    /// Frames that can be written without blocking
    fn free_frames(&self) -> usize;

    /// Queue interleaved stereo samples; returns the frames accepted
    fn write(&self, samples: &[i16]) -> usize;
}

#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Frames requested per fill
    pub buffer_frames: usize,
    /// Longest a fill may take before it counts as a stall
    pub watchdog: Duration,
    /// Poll interval while nothing is playing or the sink is full
    pub idle_sleep: Duration,
    pub spectrum_bins: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            buffer_frames: 1024,
            watchdog: Duration::from_millis(500),
            idle_sleep: Duration::from_millis(5),
            spectrum_bins: DEFAULT_BINS,
        }
    }
}

impl From<&PlayerConfig> for RenderConfig {
    fn from(config: &PlayerConfig) -> Self {
        Self {
            buffer_frames: config.buffer_frames.max(1),
            watchdog: Duration::from_millis(config.watchdog_ms),
            ..Default::default()
        }
    }
}

/// Scale interleaved samples by `volume` in place
pub fn apply_volume(samples: &mut [i16], volume: f32) {
    if volume >= 1.0 {
        return;
    }
    let volume = volume.max(0.0);
    for sample in samples.iter_mut() {
        *sample = (*sample as f32 * volume) as i16;
    }
}

pub struct RenderLoop {
    session: Arc<PlaybackSession>,
    sink: Arc<dyn AudioSink>,
    config: RenderConfig,
    logger: PlaybackLogger,
    is_running: Arc<AtomicBool>,
    analyzer: MagnitudeAnalyzer,
    processor: SpectrumProcessor,
    spectrum_tx: watch::Sender<SpectrumFrame>,
}

impl RenderLoop {
    pub fn new(
        session: Arc<PlaybackSession>,
        sink: Arc<dyn AudioSink>,
        config: RenderConfig,
        logger: PlaybackLogger,
    ) -> Self {
        let processor = SpectrumProcessor::new(config.spectrum_bins);
        let (spectrum_tx, _) = watch::channel(vec![0.0; config.spectrum_bins]);
        Self {
            session,
            sink,
            config,
            logger,
            is_running: Arc::new(AtomicBool::new(false)),
            analyzer: MagnitudeAnalyzer::new(),
            processor,
            spectrum_tx,
        }
    }

    /// Replay-latest stream of smoothed spectrum bins
    pub fn spectrum(&self) -> watch::Receiver<SpectrumFrame> {
        self.spectrum_tx.subscribe()
    }

    /// Start the loop on the runtime
    pub fn spawn(self) -> RenderHandle {
        let is_running = Arc::clone(&self.is_running);
        is_running.store(true, Ordering::SeqCst);
        let spectrum = self.spectrum();
        let task = tokio::spawn(self.run());
        RenderHandle {
            is_running,
            spectrum,
            task,
        }
    }

    async fn run(mut self) {
        info!(
            "Render loop started ({} frames per fill, watchdog {:?})",
            self.config.buffer_frames, self.config.watchdog
        );
        while self.is_running.load(Ordering::SeqCst) {
            if !self.cycle().await {
                tokio::time::sleep(self.config.idle_sleep).await;
            }
        }
        info!("Render loop stopped");
    }

    /// One render pass; false when there was nothing to do
    async fn cycle(&mut self) -> bool {
        let (epoch, volume) = {
            let snapshot = self.session.snapshot();
            match (snapshot.phase, snapshot.epoch) {
                (PlaybackPhase::Playing, Some(epoch)) if !snapshot.seeking => (epoch, snapshot.volume),
                (PlaybackPhase::Loading, _) => {
                    return self.session.drive_deferred_open(self.config.watchdog).await;
                }
                _ => return false,
            }
        };

        let frames = self.sink.free_frames().min(self.config.buffer_frames);
        if frames == 0 {
            return false;
        }

        let gateway = self.session.gateway().clone();
        let started = Instant::now();
        let chunk = match tokio::time::timeout(self.config.watchdog, gateway.render(frames)).await {
            Err(_) => {
                warn!("Render call exceeded {:?}", self.config.watchdog);
                self.session.handle_stall(epoch, self.config.watchdog).await;
                return true;
            }
            Ok(Err(err)) => {
                warn!("Render call failed: {}", err);
                self.session.handle_fault(epoch, err).await;
                return true;
            }
            Ok(Ok(chunk)) => chunk,
        };
        self.logger.record_render_time(chunk.pcm.frames, started.elapsed());

        self.deliver(chunk, volume).await
    }

    async fn deliver(&mut self, chunk: RenderChunk, volume: f32) -> bool {
        let RenderChunk {
            mut pcm,
            requested,
            ended,
            position,
            epoch,
        } = chunk;

        if !pcm.is_empty() {
            apply_volume(&mut pcm.samples, volume);
            let accepted = self.sink.write(&pcm.samples);
            if accepted < pcm.frames {
                debug!("Sink dropped {} frames", pcm.frames - accepted);
            }
            self.update_spectrum(&pcm.samples);
        }
        self.session.report_position(epoch, position);

        let short = pcm.frames < requested;
        let ended = ended || (short && self.session.gateway().is_ended().await.unwrap_or(true));
        if ended {
            self.analyzer.clear();
            self.session.handle_end(epoch).await;
            return true;
        }
        !pcm.is_empty()
    }

    fn update_spectrum(&mut self, samples: &[i16]) {
        self.analyzer.feed(samples);
        let magnitudes = self.analyzer.magnitudes();
        let bins = self.processor.process(&magnitudes).to_vec();
        self.spectrum_tx.send_replace(bins);
    }
}

/// Running render loop
pub struct RenderHandle {
    is_running: Arc<AtomicBool>,
    spectrum: watch::Receiver<SpectrumFrame>,
    task: JoinHandle<()>,
}

impl RenderHandle {
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst) && !self.task.is_finished()
    }

    pub fn spectrum(&self) -> watch::Receiver<SpectrumFrame> {
        self.spectrum.clone()
    }

    /// Stop after the current cycle and wait for the task
    pub async fn shutdown(self) {
        self.is_running.store(false, Ordering::SeqCst);
        if let Err(err) = self.task.await {
            warn!("Render task ended abnormally: {}", err);
        }
    }
}

/// Sink that discards audio while consuming it at real-time speed.
///
/// Used without an output device so tracks still take their real length.
pub struct NullSink {
    sample_rate: u32,
    capacity_frames: usize,
    clock: Mutex<SinkClock>,
}

struct SinkClock {
    anchor: Instant,
    queued: u64,
}

impl NullSink {
    pub fn new(sample_rate: u32, capacity_frames: usize) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            capacity_frames,
            clock: Mutex::new(SinkClock {
                anchor: Instant::now(),
                queued: 0,
            }),
        }
    }

    fn drain(&self, clock: &mut SinkClock) {
        let consumed = (clock.anchor.elapsed().as_secs_f64() * self.sample_rate as f64) as u64;
        if consumed >= clock.queued {
            clock.anchor = Instant::now();
            clock.queued = 0;
        }
    }

    fn pending(&self, clock: &SinkClock) -> u64 {
        let consumed = (clock.anchor.elapsed().as_secs_f64() * self.sample_rate as f64) as u64;
        clock.queued.saturating_sub(consumed)
    }
}

impl AudioSink for NullSink {
    fn free_frames(&self) -> usize {
        let mut clock = self.clock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.drain(&mut clock);
        self.capacity_frames
            .saturating_sub(self.pending(&clock) as usize)
    }

    fn write(&self, samples: &[i16]) -> usize {
        let frames = samples.len() / CHANNELS;
        let mut clock = self.clock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.drain(&mut clock);
        clock.queued += frames as u64;
        frames
    }
}
