//! Playback session: the state machine around the one open track.
//!
//! Commands lock the session and then call into the gateway (session before
//! gateway, never the reverse). The render loop talks to the session through
//! `report_position`, `handle_end` and `handle_fault`; each carries the engine
//! epoch it observed and is dropped when that epoch is no longer current.
//!
//! No command awaits an engine that a fault left busy. The close is queued
//! on its own task and any open requested meanwhile is deferred; the render
//! loop completes it through `drive_deferred_open` once the engine lets go.

pub mod events;
mod state;

pub use events::SessionEvent;

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::PlayerConfig;
use crate::engine::{ChipDevice, EngineGateway, Tags};
use crate::error::{EngineError, PlayerError, SessionError};
use crate::error_recovery::{ErrorRecoveryManager, RecoveryResult};
use crate::library::TrackLibrary;
use crate::logging::{OperationTimer, PlaybackLogger};
use crate::models::{EffectToggles, Game, PlaybackPhase, PlaybackSnapshot, Track};
use crate::sequencer::{Advance, NextTrack, RepeatPolicy, SequenceMode, TrackSequencer};
use state::{Cursor, SessionState, Transport};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub sample_rate: u32,
    pub volume: f32,
    pub effects: EffectToggles,
    pub mode: SequenceMode,
    pub repeat: RepeatPolicy,
    /// Transport after `next()`/`previous()` when nothing is playing
    pub autoplay: bool,
    pub max_stall_recoveries: u32,
    /// Fixed shuffle seed
    pub seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            volume: 0.8,
            effects: EffectToggles::default(),
            mode: SequenceMode::default(),
            repeat: RepeatPolicy::default(),
            autoplay: true,
            max_stall_recoveries: crate::error_recovery::DEFAULT_MAX_RECOVERY_ATTEMPTS,
            seed: None,
        }
    }
}

impl From<&PlayerConfig> for SessionConfig {
    fn from(config: &PlayerConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            volume: config.default_volume,
            effects: EffectToggles {
                bass: config.bass,
                reverb: config.reverb,
            },
            mode: config.sequence_mode,
            repeat: config.repeat_policy,
            autoplay: config.autoplay,
            max_stall_recoveries: config.max_stall_recoveries,
            seed: None,
        }
    }
}

struct SessionInner {
    state: SessionState,
    sequencer: TrackSequencer,
    recovery: ErrorRecoveryManager,
    autoplay: bool,
    snapshot: PlaybackSnapshot,
    /// Where to pick up after the watchdog gave up
    resume: Option<(Cursor, i64)>,
    /// Close queued behind a stalled native call
    pending_close: Option<JoinHandle<()>>,
    /// Open waiting for `pending_close` to finish
    deferred: Option<DeferredOpen>,
}

struct DeferredOpen {
    cursor: Cursor,
    position: i64,
    autoplay: bool,
    /// Silent stall retry; further waiting counts against the recovery budget
    recovering: bool,
    since: Instant,
}

struct LoadedTrack {
    epoch: u64,
    total_samples: i64,
    tags: Tags,
    position: i64,
}

pub struct PlaybackSession {
    inner: Mutex<SessionInner>,
    gateway: EngineGateway,
    library: Option<Arc<dyn TrackLibrary>>,
    logger: PlaybackLogger,
    state_tx: watch::Sender<PlaybackSnapshot>,
    events_tx: broadcast::Sender<SessionEvent>,
}

/// Seek target inside `[0, total - 1]`, 0 when the length is unknown
pub fn clamp_position(position: i64, total_samples: i64) -> i64 {
    if total_samples <= 0 {
        0
    } else {
        position.clamp(0, total_samples - 1)
    }
}

impl PlaybackSession {
    pub fn new(gateway: EngineGateway, config: SessionConfig, logger: PlaybackLogger) -> Self {
        let mut snapshot = PlaybackSnapshot::idle(
            config.sample_rate,
            config.volume.clamp(0.0, 1.0),
            config.effects,
        );
        snapshot.sequence_mode = config.mode;
        snapshot.repeat = config.repeat;

        let sequencer = match config.seed {
            Some(seed) => TrackSequencer::with_seed(config.mode, config.repeat, seed),
            None => TrackSequencer::new(config.mode, config.repeat),
        };
        let (state_tx, _) = watch::channel(snapshot.clone());
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                sequencer,
                recovery: ErrorRecoveryManager::with_max_attempts(
                    logger.clone(),
                    config.max_stall_recoveries,
                ),
                autoplay: config.autoplay,
                snapshot,
                resume: None,
                pending_close: None,
                deferred: None,
            }),
            gateway,
            library: None,
            logger,
            state_tx,
            events_tx,
        }
    }

    pub fn with_library(mut self, library: Arc<dyn TrackLibrary>) -> Self {
        self.library = Some(library);
        self
    }

    pub fn gateway(&self) -> &EngineGateway {
        &self.gateway
    }

    pub fn library(&self) -> Option<&Arc<dyn TrackLibrary>> {
        self.library.as_ref()
    }

    /// Latest published state
    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.state_tx.borrow().clone()
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.state_tx.borrow().phase
    }

    /// Replay-latest state stream
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.state_tx.subscribe()
    }

    /// Ordered event stream from now on
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // no receivers is fine
        let _ = self.events_tx.send(event);
    }

    fn publish(&self, inner: &SessionInner) {
        self.state_tx.send_replace(inner.snapshot.clone());
    }

    fn transition(&self, inner: &mut SessionInner, next: SessionState) {
        let from = inner.state.phase();
        inner.state = next;
        let to = inner.state.phase();

        let snapshot = &mut inner.snapshot;
        snapshot.phase = to;
        snapshot.epoch = inner.state.epoch();
        if !to.has_open_track() {
            snapshot.seeking = false;
        }
        match &inner.state {
            SessionState::Idle => {
                snapshot.game = None;
                snapshot.track_index = None;
                snapshot.position = 0;
                snapshot.total_samples = 0;
                snapshot.tags = None;
            }
            SessionState::Loading { cursor } => {
                snapshot.game = Some(Arc::clone(&cursor.game));
                snapshot.track_index = Some(cursor.index);
                snapshot.position = 0;
                snapshot.total_samples = 0;
                snapshot.tags = None;
            }
            SessionState::Active {
                cursor,
                total_samples,
                ..
            } => {
                snapshot.game = Some(Arc::clone(&cursor.game));
                snapshot.track_index = Some(cursor.index);
                snapshot.total_samples = *total_samples;
            }
            SessionState::Ended { cursor } => {
                snapshot.game = Some(Arc::clone(&cursor.game));
                snapshot.track_index = Some(cursor.index);
            }
        }

        self.publish(inner);
        if from != to {
            debug!("Session {} -> {}", from.as_str(), to.as_str());
            self.emit(SessionEvent::PhaseChanged { from, to });
        }
    }

    /// Load track `index` of `game`, starting it when `autoplay` is set
    pub async fn open(&self, game: Arc<Game>, index: usize, autoplay: bool) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        self.open_locked(&mut inner, game, index, autoplay, None, false)
            .await
    }

    async fn open_locked(
        &self,
        inner: &mut SessionInner,
        game: Arc<Game>,
        index: usize,
        autoplay: bool,
        start_at: Option<i64>,
        recovering: bool,
    ) -> Result<(), SessionError> {
        if game.is_empty() {
            return Err(SessionError::EmptyGame);
        }
        let track = game
            .track(index)
            .cloned()
            .ok_or(SessionError::InvalidTrackIndex {
                index,
                len: game.len(),
            })?;

        if Self::engine_busy(inner) {
            debug!("Engine still busy, deferring open of track {}", index);
            let cursor = Cursor { game, index };
            self.defer_open(inner, cursor, start_at.unwrap_or(0), autoplay, false);
            return Ok(());
        }

        let timer = OperationTimer::new("open");
        inner.resume = None;
        inner.deferred = None;
        if let Some(pending) = inner.pending_close.take() {
            let _ = pending.await;
        }
        self.transition(
            inner,
            SessionState::Loading {
                cursor: Cursor {
                    game: Arc::clone(&game),
                    index,
                },
            },
        );

        let loaded = match self
            .load_track(&track, autoplay, start_at, inner.snapshot.effects)
            .await
        {
            Ok(loaded) => loaded,
            Err(err) => {
                // a failure after the open itself still leaves a track in the engine
                if let Err(close_err) = self.gateway.close().await {
                    warn!("Close after failed load failed: {}", close_err);
                }
                self.logger
                    .log_load_failed(&track.path.display().to_string(), &err.to_string());
                self.transition(inner, SessionState::Idle);
                self.emit(SessionEvent::LoadFailed {
                    path: track.path.clone(),
                    message: err.user_message(),
                });
                return Err(err.into());
            }
        };

        let game = self.record_resolved_duration(game, index, loaded.total_samples);
        inner.sequencer.mark_played(&game, index);
        if !recovering {
            inner.recovery.clear_recovery_attempts();
        }

        inner.snapshot.tags = Some(loaded.tags);
        inner.snapshot.position = loaded.position;
        let title = inner
            .snapshot
            .tags
            .as_ref()
            .filter(|t| t.has_track_title())
            .map(Tags::display_title)
            .unwrap_or_else(|| track.display_name());

        self.emit(SessionEvent::TrackLoaded {
            game_id: game.id,
            track_index: index,
            title: title.clone(),
            total_samples: loaded.total_samples,
        });
        let transport = if autoplay {
            Transport::Playing
        } else {
            Transport::Paused
        };
        self.transition(
            inner,
            SessionState::Active {
                cursor: Cursor { game, index },
                transport,
                total_samples: loaded.total_samples,
                epoch: loaded.epoch,
            },
        );

        self.logger
            .log_track_loaded(&title, loaded.total_samples, timer.finish());
        if autoplay {
            self.logger.log_playback_started(&title);
        }
        Ok(())
    }

    async fn load_track(
        &self,
        track: &Track,
        autoplay: bool,
        start_at: Option<i64>,
        effects: EffectToggles,
    ) -> Result<LoadedTrack, EngineError> {
        self.gateway.close().await?;
        let mut epoch = self
            .gateway
            .try_open(&track.path, track.subtrack_index())
            .await?;
        let total_samples = self.gateway.total_samples().await?;
        let tags = self.gateway.tags().await?;
        self.gateway.set_effects(effects).await?;

        let mut position = 0;
        if let Some(start) = start_at {
            let target = clamp_position(start, total_samples);
            if target > 0 {
                epoch = self.gateway.seek(target).await?;
                position = target;
            }
        }
        if !autoplay {
            self.gateway.stop().await?;
        }

        Ok(LoadedTrack {
            epoch,
            total_samples,
            tags,
            position,
        })
    }

    /// Fill in a track duration learned from an open, persisting it once
    fn record_resolved_duration(&self, mut game: Arc<Game>, index: usize, total_samples: i64) -> Arc<Game> {
        let needs_duration = game.track(index).map_or(false, |t| !t.has_duration());
        if needs_duration && total_samples >= 0 {
            let track = &mut Arc::make_mut(&mut game).tracks[index];
            track.resolve_duration(total_samples);
            self.persist_duration(track.id, total_samples);
        }
        game
    }

    fn persist_duration(&self, track_id: i64, samples: i64) {
        if let Some(library) = &self.library {
            if let Err(err) = library.record_duration(track_id, samples) {
                warn!("Cannot record duration of track {}: {}", track_id, err);
            }
        }
    }

    /// Close the engine after a failed transport call and report it
    async fn engine_failed(&self, inner: &mut SessionInner, err: EngineError) -> SessionError {
        error!("Engine failure: {}", err);
        if let Err(close_err) = self.gateway.close().await {
            warn!("Close after engine failure failed: {}", close_err);
        }
        self.transition(inner, SessionState::Idle);
        self.emit(SessionEvent::EngineFailed {
            message: err.user_message(),
        });
        SessionError::Engine(err)
    }

    /// Resume a paused track, or reopen the track a stall interrupted
    pub async fn play(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        match inner.state.clone() {
            SessionState::Active {
                cursor,
                transport: Transport::Paused,
                total_samples,
                epoch,
            } => {
                if let Err(err) = self.gateway.play().await {
                    return Err(self.engine_failed(&mut inner, err).await);
                }
                self.transition(
                    &mut inner,
                    SessionState::Active {
                        cursor,
                        transport: Transport::Playing,
                        total_samples,
                        epoch,
                    },
                );
                let title = inner.snapshot.title();
                self.logger.log_playback_started(&title);
                Ok(())
            }
            SessionState::Idle => match inner.resume.take() {
                Some((cursor, position)) => {
                    info!("Reopening interrupted track at sample {}", position);
                    self.open_locked(&mut inner, cursor.game, cursor.index, true, Some(position), false)
                        .await
                }
                None => Ok(()),
            },
            _ => {
                if let Some(deferred) = inner.deferred.as_mut() {
                    deferred.autoplay = true;
                }
                Ok(())
            }
        }
    }

    pub async fn pause(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        let SessionState::Active {
            cursor,
            transport: Transport::Playing,
            total_samples,
            epoch,
        } = inner.state.clone()
        else {
            if let Some(deferred) = inner.deferred.as_mut() {
                deferred.autoplay = false;
            }
            return Ok(());
        };
        if let Err(err) = self.gateway.stop().await {
            return Err(self.engine_failed(&mut inner, err).await);
        }
        self.transition(
            &mut inner,
            SessionState::Active {
                cursor,
                transport: Transport::Paused,
                total_samples,
                epoch,
            },
        );
        self.logger.log_playback_paused(inner.snapshot.position);
        Ok(())
    }

    pub async fn toggle(&self) -> Result<(), SessionError> {
        if self.phase() == PlaybackPhase::Playing {
            self.pause().await
        } else {
            self.play().await
        }
    }

    /// Seek the open track; returns the clamped target
    pub async fn seek(&self, position: i64) -> Result<i64, SessionError> {
        let mut inner = self.inner.lock().await;
        let SessionState::Active {
            cursor,
            transport,
            total_samples,
            ..
        } = inner.state.clone()
        else {
            return Err(SessionError::NoTrackLoaded);
        };

        let target = clamp_position(position, total_samples);
        let from = inner.snapshot.position;
        let timer = OperationTimer::new("seek");

        inner.snapshot.seeking = true;
        self.publish(&inner);
        let epoch = match self.gateway.seek(target).await {
            Ok(epoch) => epoch,
            Err(err) => return Err(self.engine_failed(&mut inner, err).await),
        };

        inner.snapshot.seeking = false;
        inner.snapshot.position = target;
        self.transition(
            &mut inner,
            SessionState::Active {
                cursor,
                transport,
                total_samples,
                epoch,
            },
        );
        self.logger.log_seek(from, target, timer.finish());
        Ok(target)
    }

    fn transport_after_skip(inner: &SessionInner) -> bool {
        match inner.state {
            SessionState::Active {
                transport: Transport::Playing,
                ..
            } => true,
            SessionState::Active {
                transport: Transport::Paused,
                ..
            } => false,
            _ => inner
                .deferred
                .as_ref()
                .map_or(inner.autoplay, |deferred| deferred.autoplay),
        }
    }

    fn skip_cursor(inner: &SessionInner) -> Option<Cursor> {
        inner
            .state
            .cursor()
            .cloned()
            .or_else(|| inner.resume.as_ref().map(|(cursor, _)| cursor.clone()))
    }

    /// Skip to the sequencer's next track
    pub async fn next(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        let cursor = Self::skip_cursor(&inner).ok_or(SessionError::NoTrackLoaded)?;
        let autoplay = Self::transport_after_skip(&inner);
        let next = inner
            .sequencer
            .next(&cursor.game, cursor.index, Advance::Explicit);
        self.advance(&mut inner, cursor, next, autoplay).await
    }

    /// Go to the positionally previous track; a no-op at the first track
    /// unless the whole game repeats
    pub async fn previous(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        let cursor = Self::skip_cursor(&inner).ok_or(SessionError::NoTrackLoaded)?;
        let Some(index) = inner.sequencer.previous(&cursor.game, cursor.index) else {
            return Ok(());
        };
        let autoplay = Self::transport_after_skip(&inner);
        self.open_locked(&mut inner, cursor.game, index, autoplay, None, false)
            .await
    }

    async fn advance(
        &self,
        inner: &mut SessionInner,
        cursor: Cursor,
        next: NextTrack,
        autoplay: bool,
    ) -> Result<(), SessionError> {
        match next {
            NextTrack::Track(index) => {
                self.open_locked(inner, cursor.game, index, autoplay, None, false)
                    .await
            }
            NextTrack::EndOfGame => {
                if inner.state.epoch().is_some() {
                    if let Err(err) = self.gateway.close().await {
                        warn!("Close at end of game failed: {}", err);
                    }
                }
                inner.resume = None;
                inner.deferred = None;
                self.transition(inner, SessionState::Idle);
                self.logger.log_end_of_queue(&cursor.game.display_name());
                self.emit(SessionEvent::EndOfQueue {
                    game_id: cursor.game.id,
                });
                Ok(())
            }
        }
    }

    pub async fn stop(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        inner.resume = None;
        if matches!(inner.state, SessionState::Idle) {
            return Ok(());
        }
        if inner.deferred.take().is_some() {
            // the queued close leaves the engine empty
            self.transition(&mut inner, SessionState::Idle);
            self.logger.log_playback_stopped("stopped while the engine was busy");
            return Ok(());
        }
        let stopped = match self.gateway.stop().await {
            Ok(()) => self.gateway.close().await,
            Err(err) => {
                let _ = self.gateway.close().await;
                Err(err)
            }
        };
        self.transition(&mut inner, SessionState::Idle);
        self.logger.log_playback_stopped("stopped by user");
        stopped.map_err(SessionError::from)
    }

    /// Render loop observed the end of the track opened in `epoch`
    pub async fn handle_end(&self, epoch: u64) {
        let mut inner = self.inner.lock().await;
        let SessionState::Active {
            cursor,
            epoch: current,
            ..
        } = inner.state.clone()
        else {
            return;
        };
        if current != epoch {
            debug!("Ignoring end signal from epoch {} (current {})", epoch, current);
            return;
        }

        if let Err(err) = self.gateway.close().await {
            warn!("Close at end of track failed: {}", err);
        }
        let title = inner.snapshot.title();
        inner.snapshot.position = inner.snapshot.total_samples;
        self.transition(&mut inner, SessionState::Ended { cursor: cursor.clone() });
        self.logger.log_end_of_track(&title);

        let next = inner.sequencer.next(&cursor.game, cursor.index, Advance::Auto);
        if let Err(err) = self.advance(&mut inner, cursor, next, true).await {
            warn!("Advancing after end of track failed: {}", err);
        }
    }

    /// Render loop saw `error` from the engine while rendering `epoch`
    pub async fn handle_fault(&self, epoch: u64, error: EngineError) {
        let mut inner = self.inner.lock().await;
        let SessionState::Active {
            cursor,
            transport,
            epoch: current,
            ..
        } = inner.state.clone()
        else {
            return;
        };
        if current != epoch {
            return;
        }

        let position = inner.snapshot.position;
        let fault = PlayerError::Engine(error.clone());
        self.queue_close(&mut inner);
        match inner.recovery.attempt_recovery(&fault) {
            RecoveryResult::Retry(_) => {
                let attempt = inner.recovery.attempts_for(&fault);
                self.logger.log_recovery(attempt, position);
                let autoplay = transport == Transport::Playing;
                self.defer_open(&mut inner, cursor, position, autoplay, true);
                self.emit(SessionEvent::Recovering { attempt, position });
            }
            RecoveryResult::Success(_) | RecoveryResult::Failed(_) => {
                self.surface_fault(&mut inner, cursor, position, error);
            }
        }
    }

    /// Close the engine on its own task; a stalled call keeps the lock until
    /// it returns
    fn queue_close(&self, inner: &mut SessionInner) {
        let previous = inner.pending_close.take();
        let gateway = self.gateway.clone();
        inner.pending_close = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            if let Err(err) = gateway.close().await {
                warn!("Close after engine fault failed: {}", err);
            }
        }));
    }

    fn engine_busy(inner: &SessionInner) -> bool {
        inner
            .pending_close
            .as_ref()
            .map_or(false, |close| !close.is_finished())
    }

    fn defer_open(&self, inner: &mut SessionInner, cursor: Cursor, position: i64, autoplay: bool, recovering: bool) {
        inner.resume = None;
        self.transition(inner, SessionState::Loading { cursor: cursor.clone() });
        inner.deferred = Some(DeferredOpen {
            cursor,
            position,
            autoplay,
            recovering,
            since: Instant::now(),
        });
    }

    /// Give up on the engine: Idle with a resume point for the next `play()`
    fn surface_fault(&self, inner: &mut SessionInner, cursor: Cursor, position: i64, error: EngineError) {
        if let EngineError::Stalled { waited, .. } = &error {
            self.logger.log_stall(*waited, false);
        }
        self.transition(inner, SessionState::Idle);
        inner.resume = Some((cursor, position));
        let event = match error {
            EngineError::Stalled { .. } => SessionEvent::PlaybackStalled {
                message: error.user_message(),
            },
            _ => SessionEvent::EngineFailed {
                message: error.user_message(),
            },
        };
        self.emit(event);
    }

    /// Complete an open deferred behind a busy engine.
    ///
    /// Called by the render loop while the session is Loading. A recovery
    /// that keeps waiting longer than `watchdog` counts as another stall and
    /// surfaces once the recovery budget is spent. Returns true when the
    /// session changed.
    pub async fn drive_deferred_open(&self, watchdog: Duration) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(mut deferred) = inner.deferred.take() else {
            return false;
        };

        if Self::engine_busy(&inner) {
            let waited = deferred.since.elapsed();
            if !deferred.recovering || waited < watchdog {
                inner.deferred = Some(deferred);
                return false;
            }
            let stall = EngineError::Stalled {
                operation: "fill_buffer",
                waited,
            };
            return match inner.recovery.attempt_recovery(&PlayerError::Engine(stall.clone())) {
                RecoveryResult::Retry(_) => {
                    let attempt = inner.recovery.attempts_for(&PlayerError::Engine(stall));
                    self.logger.log_recovery(attempt, deferred.position);
                    self.emit(SessionEvent::Recovering {
                        attempt,
                        position: deferred.position,
                    });
                    deferred.since = Instant::now();
                    inner.deferred = Some(deferred);
                    false
                }
                RecoveryResult::Success(_) | RecoveryResult::Failed(_) => {
                    self.surface_fault(&mut inner, deferred.cursor, deferred.position, stall);
                    true
                }
            };
        }

        let DeferredOpen {
            cursor,
            position,
            autoplay,
            recovering,
            ..
        } = deferred;
        if recovering {
            info!("Reopening track {} at sample {}", cursor.index, position);
        }
        let start_at = (position > 0).then_some(position);
        if let Err(err) = self
            .open_locked(&mut inner, cursor.game, cursor.index, autoplay, start_at, recovering)
            .await
        {
            warn!("Deferred open failed: {}", err);
        }
        true
    }

    /// Watchdog expiry on a render call for `epoch`
    pub async fn handle_stall(&self, epoch: u64, waited: Duration) {
        self.handle_fault(
            epoch,
            EngineError::Stalled {
                operation: "fill_buffer",
                waited,
            },
        )
        .await;
    }

    /// Lossy position update from the render loop. Skipped while a command
    /// holds the session, while seeking and for stale epochs.
    pub fn report_position(&self, epoch: u64, position: i64) -> bool {
        let Ok(mut inner) = self.inner.try_lock() else {
            return false;
        };
        if inner.state.epoch() != Some(epoch) || inner.snapshot.seeking {
            return false;
        }
        inner.snapshot.position = position;
        self.publish(&inner);
        true
    }

    /// Master volume in `0.0..=1.0`, applied by the render loop
    pub async fn set_volume(&self, volume: f32) -> f32 {
        let mut inner = self.inner.lock().await;
        inner.snapshot.volume = volume.clamp(0.0, 1.0);
        self.publish(&inner);
        inner.snapshot.volume
    }

    async fn set_effects(&self, update: impl FnOnce(&mut EffectToggles)) -> EffectToggles {
        let mut inner = self.inner.lock().await;
        update(&mut inner.snapshot.effects);
        let effects = inner.snapshot.effects;
        if inner.state.epoch().is_some() {
            if let Err(err) = self.gateway.set_effects(effects).await {
                warn!("Cannot apply effects: {}", err);
            }
        }
        self.publish(&inner);
        effects
    }

    pub async fn toggle_bass(&self) -> bool {
        self.set_effects(|e| e.bass = !e.bass).await.bass
    }

    pub async fn toggle_reverb(&self) -> bool {
        self.set_effects(|e| e.reverb = !e.reverb).await.reverb
    }

    pub async fn set_sequence_mode(&self, mode: SequenceMode) {
        let mut inner = self.inner.lock().await;
        inner.sequencer.set_mode(mode);
        inner.snapshot.sequence_mode = mode;
        self.publish(&inner);
    }

    pub async fn set_repeat_policy(&self, repeat: RepeatPolicy) {
        let mut inner = self.inner.lock().await;
        inner.sequencer.set_repeat(repeat);
        inner.snapshot.repeat = repeat;
        self.publish(&inner);
    }

    /// Swap in an updated copy of the current game
    fn replace_game(&self, inner: &mut SessionInner, game: &Arc<Game>) {
        let mut changed = false;
        if let Some(cursor) = inner.state.cursor_mut() {
            if cursor.game.id == game.id {
                cursor.game = Arc::clone(game);
                changed = true;
            }
        }
        if let Some((cursor, _)) = inner.resume.as_mut() {
            if cursor.game.id == game.id {
                cursor.game = Arc::clone(game);
            }
        }
        if let Some(deferred) = inner.deferred.as_mut() {
            if deferred.cursor.game.id == game.id {
                deferred.cursor.game = Arc::clone(game);
            }
        }
        if changed {
            inner.snapshot.game = Some(Arc::clone(game));
            self.publish(inner);
        }
    }

    /// Flip the favorite flag of the current track; returns the new value
    pub async fn toggle_favorite(&self) -> Result<bool, PlayerError> {
        let mut inner = self.inner.lock().await;
        let cursor = inner
            .state
            .cursor()
            .cloned()
            .ok_or(SessionError::NoTrackLoaded)?;
        let mut game = cursor.game;
        let track = &mut Arc::make_mut(&mut game).tracks[cursor.index];
        track.favorite = !track.favorite;
        let (track_id, favorite) = (track.id, track.favorite);

        if let Some(library) = &self.library {
            library.set_favorite(track_id, favorite)?;
        }
        self.replace_game(&mut inner, &game);
        Ok(favorite)
    }

    /// Probe every track of `game` with an unknown duration.
    ///
    /// Probing goes through the gateway and leaves the open track alone.
    pub async fn resolve_durations(&self, game: Arc<Game>) -> Arc<Game> {
        let mut game = game;
        for index in 0..game.len() {
            if game.tracks[index].has_duration() {
                continue;
            }
            let path = game.tracks[index].path.clone();
            match self.gateway.probe_length(&path).await {
                Ok(samples) => {
                    let track = &mut Arc::make_mut(&mut game).tracks[index];
                    if track.resolve_duration(samples) {
                        self.persist_duration(track.id, samples);
                    }
                }
                Err(err) => debug!("Cannot probe {:?}: {}", path, err),
            }
        }

        let mut inner = self.inner.lock().await;
        self.replace_game(&mut inner, &game);
        game
    }

    /// Sound chips of the open track
    pub async fn devices(&self) -> Result<Vec<ChipDevice>, SessionError> {
        Ok(self.gateway.devices().await?)
    }

    pub async fn set_device_volume(&self, id: u32, volume: u32) -> Result<(), SessionError> {
        Ok(self.gateway.set_device_volume(id, volume).await?)
    }
}
