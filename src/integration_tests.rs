//! Scenarios across the engine gateway, session, render loop and library.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio_test::{assert_err, assert_ok};

use crate::config::PlayerConfig;
use crate::engine::{EngineGateway, SymphoniaEngine, CHANNELS};
use crate::library::{DirectoryLibrary, TrackLibrary};
use crate::logging::PlaybackLogger;
use crate::models::{Game, PlaybackPhase, Track};
use crate::render::{AudioSink, RenderConfig, RenderHandle, RenderLoop};
use crate::sequencer::RepeatPolicy;
use crate::session::{PlaybackSession, SessionConfig, SessionEvent};
use crate::testing::{engine_for, scripted_game, EngineProbe, ScriptedPair};

/// Accepts everything, keeps only a frame count
#[derive(Default)]
struct CountingSink {
    frames: AtomicUsize,
}

impl CountingSink {
    fn frames(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }
}

impl AudioSink for CountingSink {
    fn free_frames(&self) -> usize {
        usize::MAX
    }

    fn write(&self, samples: &[i16]) -> usize {
        let frames = samples.len() / CHANNELS;
        self.frames.fetch_add(frames, Ordering::SeqCst);
        frames
    }
}

fn scripted_session(
    tracks: usize,
    total_samples: i64,
    config: SessionConfig,
) -> (Arc<PlaybackSession>, Arc<EngineProbe>, Arc<Game>) {
    let game = Arc::new(scripted_game(1, tracks));
    let (engine, probe) = engine_for(&game, total_samples);
    let session = Arc::new(PlaybackSession::new(
        EngineGateway::new(engine),
        config,
        PlaybackLogger::new(),
    ));
    (session, probe, game)
}

fn start_render(session: &Arc<PlaybackSession>, sink: Arc<dyn AudioSink>, config: RenderConfig) -> RenderHandle {
    RenderLoop::new(Arc::clone(session), sink, config, PlaybackLogger::new()).spawn()
}

async fn wait_for<F>(events: &mut broadcast::Receiver<SessionEvent>, mut matches: F) -> Vec<SessionEvent>
where
    F: FnMut(&SessionEvent) -> bool,
{
    let mut seen = Vec::new();
    let deadline = tokio::time::sleep(Duration::from_secs(15));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            event = events.recv() => {
                let event = event.expect("event stream closed");
                let done = matches(&event);
                seen.push(event);
                if done {
                    return seen;
                }
            }
            _ = &mut deadline => panic!("timed out, saw {:?}", seen),
        }
    }
}

fn phase_changes(events: &[SessionEvent]) -> Vec<(PlaybackPhase, PlaybackPhase)> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::PhaseChanged { from, to } => Some((*from, *to)),
            _ => None,
        })
        .collect()
}

fn loaded_indices(events: &[SessionEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::TrackLoaded { track_index, .. } => Some(*track_index),
            _ => None,
        })
        .collect()
}

/// 16-bit stereo PCM WAV
fn write_wav(dir: &Path, name: &str, rate: u32, frames: u32) -> PathBuf {
    let channels = 2u16;
    let data_len = frames * channels as u32 * 2;
    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVEfmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&rate.to_le_bytes());
    bytes.extend_from_slice(&(rate * channels as u32 * 2).to_le_bytes());
    bytes.extend_from_slice(&(channels * 2).to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    for i in 0..frames {
        let v = ((i % 64) as i16 - 32) * 200;
        bytes.extend_from_slice(&v.to_le_bytes());
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    let path = dir.join(name);
    let mut file = File::create(&path).unwrap();
    file.write_all(&bytes).unwrap();
    path
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_million_sample_track_runs_to_next() {
    let (session, probe, game) = scripted_session(2, 1_000_000, SessionConfig::default());
    assert_ok!(session.open(Arc::clone(&game), 0, true).await);

    let snapshot = session.snapshot();
    assert_eq!(snapshot.total_samples, 1_000_000);
    assert_eq!(snapshot.sample_rate, 44_100);
    assert_eq!(snapshot.duration_seconds(), 22);

    let position = assert_ok!(session.seek(2_000_000).await);
    assert_eq!(position, 999_999);
    assert_eq!(probe.seeks().last(), Some(&999_999));
    assert_eq!(session.phase(), PlaybackPhase::Playing);

    let mut events = session.events();
    let handle = start_render(&session, Arc::new(CountingSink::default()), RenderConfig::default());
    let seen = wait_for(&mut events, |e| {
        matches!(
            e,
            SessionEvent::PhaseChanged {
                from: PlaybackPhase::Loading,
                to: PlaybackPhase::Playing
            }
        )
    })
    .await;
    handle.shutdown().await;

    assert_eq!(
        phase_changes(&seen),
        vec![
            (PlaybackPhase::Playing, PlaybackPhase::Ended),
            (PlaybackPhase::Ended, PlaybackPhase::Loading),
            (PlaybackPhase::Loading, PlaybackPhase::Playing),
        ]
    );
    assert_eq!(loaded_indices(&seen), vec![1]);
    assert_eq!(session.snapshot().track_index, Some(1));
}

#[tokio::test]
async fn test_unreadable_path_leaves_nothing_open() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.wav");
    let game = Arc::new(Game::new(9, "Broken").with_tracks(vec![Track::new(1, &missing, "Gone", 1)]));
    let gateway = EngineGateway::new(SymphoniaEngine::new(44_100));
    let session = PlaybackSession::new(gateway.clone(), SessionConfig::default(), PlaybackLogger::new());
    let mut events = session.events();

    assert_err!(session.open(Arc::clone(&game), 0, true).await);

    assert_eq!(session.phase(), PlaybackPhase::Idle);
    assert_eq!(session.snapshot().epoch, None);
    assert_eq!(gateway.open_path().await, None);
    assert!(assert_ok!(gateway.is_ended().await));
    assert!(!gateway.open(&missing).await);

    let mut failures = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::LoadFailed { path, .. } = event {
            failures.push(path);
        }
    }
    assert_eq!(failures, vec![missing]);

    // transport is inert afterwards
    assert_ok!(session.play().await);
    assert_eq!(session.phase(), PlaybackPhase::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scanned_library_plays_through_real_decoder() {
    let root = TempDir::new().unwrap();
    let game_dir = root.path().join("Sonic");
    std::fs::create_dir(&game_dir).unwrap();
    write_wav(&game_dir, "01 Title.wav", 44_100, 4_410);
    write_wav(&game_dir, "02 Green Hill.wav", 44_100, 8_820);
    std::fs::write(game_dir.join("notes.txt"), b"not audio").unwrap();

    let library = Arc::new(DirectoryLibrary::scan(root.path()).unwrap());
    let games = library.games();
    assert_eq!(games.len(), 1);
    let game = Arc::clone(&games[0]);
    assert_eq!(game.len(), 2);

    let session = Arc::new(
        PlaybackSession::new(
            EngineGateway::new(SymphoniaEngine::new(44_100)),
            SessionConfig::default(),
            PlaybackLogger::new(),
        )
        .with_library(Arc::clone(&library) as Arc<dyn TrackLibrary>),
    );

    let game = session.resolve_durations(game).await;
    assert_eq!(game.tracks[0].duration_samples, 4_410);
    assert_eq!(game.tracks[1].duration_samples, 8_820);
    let stored = library.game(game.id).unwrap();
    assert!(stored.tracks.iter().all(|t| t.has_duration()));

    let sink = Arc::new(CountingSink::default());
    let mut events = session.events();
    assert_ok!(session.open(Arc::clone(&game), 0, true).await);
    let handle = start_render(&session, sink.clone(), RenderConfig::default());

    let seen = wait_for(&mut events, |e| matches!(e, SessionEvent::EndOfQueue { .. })).await;
    handle.shutdown().await;

    assert_eq!(sink.frames(), 4_410 + 8_820);
    assert_eq!(loaded_indices(&seen), vec![0, 1]);
    assert_eq!(session.phase(), PlaybackPhase::Idle);
    assert_eq!(session.gateway().open_path().await, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_surfaced_stall_resumes_on_play() {
    let (session, probe, game) = scripted_session(
        1,
        30_000,
        SessionConfig {
            max_stall_recoveries: 1,
            ..Default::default()
        },
    );
    probe.stall_fills(1, Duration::from_millis(400));
    let sink = Arc::new(CountingSink::default());
    let mut events = session.events();
    assert_ok!(session.open(Arc::clone(&game), 0, true).await);
    let config = RenderConfig {
        watchdog: Duration::from_millis(30),
        ..Default::default()
    };
    let handle = start_render(&session, sink.clone(), config);

    // one silent retry while the fill is still hung, then the stall surfaces
    let seen = wait_for(&mut events, |e| matches!(e, SessionEvent::PlaybackStalled { .. })).await;
    assert!(seen
        .iter()
        .any(|e| *e == SessionEvent::Recovering { attempt: 1, position: 0 }));
    assert_eq!(session.phase(), PlaybackPhase::Idle);
    assert_eq!(session.snapshot().epoch, None);

    // the engine is still busy; play queues the reopen instead of waiting
    assert_ok!(
        tokio::time::timeout(Duration::from_millis(100), session.play())
            .await
            .expect("play waited on the engine")
    );
    wait_for(&mut events, |e| matches!(e, SessionEvent::EndOfQueue { .. })).await;
    handle.shutdown().await;

    // initial open and the user resume; the retry never reached the engine
    assert_eq!(probe.opened_paths().len(), 2);
    assert!(sink.frames() >= 30_000);
    assert_eq!(session.phase(), PlaybackPhase::Idle);
}

async fn loads_under_repeat(repeat: RepeatPolicy, tracks: usize) -> Vec<usize> {
    let (session, _probe, game) = scripted_session(
        tracks,
        2_000,
        SessionConfig {
            repeat,
            ..Default::default()
        },
    );
    let mut events = session.events();
    assert_ok!(session.open(Arc::clone(&game), 0, true).await);
    let handle = start_render(&session, Arc::new(CountingSink::default()), RenderConfig::default());

    let mut loads = 0;
    let seen = wait_for(&mut events, |e| {
        if matches!(e, SessionEvent::TrackLoaded { .. }) {
            loads += 1;
        }
        loads == 4 || matches!(e, SessionEvent::EndOfQueue { .. })
    })
    .await;
    handle.shutdown().await;
    assert_ok!(session.stop().await);
    loaded_indices(&seen)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_repeat_policies_at_end_of_track() {
    assert_eq!(loads_under_repeat(RepeatPolicy::Off, 2).await, vec![0, 1]);
    assert_eq!(loads_under_repeat(RepeatPolicy::Game, 2).await, vec![0, 1, 0, 1]);
    assert_eq!(loads_under_repeat(RepeatPolicy::Track, 2).await, vec![0, 0, 0, 0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_commands_racing_the_render_loop_stay_serialized() {
    let (engine, probe) = engine_for(&scripted_game(3, 3), 5_000_000).with_call_delay(Duration::from_micros(100));
    let game = Arc::new(scripted_game(3, 3));
    let session = Arc::new(PlaybackSession::new(
        EngineGateway::new(engine),
        SessionConfig {
            repeat: RepeatPolicy::Game,
            ..Default::default()
        },
        PlaybackLogger::new(),
    ));
    assert_ok!(session.open(Arc::clone(&game), 0, true).await);
    let handle = start_render(&session, Arc::new(CountingSink::default()), RenderConfig::default());

    let mut tasks = Vec::new();
    for worker in 0..3usize {
        let session = Arc::clone(&session);
        tasks.push(tokio::spawn(async move {
            for i in 0..20usize {
                match (worker + i) % 4 {
                    0 => {
                        let _ = session.seek((i * 10_000) as i64).await;
                    }
                    1 => {
                        let _ = session.toggle().await;
                    }
                    2 => {
                        let _ = session.next().await;
                    }
                    _ => {
                        let _ = session.play().await;
                    }
                }
                let snapshot = session.snapshot();
                assert_eq!(snapshot.phase.has_open_track(), snapshot.epoch.is_some());
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    handle.shutdown().await;

    assert_eq!(probe.overlaps(), 0);
    assert!(probe.count("fill_buffer") > 0);

    assert_ok!(session.stop().await);
    assert_eq!(session.phase(), PlaybackPhase::Idle);
    assert_eq!(session.gateway().open_path().await, None);
}

#[test]
fn test_config_drives_session_and_snapshot_serializes() {
    let config = PlayerConfig {
        default_volume: 0.25,
        repeat_policy: RepeatPolicy::Track,
        bass: true,
        ..Default::default()
    };
    let (engine, _probe) = engine_for(&scripted_game(4, 2), 88_200);
    let session = PlaybackSession::new(
        EngineGateway::new(engine),
        SessionConfig::from(&config),
        PlaybackLogger::new(),
    );

    tokio_test::block_on(async {
        assert_ok!(session.open(Arc::new(scripted_game(4, 2)), 1, false).await);
    });

    // a late subscriber sees the current state immediately
    let state = session.subscribe();
    let snapshot = state.borrow().clone();
    assert_eq!(snapshot.phase, PlaybackPhase::Paused);
    assert_eq!(snapshot.volume, 0.25);
    assert_eq!(snapshot.repeat, RepeatPolicy::Track);
    assert!(snapshot.effects.bass);
    assert_eq!(snapshot.duration_seconds(), 2);

    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["phase"], "Paused");
    assert_eq!(json["track_index"], 1);
    assert_eq!(json["repeat"], "track");
    assert_eq!(json["game"]["name"], "Game 4");
    assert_eq!(json["tags"]["system_en"], "Mega Drive");
}
