//! Native engine for sample-based formats (WAV, FLAC, OGG, MP3) on symphonia.

use std::collections::VecDeque;
use std::fs::File;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey, Value};
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};

use super::resample::StereoResampler;
use super::{NativeEngine, Tags, CHANNELS, DEVICE_VOLUME_UNITY};
use crate::error::EngineError;
use crate::models::EffectToggles;

const PCM_DEVICE_NAME: &str = "PCM";

/// Decoder state for the open file
struct OpenStream {
    path: PathBuf,
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    time_base: Option<TimeBase>,
    source_rate: u32,
    /// Length at the output rate, 0 when the container does not say
    total_samples: i64,
    /// Output frames handed out so far
    position: i64,
    pending: VecDeque<i16>,
    resampler: StereoResampler,
    /// Source frames still to drop after an inexact seek
    discard_frames: u64,
    exhausted: bool,
    tags: Tags,
}

impl OpenStream {
    /// Decode packets until `wanted` samples are queued or the stream ends
    fn fill_pending(&mut self, wanted: usize) {
        while self.pending.len() < wanted && !self.exhausted {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref err))
                    if err.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.exhausted = true;
                    break;
                }
                Err(err) => {
                    warn!("Stopping {:?} after read error: {}", self.path, err);
                    self.exhausted = true;
                    break;
                }
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let mut buffer = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
                    buffer.copy_interleaved_ref(decoded);
                    let stereo = to_stereo(buffer.samples(), spec.channels.count());

                    let skip = (self.discard_frames as usize).min(stereo.len() / CHANNELS);
                    self.discard_frames -= skip as u64;
                    self.resampler
                        .process_into(&stereo[skip * CHANNELS..], &mut self.pending);
                }
                Err(SymphoniaError::DecodeError(err)) => {
                    debug!("Skipping undecodable packet in {:?}: {}", self.path, err);
                }
                Err(err) => {
                    warn!("Decoder failed for {:?}: {}", self.path, err);
                    self.exhausted = true;
                }
            }
        }
    }

    fn is_ended(&self) -> bool {
        let past_end = self.total_samples > 0 && self.position >= self.total_samples;
        past_end || (self.exhausted && self.pending.is_empty())
    }
}

/// `NativeEngine` implementation backed by symphonia's demuxers and codecs
pub struct SymphoniaEngine {
    sample_rate: u32,
    asset_path: Option<PathBuf>,
    stream: Option<OpenStream>,
    playing: bool,
    pcm_volume: u32,
    effects: EffectToggles,
}

impl Default for SymphoniaEngine {
    fn default() -> Self {
        Self::new(44_100)
    }
}

impl SymphoniaEngine {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            asset_path: None,
            stream: None,
            playing: false,
            pcm_volume: DEVICE_VOLUME_UNITY,
            effects: EffectToggles::default(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn effects(&self) -> EffectToggles {
        self.effects
    }

    /// Locate `path`, looking in the asset directory when it is not found as given
    fn resolve(&self, path: &Path) -> Result<PathBuf, EngineError> {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        if let Some(assets) = &self.asset_path {
            let candidates = [
                Some(assets.join(path)),
                path.file_name().map(|name| assets.join(name)),
            ];
            if let Some(found) = candidates.into_iter().flatten().find(|p| p.is_file()) {
                debug!("Resolved {:?} to {:?} via asset path", path, found);
                return Ok(found);
            }
        }
        Err(EngineError::Unreadable {
            path: path.to_path_buf(),
            reason: "file not found".to_string(),
        })
    }

    fn open_reader(&self, path: &Path) -> Result<(PathBuf, Box<dyn FormatReader>, Tags), EngineError> {
        let resolved = self.resolve(path)?;
        let file = File::open(&resolved).map_err(|e| EngineError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let source = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = resolved.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let mut probed = symphonia::default::get_probe()
            .format(&hint, source, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| EngineError::Unsupported {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let mut tags = Tags::default();
        if let Some(revision) = probed.metadata.get().as_ref().and_then(|m| m.current()) {
            apply_revision(revision, &mut tags);
        }
        if let Some(revision) = probed.format.metadata().current() {
            apply_revision(revision, &mut tags);
        }
        if tags.system_en.is_empty() {
            if let Some(ext) = resolved.extension().and_then(|e| e.to_str()) {
                tags.system_en = ext.to_ascii_uppercase();
            }
        }

        Ok((resolved, probed.format, tags))
    }

    fn to_output_samples(&self, source_frames: u64, source_rate: u32) -> i64 {
        if source_rate == 0 {
            return 0;
        }
        (source_frames as u128 * self.sample_rate as u128 / source_rate as u128) as i64
    }
}

impl NativeEngine for SymphoniaEngine {
    fn set_sample_rate(&mut self, rate: u32) {
        self.sample_rate = rate;
        if let Some(stream) = self.stream.as_mut() {
            stream.resampler.set_rates(stream.source_rate, rate);
        }
    }

    fn set_asset_search_path(&mut self, path: &Path) {
        self.asset_path = Some(path.to_path_buf());
    }

    fn open(&mut self, path: &Path) -> Result<(), EngineError> {
        self.close();

        let (resolved, reader, tags) = self.open_reader(path)?;
        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| EngineError::Unsupported {
                path: path.to_path_buf(),
                reason: "no audio track".to_string(),
            })?;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| EngineError::Unsupported {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let track_id = track.id;
        let source_rate = track.codec_params.sample_rate.unwrap_or(self.sample_rate);
        let time_base = track.codec_params.time_base;
        let total_samples = track
            .codec_params
            .n_frames
            .map(|frames| self.to_output_samples(frames, source_rate))
            .unwrap_or(0);

        debug!(
            "Opened {:?}: {} Hz source, {} output samples",
            resolved, source_rate, total_samples
        );

        self.stream = Some(OpenStream {
            path: resolved,
            reader,
            decoder,
            track_id,
            time_base,
            source_rate,
            total_samples,
            position: 0,
            pending: VecDeque::new(),
            resampler: StereoResampler::new(source_rate, self.sample_rate),
            discard_frames: 0,
            exhausted: false,
            tags,
        });
        Ok(())
    }

    fn close(&mut self) {
        self.stream = None;
        self.playing = false;
        self.pcm_volume = DEVICE_VOLUME_UNITY;
    }

    fn play(&mut self) {
        self.playing = self.stream.is_some();
    }

    fn stop(&mut self) {
        self.playing = false;
    }

    fn is_ended(&self) -> bool {
        self.stream.as_ref().map_or(true, OpenStream::is_ended)
    }

    fn total_samples(&self) -> i64 {
        self.stream.as_ref().map_or(0, |s| s.total_samples)
    }

    fn current_sample(&self) -> i64 {
        self.stream.as_ref().map_or(0, |s| s.position)
    }

    fn seek(&mut self, sample: i64) {
        let rate = self.sample_rate.max(1) as i64;
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        let mut target = sample.max(0);
        if stream.total_samples > 0 {
            target = target.min(stream.total_samples);
        }

        let time = Time::new((target / rate) as u64, (target % rate) as f64 / rate as f64);
        let ts = match stream.time_base {
            Some(base) => base.calc_timestamp(time),
            None => (target as u128 * stream.source_rate as u128 / rate as u128) as u64,
        };

        match stream.reader.seek(
            SeekMode::Accurate,
            SeekTo::TimeStamp {
                ts,
                track_id: stream.track_id,
            },
        ) {
            Ok(seeked) => {
                stream.decoder.reset();
                stream.resampler.reset();
                stream.pending.clear();
                stream.discard_frames = seeked.required_ts.saturating_sub(seeked.actual_ts);
                stream.exhausted = false;
                stream.position = target;
            }
            Err(err) => warn!("Seek to sample {} in {:?} failed: {}", target, stream.path, err),
        }
    }

    fn fill_buffer(&mut self, out: &mut [i16], frames: usize) -> usize {
        if !self.playing {
            return 0;
        }
        let Some(stream) = self.stream.as_mut() else {
            return 0;
        };

        let mut frames = frames.min(out.len() / CHANNELS);
        if stream.total_samples > 0 {
            let remaining = (stream.total_samples - stream.position).max(0) as usize;
            frames = frames.min(remaining);
        }

        stream.fill_pending(frames * CHANNELS);
        let written = frames.min(stream.pending.len() / CHANNELS);
        // any u32 volume times an i16 sample fits in i64
        let volume = i64::from(self.pcm_volume);
        for (slot, sample) in out.iter_mut().zip(stream.pending.drain(..written * CHANNELS)) {
            let scaled = i64::from(sample) * volume / i64::from(DEVICE_VOLUME_UNITY);
            *slot = scaled.clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16;
        }
        stream.position += written as i64;
        written
    }

    fn raw_tags(&self) -> String {
        self.stream
            .as_ref()
            .map(|s| s.tags.to_raw())
            .unwrap_or_default()
    }

    fn probe_length(&mut self, path: &Path) -> Result<i64, EngineError> {
        let (_, mut reader, _) = self.open_reader(path)?;
        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| EngineError::Unsupported {
                path: path.to_path_buf(),
                reason: "no audio track".to_string(),
            })?;
        let track_id = track.id;
        let source_rate = track.codec_params.sample_rate.unwrap_or(self.sample_rate);

        if let Some(frames) = track.codec_params.n_frames {
            return Ok(self.to_output_samples(frames, source_rate));
        }

        // no frame count in the header: walk the packets
        let mut frames = 0u64;
        loop {
            match reader.next_packet() {
                Ok(packet) if packet.track_id() == track_id => frames += packet.dur,
                Ok(_) => {}
                Err(_) => break,
            }
        }
        Ok(self.to_output_samples(frames, source_rate))
    }

    fn device_count(&self) -> usize {
        usize::from(self.stream.is_some())
    }

    fn device_name(&self, id: u32) -> String {
        if id == 0 && self.stream.is_some() {
            PCM_DEVICE_NAME.to_string()
        } else {
            String::new()
        }
    }

    fn device_volume(&self, id: u32) -> u32 {
        if id == 0 {
            self.pcm_volume
        } else {
            0
        }
    }

    fn set_device_volume(&mut self, id: u32, volume: u32) {
        if id == 0 {
            self.pcm_volume = volume;
        }
    }

    fn set_effects(&mut self, effects: EffectToggles) {
        self.effects = effects;
    }
}

/// Downmix or duplicate to interleaved stereo
fn to_stereo(samples: &[i16], channels: usize) -> Vec<i16> {
    match channels {
        0 => Vec::new(),
        1 => samples.iter().flat_map(|&s| [s, s]).collect(),
        2 => samples.to_vec(),
        n => samples
            .chunks_exact(n)
            .flat_map(|frame| [frame[0], frame[1]])
            .collect(),
    }
}

fn apply_revision(revision: &MetadataRevision, tags: &mut Tags) {
    for tag in revision.tags() {
        let Some(key) = tag.std_key else {
            continue;
        };
        let text = match &tag.value {
            Value::String(s) => s.trim().to_string(),
            Value::UnsignedInt(n) => n.to_string(),
            Value::SignedInt(n) => n.to_string(),
            _ => continue,
        };
        // the raw layout reserves "|||" as separator
        let text = text.replace(super::tags::TAG_SEPARATOR, "|");
        let field = match key {
            StandardTagKey::TrackTitle => &mut tags.track_en,
            StandardTagKey::Album => &mut tags.game_en,
            StandardTagKey::Artist | StandardTagKey::Composer => &mut tags.author_en,
            StandardTagKey::Date => &mut tags.date,
            StandardTagKey::EncodedBy | StandardTagKey::Encoder => &mut tags.creator,
            StandardTagKey::Comment => &mut tags.notes,
            _ => continue,
        };
        if field.is_empty() {
            *field = text;
        }
    }
}
