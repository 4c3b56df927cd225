use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use log::{error, info, warn};

use super::buffer::PcmRingBuffer;
use crate::engine::CHANNELS;
use crate::error::OutputError;
use crate::render::AudioSink;

/// Buffered frames per requested render size
const BUFFER_BLOCKS: usize = 4;

/// Names of the host's output devices
pub fn list_output_devices() -> Result<Vec<String>, OutputError> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| OutputError::InitializationFailed(format!("Failed to enumerate devices: {}", e)))?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// Select a device by name, falling back to the default device
fn select_device(preferred: Option<&str>) -> Result<Device, OutputError> {
    let host = cpal::default_host();
    if let Some(name) = preferred {
        let found = host
            .output_devices()
            .map_err(|e| OutputError::InitializationFailed(format!("Failed to enumerate devices: {}", e)))?
            .find(|d| d.name().map_or(false, |n| n == name));
        match found {
            Some(device) => return Ok(device),
            None => warn!("Output device '{}' not found, using the default device", name),
        }
    }
    host.default_output_device()
        .ok_or_else(|| OutputError::DeviceNotFound {
            device: preferred.unwrap_or("default").to_string(),
        })
}

struct StreamInfo {
    device_name: String,
    sample_rate: u32,
    channels: u16,
}

/// cpal output fed from a `PcmRingBuffer`.
///
/// The stream lives on its own thread (cpal streams are not `Send`); dropping
/// the sink stops it.
pub struct CpalSink {
    ring: Arc<PcmRingBuffer>,
    device_name: String,
    sample_rate: u32,
    channels: u16,
    shutdown: Option<mpsc::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl CpalSink {
    /// Open `preferred_device` (or the default) and start streaming.
    ///
    /// The ring holds `buffer_frames * 4` frames at the device rate; the
    /// engine must render at `sample_rate()`.
    pub fn start(preferred_device: Option<&str>, buffer_frames: usize) -> Result<Self, OutputError> {
        let preferred = preferred_device.map(str::to_string);
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(StreamInfo, Arc<PcmRingBuffer>), OutputError>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let thread = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let opened = Self::open_stream(preferred.as_deref(), buffer_frames);
                let stream = match opened {
                    Ok((stream, info, ring)) => {
                        let _ = ready_tx.send(Ok((info, ring)));
                        stream
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                // park until the sink is dropped
                let _ = shutdown_rx.recv();
                let _ = stream.pause();
            })
            .map_err(|e| OutputError::InitializationFailed(format!("Failed to create audio thread: {}", e)))?;

        let (info, ring) = ready_rx
            .recv()
            .map_err(|_| OutputError::InitializationFailed("Audio thread exited during setup".to_string()))??;

        info!(
            "Audio output on '{}' at {} Hz, {} channels",
            info.device_name, info.sample_rate, info.channels
        );
        Ok(Self {
            ring,
            device_name: info.device_name,
            sample_rate: info.sample_rate,
            channels: info.channels,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    fn open_stream(
        preferred: Option<&str>,
        buffer_frames: usize,
    ) -> Result<(Stream, StreamInfo, Arc<PcmRingBuffer>), OutputError> {
        let device = select_device(preferred)?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        let default_config = device
            .default_output_config()
            .map_err(|e| OutputError::InitializationFailed(format!("Failed to get default config: {}", e)))?;

        let sample_format = default_config.sample_format();
        let config: StreamConfig = default_config.config();
        let ring = Arc::new(PcmRingBuffer::new(
            buffer_frames.max(1) * BUFFER_BLOCKS,
            config.sample_rate.0,
        ));

        let stream = match sample_format {
            SampleFormat::F32 => Self::create_stream::<f32>(&device, &config, &ring)?,
            SampleFormat::I16 => Self::create_stream::<i16>(&device, &config, &ring)?,
            SampleFormat::U16 => Self::create_stream::<u16>(&device, &config, &ring)?,
            other => {
                return Err(OutputError::UnsupportedFormat {
                    format: format!("{:?}", other),
                })
            }
        };
        stream
            .play()
            .map_err(|e| OutputError::StreamError(format!("Failed to start audio stream: {}", e)))?;

        let info = StreamInfo {
            device_name,
            sample_rate: config.sample_rate.0,
            channels: config.channels,
        };
        Ok((stream, info, ring))
    }

    fn create_stream<T>(
        device: &Device,
        config: &StreamConfig,
        ring: &Arc<PcmRingBuffer>,
    ) -> Result<Stream, OutputError>
    where
        T: cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
    {
        let ring = Arc::clone(ring);
        let channels = config.channels.max(1) as usize;
        let mut scratch: Vec<i16> = Vec::new();

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels;
                    scratch.resize(frames * CHANNELS, 0);
                    ring.read(&mut scratch);
                    for (out, stereo) in data.chunks_mut(channels).zip(scratch.chunks(CHANNELS)) {
                        map_frame(stereo, out);
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| OutputError::StreamError(format!("Failed to build output stream: {}", e)))
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Device rate; the engine renders at this rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn ring(&self) -> Arc<PcmRingBuffer> {
        Arc::clone(&self.ring)
    }
}

/// Write one stereo frame to a device frame of any channel count
fn map_frame<T: cpal::FromSample<f32>>(stereo: &[i16], out: &mut [T]) {
    let left = stereo[0] as f32 / 32768.0;
    let right = stereo[1] as f32 / 32768.0;
    if out.len() == 1 {
        out[0] = T::from_sample_((left + right) * 0.5);
        return;
    }
    for (channel, sample) in out.iter_mut().enumerate() {
        let value = if channel % 2 == 0 { left } else { right };
        *sample = T::from_sample_(value);
    }
}

impl AudioSink for CpalSink {
    fn free_frames(&self) -> usize {
        self.ring.available_write_frames()
    }

    fn write(&self, samples: &[i16]) -> usize {
        self.ring.write(samples)
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.shutdown.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
