//! Push-to-talk audio capture using CPAL.
//!
//! The device records at its native rate and channel count; samples are
//! downmixed and resampled to 16 kHz mono when the recording stops.

use crate::error::{VoiceError, VoiceResult};
use chrono::{DateTime, Utc};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Sample rate every transcription backend receives.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// One finished push-to-talk recording.
#[derive(Debug, Clone)]
pub struct Recording {
    /// PCM samples (f32, -1.0..1.0), mono.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// When the key was released.
    pub timestamp: DateTime<Utc>,
    /// How long the key was held.
    pub duration: Duration,
}

impl Recording {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

struct ActiveCapture {
    stream: Stream,
    buffer: Arc<Mutex<Vec<f32>>>,
    channels: u16,
    sample_rate: u32,
    started: Instant,
}

/// Records the default input device between `start` and `stop`.
///
/// The CPAL stream is not `Send` on every platform, so a recorder stays on the
/// thread that created it.
#[derive(Default)]
pub struct Recorder {
    active: Option<ActiveCapture>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Open the default input device and start buffering. No-op while already recording.
    pub fn start(&mut self) -> VoiceResult<()> {
        if self.active.is_some() {
            return Ok(());
        }

        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| VoiceError::AudioDevice("No input device available".to_string()))?;
        let supported = device.default_input_config()?;
        let format = supported.sample_format();
        let config = supported.config();
        debug!(device = %device.name().unwrap_or_else(|_| "Unknown".to_string()), ?config, ?format, "opening input");

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let on_error = |err: cpal::StreamError| warn!("Audio stream error: {}", err);
        let stream = match format {
            SampleFormat::F32 => {
                let buffer = Arc::clone(&buffer);
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| push_samples(&buffer, data.iter().copied()),
                    on_error,
                    None,
                )?
            }
            SampleFormat::I16 => {
                let buffer = Arc::clone(&buffer);
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        push_samples(&buffer, data.iter().map(|&s| s as f32 / 32768.0))
                    },
                    on_error,
                    None,
                )?
            }
            SampleFormat::U16 => {
                let buffer = Arc::clone(&buffer);
                device.build_input_stream(
                    &config,
                    move |data: &[u16], _: &cpal::InputCallbackInfo| {
                        push_samples(&buffer, data.iter().map(|&s| (s as f32 - 32768.0) / 32768.0))
                    },
                    on_error,
                    None,
                )?
            }
            other => {
                return Err(VoiceError::AudioDevice(format!(
                    "Unsupported input sample format {:?}",
                    other
                )))
            }
        };
        stream.play()?;

        self.active = Some(ActiveCapture {
            stream,
            buffer,
            channels: config.channels,
            sample_rate: config.sample_rate.0,
            started: Instant::now(),
        });
        info!("🎤 recording");
        Ok(())
    }

    /// Stop recording and return 16 kHz mono audio. Empty if nothing was recording.
    pub fn stop(&mut self) -> Recording {
        let Some(active) = self.active.take() else {
            return Recording {
                samples: Vec::new(),
                sample_rate: TARGET_SAMPLE_RATE,
                timestamp: Utc::now(),
                duration: Duration::ZERO,
            };
        };
        if let Err(e) = active.stream.pause() {
            debug!(error = %e, "pause failed; dropping stream");
        }
        drop(active.stream);

        let raw = std::mem::take(&mut *active.buffer.lock().unwrap_or_else(|e| e.into_inner()));
        let mono = downmix(&raw, active.channels);
        let samples = resample(&mono, active.sample_rate, TARGET_SAMPLE_RATE);
        let duration = active.started.elapsed();
        info!(samples = samples.len(), secs = duration.as_secs_f32(), "⏹️ recording stopped");

        Recording {
            samples,
            sample_rate: TARGET_SAMPLE_RATE,
            timestamp: Utc::now(),
            duration,
        }
    }

    /// List available input devices
    pub fn list_input_devices() -> VoiceResult<Vec<String>> {
        let devices = cpal::default_host().input_devices()?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }
}

fn push_samples(buffer: &Mutex<Vec<f32>>, samples: impl Iterator<Item = f32>) {
    buffer.lock().unwrap_or_else(|e| e.into_inner()).extend(samples);
}

/// Average interleaved frames down to one channel.
pub fn downmix(interleaved: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Linear-interpolation resampler; adequate for speech going to STT.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 {
        return samples.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).floor() as usize;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos.floor() as usize;
            let frac = (pos - idx as f64) as f32;
            let a = samples[idx];
            let b = samples.get(idx + 1).copied().unwrap_or(a);
            a + (b - a) * frac
        })
        .collect()
}

/// Encode f32 PCM (mono) to 16-bit WAV bytes for API upload.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32; // 16-bit = 2 bytes per sample
    let mut buf = Vec::with_capacity(44 + data_len as usize);
    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_len).to_le_bytes());
    buf.extend_from_slice(b"WAVE");
    // fmt subchunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&1u16.to_le_bytes()); // mono
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
    buf.extend_from_slice(&2u16.to_le_bytes()); // block align
    buf.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    // data subchunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_len.to_le_bytes());
    for &s in samples {
        let i = (s.clamp(-1.0, 1.0) * 32767.0).round() as i16;
        buf.extend_from_slice(&i.to_le_bytes());
    }
    buf
}
