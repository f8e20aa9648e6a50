//! # Audio Capture Module
//!
//! Real-time microphone capture with CPAL and the [`MicrophoneEstimator`]
//! built on top of it.
//!
//! The CPAL callback only slices incoming audio into fixed-size mono frames
//! and hands them over without blocking. Pitch detection runs on a dedicated
//! capture thread, which also owns the stream: `cpal::Stream` is not `Send`
//! on every platform, so it is created, paused and dropped on that thread.

use crate::error::{Result, TunerError};
use crate::estimator::{FrequencyEstimator, SampleSink, Worker};
use crate::pitch::{DEFAULT_AMPLITUDE_THRESHOLD, PitchDetector};
use anyhow::anyhow;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SupportedStreamConfigRange};
use crossbeam_channel::Sender;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Audio buffer size for processing frames.
///
/// 2048 samples is ~46 ms at 44.1 kHz: enough periods for low guitar and
/// bass notes while keeping the readout responsive.
pub const BUFFER_SIZE: usize = 2048;

/// Preferred capture rate in Hz.
pub const TARGET_SAMPLE_RATE: u32 = 44_100;

/// Frames waiting for the detector before new ones are dropped.
const FRAME_QUEUE_CAPACITY: usize = 8;

/// How long `acquire` waits for the device to open.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Capture and detection settings for [`MicrophoneEstimator`].
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    pub frame_size: usize,
    pub target_sample_rate: u32,
    pub amplitude_threshold: f32,
    pub spectral_refinement: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            frame_size: BUFFER_SIZE,
            target_sample_rate: TARGET_SAMPLE_RATE,
            amplitude_threshold: DEFAULT_AMPLITUDE_THRESHOLD,
            spectral_refinement: false,
        }
    }
}

/// Starts audio capture from the default input device.
///
/// Frames of `frame_size` mono samples are sent to `sender`; when the
/// receiver falls behind, frames are dropped rather than blocking the
/// audio callback.
///
/// # Returns
/// * `Ok((stream, sample_rate))` - the running stream and its sample rate
/// * `Err(e)` - no device, no usable f32 format, or the stream failed to start
pub fn start_audio_capture(
    sender: Sender<Vec<f32>>,
    settings: &CaptureSettings,
) -> anyhow::Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    info!(target: "audio", "using audio input device: {}", device.name()?);

    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, settings.target_sample_rate)
        .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

    let rate = settings.target_sample_rate.clamp(
        supported_config.min_sample_rate().0,
        supported_config.max_sample_rate().0,
    );
    let config = supported_config.with_sample_rate(cpal::SampleRate(rate));
    let sample_rate = config.sample_rate().0;
    let channels = usize::from(config.channels().max(1));
    let config: cpal::StreamConfig = config.into();

    info!(target: "audio", sample_rate, channels, "selected input format");

    let err_fn = |err| warn!(target: "audio", "an error occurred on the audio stream: {err}");

    let frame_size = settings.frame_size;
    // Accumulates downmixed audio until a full frame is available.
    let mut frame = Vec::with_capacity(frame_size);

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            for chunk in data.chunks(channels) {
                frame.push(chunk.iter().sum::<f32>() / chunk.len() as f32);
                if frame.len() == frame_size {
                    // Drop the frame if the detector is behind.
                    let _ = sender.try_send(frame.clone());
                    frame.clear();
                }
            }
        },
        err_fn,
        None,
    )?;

    stream.play()?;

    Ok((stream, sample_rate))
}

/// Picks the f32 input configuration closest to `target_rate`, preferring mono.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .min_by_key(|c| {
            let in_range = (c.min_sample_rate().0..=c.max_sample_rate().0).contains(&target_rate);
            let min_diff = (i64::from(c.min_sample_rate().0) - i64::from(target_rate)).abs();
            let max_diff = (i64::from(c.max_sample_rate().0) - i64::from(target_rate)).abs();
            let rate_distance = if in_range { 0 } else { min_diff.min(max_diff) };
            (rate_distance, c.channels())
        })
}

/// Live pitch estimates from the default microphone.
#[derive(Debug, Default)]
pub struct MicrophoneEstimator {
    settings: CaptureSettings,
    worker: Option<Worker>,
}

impl MicrophoneEstimator {
    pub fn new(settings: CaptureSettings) -> Self {
        Self {
            settings,
            worker: None,
        }
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }
}

impl FrequencyEstimator for MicrophoneEstimator {
    fn name(&self) -> &str {
        "microphone"
    }

    fn acquire(&mut self, sink: SampleSink) -> Result<()> {
        self.release();
        let settings = self.settings.clone();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<std::result::Result<u32, String>>(1);

        let worker = Worker::spawn("microphone-capture", move |shutdown_rx| {
            let (frame_tx, frame_rx) = crossbeam_channel::bounded::<Vec<f32>>(FRAME_QUEUE_CAPACITY);
            let (stream, sample_rate) = match start_audio_capture(frame_tx, &settings) {
                Ok(started) => started,
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("{e:#}")));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(sample_rate));

            let mut detector = PitchDetector::new(sample_rate, settings.frame_size)
                .with_amplitude_threshold(settings.amplitude_threshold)
                .with_spectral_refinement(settings.spectral_refinement);
            let frame_ms = settings.frame_size as u64 * 1000;
            let mut frames: u64 = 0;

            loop {
                crossbeam_channel::select! {
                    recv(frame_rx) -> msg => match msg {
                        Ok(frame) => {
                            // Timestamps follow the audio clock, not the wall clock.
                            let timestamp_ms = frames * frame_ms / u64::from(sample_rate.max(1));
                            frames += 1;
                            sink.push(detector.analyze(&frame, timestamp_ms));
                        }
                        Err(_) => {
                            warn!(target: "audio", "audio stream closed");
                            break;
                        }
                    },
                    recv(shutdown_rx) -> _ => break,
                }
            }

            if let Err(e) = stream.pause() {
                warn!(target: "audio", "error pausing stream: {e}");
            }
            drop(stream);
            debug!(target: "audio", "capture thread finished");
        })
        .map_err(|e| TunerError::CaptureUnavailable(e.to_string()))?;

        match ready_rx.recv_timeout(ACQUIRE_TIMEOUT) {
            Ok(Ok(sample_rate)) => {
                info!(target: "audio", sample_rate, "microphone acquired");
                self.worker = Some(worker);
                Ok(())
            }
            Ok(Err(reason)) => {
                worker.stop();
                Err(TunerError::CaptureUnavailable(reason))
            }
            Err(_) => {
                worker.detach();
                Err(TunerError::CaptureUnavailable(
                    "audio device did not respond".to_string(),
                ))
            }
        }
    }

    fn release(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop();
            debug!(target: "audio", "microphone released");
        }
    }
}

impl Drop for MicrophoneEstimator {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings() {
        let s = CaptureSettings::default();
        assert_eq!(s.frame_size, BUFFER_SIZE);
        assert_eq!(s.target_sample_rate, 44_100);
        assert!(!s.spectral_refinement);
    }

    #[test]
    fn release_without_acquire_is_noop() {
        let mut mic = MicrophoneEstimator::default();
        mic.release();
        mic.release();
        assert_eq!(mic.name(), "microphone");
    }
}
