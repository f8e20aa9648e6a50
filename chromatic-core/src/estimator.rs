//! # Frequency Estimator Module
//!
//! The contract between the tuner engine and whatever produces pitch
//! estimates: a live microphone analyzer, a simulation, or a capture layer
//! that already performs detection and only forwards frequency events.
//!
//! Estimators push [`FrequencySample`]s into a [`SampleSink`] from their own
//! delivery context. Pushing never blocks; when the engine falls behind the
//! newest sample is dropped.

use crate::error::Result;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace};

/// Capacity of the channel between an estimator and the session worker.
pub const SAMPLE_QUEUE_CAPACITY: usize = 256;

/// A single fundamental-frequency estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencySample {
    /// Estimated fundamental in Hz. `0.0` means silence or unvoiced input.
    pub frequency_hz: f64,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f64,
    /// Capture time in milliseconds on the estimator's monotonic clock.
    pub timestamp_ms: u64,
}

impl FrequencySample {
    pub fn new(frequency_hz: f64, confidence: f64, timestamp_ms: u64) -> Self {
        Self {
            frequency_hz,
            confidence,
            timestamp_ms,
        }
    }

    /// An explicit silence event.
    pub fn silence(timestamp_ms: u64) -> Self {
        Self::new(0.0, 0.0, timestamp_ms)
    }

    /// Whether this sample should be treated as pitched input.
    ///
    /// NaN confidence or frequency counts as unvoiced.
    pub fn is_voiced(&self, min_confidence: f64) -> bool {
        self.frequency_hz.is_finite()
            && self.frequency_hz > 0.0
            && self.confidence >= min_confidence
    }
}

/// Non-blocking handle estimators use to deliver samples.
#[derive(Debug, Clone)]
pub struct SampleSink {
    tx: Sender<FrequencySample>,
}

impl SampleSink {
    /// Creates a bounded sink and the receiving end for the engine.
    pub fn bounded(capacity: usize) -> (SampleSink, Receiver<FrequencySample>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (SampleSink { tx }, rx)
    }

    /// Delivers a sample without blocking.
    ///
    /// Returns `false` if the sample was dropped because the queue is full or
    /// the session has gone away.
    pub fn push(&self, sample: FrequencySample) -> bool {
        match self.tx.try_send(sample) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                trace!(target: "estimator", "sample queue full, dropping sample");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// A source of [`FrequencySample`]s.
///
/// `acquire` takes the underlying resource (audio device, timer thread, ...)
/// and starts delivery into `sink`. `release` stops delivery and frees the
/// resource; it must be idempotent. Implementations should also release on
/// drop.
pub trait FrequencyEstimator: Send {
    /// Short human readable name for logs.
    fn name(&self) -> &str;

    /// Starts delivering samples.
    ///
    /// Fails with [`TunerError::CaptureUnavailable`](crate::TunerError::CaptureUnavailable)
    /// when the source cannot be opened.
    fn acquire(&mut self, sink: SampleSink) -> Result<()>;

    /// Stops delivery and frees the source. Calling it twice is harmless.
    fn release(&mut self);
}

/// Background thread that can be signalled to stop and joined.
#[derive(Debug)]
pub(crate) struct Worker {
    shutdown_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub(crate) fn spawn<F>(name: &str, body: F) -> std::io::Result<Worker>
    where
        F: FnOnce(Receiver<()>) + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(shutdown_rx))?;
        Ok(Worker {
            shutdown_tx,
            handle: Some(handle),
        })
    }

    /// Signals the thread and waits for it to exit.
    pub(crate) fn stop(mut self) {
        let _ = self.shutdown_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                debug!(target: "estimator", "worker thread panicked");
            }
        }
    }

    /// Signals the thread without waiting for it.
    pub(crate) fn detach(mut self) {
        let _ = self.shutdown_tx.try_send(());
        self.handle.take();
    }
}

/// Replays a fixed sequence of frequency events.
///
/// Useful when the capture layer already performs detection and hands over
/// plain frequency estimates, and for deterministic tests.
#[derive(Debug)]
pub struct ReplayEstimator {
    samples: Vec<FrequencySample>,
    interval: Duration,
    worker: Option<Worker>,
    acquisitions: usize,
}

impl ReplayEstimator {
    /// Delivers `samples` in order, waiting `interval` between them.
    pub fn new(samples: Vec<FrequencySample>, interval: Duration) -> Self {
        Self {
            samples,
            interval,
            worker: None,
            acquisitions: 0,
        }
    }

    /// Builds samples from bare frequencies, spaced `step_ms` apart, with
    /// full confidence for positive frequencies.
    pub fn from_frequencies(frequencies: &[f64], step_ms: u64, interval: Duration) -> Self {
        let samples = frequencies
            .iter()
            .enumerate()
            .map(|(i, &f)| {
                let confidence = if f > 0.0 { 1.0 } else { 0.0 };
                FrequencySample::new(f, confidence, i as u64 * step_ms)
            })
            .collect();
        Self::new(samples, interval)
    }

    /// Number of successful `acquire` calls so far.
    pub fn acquisitions(&self) -> usize {
        self.acquisitions
    }

    /// Whether delivery is currently running.
    pub fn is_acquired(&self) -> bool {
        self.worker.is_some()
    }
}

impl FrequencyEstimator for ReplayEstimator {
    fn name(&self) -> &str {
        "replay"
    }

    fn acquire(&mut self, sink: SampleSink) -> Result<()> {
        self.release();
        let samples = self.samples.clone();
        let interval = self.interval;
        let worker = Worker::spawn("replay-estimator", move |shutdown_rx| {
            for sample in samples {
                sink.push(sample);
                match shutdown_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    _ => return,
                }
            }
        })
        .map_err(|e| crate::TunerError::CaptureUnavailable(e.to_string()))?;
        self.worker = Some(worker);
        self.acquisitions += 1;
        Ok(())
    }

    fn release(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop();
        }
    }
}

impl Drop for ReplayEstimator {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voicing_rules() {
        assert!(FrequencySample::new(440.0, 0.9, 0).is_voiced(0.5));
        assert!(!FrequencySample::new(440.0, 0.4, 0).is_voiced(0.5));
        assert!(!FrequencySample::new(-1.0, 1.0, 0).is_voiced(0.5));
        assert!(!FrequencySample::new(f64::NAN, 1.0, 0).is_voiced(0.5));
        assert!(!FrequencySample::new(440.0, f64::NAN, 0).is_voiced(0.5));
        assert!(!FrequencySample::silence(10).is_voiced(0.0));
    }

    #[test]
    fn sink_drops_when_full() {
        let (sink, rx) = SampleSink::bounded(2);
        assert!(sink.push(FrequencySample::silence(0)));
        assert!(sink.push(FrequencySample::silence(1)));
        assert!(!sink.push(FrequencySample::silence(2)));
        assert_eq!(rx.try_recv().unwrap().timestamp_ms, 0);
        drop(rx);
        assert!(!sink.push(FrequencySample::silence(3)));
    }

    #[test]
    fn replay_delivers_in_order_and_releases() {
        let mut est = ReplayEstimator::from_frequencies(&[440.0, 0.0, 220.0], 10, Duration::ZERO);
        let (sink, rx) = SampleSink::bounded(8);
        est.acquire(sink).unwrap();
        let got: Vec<_> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(1)).unwrap())
            .collect();
        assert_eq!(got[0].frequency_hz, 440.0);
        assert_eq!(got[1].confidence, 0.0);
        assert_eq!(got[2].timestamp_ms, 20);
        est.release();
        est.release();
        assert!(!est.is_acquired());
        assert_eq!(est.acquisitions(), 1);
    }
}
