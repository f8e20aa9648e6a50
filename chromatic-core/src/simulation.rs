//! # Simulation Module
//!
//! A stand-in for a microphone: imitates someone tuning an instrument.
//! Each note starts noticeably detuned, drifts toward pitch with a little
//! jitter, occasionally slips an octave, and is followed by a short pause.

use crate::error::{Result, TunerError};
use crate::estimator::{FrequencyEstimator, FrequencySample, SampleSink, Worker};
use crate::note::reference_frequency;
use crossbeam_channel::RecvTimeoutError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tracing::debug;

/// Standard guitar tuning, low to high (MIDI numbers).
const GUITAR_STRINGS: [i32; 6] = [40, 45, 50, 55, 59, 64];

/// How long a simulated note sounds before the next one.
const NOTE_LENGTH_MS: u64 = 3_000;
/// Pause between simulated notes.
const GAP_LENGTH_MS: u64 = 600;

/// Pure pitch generator behind [`SimulatedEstimator`].
#[derive(Debug)]
pub struct PitchSimulator {
    rng: StdRng,
    midi: i32,
    detune_cents: f64,
    note_started_ms: u64,
}

impl PitchSimulator {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut sim = Self {
            rng,
            midi: GUITAR_STRINGS[0],
            detune_cents: 0.0,
            note_started_ms: 0,
        };
        sim.next_note(0);
        sim
    }

    /// MIDI number of the note currently being "played".
    pub fn current_midi(&self) -> i32 {
        self.midi
    }

    fn next_note(&mut self, now_ms: u64) {
        self.midi = GUITAR_STRINGS[self.rng.random_range(0..GUITAR_STRINGS.len())];
        self.detune_cents = self.rng.random_range(-40.0..40.0);
        self.note_started_ms = now_ms;
    }

    /// Produces the sample for time `now_ms`. Time must not go backwards.
    pub fn sample_at(&mut self, now_ms: u64) -> FrequencySample {
        let elapsed = now_ms.saturating_sub(self.note_started_ms);
        if elapsed >= NOTE_LENGTH_MS + GAP_LENGTH_MS {
            self.next_note(now_ms);
        } else if elapsed >= NOTE_LENGTH_MS {
            return FrequencySample::silence(now_ms);
        }

        // The player closes in on the target a little every frame.
        self.detune_cents *= 0.97;
        let jitter = self.rng.random_range(-2.0..2.0);
        let mut frequency =
            reference_frequency(self.midi) * 2.0_f64.powf((self.detune_cents + jitter) / 1200.0);
        if self.rng.random_bool(0.03) {
            frequency *= 2.0;
        }
        let confidence = self.rng.random_range(0.7..1.0);
        FrequencySample::new(frequency, confidence, now_ms)
    }
}

/// A [`FrequencyEstimator`] that needs no audio hardware.
#[derive(Debug)]
pub struct SimulatedEstimator {
    interval: Duration,
    seed: Option<u64>,
    worker: Option<Worker>,
}

impl SimulatedEstimator {
    /// Emits one sample every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            seed: None,
            worker: None,
        }
    }

    /// Makes the generated sequence reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Default for SimulatedEstimator {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}

impl FrequencyEstimator for SimulatedEstimator {
    fn name(&self) -> &str {
        "simulation"
    }

    fn acquire(&mut self, sink: SampleSink) -> Result<()> {
        self.release();
        let interval = self.interval;
        let step_ms = interval.as_millis().max(1) as u64;
        let mut sim = PitchSimulator::new(self.seed);
        let worker = Worker::spawn("simulated-estimator", move |shutdown_rx| {
            let mut now_ms = 0;
            loop {
                sink.push(sim.sample_at(now_ms));
                now_ms += step_ms;
                match shutdown_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    _ => break,
                }
            }
            debug!(target: "simulation", "simulation stopped");
        })
        .map_err(|e| TunerError::CaptureUnavailable(e.to_string()))?;
        self.worker = Some(worker);
        Ok(())
    }

    fn release(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop();
        }
    }
}

impl Drop for SimulatedEstimator {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::map_frequency;

    #[test]
    fn seeded_simulation_is_reproducible() {
        let mut a = PitchSimulator::new(Some(7));
        let mut b = PitchSimulator::new(Some(7));
        for t in (0..5_000).step_by(50) {
            assert_eq!(a.sample_at(t), b.sample_at(t));
        }
    }

    #[test]
    fn samples_stay_near_a_guitar_string() {
        let mut sim = PitchSimulator::new(Some(3));
        for t in (0..NOTE_LENGTH_MS).step_by(50) {
            let s = sim.sample_at(t);
            let m = map_frequency(s.frequency_hz).unwrap();
            let pitch_class = sim.current_midi().rem_euclid(12);
            assert_eq!(m.midi.rem_euclid(12), pitch_class, "t = {t}");
            assert!((0.7..1.0).contains(&s.confidence));
        }
    }

    #[test]
    fn pause_between_notes_is_silent() {
        let mut sim = PitchSimulator::new(Some(11));
        let s = sim.sample_at(NOTE_LENGTH_MS + 10);
        assert_eq!(s.frequency_hz, 0.0);
        let next = sim.sample_at(NOTE_LENGTH_MS + GAP_LENGTH_MS);
        assert!(next.frequency_hz > 0.0);
    }

    #[test]
    fn estimator_delivers_and_releases() {
        let mut est = SimulatedEstimator::new(Duration::from_millis(1)).with_seed(1);
        let (sink, rx) = SampleSink::bounded(16);
        est.acquire(sink).unwrap();
        let first = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(first.timestamp_ms, 0);
        est.release();
        est.release();
    }
}
