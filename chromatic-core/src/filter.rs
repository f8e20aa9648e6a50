//! # Stability Filter Module
//!
//! Debounces the raw note stream so the readout does not flicker on
//! momentary silence between notes, octave slips or cent jitter.
//!
//! ## Trade-off
//! Two knobs decide how "live" the tuner feels:
//! - `smoothing_window_ms`: a longer window rides out more noise but a real
//!   note change takes up to about one window length to show.
//! - `majority_ratio`: the share of the window a note name must hold. Higher
//!   values flicker less but need more consistent input.
//!
//! With the defaults (250 ms, 0.6) and a detector running at ~20 frames per
//! second, a note must win three of the last five frames.

use crate::config::TunerConfig;
use crate::estimator::FrequencySample;
use crate::note::{self, NoteMapping, NoteName};
use std::collections::VecDeque;

/// Hard cap on window entries; the window never reallocates past this.
pub const MAX_WINDOW_ENTRIES: usize = 64;

/// Filter parameters, derived from [`TunerConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityParams {
    pub window_ms: u64,
    pub majority_ratio: f64,
    pub min_confidence: f64,
    pub silence_timeout_ms: u64,
}

impl From<&TunerConfig> for StabilityParams {
    fn from(config: &TunerConfig) -> Self {
        Self {
            window_ms: config.smoothing_window_ms,
            majority_ratio: config.majority_ratio,
            min_confidence: config.min_confidence,
            silence_timeout_ms: config.silence_timeout_ms,
        }
    }
}

impl Default for StabilityParams {
    fn default() -> Self {
        Self::from(&TunerConfig::default())
    }
}

/// A sample after note mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub sample: FrequencySample,
    pub mapping: Option<NoteMapping>,
}

impl Observation {
    /// Runs the note mapper over a raw sample.
    pub fn from_sample(sample: &FrequencySample) -> Self {
        Self {
            sample: *sample,
            mapping: note::map_frequency(sample.frequency_hz),
        }
    }
}

/// What the filter lets through for one observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterOutput {
    /// A stable note. `cents_off` is smoothed over the window and
    /// `frequency_hz` is the pitch those smoothed cents describe.
    Note {
        mapping: NoteMapping,
        frequency_hz: f64,
        cents_off: f64,
    },
    /// Input has been unvoiced for longer than the silence timeout.
    Silent,
    /// Nothing new to show.
    Hold,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    note: NoteName,
    midi: i32,
    cents_off: f64,
    timestamp_ms: u64,
}

/// Majority-vote debouncer over a time-bounded window.
#[derive(Debug)]
pub struct StabilityFilter {
    params: StabilityParams,
    window: VecDeque<Entry>,
    emitted: bool,
    silent: bool,
    last_voiced_ms: Option<u64>,
}

impl StabilityFilter {
    pub fn new(params: StabilityParams) -> Self {
        Self {
            params,
            window: VecDeque::with_capacity(MAX_WINDOW_ENTRIES),
            emitted: false,
            silent: false,
            last_voiced_ms: None,
        }
    }

    /// Replaces the parameters; the window contents are kept.
    pub fn set_params(&mut self, params: StabilityParams) {
        self.params = params;
    }

    /// Forgets all history, as if freshly created.
    pub fn reset(&mut self) {
        self.window.clear();
        self.emitted = false;
        self.silent = false;
        self.last_voiced_ms = None;
    }

    /// Number of voiced entries currently in the window.
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn push(&mut self, obs: Observation) -> FilterOutput {
        let now = obs.sample.timestamp_ms;
        self.evict(now);

        let mapping = match obs.mapping {
            Some(m) if obs.sample.is_voiced(self.params.min_confidence) => m,
            _ => return self.unvoiced(now),
        };

        if self.window.len() == MAX_WINDOW_ENTRIES {
            self.window.pop_front();
        }
        self.window.push_back(Entry {
            note: mapping.note,
            midi: mapping.midi,
            cents_off: mapping.cents_off,
            timestamp_ms: now,
        });
        self.last_voiced_ms = Some(now);

        let count = self.window.iter().filter(|e| e.note == mapping.note).count();
        let share = count as f64 / self.window.len() as f64;
        if share < self.params.majority_ratio && self.emitted {
            return FilterOutput::Hold;
        }

        self.emitted = true;
        self.silent = false;
        self.stable_note(mapping)
    }

    /// Builds the output for an accepted pitch class.
    ///
    /// The octave is voted separately: a lone octave error keeps the octave
    /// most of the window agrees on. Cents are averaged over that octave only.
    fn stable_note(&self, accepted: NoteMapping) -> FilterOutput {
        let midi_count =
            |midi: i32| self.window.iter().filter(|e| e.midi == midi).count();

        let mut midi = accepted.midi;
        let mut best = midi_count(midi);
        for e in self.window.iter().filter(|e| e.note == accepted.note) {
            let n = midi_count(e.midi);
            if n > best {
                midi = e.midi;
                best = n;
            }
        }

        let cents_sum: f64 = self
            .window
            .iter()
            .filter(|e| e.midi == midi)
            .map(|e| e.cents_off)
            .sum();
        let cents_off = cents_sum / best as f64;
        let reference_hz = note::reference_frequency(midi);

        FilterOutput::Note {
            mapping: NoteMapping {
                note: accepted.note,
                midi,
                cents_off,
                reference_hz,
            },
            frequency_hz: reference_hz * 2.0_f64.powf(cents_off / 1200.0),
            cents_off,
        }
    }

    fn unvoiced(&mut self, now: u64) -> FilterOutput {
        if !self.window.is_empty() || self.silent {
            return FilterOutput::Hold;
        }
        let timed_out = self
            .last_voiced_ms
            .is_none_or(|t| now.saturating_sub(t) >= self.params.silence_timeout_ms);
        if timed_out {
            self.silent = true;
            self.emitted = true;
            FilterOutput::Silent
        } else {
            FilterOutput::Hold
        }
    }

    fn evict(&mut self, now: u64) {
        while let Some(front) = self.window.front() {
            if now.saturating_sub(front.timestamp_ms) > self.params.window_ms {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for StabilityFilter {
    fn default() -> Self {
        Self::new(StabilityParams::default())
    }
}
