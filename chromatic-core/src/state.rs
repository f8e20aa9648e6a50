//! # Tuning State Machine
//!
//! Owns the session state and the single current [`TuningReading`]. Filter
//! output is turned into a classified reading here, and only changed
//! readings are handed back for publication.

use crate::filter::FilterOutput;
use crate::note::NoteName;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a tuner session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    Idle,
    Listening,
}

/// How the current pitch relates to the nearest note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    InTune,
    Flat,
    Sharp,
    Silent,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Classification::InTune => "in tune",
            Classification::Flat => "flat",
            Classification::Sharp => "sharp",
            Classification::Silent => "silent",
        };
        f.write_str(s)
    }
}

/// Classifies a deviation against the in-tune band `threshold_cents`.
pub fn classify(cents_off: f64, threshold_cents: f64) -> Classification {
    if cents_off.abs() < threshold_cents {
        Classification::InTune
    } else if cents_off <= -threshold_cents {
        Classification::Flat
    } else {
        Classification::Sharp
    }
}

/// The published tuner readout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TuningReading {
    /// Nearest note, `None` while nothing is detected.
    pub note: Option<NoteName>,
    /// Octave of the nearest note (MIDI 60 = C4).
    pub octave: Option<i32>,
    pub frequency_hz: f64,
    pub cents_off: f64,
    pub classification: Classification,
}

impl TuningReading {
    /// Display label for the note, `"--"` when silent.
    pub fn note_label(&self) -> &'static str {
        self.note.map_or("--", NoteName::as_str)
    }
}

impl Default for TuningReading {
    fn default() -> Self {
        Self {
            note: None,
            octave: None,
            frequency_hz: 0.0,
            cents_off: 0.0,
            classification: Classification::Silent,
        }
    }
}

/// `Idle -> Listening -> Idle`, plus the current reading.
#[derive(Debug, Default)]
pub struct TuningStateMachine {
    state: SessionState,
    reading: TuningReading,
}

impl TuningStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn reading(&self) -> TuningReading {
        self.reading
    }

    /// Enters `Listening`. Returns `false` if already listening.
    pub fn start(&mut self) -> bool {
        if self.state == SessionState::Listening {
            return false;
        }
        self.state = SessionState::Listening;
        true
    }

    /// Returns to `Idle`, keeping the last reading. Returns `false` if
    /// already idle.
    pub fn stop(&mut self) -> bool {
        if self.state == SessionState::Idle {
            return false;
        }
        self.state = SessionState::Idle;
        true
    }

    /// Applies filter output and returns the reading to publish, if any.
    ///
    /// Nothing is returned while idle, for held output, or when the new
    /// reading equals the current one.
    pub fn apply(&mut self, output: FilterOutput, threshold_cents: f64) -> Option<TuningReading> {
        if self.state != SessionState::Listening {
            return None;
        }
        let next = match output {
            FilterOutput::Hold => return None,
            FilterOutput::Silent => TuningReading::default(),
            FilterOutput::Note {
                mapping,
                frequency_hz,
                cents_off,
            } => TuningReading {
                note: Some(mapping.note),
                octave: Some(mapping.octave()),
                frequency_hz,
                cents_off,
                classification: classify(cents_off, threshold_cents),
            },
        };
        if next == self.reading {
            return None;
        }
        self.reading = next;
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::map_frequency;

    fn note_output(freq: f64) -> FilterOutput {
        let mapping = map_frequency(freq).unwrap();
        FilterOutput::Note {
            mapping,
            frequency_hz: freq,
            cents_off: mapping.cents_off,
        }
    }

    #[test]
    fn classification_boundaries() {
        assert_eq!(classify(0.0, 10.0), Classification::InTune);
        assert_eq!(classify(9.99, 10.0), Classification::InTune);
        assert_eq!(classify(-9.99, 10.0), Classification::InTune);
        assert_eq!(classify(10.0, 10.0), Classification::Sharp);
        assert_eq!(classify(-10.0, 10.0), Classification::Flat);
        assert_eq!(classify(-49.0, 10.0), Classification::Flat);
    }

    #[test]
    fn start_and_stop_are_reentrant() {
        let mut sm = TuningStateMachine::new();
        assert!(!sm.stop());
        assert!(sm.start());
        assert!(!sm.start());
        assert_eq!(sm.state(), SessionState::Listening);
        assert!(sm.stop());
        assert!(!sm.stop());
        assert_eq!(sm.state(), SessionState::Idle);
    }

    #[test]
    fn idle_machine_ignores_output() {
        let mut sm = TuningStateMachine::new();
        assert!(sm.apply(note_output(440.0), 10.0).is_none());
        assert_eq!(sm.reading(), TuningReading::default());
    }

    #[test]
    fn publishes_only_changes() {
        let mut sm = TuningStateMachine::new();
        sm.start();
        let r = sm.apply(note_output(440.0), 10.0).unwrap();
        assert_eq!(r.note, Some(NoteName::A));
        assert_eq!(r.octave, Some(4));
        assert_eq!(r.classification, Classification::InTune);
        assert!(sm.apply(note_output(440.0), 10.0).is_none());
        assert!(sm.apply(FilterOutput::Hold, 10.0).is_none());

        let s = sm.apply(FilterOutput::Silent, 10.0).unwrap();
        assert_eq!(s.classification, Classification::Silent);
        assert_eq!(s.note_label(), "--");
    }

    #[test]
    fn stop_keeps_last_reading() {
        let mut sm = TuningStateMachine::new();
        sm.start();
        sm.apply(note_output(415.0), 10.0);
        sm.stop();
        assert_eq!(sm.reading().note, Some(NoteName::GSharp));
    }

    #[test]
    fn initial_silence_is_not_republished() {
        let mut sm = TuningStateMachine::new();
        sm.start();
        assert!(sm.apply(FilterOutput::Silent, 10.0).is_none());
    }
}
