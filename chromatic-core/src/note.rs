//! # Note Mapping Module
//!
//! Maps a frequency onto the nearest note of the twelve-tone equal-tempered
//! scale and measures the deviation from that note in cents.
//!
//! ## Conventions
//! - A4 = MIDI 69 = 440 Hz (fixed reference)
//! - MIDI 60 = C4, pitch class index 0 = C
//! - An exact half-semitone tie resolves toward the higher note
//!
//! Everything in this module is pure and safe to call from any thread.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference frequency of A4 in Hz.
pub const A4_FREQUENCY: f64 = 440.0;

/// MIDI note number of A4.
pub const A4_MIDI: i32 = 69;

/// One of the twelve equal-tempered pitch classes, starting at C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoteName {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl NoteName {
    /// All pitch classes in MIDI order (index 0 = C).
    pub const ALL: [NoteName; 12] = [
        NoteName::C,
        NoteName::CSharp,
        NoteName::D,
        NoteName::DSharp,
        NoteName::E,
        NoteName::F,
        NoteName::FSharp,
        NoteName::G,
        NoteName::GSharp,
        NoteName::A,
        NoteName::ASharp,
        NoteName::B,
    ];

    /// Pitch class for a MIDI note number. Negative numbers wrap correctly.
    pub fn from_midi(midi: i32) -> NoteName {
        Self::ALL[midi.rem_euclid(12) as usize]
    }

    /// Index into [`NoteName::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Sharp spelling, e.g. `"C#"`.
    pub fn as_str(self) -> &'static str {
        const NAMES: [&str; 12] = [
            "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
        ];
        NAMES[self.index()]
    }

    /// Flat spelling, e.g. `"Db"`.
    pub fn flat_name(self) -> &'static str {
        const NAMES: [&str; 12] = [
            "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
        ];
        NAMES[self.index()]
    }
}

impl fmt::Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The nearest equal-tempered note to a frequency, with the deviation from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteMapping {
    /// Pitch class of the nearest note.
    pub note: NoteName,
    /// MIDI note number of the nearest note.
    pub midi: i32,
    /// Signed deviation from the nearest note (negative = flat).
    pub cents_off: f64,
    /// Frequency of the nearest note in Hz.
    pub reference_hz: f64,
}

impl NoteMapping {
    /// Scientific pitch octave of the nearest note (MIDI 60 = C4).
    pub fn octave(&self) -> i32 {
        self.midi.div_euclid(12) - 1
    }
}

/// Reference frequencies for the full MIDI range (0..=127), computed once.
static MIDI_FREQUENCIES: Lazy<Vec<f64>> =
    Lazy::new(|| (0..128).map(equal_tempered_frequency).collect());

fn equal_tempered_frequency(midi: i32) -> f64 {
    A4_FREQUENCY * 2.0_f64.powf(f64::from(midi - A4_MIDI) / 12.0)
}

/// Frequency of a MIDI note in Hz.
pub fn reference_frequency(midi: i32) -> f64 {
    usize::try_from(midi)
        .ok()
        .and_then(|i| MIDI_FREQUENCIES.get(i).copied())
        .unwrap_or_else(|| equal_tempered_frequency(midi))
}

/// Calculates the deviation from a target frequency in cents.
///
/// Positive values are sharp, negative values flat.
pub fn cents_between(freq: f64, target_freq: f64) -> f64 {
    1200.0 * (freq / target_freq).log2()
}

/// Maps a frequency to its nearest note.
///
/// Returns `None` ("no signal") for zero, negative, NaN or infinite input.
/// The returned `cents_off` always lies in `[-50, 50)`.
pub fn map_frequency(frequency_hz: f64) -> Option<NoteMapping> {
    if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
        return None;
    }

    let midi = f64::from(A4_MIDI) + 12.0 * (frequency_hz / A4_FREQUENCY).log2();
    // floor(x + 0.5) sends x.5 upward for negative MIDI values as well.
    let rounded = (midi + 0.5).floor();
    let cents_off = (midi - rounded) * 100.0;
    let midi = rounded as i32;

    Some(NoteMapping {
        note: NoteName::from_midi(midi),
        midi,
        cents_off,
        reference_hz: reference_frequency(midi),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn exact_semitones_have_zero_cents() {
        for k in -48..=48 {
            let f = 440.0 * 2.0_f64.powf(f64::from(k) / 12.0);
            let m = map_frequency(f).unwrap();
            assert_abs_diff_eq!(m.cents_off, 0.0, epsilon = 1e-9);
            assert_eq!(m.note, NoteName::from_midi(69 + k));
            assert_eq!(m.midi, 69 + k);
        }
    }

    #[test]
    fn a4_and_middle_c() {
        let a = map_frequency(440.0).unwrap();
        assert_eq!(a.note, NoteName::A);
        assert_eq!(a.octave(), 4);

        let c = map_frequency(261.625_565).unwrap();
        assert_eq!(c.note, NoteName::C);
        assert_eq!(c.midi, 60);
        assert_eq!(c.octave(), 4);
    }

    #[test]
    fn a_sharp_slightly_flat() {
        let m = map_frequency(466.0).unwrap();
        assert_eq!(m.note, NoteName::ASharp);
        // A#4 is 466.1638 Hz, so 466 Hz sits about 0.61 cents flat.
        assert_abs_diff_eq!(m.cents_off, -0.608, epsilon = 0.01);
    }

    #[test]
    fn cents_stay_within_half_semitone() {
        let mut f = 20.0;
        while f < 5000.0 {
            let m = map_frequency(f).unwrap();
            assert!(m.cents_off >= -50.0 && m.cents_off < 50.0, "{f}: {}", m.cents_off);
            f *= 1.0137;
        }
    }

    #[test]
    fn half_semitone_tie_goes_up() {
        // Exactly between A4 and A#4.
        let f = 440.0 * 2.0_f64.powf(0.5 / 12.0);
        let m = map_frequency(f).unwrap();
        assert_eq!(m.midi, 70);
        assert_eq!(m.note, NoteName::ASharp);
        assert_abs_diff_eq!(m.cents_off, -50.0, epsilon = 1e-6);
    }

    #[test]
    fn non_positive_and_nan_are_silence() {
        assert!(map_frequency(0.0).is_none());
        assert!(map_frequency(-12.5).is_none());
        assert!(map_frequency(f64::NAN).is_none());
        assert!(map_frequency(f64::INFINITY).is_none());
    }

    #[test]
    fn negative_midi_wraps_pitch_class() {
        assert_eq!(NoteName::from_midi(-1), NoteName::B);
        assert_eq!(NoteName::from_midi(-12), NoteName::C);
    }

    #[test]
    fn reference_table_matches_formula() {
        assert_abs_diff_eq!(reference_frequency(69), 440.0, epsilon = 1e-9);
        assert_abs_diff_eq!(reference_frequency(81), 880.0, epsilon = 1e-9);
        assert_abs_diff_eq!(reference_frequency(-3), 440.0 / 2.0_f64.powf(6.0), epsilon = 1e-9);
        assert_abs_diff_eq!(cents_between(880.0, 440.0), 1200.0, epsilon = 1e-9);
    }
}
