//! # Pitch Detection Module
//!
//! Turns frames of audio samples into [`FrequencySample`]s. This is the
//! default analyzer behind the microphone estimator.
//!
//! ## Features
//! - YIN pitch detection with an RMS noise gate and clarity check
//! - Parabolic interpolation for sub-sample accuracy
//! - Optional refinement against the magnitude spectrum

use crate::estimator::FrequencySample;
use crate::fft::SpectrumAnalyzer;

/// Frames quieter than this RMS are treated as silence.
pub const DEFAULT_AMPLITUDE_THRESHOLD: f32 = 0.01;

/// A first dip deeper than this is required; anything shallower is noise.
const CLARITY_THRESHOLD: f32 = 0.1;

/// Lowest frequency we report. Anything below is rumble.
const MIN_FREQUENCY: f32 = 20.0;

/// Runs YIN over `signal` using `yin_buffer` as scratch space.
///
/// `yin_buffer` must hold at least `signal.len() / 2` values.
fn yin_into(
    signal: &[f32],
    sample_rate: u32,
    amplitude_threshold: f32,
    yin_buffer: &mut [f32],
) -> Option<(f32, f32)> {
    let frame_size = signal.len();
    let half = frame_size / 2;
    if half < 4 || yin_buffer.len() < half {
        return None;
    }
    let yin_buffer = &mut yin_buffer[..half];

    // --- Noise Gate: Calculate RMS to filter out silence/noise ---
    let rms = (signal.iter().map(|&s| s * s).sum::<f32>() / frame_size as f32).sqrt();
    if !rms.is_finite() || rms < amplitude_threshold {
        return None;
    }

    // --- Difference function ---
    yin_buffer[0] = 0.0;
    for tau in 1..half {
        let mut diff = 0.0;
        for i in 0..half {
            let delta = signal[i] - signal[i + tau];
            diff += delta * delta;
        }
        yin_buffer[tau] = diff;
    }

    // --- Cumulative mean normalized difference ---
    let mut running_sum = 0.0;
    yin_buffer[0] = 1.0;
    for tau in 1..half {
        running_sum += yin_buffer[tau];
        if running_sum != 0.0 {
            yin_buffer[tau] *= tau as f32 / running_sum;
        } else {
            yin_buffer[tau] = 1.0;
        }
    }

    // --- First dip close to the global minimum, to avoid octave errors ---
    let min_val = yin_buffer
        .iter()
        .skip(1)
        .cloned()
        .fold(f32::INFINITY, f32::min);
    let threshold = min_val + 0.05;

    let mut period = 0;
    for tau in 2..half {
        if yin_buffer[tau] < threshold && yin_buffer[tau] < yin_buffer[tau - 1] {
            period = tau;
            break;
        }
    }
    // Slide down to the bottom of that dip.
    while period != 0 && period + 1 < half && yin_buffer[period + 1] < yin_buffer[period] {
        period += 1;
    }

    if period == 0 || yin_buffer[period] > CLARITY_THRESHOLD {
        return None;
    }
    if period + 1 >= half {
        return None;
    }

    // --- Parabolic interpolation ---
    let y1 = yin_buffer[period - 1];
    let y2 = yin_buffer[period];
    let y3 = yin_buffer[period + 1];

    let period_float = if (y1 - 2.0 * y2 + y3) != 0.0 {
        let peak_shift = (y1 - y3) / (2.0 * (y1 - 2.0 * y2 + y3));
        period as f32 + peak_shift
    } else {
        period as f32
    };

    let frequency = sample_rate as f32 / period_float;
    let confidence = (1.0 - y2).clamp(0.0, 1.0);

    if frequency.is_finite() && frequency > MIN_FREQUENCY {
        Some((frequency, confidence))
    } else {
        None
    }
}

/// YIN pitch detection on a single frame.
///
/// # Returns
/// * `Some((frequency, confidence))` - detected fundamental and clarity (0..1)
/// * `None` - silence, noise or a frame too short to analyse
pub fn detect_pitch_yin(
    signal: &[f32],
    sample_rate: u32,
    amplitude_threshold: f32,
) -> Option<(f32, f32)> {
    let mut yin_buffer = vec![0.0; signal.len() / 2];
    yin_into(signal, sample_rate, amplitude_threshold, &mut yin_buffer)
}

/// Refines a frequency estimate using a pre-computed magnitude spectrum.
///
/// Looks for the strongest bin within two bins of `rough_freq` and
/// interpolates the peak on a log scale.
///
/// # Returns
/// * `Some(refined_freq)` - refined estimate, or `rough_freq` when the
///   spectrum gives nothing better
/// * `None` - `rough_freq` is not positive
pub fn refine_from_spectrum(
    spectrum_magnitudes: &[f32],
    rough_freq: f32,
    sample_rate: u32,
) -> Option<f32> {
    if rough_freq <= 0.0 {
        return None;
    }
    if spectrum_magnitudes.len() < 3 {
        return Some(rough_freq);
    }
    let buffer_size = spectrum_magnitudes.len() * 2;
    let target_bin = (rough_freq * buffer_size as f32) / sample_rate as f32;
    let search_radius = 2.0;
    let start_bin = (target_bin - search_radius).max(0.0) as usize;
    let end_bin =
        (target_bin + search_radius).min((spectrum_magnitudes.len() - 1) as f32) as usize;
    if start_bin >= end_bin {
        return Some(rough_freq);
    }

    let peak_bin = match spectrum_magnitudes[start_bin..=end_bin]
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
    {
        Some((offset, _)) => start_bin + offset,
        None => return Some(rough_freq),
    };

    if peak_bin == 0 || peak_bin >= spectrum_magnitudes.len() - 1 {
        return Some(rough_freq);
    }

    let y1 = spectrum_magnitudes[peak_bin - 1].ln();
    let y2 = spectrum_magnitudes[peak_bin].ln();
    let y3 = spectrum_magnitudes[peak_bin + 1].ln();

    if !y1.is_finite() || !y2.is_finite() || !y3.is_finite() {
        return Some(rough_freq);
    }

    let denominator = 2.0 * y2 - y1 - y3;
    if denominator.abs() < 1e-6 {
        return Some(rough_freq);
    }

    let peak_shift = (y3 - y1) / (2.0 * denominator);
    let interpolated_bin = peak_bin as f32 + peak_shift;
    let final_freq = (interpolated_bin * sample_rate as f32) / buffer_size as f32;

    if final_freq.is_finite() && final_freq > 0.0 {
        Some(final_freq)
    } else {
        Some(rough_freq)
    }
}

/// Frame-by-frame analyzer with preallocated buffers.
pub struct PitchDetector {
    sample_rate: u32,
    amplitude_threshold: f32,
    yin_buffer: Vec<f32>,
    spectrum: Option<SpectrumAnalyzer>,
}

impl PitchDetector {
    pub fn new(sample_rate: u32, frame_size: usize) -> Self {
        Self {
            sample_rate,
            amplitude_threshold: DEFAULT_AMPLITUDE_THRESHOLD,
            yin_buffer: vec![0.0; frame_size / 2],
            spectrum: None,
        }
    }

    /// Sets the RMS noise gate.
    pub fn with_amplitude_threshold(mut self, threshold: f32) -> Self {
        self.amplitude_threshold = threshold.max(0.0);
        self
    }

    /// Enables refinement of each YIN estimate against the FFT spectrum.
    pub fn with_spectral_refinement(mut self, enabled: bool) -> Self {
        self.spectrum = enabled.then(|| SpectrumAnalyzer::new(self.yin_buffer.len() * 2));
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Detects the fundamental of one frame.
    pub fn detect(&mut self, frame: &[f32]) -> Option<(f32, f32)> {
        if self.yin_buffer.len() < frame.len() / 2 {
            self.yin_buffer.resize(frame.len() / 2, 0.0);
        }
        let (freq, confidence) = yin_into(
            frame,
            self.sample_rate,
            self.amplitude_threshold,
            &mut self.yin_buffer,
        )?;

        let refined = match self.spectrum.as_mut() {
            Some(spectrum) => spectrum
                .magnitudes(frame)
                .and_then(|mags| refine_from_spectrum(mags, freq, self.sample_rate))
                .unwrap_or(freq),
            None => freq,
        };
        Some((refined, confidence))
    }

    /// Analyses one frame into a sample stamped with `timestamp_ms`.
    pub fn analyze(&mut self, frame: &[f32], timestamp_ms: u64) -> FrequencySample {
        match self.detect(frame) {
            Some((freq, confidence)) => {
                FrequencySample::new(f64::from(freq), f64::from(confidence), timestamp_ms)
            }
            None => FrequencySample::silence(timestamp_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::cents_between;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn yin_finds_a440() {
        let (f, conf) = detect_pitch_yin(&sine(440.0, 44_100, 2048), 44_100, 0.01).unwrap();
        let cents = cents_between(f64::from(f), 440.0);
        assert!(cents.abs() < 3.0, "f = {f}, cents = {cents}");
        assert!(conf > 0.9, "confidence = {conf}");
    }

    #[test]
    fn yin_finds_low_e() {
        let (f, _) = detect_pitch_yin(&sine(82.41, 44_100, 2048), 44_100, 0.01).unwrap();
        assert!(cents_between(f64::from(f), 82.41).abs() < 5.0, "f = {f}");
    }

    #[test]
    fn silence_and_tiny_frames_have_no_pitch() {
        assert!(detect_pitch_yin(&[0.0; 2048], 44_100, 0.01).is_none());
        assert!(detect_pitch_yin(&[0.3; 4], 44_100, 0.01).is_none());
        assert!(detect_pitch_yin(&[], 44_100, 0.01).is_none());
    }

    #[test]
    fn refine_rejects_non_positive() {
        assert!(refine_from_spectrum(&[1.0, 2.0, 1.0], 0.0, 44_100).is_none());
        assert_eq!(refine_from_spectrum(&[], 100.0, 44_100), Some(100.0));
    }

    #[test]
    fn refinement_stays_close() {
        let frame = sine(440.0, 44_100, 2048);
        let mut detector = PitchDetector::new(44_100, 2048).with_spectral_refinement(true);
        let (f, _) = detector.detect(&frame).unwrap();
        assert!(cents_between(f64::from(f), 440.0).abs() < 15.0, "f = {f}");
    }

    #[test]
    fn analyze_stamps_samples() {
        let mut detector = PitchDetector::new(44_100, 2048);
        let voiced = detector.analyze(&sine(330.0, 44_100, 2048), 42);
        assert_eq!(voiced.timestamp_ms, 42);
        assert!(voiced.frequency_hz > 0.0);

        let quiet = detector.analyze(&[0.0; 2048], 43);
        assert_eq!(quiet, FrequencySample::silence(43));
    }
}
