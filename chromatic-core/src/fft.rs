//! # Fast Fourier Transform (FFT) Module
//!
//! Magnitude spectra of audio frames, used to refine pitch estimates.
//! The FFT plan, window and buffers are created once per frame size so
//! analysing a frame does not allocate.

use rustfft::{Fft, FftPlanner, num_complex::Complex};
use std::sync::Arc;

/// Removes the DC offset from a signal by making its average value zero.
fn remove_dc_offset(signal: &mut [f32]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

fn hann_window(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![1.0; n];
    }
    let n_minus_1 = (n - 1) as f32;
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos()))
        .collect()
}

/// Computes windowed magnitude spectra for frames of a fixed size.
pub struct SpectrumAnalyzer {
    frame_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    real: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
}

impl SpectrumAnalyzer {
    pub fn new(frame_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(frame_size);
        let scratch_len = fft.get_inplace_scratch_len();
        Self {
            frame_size,
            fft,
            window: hann_window(frame_size),
            real: vec![0.0; frame_size],
            buffer: vec![Complex::new(0.0, 0.0); frame_size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            magnitudes: vec![0.0; frame_size / 2],
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Magnitude spectrum up to Nyquist (`frame_size / 2` bins).
    ///
    /// The frame is DC-corrected and Hann-windowed first. Returns `None` when
    /// `signal.len()` differs from the configured frame size.
    pub fn magnitudes(&mut self, signal: &[f32]) -> Option<&[f32]> {
        if signal.len() != self.frame_size {
            return None;
        }
        self.real.copy_from_slice(signal);
        remove_dc_offset(&mut self.real);

        for ((out, &s), &w) in self.buffer.iter_mut().zip(&self.real).zip(&self.window) {
            *out = Complex { re: s * w, im: 0.0 };
        }
        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        for (m, c) in self.magnitudes.iter_mut().zip(&self.buffer) {
            *m = c.norm();
        }
        Some(&self.magnitudes)
    }
}
