//! Biquad filter — voice filters and the shelving EQ stages.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Filter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    Lowpass,
    Highpass,
    Bandpass,
    Notch,
    Peaking,
    Lowshelf,
    Highshelf,
}

/// A biquad IIR filter (2nd order).
///
/// Implements the standard Direct Form II Transposed structure.
/// Coefficient formulas from the Audio EQ Cookbook (Robert Bristow-Johnson);
/// shelves use a slope of 1.
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    pub filter_type: FilterType,
    pub frequency: f64,
    pub q: f64,
    pub gain_db: f64, // Peaking and shelves

    // Coefficients
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    // State (Direct Form II Transposed)
    z1: f64,
    z2: f64,

    sample_rate: f64,
    dirty: bool,
}

impl BiquadFilter {
    pub fn new(filter_type: FilterType, sample_rate: f64) -> Self {
        let mut f = BiquadFilter {
            filter_type,
            frequency: 1000.0,
            q: 0.707, // Butterworth
            gain_db: 0.0,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
            sample_rate,
            dirty: true,
        };
        f.update_coefficients();
        f
    }

    /// Build a filter with frequency and Q set in one go.
    pub fn with_params(filter_type: FilterType, sample_rate: f64, frequency: f64, q: f64) -> Self {
        let mut f = Self::new(filter_type, sample_rate);
        f.frequency = frequency;
        f.q = q;
        f.update_coefficients();
        f
    }

    /// Shelving EQ stage at `frequency` with the given boost/cut.
    pub fn shelf(filter_type: FilterType, sample_rate: f64, frequency: f64, gain_db: f64) -> Self {
        let mut f = Self::new(filter_type, sample_rate);
        f.frequency = frequency;
        f.gain_db = gain_db;
        f.update_coefficients();
        f
    }

    /// Recompute filter coefficients from current parameters.
    pub fn update_coefficients(&mut self) {
        // Keep the corner strictly inside (0, nyquist) so the bilinear warp stays stable.
        let nyquist = self.sample_rate / 2.0;
        let freq = self.frequency.clamp(1.0, nyquist * 0.999);
        let q = if self.q > 1e-4 { self.q } else { 1e-4 };

        let w0 = 2.0 * PI * freq / self.sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);

        let (b0, b1, b2, a0, a1, a2) = match self.filter_type {
            FilterType::Lowpass => {
                let b1 = 1.0 - cos_w0;
                let b0 = b1 / 2.0;
                let b2 = b0;
                let a0 = 1.0 + alpha;
                let a1 = -2.0 * cos_w0;
                let a2 = 1.0 - alpha;
                (b0, b1, b2, a0, a1, a2)
            }
            FilterType::Highpass => {
                let b1_raw = 1.0 + cos_w0;
                let b0 = b1_raw / 2.0;
                let b1 = -(1.0 + cos_w0);
                let b2 = b0;
                let a0 = 1.0 + alpha;
                let a1 = -2.0 * cos_w0;
                let a2 = 1.0 - alpha;
                (b0, b1, b2, a0, a1, a2)
            }
            FilterType::Bandpass => {
                let b0 = alpha;
                let b1 = 0.0;
                let b2 = -alpha;
                let a0 = 1.0 + alpha;
                let a1 = -2.0 * cos_w0;
                let a2 = 1.0 - alpha;
                (b0, b1, b2, a0, a1, a2)
            }
            FilterType::Notch => {
                let b0 = 1.0;
                let b1 = -2.0 * cos_w0;
                let b2 = 1.0;
                let a0 = 1.0 + alpha;
                let a1 = -2.0 * cos_w0;
                let a2 = 1.0 - alpha;
                (b0, b1, b2, a0, a1, a2)
            }
            FilterType::Peaking => {
                let a_lin = (10.0_f64).powf(self.gain_db / 40.0);
                let b0 = 1.0 + alpha * a_lin;
                let b1 = -2.0 * cos_w0;
                let b2 = 1.0 - alpha * a_lin;
                let a0 = 1.0 + alpha / a_lin;
                let a1 = -2.0 * cos_w0;
                let a2 = 1.0 - alpha / a_lin;
                (b0, b1, b2, a0, a1, a2)
            }
            FilterType::Lowshelf => {
                let a_lin = (10.0_f64).powf(self.gain_db / 40.0);
                let shelf_alpha = sin_w0 / 2.0 * std::f64::consts::SQRT_2;
                let k = 2.0 * a_lin.sqrt() * shelf_alpha;
                let b0 = a_lin * ((a_lin + 1.0) - (a_lin - 1.0) * cos_w0 + k);
                let b1 = 2.0 * a_lin * ((a_lin - 1.0) - (a_lin + 1.0) * cos_w0);
                let b2 = a_lin * ((a_lin + 1.0) - (a_lin - 1.0) * cos_w0 - k);
                let a0 = (a_lin + 1.0) + (a_lin - 1.0) * cos_w0 + k;
                let a1 = -2.0 * ((a_lin - 1.0) + (a_lin + 1.0) * cos_w0);
                let a2 = (a_lin + 1.0) + (a_lin - 1.0) * cos_w0 - k;
                (b0, b1, b2, a0, a1, a2)
            }
            FilterType::Highshelf => {
                let a_lin = (10.0_f64).powf(self.gain_db / 40.0);
                let shelf_alpha = sin_w0 / 2.0 * std::f64::consts::SQRT_2;
                let k = 2.0 * a_lin.sqrt() * shelf_alpha;
                let b0 = a_lin * ((a_lin + 1.0) + (a_lin - 1.0) * cos_w0 + k);
                let b1 = -2.0 * a_lin * ((a_lin - 1.0) + (a_lin + 1.0) * cos_w0);
                let b2 = a_lin * ((a_lin + 1.0) + (a_lin - 1.0) * cos_w0 - k);
                let a0 = (a_lin + 1.0) - (a_lin - 1.0) * cos_w0 + k;
                let a1 = 2.0 * ((a_lin - 1.0) - (a_lin + 1.0) * cos_w0);
                let a2 = (a_lin + 1.0) - (a_lin - 1.0) * cos_w0 - k;
                (b0, b1, b2, a0, a1, a2)
            }
        };

        // Normalize by a0
        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
        self.dirty = false;
    }

    /// Process a single sample through the filter.
    pub fn process(&mut self, input: f32) -> f32 {
        if self.dirty {
            self.update_coefficients();
        }

        let input = input as f64;
        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output as f32
    }

    /// Filter a block in place.
    pub fn process_block(&mut self, buf: &mut [f32]) {
        for s in buf.iter_mut() {
            *s = self.process(*s);
        }
    }

    /// Reset filter state.
    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    /// Set frequency and mark coefficients dirty.
    pub fn set_frequency(&mut self, freq: f64) {
        self.frequency = freq;
        self.dirty = true;
    }

    /// Set Q and mark coefficients dirty.
    pub fn set_q(&mut self, q: f64) {
        self.q = q;
        self.dirty = true;
    }

    /// Set shelf/peak gain and mark coefficients dirty.
    pub fn set_gain_db(&mut self, gain_db: f64) {
        self.gain_db = gain_db;
        self.dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_peak(f: &mut BiquadFilter, freq: f64, sample_rate: f64) -> f32 {
        let mut max_out = 0.0_f32;
        for i in 0..8820 {
            let t = i as f64 / sample_rate;
            let input = (2.0 * PI * freq * t).sin() as f32;
            let out = f.process(input);
            if i > 4410 {
                max_out = max_out.max(out.abs());
            }
        }
        max_out
    }

    #[test]
    fn lowpass_passes_dc() {
        let mut f = BiquadFilter::new(FilterType::Lowpass, 44100.0);
        f.frequency = 5000.0;
        f.update_coefficients();

        let mut output = 0.0;
        for _ in 0..1000 {
            output = f.process(1.0);
        }
        assert!(
            (output - 1.0).abs() < 0.001,
            "Lowpass should pass DC, got {output}"
        );
    }

    #[test]
    fn highpass_blocks_dc() {
        let mut f = BiquadFilter::with_params(FilterType::Highpass, 44100.0, 2000.0, 1.0);

        let mut output = 0.0;
        for _ in 0..1000 {
            output = f.process(1.0);
        }
        assert!(
            output.abs() < 0.001,
            "Highpass should block DC, got {output}"
        );
    }

    #[test]
    fn lowpass_attenuates_high_freq() {
        let mut f = BiquadFilter::with_params(FilterType::Lowpass, 44100.0, 200.0, 0.707);
        let peak = sine_peak(&mut f, 10000.0, 44100.0);
        assert!(
            peak < 0.01,
            "Lowpass@200Hz should strongly attenuate 10kHz, got amplitude {peak}"
        );
    }

    #[test]
    fn corner_above_nyquist_stays_stable() {
        // 20 kHz default lowpass on a 22.05 kHz graph
        let mut f = BiquadFilter::with_params(FilterType::Lowpass, 22050.0, 20000.0, 1.0);
        for i in 0..10000 {
            let input = if i % 50 == 0 { 1.0 } else { 0.0 };
            assert!(f.process(input).is_finite());
        }
    }

    #[test]
    fn flat_shelves_are_transparent() {
        let mut low = BiquadFilter::shelf(FilterType::Lowshelf, 44100.0, 250.0, 0.0);
        let mut high = BiquadFilter::shelf(FilterType::Highshelf, 44100.0, 4000.0, 0.0);
        for i in 0..2000 {
            let input = ((i as f32) * 0.37).sin();
            let out = high.process(low.process(input));
            assert!((out - input).abs() < 1e-4, "0 dB shelves should pass through");
        }
    }

    #[test]
    fn lowshelf_boosts_bass() {
        // +12 dB ≈ 3.98x at DC
        let mut f = BiquadFilter::shelf(FilterType::Lowshelf, 44100.0, 250.0, 12.0);
        let mut output = 0.0;
        for _ in 0..5000 {
            output = f.process(1.0);
        }
        assert!((output - 3.98).abs() < 0.05, "expected ~3.98, got {output}");

        let treble = sine_peak(&mut f, 12000.0, 44100.0);
        assert!((treble - 1.0).abs() < 0.05, "treble should be untouched, got {treble}");
    }

    #[test]
    fn highshelf_cuts_treble() {
        let mut f = BiquadFilter::shelf(FilterType::Highshelf, 44100.0, 4000.0, -12.0);
        let treble = sine_peak(&mut f, 15000.0, 44100.0);
        assert!(treble < 0.35, "-12 dB shelf should cut 15kHz, got {treble}");

        f.reset();
        let mut output = 0.0;
        for _ in 0..5000 {
            output = f.process(1.0);
        }
        assert!((output - 1.0).abs() < 0.01, "DC should be untouched, got {output}");
    }

    #[test]
    fn gain_change_takes_effect() {
        let mut f = BiquadFilter::shelf(FilterType::Lowshelf, 44100.0, 250.0, 0.0);
        f.set_gain_db(-12.0);
        let mut output = 0.0;
        for _ in 0..5000 {
            output = f.process(1.0);
        }
        assert!((output - 0.251).abs() < 0.01, "expected ~0.251, got {output}");
    }

    #[test]
    fn filter_output_finite() {
        let mut f = BiquadFilter::with_params(FilterType::Bandpass, 44100.0, 800.0, 2.0);

        for i in 0..10000 {
            let input = if i % 100 == 0 { 1.0 } else { 0.0 };
            let out = f.process(input);
            assert!(out.is_finite(), "Filter output not finite at sample {i}");
        }
    }
}
