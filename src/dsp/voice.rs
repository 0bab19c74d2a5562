//! Voice — one synthesized sound event.
//!
//! A voice is an oscillator (with optional exponential sweep) through a
//! biquad filter, plus an optional white-noise layer, both shaped by one
//! breakpoint envelope. Voices are built at trigger time, render themselves
//! into whatever bus owns them, and are dropped once past their stop frame.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::catalog::{SoundDefinition, Sweep};
use crate::error::VoiceError;

use super::envelope::{DEFAULT_SUSTAIN_FLOOR, Envelope, EnvelopeShape};
use super::filter::BiquadFilter;
use super::oscillator::Oscillator;

/// Longest voice the synthesizer will build, in seconds.
pub const MAX_VOICE_SECONDS: f64 = 10.0;

/// Where a freshly built voice is connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceRoute {
    /// Dry into the track's EQ input, wet into the track's reverb send.
    Track(usize),
    /// Dry into the master input only; no reverb send.
    Master,
}

/// A single scheduled voice.
#[derive(Debug, Clone)]
pub struct Voice {
    oscillator: Oscillator,
    filter: BiquadFilter,
    envelope: Envelope,
    sweep: Option<Sweep>,
    /// Pre-scaled noise layer, one sample per voice frame.
    noise: Option<Vec<f32>>,
    route: VoiceRoute,
    start_frame: u64,
    stop_frame: u64,
    /// Next absolute frame this voice will produce.
    cursor: u64,
    sample_rate: f64,
    total_duration: f64,
}

impl Voice {
    pub fn route(&self) -> VoiceRoute {
        self.route
    }

    pub fn start_frame(&self) -> u64 {
        self.start_frame
    }

    pub fn stop_frame(&self) -> u64 {
        self.stop_frame
    }

    /// True once every frame up to the stop frame has been rendered.
    pub fn is_finished(&self) -> bool {
        self.cursor >= self.stop_frame
    }

    /// Add this voice's output for the quantum starting at absolute frame
    /// `quantum_start` into `out`. Frames before the start frame are left
    /// untouched.
    pub fn render_into(&mut self, quantum_start: u64, out: &mut [f32]) {
        let quantum_end = quantum_start + out.len() as u64;
        if quantum_end <= self.start_frame || self.is_finished() {
            return;
        }
        let from = self.cursor.max(quantum_start);
        let to = quantum_end.min(self.stop_frame);
        for frame in from..to {
            let idx = (frame - quantum_start) as usize;
            out[idx] += self.sample_at(frame);
        }
        self.cursor = to.max(self.cursor);
    }

    fn sample_at(&mut self, frame: u64) -> f32 {
        let offset = (frame - self.start_frame) as usize;
        let t = offset as f64 / self.sample_rate;

        if let Some(sweep) = self.sweep {
            self.oscillator.frequency =
                sweep.start * (sweep.end / sweep.start).powf(t / self.total_duration);
        }

        let tone = self.filter.process(self.oscillator.next_sample() as f32);
        let noise = self
            .noise
            .as_ref()
            .and_then(|n| n.get(offset).copied())
            .unwrap_or(0.0);
        (tone + noise) * self.envelope.level_at(t) as f32
    }
}

/// Builds voices from sound definitions.
///
/// Owns the noise generator, so two synthesizers created with the same seed
/// build identical voices for identical trigger sequences.
#[derive(Debug, Clone)]
pub struct VoiceSynthesizer {
    sample_rate: u32,
    rng: SmallRng,
}

impl VoiceSynthesizer {
    pub fn new(sample_rate: u32, seed: u64) -> Self {
        VoiceSynthesizer {
            sample_rate,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Build one voice starting at absolute frame `start_frame`.
    ///
    /// `volume` scales the envelope peak and sustain together with the
    /// definition's own gain.
    pub fn build_voice(
        &mut self,
        definition: &SoundDefinition,
        volume: f64,
        start_frame: u64,
        route: VoiceRoute,
    ) -> Result<Voice, VoiceError> {
        if !definition.freq.is_finite() || definition.freq <= 0.0 {
            return Err(VoiceError::InvalidFrequency(definition.freq));
        }
        if !definition.gain.is_finite() || definition.gain < 0.0 {
            return Err(VoiceError::InvalidGain(definition.gain));
        }
        let total = definition.total_duration();
        if !total.is_finite() || total > MAX_VOICE_SECONDS {
            return Err(VoiceError::InvalidDuration(total));
        }

        let sample_rate = self.sample_rate as f64;
        let peak = volume * definition.gain;
        let sustain_level = match definition.sustain {
            Some(sustain) => sustain * volume * definition.gain,
            None => DEFAULT_SUSTAIN_FLOOR,
        };
        let envelope = Envelope::new(EnvelopeShape {
            attack: definition.attack(),
            decay: definition.decay(),
            sustain_level,
            total,
            peak,
        });

        let mut oscillator = Oscillator::new(definition.waveform, sample_rate);
        oscillator.frequency = definition.freq;

        // An exponential glide cannot start or end at 0 Hz.
        let sweep = definition
            .sweep
            .filter(|s| s.start > 0.0 && s.end > 0.0 && s.start.is_finite() && s.end.is_finite());
        if let Some(s) = sweep {
            oscillator.frequency = s.start;
        }

        let resolved = definition.resolved_filter();
        let filter = BiquadFilter::with_params(
            resolved.filter_type,
            sample_rate,
            resolved.frequency,
            resolved.q,
        );

        let frames = (total * sample_rate).round() as usize;
        let noise = definition.noise_gain().map(|gain| {
            let gain = gain as f32;
            (0..frames)
                .map(|_| self.rng.gen_range(-1.0_f32..=1.0) * gain)
                .collect::<Vec<f32>>()
        });

        Ok(Voice {
            oscillator,
            filter,
            envelope,
            sweep,
            noise,
            route,
            start_frame,
            stop_frame: start_frame + frames as u64,
            cursor: start_frame,
            sample_rate,
            total_duration: total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SoundCatalog;

    fn render_all(voice: &mut Voice, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0_f32; frames];
        for (q, chunk) in out.chunks_mut(128).enumerate() {
            voice.render_into((q * 128) as u64, chunk);
        }
        out
    }

    fn def(name: &str) -> SoundDefinition {
        SoundCatalog::builtin().get(name).unwrap().clone()
    }

    #[test]
    fn voice_produces_sound() {
        let mut synth = VoiceSynthesizer::new(44100, 1);
        let mut v = synth.build_voice(&def("synth-01"), 1.0, 0, VoiceRoute::Master).unwrap();
        let out = render_all(&mut v, 44100);
        assert!(out.iter().any(|s| s.abs() > 0.01), "Voice should produce output");
    }

    #[test]
    fn stop_frame_follows_duration() {
        let mut synth = VoiceSynthesizer::new(44100, 1);
        let v = synth.build_voice(&def("kick-01"), 0.8, 1000, VoiceRoute::Master).unwrap();
        assert_eq!(v.start_frame(), 1000);
        assert_eq!(v.stop_frame(), 1000 + 22050);
    }

    #[test]
    fn silent_before_start_and_after_stop() {
        let mut synth = VoiceSynthesizer::new(44100, 1);
        let mut v = synth.build_voice(&def("perc-02"), 1.0, 300, VoiceRoute::Master).unwrap();
        let out = render_all(&mut v, 44100);
        assert!(out[..300].iter().all(|&s| s == 0.0));
        let stop = v.stop_frame() as usize;
        assert!(out[stop..].iter().all(|&s| s == 0.0));
        assert!(v.is_finished());
    }

    #[test]
    fn output_bounded_by_peak() {
        let mut synth = VoiceSynthesizer::new(44100, 1);
        for name in SoundCatalog::builtin().names() {
            let d = def(name);
            let mut v = synth.build_voice(&d, 1.0, 0, VoiceRoute::Master).unwrap();
            let out = render_all(&mut v, 60000);
            let bound = (d.gain * (1.5 + d.noise_gain().unwrap_or(0.0))) as f32 * 1.5;
            let peak = out.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
            assert!(peak <= bound, "{name} peaked at {peak}");
        }
    }

    #[test]
    fn volume_scales_output() {
        let mut loud = VoiceSynthesizer::new(44100, 7);
        let mut quiet = VoiceSynthesizer::new(44100, 7);
        let d = def("perc-01");
        // attack segment only; the default sustain floor is not volume-scaled
        let a = render_all(&mut loud.build_voice(&d, 1.0, 0, VoiceRoute::Master).unwrap(), 200);
        let b = render_all(&mut quiet.build_voice(&d, 0.5, 0, VoiceRoute::Master).unwrap(), 200);
        for (x, y) in a.iter().zip(&b) {
            assert!((x * 0.5 - y).abs() < 1e-5);
        }
    }

    #[test]
    fn sweep_is_exponential() {
        let mut synth = VoiceSynthesizer::new(44100, 1);
        let mut v = synth.build_voice(&def("fx-01"), 1.0, 0, VoiceRoute::Master).unwrap();
        // render the first half of the 0.7s voice
        let half = (0.35 * 44100.0) as usize;
        render_all(&mut v, half);
        let expected = (1200.0_f64 * 100.0).sqrt();
        assert!(
            (v.oscillator.frequency - expected).abs() / expected < 0.01,
            "midpoint should be the geometric mean, got {}",
            v.oscillator.frequency
        );
    }

    #[test]
    fn zero_sweep_endpoint_disables_glide() {
        let mut d = def("fx-01");
        d.sweep = Some(Sweep { start: 1200.0, end: 0.0 });
        let mut synth = VoiceSynthesizer::new(44100, 1);
        let mut v = synth.build_voice(&d, 1.0, 0, VoiceRoute::Master).unwrap();
        render_all(&mut v, 8000);
        assert_eq!(v.oscillator.frequency, d.freq);
    }

    #[test]
    fn same_seed_same_noise() {
        let d = def("hihat-01");
        let a = render_all(&mut VoiceSynthesizer::new(44100, 42).build_voice(&d, 1.0, 0, VoiceRoute::Master).unwrap(), 4410);
        let b = render_all(&mut VoiceSynthesizer::new(44100, 42).build_voice(&d, 1.0, 0, VoiceRoute::Master).unwrap(), 4410);
        let c = render_all(&mut VoiceSynthesizer::new(44100, 43).build_voice(&d, 1.0, 0, VoiceRoute::Master).unwrap(), 4410);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn rejects_invalid_definitions() {
        let mut synth = VoiceSynthesizer::new(44100, 1);
        let mut d = def("kick-01");
        d.freq = 0.0;
        assert_eq!(synth.build_voice(&d, 1.0, 0, VoiceRoute::Master).unwrap_err(), VoiceError::InvalidFrequency(0.0));

        let mut d = def("kick-01");
        d.duration = Some(60.0);
        assert!(matches!(synth.build_voice(&d, 1.0, 0, VoiceRoute::Master), Err(VoiceError::InvalidDuration(_))));

        let mut d = def("kick-01");
        d.gain = f64::NAN;
        assert!(matches!(synth.build_voice(&d, 1.0, 0, VoiceRoute::Master), Err(VoiceError::InvalidGain(_))));
    }
}
