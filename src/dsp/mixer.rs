//! Master bus — sums every track, runs the master EQ and gain, and returns
//! the shared reverb into the mix.
//!
//! ```text
//! tracks ──► input sum ─► lowshelf 250 Hz ─► highshelf 4 kHz ─► master gain ─► out
//!               ▲
//! sends ──► convolver ─► wet gain
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::track::{EQ_RANGE_DB, clamp_param};

use super::buffer::RENDER_QUANTUM;
use super::chain::{EQ_HIGH_FREQ, EQ_LOW_FREQ};
use super::convolver::{Convolver, ReverbKernel};
use super::filter::{BiquadFilter, FilterType};

/// Master-section parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterParams {
    pub volume: f64,
    pub eq_low: f64,
    pub eq_high: f64,
    pub reverb_wetness: f64,
}

impl Default for MasterParams {
    fn default() -> Self {
        MasterParams {
            volume: 0.7,
            eq_low: 0.0,
            eq_high: 0.0,
            reverb_wetness: 0.3,
        }
    }
}

impl MasterParams {
    pub fn set_volume(&mut self, volume: f64) {
        if let Some(v) = clamp_param(volume, 0.0, 1.0) {
            self.volume = v;
        }
    }

    pub fn set_eq_low(&mut self, gain_db: f64) {
        if let Some(v) = clamp_param(gain_db, -EQ_RANGE_DB, EQ_RANGE_DB) {
            self.eq_low = v;
        }
    }

    pub fn set_eq_high(&mut self, gain_db: f64) {
        if let Some(v) = clamp_param(gain_db, -EQ_RANGE_DB, EQ_RANGE_DB) {
            self.eq_high = v;
        }
    }

    pub fn set_reverb_wetness(&mut self, wetness: f64) {
        if let Some(v) = clamp_param(wetness, 0.0, 1.0) {
            self.reverb_wetness = v;
        }
    }
}

type StereoInputs<'a> = (&'a mut [f32], &'a mut [f32]);

/// The master section of one audio graph.
#[derive(Debug, Clone)]
pub struct MixBus {
    eq_low: [BiquadFilter; 2],
    eq_high: [BiquadFilter; 2],
    gain: f32,
    wet: f32,
    convolver: Convolver,
    input: [Vec<f32>; 2],
    send: [Vec<f32>; 2],
    wet_return: [Vec<f32>; 2],
}

impl MixBus {
    pub fn new(params: &MasterParams, sample_rate: f64, kernel: Option<Arc<ReverbKernel>>) -> Self {
        let low = BiquadFilter::shelf(FilterType::Lowshelf, sample_rate, EQ_LOW_FREQ, 0.0);
        let high = BiquadFilter::shelf(FilterType::Highshelf, sample_rate, EQ_HIGH_FREQ, 0.0);
        let quantum = || vec![0.0_f32; RENDER_QUANTUM];
        let mut bus = MixBus {
            eq_low: [low.clone(), low],
            eq_high: [high.clone(), high],
            gain: 0.0,
            wet: 0.0,
            convolver: Convolver::new(kernel),
            input: [quantum(), quantum()],
            send: [quantum(), quantum()],
            wet_return: [quantum(), quantum()],
        };
        bus.apply(params);
        bus
    }

    pub fn apply(&mut self, params: &MasterParams) {
        self.gain = params.volume as f32;
        self.wet = params.reverb_wetness as f32;
        for f in &mut self.eq_low {
            f.set_gain_db(params.eq_low);
        }
        for f in &mut self.eq_high {
            f.set_gain_db(params.eq_high);
        }
    }

    pub fn set_kernel(&mut self, kernel: Option<Arc<ReverbKernel>>) {
        self.convolver.set_kernel(kernel);
    }

    pub fn has_reverb(&self) -> bool {
        self.convolver.kernel().is_some()
    }

    /// Master-input and reverb-send buses for the current quantum, for a
    /// track chain to add into.
    pub fn track_inputs(&mut self) -> (StereoInputs<'_>, StereoInputs<'_>) {
        let [in_l, in_r] = &mut self.input;
        let [send_l, send_r] = &mut self.send;
        (
            (in_l.as_mut_slice(), in_r.as_mut_slice()),
            (send_l.as_mut_slice(), send_r.as_mut_slice()),
        )
    }

    /// Add a mono signal straight into the master input, both channels.
    pub fn add_direct(&mut self, mono: &[f32]) {
        let [in_l, in_r] = &mut self.input;
        for ((l, r), &s) in in_l.iter_mut().zip(in_r.iter_mut()).zip(mono) {
            *l += s;
            *r += s;
        }
    }

    /// Finish the quantum: mix in the reverb return, apply EQ and gain, and
    /// write `out_left.len()` frames. The input buses are cleared afterwards.
    pub fn process(&mut self, out_left: &mut [f32], out_right: &mut [f32]) {
        let n = out_left.len().min(RENDER_QUANTUM);
        {
            let [send_l, send_r] = &self.send;
            let [ret_l, ret_r] = &mut self.wet_return;
            self.convolver
                .process(&send_l[..n], &send_r[..n], &mut ret_l[..n], &mut ret_r[..n]);
        }

        let outs = [out_left, out_right];
        for (ch, out) in outs.into_iter().enumerate() {
            let input = &mut self.input[ch][..n];
            for (x, &w) in input.iter_mut().zip(&self.wet_return[ch][..n]) {
                *x += w * self.wet;
            }
            self.eq_low[ch].process_block(input);
            self.eq_high[ch].process_block(input);
            for (o, &x) in out[..n].iter_mut().zip(input.iter()) {
                *o = x * self.gain;
            }
        }

        for buf in self.input.iter_mut().chain(self.send.iter_mut()) {
            buf.fill(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let p = MasterParams::default();
        assert_eq!(p.volume, 0.7);
        assert_eq!(p.reverb_wetness, 0.3);
        assert_eq!((p.eq_low, p.eq_high), (0.0, 0.0));
    }

    #[test]
    fn setters_clamp() {
        let mut p = MasterParams::default();
        p.set_volume(2.0);
        p.set_reverb_wetness(-1.0);
        p.set_eq_low(-40.0);
        p.set_eq_high(f64::INFINITY);
        assert_eq!(p.volume, 1.0);
        assert_eq!(p.reverb_wetness, 0.0);
        assert_eq!(p.eq_low, -12.0);
        assert_eq!(p.eq_high, 0.0);
    }

    #[test]
    fn silent_input_gives_silence() {
        let mut bus = MixBus::new(&MasterParams::default(), 44100.0, None);
        let (mut l, mut r) = (vec![1.0_f32; RENDER_QUANTUM], vec![1.0_f32; RENDER_QUANTUM]);
        bus.process(&mut l, &mut r);
        assert!(l.iter().chain(&r).all(|&s| s == 0.0));
    }

    #[test]
    fn master_gain_scales_direct_input() {
        let mut bus = MixBus::new(&MasterParams::default(), 44100.0, None);
        bus.add_direct(&[1.0; 4]);
        let (mut l, mut r) = (vec![0.0_f32; 4], vec![0.0_f32; 4]);
        bus.process(&mut l, &mut r);
        assert!((l[0] - 0.7).abs() < 1e-5);
        assert!((r[3] - 0.7).abs() < 1e-5);
    }

    #[test]
    fn buses_clear_between_quanta() {
        let mut bus = MixBus::new(&MasterParams::default(), 44100.0, None);
        bus.add_direct(&[1.0; 4]);
        let (mut l, mut r) = (vec![0.0_f32; 4], vec![0.0_f32; 4]);
        bus.process(&mut l, &mut r);
        bus.process(&mut l, &mut r);
        assert!(l.iter().all(|&s| s.abs() < 1e-6));
    }

    #[test]
    fn reverb_return_is_wet_scaled() {
        let kernel = Arc::new(ReverbKernel::new(&[vec![1.0]], 44100, false).unwrap());
        let params = MasterParams { volume: 1.0, reverb_wetness: 0.5, ..MasterParams::default() };
        let mut bus = MixBus::new(&params, 44100.0, Some(kernel));
        assert!(bus.has_reverb());
        {
            let (_, (send_l, send_r)) = bus.track_inputs();
            send_l[..4].fill(1.0);
            send_r[..4].fill(1.0);
        }
        let (mut l, mut r) = (vec![0.0_f32; 4], vec![0.0_f32; 4]);
        bus.process(&mut l, &mut r);
        assert!((l[0] - 0.5).abs() < 1e-5, "got {}", l[0]);
        assert!((r[2] - 0.5).abs() < 1e-5);
    }
}
