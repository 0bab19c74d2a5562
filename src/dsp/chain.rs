//! Per-track routing chain.
//!
//! ```text
//! voices ─┬─► lowshelf 250 Hz ─► highshelf 4 kHz ─► pan ─► gain ─┬─► master
//!         │                                                       │
//!         └──────────────────────────────► reverb send ◄──────────┘
//! ```
//!
//! The send stage sums the post-gain track signal with the raw voice signal,
//! since voices also connect to it directly.

use crate::track::TrackParams;

use super::buffer::RENDER_QUANTUM;
use super::filter::{BiquadFilter, FilterType};
use super::panner::StereoPanner;

pub const EQ_LOW_FREQ: f64 = 250.0;
pub const EQ_HIGH_FREQ: f64 = 4000.0;

#[derive(Debug, Clone)]
pub struct TrackChain {
    eq_low: BiquadFilter,
    eq_high: BiquadFilter,
    panner: StereoPanner,
    gain: f32,
    send: f32,
    mono: Vec<f32>,
    left: Vec<f32>,
    right: Vec<f32>,
}

impl TrackChain {
    pub fn new(params: &TrackParams, sample_rate: f64) -> Self {
        let mut chain = TrackChain {
            eq_low: BiquadFilter::shelf(FilterType::Lowshelf, sample_rate, EQ_LOW_FREQ, 0.0),
            eq_high: BiquadFilter::shelf(FilterType::Highshelf, sample_rate, EQ_HIGH_FREQ, 0.0),
            panner: StereoPanner::default(),
            gain: 0.0,
            send: 0.0,
            mono: vec![0.0; RENDER_QUANTUM],
            left: vec![0.0; RENDER_QUANTUM],
            right: vec![0.0; RENDER_QUANTUM],
        };
        chain.apply(params);
        chain
    }

    /// Push every parameter into the processing stages.
    pub fn apply(&mut self, params: &TrackParams) {
        self.gain = params.volume as f32;
        self.send = params.reverb_send as f32;
        self.panner.set_pan(params.pan);
        self.eq_low.set_gain_db(params.eq_low);
        self.eq_high.set_gain_db(params.eq_high);
    }

    /// Run one quantum of summed voice signal through the chain, adding the
    /// result into the master and reverb-send buses.
    pub fn process(
        &mut self,
        input: &[f32],
        master: (&mut [f32], &mut [f32]),
        reverb: (&mut [f32], &mut [f32]),
    ) {
        let n = input.len().min(RENDER_QUANTUM);
        let (mono, left, right) = (&mut self.mono[..n], &mut self.left[..n], &mut self.right[..n]);

        mono.copy_from_slice(&input[..n]);
        self.eq_low.process_block(mono);
        self.eq_high.process_block(mono);
        self.panner.process(mono, left, right);

        let (master_l, master_r) = master;
        let (reverb_l, reverb_r) = reverb;
        for i in 0..n {
            let l = left[i] * self.gain;
            let r = right[i] * self.gain;
            master_l[i] += l;
            master_r[i] += r;
            reverb_l[i] += (l + input[i]) * self.send;
            reverb_r[i] += (r + input[i]) * self.send;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(params: &TrackParams, input: &[f32]) -> [Vec<f32>; 4] {
        let mut chain = TrackChain::new(params, 44100.0);
        let n = input.len();
        let (mut ml, mut mr, mut rl, mut rr) = (vec![0.0; n], vec![0.0; n], vec![0.0; n], vec![0.0; n]);
        chain.process(input, (&mut ml, &mut mr), (&mut rl, &mut rr));
        [ml, mr, rl, rr]
    }

    #[test]
    fn flat_center_chain_is_equal_power() {
        let params = TrackParams { volume: 1.0, ..TrackParams::default() };
        let [ml, mr, rl, _] = run(&params, &[1.0; 8]);
        assert!((ml[0] - 0.70710677).abs() < 1e-5);
        assert!((mr[0] - 0.70710677).abs() < 1e-5);
        // send defaults to zero
        assert!(rl.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn send_includes_direct_voice_signal() {
        let params = TrackParams {
            volume: 0.0,
            reverb_send: 0.5,
            ..TrackParams::default()
        };
        let [ml, _, rl, rr] = run(&params, &[1.0; 4]);
        assert!(ml.iter().all(|&s| s == 0.0));
        assert!((rl[0] - 0.5).abs() < 1e-6);
        assert!((rr[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn hard_pan_mutes_other_side() {
        let params = TrackParams { volume: 1.0, pan: 1.0, ..TrackParams::default() };
        let [ml, mr, _, _] = run(&params, &[0.5; 4]);
        assert!(ml[0].abs() < 1e-6);
        assert!((mr[0] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn outputs_accumulate() {
        let mut chain = TrackChain::new(&TrackParams { volume: 1.0, ..TrackParams::default() }, 44100.0);
        let (mut ml, mut mr) = (vec![1.0_f32; 2], vec![1.0_f32; 2]);
        let (mut rl, mut rr) = (vec![0.0_f32; 2], vec![0.0_f32; 2]);
        chain.process(&[0.0, 0.0], (&mut ml, &mut mr), (&mut rl, &mut rr));
        assert_eq!(ml, vec![1.0, 1.0]);
    }
}
