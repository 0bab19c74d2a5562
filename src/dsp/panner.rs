//! Equal-power stereo panner for mono sources.

use std::f64::consts::FRAC_PI_2;

#[derive(Debug, Clone)]
pub struct StereoPanner {
    pan: f64,
    gain_left: f32,
    gain_right: f32,
}

impl StereoPanner {
    pub fn new(pan: f64) -> Self {
        let mut panner = StereoPanner {
            pan: 0.0,
            gain_left: 0.0,
            gain_right: 0.0,
        };
        panner.set_pan(pan);
        panner
    }

    pub fn pan(&self) -> f64 {
        self.pan
    }

    /// Set the position, clamped to [-1, 1] (full left to full right).
    pub fn set_pan(&mut self, pan: f64) {
        self.pan = pan.clamp(-1.0, 1.0);
        let x = (self.pan + 1.0) / 2.0 * FRAC_PI_2;
        self.gain_left = x.cos() as f32;
        self.gain_right = x.sin() as f32;
    }

    /// Spread `input` into `left`/`right`, overwriting them.
    pub fn process(&self, input: &[f32], left: &mut [f32], right: &mut [f32]) {
        for ((s, l), r) in input.iter().zip(left.iter_mut()).zip(right.iter_mut()) {
            *l = s * self.gain_left;
            *r = s * self.gain_right;
        }
    }
}

impl Default for StereoPanner {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(pan: f64) -> (f32, f32) {
        let p = StereoPanner::new(pan);
        let (mut l, mut r) = ([0.0_f32; 1], [0.0_f32; 1]);
        p.process(&[1.0], &mut l, &mut r);
        (l[0], r[0])
    }

    #[test]
    fn center_is_equal_power() {
        let (l, r) = run(0.0);
        assert!((l - 0.70710677).abs() < 1e-6);
        assert!((r - 0.70710677).abs() < 1e-6);
        assert!((l * l + r * r - 1.0).abs() < 1e-6);
    }

    #[test]
    fn hard_left_and_right() {
        let (l, r) = run(-1.0);
        assert!((l - 1.0).abs() < 1e-6 && r.abs() < 1e-6);
        let (l, r) = run(1.0);
        assert!(l.abs() < 1e-6 && (r - 1.0).abs() < 1e-6);
    }

    #[test]
    fn pan_is_clamped() {
        let mut p = StereoPanner::default();
        p.set_pan(3.0);
        assert_eq!(p.pan(), 1.0);
        p.set_pan(-7.5);
        assert_eq!(p.pan(), -1.0);
    }
}
