//! Gain envelope built from linear-ramp breakpoints.
//!
//! A voice's amplitude is described the way an automation timeline would
//! describe it: a start value at t = 0 followed by "ramp linearly to `value`
//! by `time`" events. Events are applied in time order, so a ramp declared
//! later but ending earlier still lands first.

/// Level of the final ramp target. Kept above zero so the envelope never
/// produces an exact zero-gain stage.
pub const RELEASE_FLOOR: f64 = 0.0001;

/// Sustain level used when a definition has no sustain.
pub const DEFAULT_SUSTAIN_FLOOR: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Breakpoint {
    time: f64,
    value: f64,
}

/// Attack/decay/sustain/release timings resolved for one voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeShape {
    /// Attack time in seconds.
    pub attack: f64,
    /// Decay time in seconds.
    pub decay: f64,
    /// Absolute sustain level (already scaled by volume and gain).
    pub sustain_level: f64,
    /// Time in seconds at which the final ramp reaches [`RELEASE_FLOOR`].
    pub total: f64,
    /// Peak level reached at the end of the attack.
    pub peak: f64,
}

/// Piecewise-linear gain envelope.
#[derive(Debug, Clone)]
pub struct Envelope {
    points: Vec<Breakpoint>,
}

impl Envelope {
    pub fn new(shape: EnvelopeShape) -> Self {
        let mut points = vec![
            Breakpoint { time: shape.attack, value: shape.peak },
            Breakpoint { time: shape.attack + shape.decay, value: shape.sustain_level },
            Breakpoint { time: shape.total, value: RELEASE_FLOOR },
        ];
        // stable: equal times keep declaration order
        points.sort_by(|a, b| a.time.total_cmp(&b.time));
        Envelope { points }
    }

    /// Gain at `t` seconds after the voice start.
    pub fn level_at(&self, t: f64) -> f64 {
        if t <= 0.0 {
            return 0.0;
        }
        let mut prev = Breakpoint { time: 0.0, value: 0.0 };
        for &point in &self.points {
            if t < point.time {
                let span = point.time - prev.time;
                if span <= 0.0 {
                    return point.value;
                }
                let frac = (t - prev.time) / span;
                return prev.value + (point.value - prev.value) * frac;
            }
            prev = point;
        }
        prev.value
    }
}
