//! Convolution reverb.
//!
//! Uniformly partitioned overlap-save convolution with one partition per
//! render quantum, so the wet signal has no added latency. The impulse
//! response is transformed once into a [`ReverbKernel`] that any number of
//! convolvers (the live graph and every offline render) share read-only.

use std::f64::consts::PI;
use std::ops::{Add, Mul, Sub};
use std::sync::Arc;

use crate::error::AssetError;

use super::buffer::RENDER_QUANTUM;

const PARTITION: usize = RENDER_QUANTUM;
const FFT_SIZE: usize = PARTITION * 2;

// Power normalization constants used by browser convolvers, kept so an IR
// sounds the same here as in the web build.
const GAIN_CALIBRATION: f64 = 0.00125;
const GAIN_CALIBRATION_SAMPLE_RATE: f64 = 44100.0;
const MIN_POWER: f64 = 0.000125;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Complex {
    re: f64,
    im: f64,
}

impl Complex {
    const ZERO: Complex = Complex { re: 0.0, im: 0.0 };

    fn new(re: f64, im: f64) -> Self {
        Complex { re, im }
    }

    fn conj(self) -> Self {
        Complex::new(self.re, -self.im)
    }
}

impl Add for Complex {
    type Output = Complex;
    fn add(self, o: Complex) -> Complex {
        Complex::new(self.re + o.re, self.im + o.im)
    }
}

impl Sub for Complex {
    type Output = Complex;
    fn sub(self, o: Complex) -> Complex {
        Complex::new(self.re - o.re, self.im - o.im)
    }
}

impl Mul for Complex {
    type Output = Complex;
    fn mul(self, o: Complex) -> Complex {
        Complex::new(
            self.re * o.re - self.im * o.im,
            self.re * o.im + self.im * o.re,
        )
    }
}

/// In-place iterative radix-2 FFT with a precomputed twiddle table.
#[derive(Debug, Clone)]
struct Fft {
    size: usize,
    twiddles: Vec<Complex>,
}

impl Fft {
    fn new(size: usize) -> Self {
        debug_assert!(size.is_power_of_two());
        let twiddles = (0..size / 2)
            .map(|k| {
                let angle = -2.0 * PI * k as f64 / size as f64;
                Complex::new(angle.cos(), angle.sin())
            })
            .collect();
        Fft { size, twiddles }
    }

    fn forward(&self, buf: &mut [Complex]) {
        self.transform(buf, false);
    }

    fn inverse(&self, buf: &mut [Complex]) {
        self.transform(buf, true);
        let scale = 1.0 / self.size as f64;
        for c in buf.iter_mut() {
            c.re *= scale;
            c.im *= scale;
        }
    }

    fn transform(&self, buf: &mut [Complex], inverse: bool) {
        let n = self.size;

        let mut j = 0;
        for i in 1..n {
            let mut bit = n >> 1;
            while j & bit != 0 {
                j ^= bit;
                bit >>= 1;
            }
            j |= bit;
            if i < j {
                buf.swap(i, j);
            }
        }

        let mut len = 2;
        while len <= n {
            let half = len / 2;
            let stride = n / len;
            for start in (0..n).step_by(len) {
                for k in 0..half {
                    let mut w = self.twiddles[k * stride];
                    if inverse {
                        w = w.conj();
                    }
                    let u = buf[start + k];
                    let v = buf[start + k + half] * w;
                    buf[start + k] = u + v;
                    buf[start + k + half] = u - v;
                }
            }
            len <<= 1;
        }
    }
}

/// A pre-transformed impulse response.
#[derive(Debug, Clone)]
pub struct ReverbKernel {
    /// `[ir_channel][partition][bin]`
    partitions: Vec<Vec<Vec<Complex>>>,
    frames: usize,
    sample_rate: u32,
}

impl ReverbKernel {
    /// Transform planar IR channels (1, 2 or 4 of equal length) into a kernel.
    ///
    /// With `normalize` set the response is scaled by its inverse RMS power
    /// and the calibration gain, matching what a browser convolver does.
    pub fn new(channels: &[Vec<f32>], sample_rate: u32, normalize: bool) -> Result<Self, AssetError> {
        if !matches!(channels.len(), 1 | 2 | 4) {
            return Err(AssetError::Unsupported {
                format: format!("{}-channel impulse response", channels.len()),
            });
        }
        let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
        if frames == 0 {
            return Err(AssetError::Empty);
        }

        let scale = if normalize {
            normalization_scale(channels, frames, sample_rate)
        } else {
            1.0
        };

        let fft = Fft::new(FFT_SIZE);
        let partitions = channels
            .iter()
            .map(|ch| {
                (0..frames.div_ceil(PARTITION))
                    .map(|p| {
                        let mut bins = vec![Complex::ZERO; FFT_SIZE];
                        let begin = p * PARTITION;
                        let end = (begin + PARTITION).min(ch.len());
                        if begin < end {
                            for (bin, &s) in bins.iter_mut().zip(&ch[begin..end]) {
                                bin.re = s as f64 * scale;
                            }
                        }
                        fft.forward(&mut bins);
                        bins
                    })
                    .collect()
            })
            .collect();

        log::debug!(
            "reverb kernel: {} channel(s), {} frames, {} partitions",
            channels.len(),
            frames,
            frames.div_ceil(PARTITION)
        );

        Ok(ReverbKernel {
            partitions,
            frames,
            sample_rate,
        })
    }

    pub fn channel_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn frame_count(&self) -> usize {
        self.frames
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn partition_count(&self) -> usize {
        self.partitions.first().map_or(0, Vec::len)
    }
}

fn normalization_scale(channels: &[Vec<f32>], frames: usize, sample_rate: u32) -> f64 {
    let sum: f64 = channels
        .iter()
        .flat_map(|ch| ch.iter())
        .map(|&s| (s as f64) * (s as f64))
        .sum();
    let mut power = (sum / (channels.len() * frames) as f64).sqrt();
    if !power.is_finite() || power < MIN_POWER {
        power = MIN_POWER;
    }
    let mut scale = 1.0 / power * GAIN_CALIBRATION;
    if sample_rate > 0 {
        scale *= GAIN_CALIBRATION_SAMPLE_RATE / sample_rate as f64;
    }
    if channels.len() == 4 {
        scale *= 0.5;
    }
    scale
}

/// Per-output-channel convolution state.
#[derive(Debug, Clone)]
struct Lane {
    previous: Vec<f64>,
    frame: Vec<Complex>,
    acc: Vec<Complex>,
    /// Input spectra, newest first.
    history: Vec<Vec<Complex>>,
}

impl Lane {
    fn new(partitions: usize) -> Self {
        Lane {
            previous: vec![0.0; PARTITION],
            frame: vec![Complex::ZERO; FFT_SIZE],
            acc: vec![Complex::ZERO; FFT_SIZE],
            history: vec![vec![Complex::ZERO; FFT_SIZE]; partitions],
        }
    }

    fn process(&mut self, fft: &Fft, filter: &[Vec<Complex>], input: &[f32], output: &mut [f32]) {
        for i in 0..PARTITION {
            let current = input.get(i).copied().unwrap_or(0.0) as f64;
            self.frame[i] = Complex::new(self.previous[i], 0.0);
            self.frame[PARTITION + i] = Complex::new(current, 0.0);
            self.previous[i] = current;
        }
        fft.forward(&mut self.frame);

        self.history.rotate_right(1);
        self.history[0].copy_from_slice(&self.frame);

        self.acc.fill(Complex::ZERO);
        for (spectrum, partition) in self.history.iter().zip(filter) {
            for ((a, &x), &h) in self.acc.iter_mut().zip(spectrum).zip(partition) {
                *a = *a + x * h;
            }
        }
        fft.inverse(&mut self.acc);

        for (out, c) in output.iter_mut().zip(&self.acc[PARTITION..]) {
            *out = c.re as f32;
        }
    }
}

/// Stereo convolver. Without a kernel it outputs silence.
#[derive(Debug, Clone)]
pub struct Convolver {
    kernel: Option<Arc<ReverbKernel>>,
    fft: Fft,
    lanes: [Lane; 2],
}

impl Convolver {
    pub fn new(kernel: Option<Arc<ReverbKernel>>) -> Self {
        let partitions = kernel.as_ref().map_or(0, |k| k.partition_count());
        Convolver {
            kernel,
            fft: Fft::new(FFT_SIZE),
            lanes: [Lane::new(partitions), Lane::new(partitions)],
        }
    }

    pub fn kernel(&self) -> Option<&Arc<ReverbKernel>> {
        self.kernel.as_ref()
    }

    /// Swap the impulse response. Any reverb tail in flight is dropped.
    pub fn set_kernel(&mut self, kernel: Option<Arc<ReverbKernel>>) {
        *self = Convolver::new(kernel);
    }

    /// Convolve one quantum (at most [`RENDER_QUANTUM`] frames).
    pub fn process(&mut self, in_left: &[f32], in_right: &[f32], out_left: &mut [f32], out_right: &mut [f32]) {
        let Some(kernel) = &self.kernel else {
            out_left.fill(0.0);
            out_right.fill(0.0);
            return;
        };
        let ir_channels = kernel.partitions.len();
        let [lane_left, lane_right] = &mut self.lanes;
        lane_left.process(&self.fft, &kernel.partitions[0], in_left, out_left);
        lane_right.process(&self.fft, &kernel.partitions[1 % ir_channels], in_right, out_right);
    }
}
