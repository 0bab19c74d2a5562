//! Impulse-response loading.
//!
//! The reverb's impulse response is the only external asset the engine
//! reads. WAV goes through `hound`, MP3 through `minimp3`; both are behind
//! the `assets` feature. Decoded audio is converted to planar `f32` and
//! resampled to the engine rate before it becomes a [`ReverbKernel`].

use std::path::Path;

use crate::dsp::convolver::ReverbKernel;
use crate::error::AssetError;

/// Decoded impulse response, planar.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpulseResponse {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl ImpulseResponse {
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self, AssetError> {
        if channels.is_empty() || channels.iter().all(Vec::is_empty) {
            return Err(AssetError::Empty);
        }
        if sample_rate == 0 {
            return Err(AssetError::Decode {
                reason: "sample rate is zero".to_string(),
            });
        }
        Ok(ImpulseResponse { channels, sample_rate })
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frame_count(&self) -> usize {
        self.channels.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Linear-interpolation resample to `target_rate`.
    pub fn resample(&self, target_rate: u32) -> ImpulseResponse {
        if target_rate == self.sample_rate {
            return self.clone();
        }
        let channels = self
            .channels
            .iter()
            .map(|ch| resample_linear(ch, self.sample_rate, target_rate))
            .collect();
        ImpulseResponse {
            channels,
            sample_rate: target_rate,
        }
    }

    /// Build a normalized convolution kernel at `sample_rate`.
    pub fn to_kernel(&self, sample_rate: u32) -> Result<ReverbKernel, AssetError> {
        let ir = self.resample(sample_rate);
        ReverbKernel::new(&ir.channels, sample_rate, true)
    }
}

fn resample_linear(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    let ratio = target_rate as f64 / source_rate as f64;
    let out_len = (samples.len() as f64 * ratio).ceil() as usize;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 / ratio;
            let idx = pos.floor() as usize;
            let frac = (pos - idx as f64) as f32;
            match (samples.get(idx), samples.get(idx + 1)) {
                (Some(&a), Some(&b)) => a * (1.0 - frac) + b * frac,
                (Some(&a), None) => a,
                _ => samples.last().copied().unwrap_or(0.0),
            }
        })
        .collect()
}

/// Read and decode an impulse response file.
pub fn load_impulse_response(path: &Path) -> Result<ImpulseResponse, AssetError> {
    let bytes = std::fs::read(path).map_err(|source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let ext = path.extension().and_then(|e| e.to_str());
    let ir = decode_impulse_response(&bytes, ext)?;
    log::info!(
        "loaded impulse response {} ({} ch, {} frames @ {} Hz)",
        path.display(),
        ir.channels.len(),
        ir.frame_count(),
        ir.sample_rate
    );
    Ok(ir)
}

/// Decode an in-memory WAV or MP3 file. `extension` is only consulted when
/// the bytes carry no recognizable signature.
#[cfg(feature = "assets")]
pub fn decode_impulse_response(bytes: &[u8], extension: Option<&str>) -> Result<ImpulseResponse, AssetError> {
    let is_wav = bytes.starts_with(b"RIFF");
    let is_mp3 = bytes.starts_with(b"ID3")
        || (bytes.len() > 1 && bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0)
        || extension.is_some_and(|e| e.eq_ignore_ascii_case("mp3"));
    if is_wav {
        decode_wav(bytes)
    } else if is_mp3 {
        decode_mp3(bytes)
    } else {
        Err(AssetError::Unsupported {
            format: extension.unwrap_or("unknown").to_string(),
        })
    }
}

#[cfg(not(feature = "assets"))]
pub fn decode_impulse_response(_bytes: &[u8], extension: Option<&str>) -> Result<ImpulseResponse, AssetError> {
    Err(AssetError::Unsupported {
        format: format!("{} (built without the `assets` feature)", extension.unwrap_or("unknown")),
    })
}

#[cfg(feature = "assets")]
fn decode_wav(bytes: &[u8]) -> Result<ImpulseResponse, AssetError> {
    let decode_err = |e: hound::Error| AssetError::Decode { reason: e.to_string() };

    let reader = hound::WavReader::new(std::io::Cursor::new(bytes)).map_err(decode_err)?;
    let spec = reader.spec();
    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(decode_err)?,
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|x| x as f32 / max))
                .collect::<Result<_, _>>()
                .map_err(decode_err)?
        }
    };
    ImpulseResponse::new(deinterleave(&interleaved, spec.channels as usize), spec.sample_rate)
}

#[cfg(feature = "assets")]
fn decode_mp3(bytes: &[u8]) -> Result<ImpulseResponse, AssetError> {
    let mut decoder = minimp3::Decoder::new(std::io::Cursor::new(bytes));
    let mut channel_count = 0usize;
    let mut sample_rate = 0u32;
    let mut interleaved = Vec::new();
    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if channel_count == 0 {
                    channel_count = frame.channels;
                    sample_rate = frame.sample_rate.max(0) as u32;
                }
                interleaved.extend(frame.data.iter().map(|&s| s as f32 / 32768.0));
            }
            Err(minimp3::Error::Eof) => break,
            Err(minimp3::Error::SkippedData) => continue,
            Err(e) => return Err(AssetError::Decode { reason: e.to_string() }),
        }
    }
    if channel_count == 0 {
        return Err(AssetError::Empty);
    }
    ImpulseResponse::new(deinterleave(&interleaved, channel_count), sample_rate)
}

#[cfg(feature = "assets")]
fn deinterleave(interleaved: &[f32], channel_count: usize) -> Vec<Vec<f32>> {
    let channel_count = channel_count.max(1);
    let mut channels = vec![Vec::with_capacity(interleaved.len() / channel_count); channel_count];
    for frame in interleaved.chunks_exact(channel_count) {
        for (ch, &s) in channels.iter_mut().zip(frame) {
            ch.push(s);
        }
    }
    channels
}
