//! WAV encoder — 16-bit PCM RIFF/WAVE from a rendered buffer.

use std::path::Path;

use crate::error::ExportError;

use super::buffer::RenderedBuffer;

const BITS_PER_SAMPLE: u16 = 16;
const HEADER_LEN: usize = 44;

/// Convert one float sample to 16-bit PCM.
fn to_i16(sample: f32) -> i16 {
    let s = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    (s * 32767.0).round() as i16
}

/// Encode `buffer` as a canonical 44-byte-header WAV file, channels
/// interleaved.
pub fn encode(buffer: &RenderedBuffer) -> Vec<u8> {
    let channels = buffer.channel_count() as u16;
    let frames = buffer.frame_count();
    let sample_rate = buffer.sample_rate();
    let block_align = channels * (BITS_PER_SAMPLE / 8);
    let byte_rate = sample_rate * block_align as u32;
    let data_size = (frames * block_align as usize) as u32;
    let file_size = 36 + data_size;

    let mut buf = Vec::with_capacity(HEADER_LEN + data_size as usize);

    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_size.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    // fmt chunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes()); // chunk size
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    // data chunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for frame in 0..frames {
        for ch in buffer.channels() {
            buf.extend_from_slice(&to_i16(ch[frame]).to_le_bytes());
        }
    }

    buf
}

/// Encode and write `buffer` to `path`.
pub fn write_wav(path: &Path, buffer: &RenderedBuffer) -> Result<(), ExportError> {
    std::fs::write(path, encode(buffer)).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u32_at(wav: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([wav[at], wav[at + 1], wav[at + 2], wav[at + 3]])
    }

    fn u16_at(wav: &[u8], at: usize) -> u16 {
        u16::from_le_bytes([wav[at], wav[at + 1]])
    }

    #[test]
    fn header_fields() {
        let buf = RenderedBuffer::new(2, 88200, 44100);
        let wav = encode(&buf);

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32_at(&wav, 16), 16);
        assert_eq!(u16_at(&wav, 20), 1);
        assert_eq!(u16_at(&wav, 22), 2);
        assert_eq!(u32_at(&wav, 24), 44100);
        assert_eq!(u32_at(&wav, 28), 176_400);
        assert_eq!(u16_at(&wav, 32), 4);
        assert_eq!(u16_at(&wav, 34), 16);
    }

    #[test]
    fn sizes_follow_frame_count() {
        // two seconds of stereo at 44.1 kHz
        let wav = encode(&RenderedBuffer::new(2, 88200, 44100));
        assert_eq!(u32_at(&wav, 40), 352_800);
        assert_eq!(u32_at(&wav, 4), 36 + 352_800);
        assert_eq!(wav.len(), 44 + 352_800);
    }

    #[test]
    fn samples_are_interleaved_and_clamped() {
        let buf = RenderedBuffer::from_channels(vec![vec![1.0, 2.0, 0.5], vec![-1.0, -7.0, 0.0]], 8000);
        let wav = encode(&buf);
        let samples: Vec<i16> = wav[44..]
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(samples, vec![32767, -32767, 32767, -32767, 16384, 0]);
    }

    #[test]
    fn empty_buffer_is_header_only() {
        let wav = encode(&RenderedBuffer::new(2, 0, 44100));
        assert_eq!(wav.len(), 44);
        assert_eq!(u32_at(&wav, 40), 0);
    }

    #[test]
    fn hound_reads_it_back() {
        let left: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.01).sin() * 0.8).collect();
        let right: Vec<f32> = left.iter().map(|s| -s).collect();
        let buf = RenderedBuffer::from_channels(vec![left.clone(), right.clone()], 22050);
        let wav = encode(&buf);

        let mut reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 22050);
        assert_eq!(spec.bits_per_sample, 16);
        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded.len(), 2000);
        for (i, pair) in decoded.chunks_exact(2).enumerate() {
            assert!((pair[0] as f32 / 32767.0 - left[i]).abs() <= 1.0 / 32767.0);
            assert!((pair[1] as f32 / 32767.0 - right[i]).abs() <= 1.0 / 32767.0);
        }
    }

    #[test]
    fn encoding_is_deterministic() {
        let buf = RenderedBuffer::from_channels(vec![vec![0.25; 64], vec![-0.5; 64]], 44100);
        assert_eq!(encode(&buf), encode(&buf));
    }
}
