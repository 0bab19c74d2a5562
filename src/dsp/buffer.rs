//! Planar PCM buffers.

/// Frames processed by every graph stage per call.
pub const RENDER_QUANTUM: usize = 128;

/// Per-channel floating-point PCM.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl RenderedBuffer {
    /// A silent buffer of `frames` frames.
    pub fn new(channel_count: usize, frames: usize, sample_rate: u32) -> Self {
        RenderedBuffer {
            channels: vec![vec![0.0; frames]; channel_count],
            sample_rate,
        }
    }

    /// Wrap existing channel data. Channels shorter than the longest one are
    /// padded with silence.
    pub fn from_channels(mut channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
        for ch in &mut channels {
            ch.resize(frames, 0.0);
        }
        RenderedBuffer { channels, sample_rate }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn duration_secs(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Largest absolute sample across all channels.
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|ch| ch.iter())
            .fold(0.0_f32, |m, &s| m.max(s.abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_silent() {
        let buf = RenderedBuffer::new(2, 441, 44100);
        assert_eq!(buf.channel_count(), 2);
        assert_eq!(buf.frame_count(), 441);
        assert!((buf.duration_secs() - 0.01).abs() < 1e-12);
        assert_eq!(buf.peak(), 0.0);
    }

    #[test]
    fn from_channels_pads_short_channels() {
        let buf = RenderedBuffer::from_channels(vec![vec![0.5; 4], vec![-0.25; 2]], 8000);
        assert_eq!(buf.frame_count(), 4);
        assert_eq!(buf.channel(1), &[-0.25, -0.25, 0.0, 0.0]);
        assert_eq!(buf.peak(), 0.5);
    }
}
