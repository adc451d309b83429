//! Interleaved PCM sample buffer.

/// An interleaved floating-point PCM buffer, one or two channels.
///
/// Samples are nominally in `[-1.0, 1.0]` but the range is not enforced
/// until the final WAV write; intermediate stages may overshoot and later
/// stages (headroom trim, limiter) bring the level back.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: u16,
    samples: Vec<f32>,
}

impl AudioBuffer {
    /// Create a buffer from interleaved samples.
    ///
    /// # Panics
    /// Panics if `channels` is zero or the sample count is not a multiple
    /// of the channel count. Buffers are always constructed by the runtime
    /// (ingest, mixdown, DSP), never from untrusted input.
    pub fn new(channels: u16, samples: Vec<f32>) -> Self {
        assert!(channels > 0, "AudioBuffer needs at least one channel");
        assert_eq!(
            samples.len() % channels as usize,
            0,
            "interleaved sample count must be a multiple of the channel count"
        );
        Self { channels, samples }
    }

    /// A silent buffer with the given geometry.
    pub fn silent(channels: u16, frames: usize) -> Self {
        Self::new(channels, vec![0.0; frames * channels as usize])
    }

    /// Number of interleaved channels (1 or 2 in practice).
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Raw interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Mutable access to the raw interleaved samples.
    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    /// Consume the buffer, returning the interleaved samples.
    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    /// Sample at `(frame, channel)`.
    #[inline]
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        self.samples[frame * self.channels as usize + channel]
    }

    /// Iterator over one channel's samples.
    pub fn channel_iter(&self, channel: usize) -> impl Iterator<Item = f32> + '_ {
        let step = self.channels as usize;
        self.samples.iter().skip(channel).step_by(step).copied()
    }

    /// Extract one channel as a contiguous vector.
    pub fn channel(&self, channel: usize) -> Vec<f32> {
        self.channel_iter(channel).collect()
    }

    /// Mix all channels down to a mono vector (arithmetic mean per frame).
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels == 1 {
            return self.samples.clone();
        }
        let ch = self.channels as usize;
        self.samples
            .chunks_exact(ch)
            .map(|frame| frame.iter().sum::<f32>() / ch as f32)
            .collect()
    }

    /// Return a stereo copy of this buffer.
    ///
    /// Mono input is duplicated to both channels; stereo input is cloned.
    pub fn to_stereo(&self) -> AudioBuffer {
        match self.channels {
            2 => self.clone(),
            1 => {
                let mut samples = Vec::with_capacity(self.samples.len() * 2);
                for &s in &self.samples {
                    samples.push(s);
                    samples.push(s);
                }
                AudioBuffer::new(2, samples)
            }
            n => {
                // >2 channels never survives ingest, but keep the fold total.
                let mut samples = Vec::with_capacity(self.frames() * 2);
                for frame in self.samples.chunks_exact(n as usize) {
                    samples.push(frame[0]);
                    samples.push(frame[1.min(frame.len() - 1)]);
                }
                AudioBuffer::new(2, samples)
            }
        }
    }

    /// Rebuild a buffer from per-channel (planar) vectors.
    ///
    /// All planes must have equal length.
    pub fn from_planes(planes: &[Vec<f32>]) -> Self {
        assert!(!planes.is_empty());
        let frames = planes[0].len();
        assert!(planes.iter().all(|p| p.len() == frames));
        let ch = planes.len();
        let mut samples = vec![0.0f32; frames * ch];
        for (c, plane) in planes.iter().enumerate() {
            for (f, &s) in plane.iter().enumerate() {
                samples[f * ch + c] = s;
            }
        }
        Self::new(ch as u16, samples)
    }

    /// Peak absolute sample value (linear).
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }

    /// Apply a uniform linear gain in place.
    pub fn apply_gain(&mut self, gain: f32) {
        for s in &mut self.samples {
            *s *= gain;
        }
    }

    /// True when the buffer holds no frames.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_accessors() {
        let buf = AudioBuffer::new(2, vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(buf.channels(), 2);
        assert_eq!(buf.frames(), 2);
        assert_eq!(buf.sample(1, 0), 0.3);
        assert_eq!(buf.channel(1), vec![0.2, 0.4]);
    }

    #[test]
    fn mono_to_stereo_duplicates() {
        let buf = AudioBuffer::new(1, vec![0.5, -0.5]);
        let stereo = buf.to_stereo();
        assert_eq!(stereo.channels(), 2);
        assert_eq!(stereo.samples(), &[0.5, 0.5, -0.5, -0.5]);
    }

    #[test]
    fn to_mono_averages_channels() {
        let buf = AudioBuffer::new(2, vec![1.0, 0.0, 0.0, 1.0]);
        assert_eq!(buf.to_mono(), vec![0.5, 0.5]);
    }

    #[test]
    fn planes_round_trip() {
        let left = vec![0.1, 0.2];
        let right = vec![0.3, 0.4];
        let buf = AudioBuffer::from_planes(&[left.clone(), right.clone()]);
        assert_eq!(buf.channel(0), left);
        assert_eq!(buf.channel(1), right);
    }

    #[test]
    fn gain_and_peak() {
        let mut buf = AudioBuffer::new(1, vec![0.25, -0.5]);
        assert_eq!(buf.peak(), 0.5);
        buf.apply_gain(2.0);
        assert_eq!(buf.peak(), 1.0);
    }
}
