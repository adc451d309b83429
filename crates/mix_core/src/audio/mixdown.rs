//! Stem summation into the working mixdown.

use std::collections::BTreeMap;

use crate::context::Stem;

use super::buffer::AudioBuffer;

/// Sum all stems into a stereo buffer.
///
/// The result is padded with zeros to the longest stem (tail padding, never
/// head), mono stems contribute equally to both channels, and no level
/// normalization is applied - headroom management belongs to DSP stages.
///
/// Returns `None` when there are no stems or every stem is empty.
pub fn mix_stems(stems: &BTreeMap<String, Stem>) -> Option<AudioBuffer> {
    let max_frames = stems.values().map(|s| s.buffer.frames()).max()?;
    if max_frames == 0 {
        return None;
    }

    let mut mix = vec![0.0f32; max_frames * 2];
    for stem in stems.values() {
        let buf = &stem.buffer;
        match buf.channels() {
            1 => {
                for (frame, s) in buf.samples().iter().enumerate() {
                    mix[frame * 2] += s;
                    mix[frame * 2 + 1] += s;
                }
            }
            _ => {
                let ch = buf.channels() as usize;
                for (frame, chunk) in buf.samples().chunks_exact(ch).enumerate() {
                    mix[frame * 2] += chunk[0];
                    mix[frame * 2 + 1] += chunk[1.min(ch - 1)];
                }
            }
        }
    }

    Some(AudioBuffer::new(2, mix))
}
