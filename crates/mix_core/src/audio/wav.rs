//! WAV byte-buffer codec.
//!
//! Stems arrive and artifacts leave as in-memory byte buffers; the ports
//! own the actual persistence. Supports 16/24/32-bit integer and 32-bit
//! float PCM on the way in; the pipeline always writes 32-bit float out.

use std::io::Cursor;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use thiserror::Error;

use super::buffer::AudioBuffer;

/// WAV decode/encode failure.
#[derive(Error, Debug)]
pub enum WavError {
    #[error("failed to parse WAV data: {0}")]
    Malformed(#[from] hound::Error),

    #[error("unsupported WAV layout: {0}")]
    Unsupported(String),
}

/// A decoded WAV file: interleaved buffer plus its sample rate.
#[derive(Debug, Clone)]
pub struct DecodedWav {
    pub buffer: AudioBuffer,
    pub sample_rate: u32,
}

/// Decode a WAV byte buffer.
///
/// Files with more than two channels are folded down to their first two
/// channels at read time; everything past ingest deals in mono or stereo
/// only.
pub fn decode(bytes: &[u8]) -> Result<DecodedWav, WavError> {
    let mut reader = WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()?,
        (SampleFormat::Int, bits @ (8 | 16 | 24 | 32)) => {
            let scale = 1.0 / (1i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<Vec<_>, _>>()?
        }
        (format, bits) => {
            return Err(WavError::Unsupported(format!(
                "{bits}-bit {format:?} PCM"
            )))
        }
    };

    let buffer = if spec.channels <= 2 {
        AudioBuffer::new(spec.channels.max(1), samples)
    } else {
        // Keep the first two channels, drop the rest.
        let ch = spec.channels as usize;
        let mut folded = Vec::with_capacity(samples.len() / ch * 2);
        for frame in samples.chunks_exact(ch) {
            folded.push(frame[0]);
            folded.push(frame[1]);
        }
        AudioBuffer::new(2, folded)
    };

    Ok(DecodedWav {
        buffer,
        sample_rate: spec.sample_rate,
    })
}

/// Encode a buffer as 32-bit float PCM WAV bytes.
///
/// Samples are clamped to `[-1.0, 1.0]` at write time; this is the only
/// place the nominal range is enforced.
pub fn encode(buffer: &AudioBuffer, sample_rate: u32) -> Result<Vec<u8>, WavError> {
    let spec = WavSpec {
        channels: buffer.channels(),
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &s in buffer.samples() {
            writer.write_sample(s.clamp(-1.0, 1.0))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_round_trip() {
        let buf = AudioBuffer::new(2, vec![0.5, -0.5, 0.25, -0.25]);
        let bytes = encode(&buf, 48_000).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.sample_rate, 48_000);
        assert_eq!(decoded.buffer.channels(), 2);
        assert_eq!(decoded.buffer.samples(), buf.samples());
    }

    #[test]
    fn int16_input_is_scaled() {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            writer.write_sample(i16::MAX).unwrap();
            writer.write_sample(0i16).unwrap();
            writer.write_sample(i16::MIN).unwrap();
            writer.finalize().unwrap();
        }
        let decoded = decode(&cursor.into_inner()).unwrap();
        let s = decoded.buffer.samples();
        assert!((s[0] - (i16::MAX as f32 / 32768.0)).abs() < 1e-6);
        assert_eq!(s[1], 0.0);
        assert!((s[2] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn encode_clamps_overshoot() {
        let buf = AudioBuffer::new(1, vec![1.5, -2.0]);
        let bytes = encode(&buf, 44_100).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.buffer.samples(), &[1.0, -1.0]);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode(b"definitely not a wav file").is_err());
    }
}
