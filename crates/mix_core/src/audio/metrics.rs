//! Level and stereo-field metrics.
//!
//! Pure functions over [`AudioBuffer`]. Decibel conversions return
//! `-inf` for silence rather than clamping to an arbitrary floor; the
//! diff layer and the JSON sanitizer know how to handle non-finite
//! values.

use super::buffer::AudioBuffer;

/// Convert a linear magnitude to decibels. Non-positive input maps to `-inf`.
pub fn linear_to_db(value: f64) -> f64 {
    if value <= 0.0 {
        f64::NEG_INFINITY
    } else {
        20.0 * value.log10()
    }
}

/// Convert decibels to a linear magnitude.
pub fn db_to_linear(db: f64) -> f64 {
    10.0f64.powf(db / 20.0)
}

/// Peak level in dBFS over all channels.
pub fn peak_dbfs(buf: &AudioBuffer) -> f64 {
    linear_to_db(buf.peak() as f64)
}

/// RMS level in dBFS over all interleaved samples.
pub fn rms_dbfs(buf: &AudioBuffer) -> f64 {
    let samples = buf.samples();
    if samples.is_empty() {
        return f64::NEG_INFINITY;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    linear_to_db((sum_sq / samples.len() as f64).sqrt())
}

/// Crest factor (peak minus RMS) in dB. Zero for silent buffers.
pub fn crest_factor_db(buf: &AudioBuffer) -> f64 {
    let peak = peak_dbfs(buf);
    let rms = rms_dbfs(buf);
    if peak.is_finite() && rms.is_finite() {
        peak - rms
    } else {
        0.0
    }
}

/// Mean sample value per channel (DC offset), linear.
pub fn dc_offset_per_channel(buf: &AudioBuffer) -> Vec<f64> {
    let frames = buf.frames();
    if frames == 0 {
        return vec![0.0; buf.channels() as usize];
    }
    (0..buf.channels() as usize)
        .map(|ch| buf.channel_iter(ch).map(|s| s as f64).sum::<f64>() / frames as f64)
        .collect()
}

/// Pearson correlation between the two channels of a stereo buffer.
///
/// `+1.0` is a dual-mono signal, `0.0` uncorrelated, `-1.0` out of phase.
/// Mono or silent buffers report `1.0` (nothing to disagree about).
pub fn stereo_correlation(buf: &AudioBuffer) -> f64 {
    if buf.channels() < 2 || buf.frames() == 0 {
        return 1.0;
    }
    let n = buf.frames() as f64;
    let (mut sum_l, mut sum_r, mut sum_ll, mut sum_rr, mut sum_lr) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for frame in buf.samples().chunks_exact(buf.channels() as usize) {
        let l = frame[0] as f64;
        let r = frame[1] as f64;
        sum_l += l;
        sum_r += r;
        sum_ll += l * l;
        sum_rr += r * r;
        sum_lr += l * r;
    }
    let cov = sum_lr - sum_l * sum_r / n;
    let var_l = sum_ll - sum_l * sum_l / n;
    let var_r = sum_rr - sum_r * sum_r / n;
    let denom = (var_l * var_r).sqrt();
    if denom <= 0.0 {
        1.0
    } else {
        (cov / denom).clamp(-1.0, 1.0)
    }
}

/// Absolute RMS level difference between left and right channels, in dB.
///
/// Zero for mono buffers. A large value flags a lopsided mix.
pub fn channel_loudness_diff_db(buf: &AudioBuffer) -> f64 {
    if buf.channels() < 2 {
        return 0.0;
    }
    let rms_of = |ch: usize| -> f64 {
        let frames = buf.frames();
        if frames == 0 {
            return f64::NEG_INFINITY;
        }
        let sum_sq: f64 = buf.channel_iter(ch).map(|s| (s as f64) * (s as f64)).sum();
        linear_to_db((sum_sq / frames as f64).sqrt())
    };
    let l = rms_of(0);
    let r = rms_of(1);
    if l.is_finite() && r.is_finite() {
        (l - r).abs()
    } else if l == r {
        0.0
    } else {
        f64::INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frames: usize, amplitude: f32) -> Vec<f32> {
        (0..frames)
            .map(|i| amplitude * (i as f32 * 0.1).sin())
            .collect()
    }

    #[test]
    fn db_round_trip() {
        let db = linear_to_db(0.5);
        assert!((db_to_linear(db) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn silence_is_neg_infinity() {
        let buf = AudioBuffer::silent(2, 128);
        assert_eq!(peak_dbfs(&buf), f64::NEG_INFINITY);
        assert_eq!(rms_dbfs(&buf), f64::NEG_INFINITY);
    }

    #[test]
    fn full_scale_square_is_zero_dbfs() {
        let buf = AudioBuffer::new(1, vec![1.0, -1.0, 1.0, -1.0]);
        assert!(peak_dbfs(&buf).abs() < 1e-9);
        assert!(rms_dbfs(&buf).abs() < 1e-9);
    }

    #[test]
    fn dc_offset_measured_per_channel() {
        let mut samples = Vec::new();
        for _ in 0..100 {
            samples.push(0.25f32); // left has +0.25 DC
            samples.push(0.0f32);
        }
        let buf = AudioBuffer::new(2, samples);
        let dc = dc_offset_per_channel(&buf);
        assert!((dc[0] - 0.25).abs() < 1e-6);
        assert!(dc[1].abs() < 1e-9);
    }

    #[test]
    fn dual_mono_correlates_fully() {
        let mono = sine(512, 0.8);
        let buf = AudioBuffer::from_planes(&[mono.clone(), mono]).to_stereo();
        assert!((stereo_correlation(&buf) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn out_of_phase_correlates_negatively() {
        let mono = sine(512, 0.8);
        let inverted: Vec<f32> = mono.iter().map(|s| -s).collect();
        let buf = AudioBuffer::from_planes(&[mono, inverted]);
        assert!((stereo_correlation(&buf) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn channel_diff_detects_lopsided_mix() {
        let loud = sine(512, 0.8);
        let quiet = sine(512, 0.4);
        let buf = AudioBuffer::from_planes(&[loud, quiet]);
        let diff = channel_loudness_diff_db(&buf);
        assert!((diff - 6.02).abs() < 0.1, "expected ~6 dB, got {diff}");
    }
}
