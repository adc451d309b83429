//! Biquad filter wrappers operating on interleaved buffers.
//!
//! Each function filters every channel independently with its own filter
//! state and rewrites the buffer in place. Cutoffs at or beyond Nyquist
//! leave the signal untouched rather than erroring; the calling stage
//! already validated its parameters against the contract limits.

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type, Q_BUTTERWORTH_F32};

use crate::audio::AudioBuffer;

fn run_per_channel(buf: &mut AudioBuffer, sample_rate: u32, filter_type: Type<f32>, cutoff_hz: f64, q: f32) {
    if cutoff_hz <= 0.0 || cutoff_hz >= sample_rate as f64 / 2.0 {
        return;
    }
    let coeffs = match Coefficients::<f32>::from_params(
        filter_type,
        (sample_rate as f32).hz(),
        (cutoff_hz as f32).hz(),
        q,
    ) {
        Ok(c) => c,
        Err(_) => return,
    };

    let channels = buf.channels() as usize;
    let mut states: Vec<DirectForm2Transposed<f32>> = (0..channels)
        .map(|_| DirectForm2Transposed::<f32>::new(coeffs))
        .collect();

    for frame in buf.samples_mut().chunks_exact_mut(channels) {
        for (ch, s) in frame.iter_mut().enumerate() {
            *s = states[ch].run(*s);
        }
    }
}

/// 2nd-order Butterworth high-pass.
pub fn high_pass(buf: &mut AudioBuffer, sample_rate: u32, cutoff_hz: f64) {
    run_per_channel(buf, sample_rate, Type::HighPass, cutoff_hz, Q_BUTTERWORTH_F32);
}

/// 2nd-order Butterworth low-pass.
pub fn low_pass(buf: &mut AudioBuffer, sample_rate: u32, cutoff_hz: f64) {
    run_per_channel(buf, sample_rate, Type::LowPass, cutoff_hz, Q_BUTTERWORTH_F32);
}

/// Low shelf with the given gain.
pub fn low_shelf(buf: &mut AudioBuffer, sample_rate: u32, corner_hz: f64, gain_db: f64) {
    run_per_channel(
        buf,
        sample_rate,
        Type::LowShelf(gain_db as f32),
        corner_hz,
        Q_BUTTERWORTH_F32,
    );
}

/// High shelf with the given gain.
pub fn high_shelf(buf: &mut AudioBuffer, sample_rate: u32, corner_hz: f64, gain_db: f64) {
    run_per_channel(
        buf,
        sample_rate,
        Type::HighShelf(gain_db as f32),
        corner_hz,
        Q_BUTTERWORTH_F32,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::rms_dbfs;

    fn sine(freq: f64, rate: u32, seconds: f64) -> AudioBuffer {
        let frames = (rate as f64 * seconds) as usize;
        AudioBuffer::new(
            1,
            (0..frames)
                .map(|i| {
                    0.5 * (2.0 * std::f64::consts::PI * freq * i as f64 / rate as f64).sin() as f32
                })
                .collect(),
        )
    }

    #[test]
    fn high_pass_attenuates_low_content() {
        let mut low = sine(50.0, 48_000, 0.5);
        let before = rms_dbfs(&low);
        high_pass(&mut low, 48_000, 400.0);
        assert!(rms_dbfs(&low) < before - 20.0);
    }

    #[test]
    fn high_pass_passes_high_content() {
        let mut high = sine(4_000.0, 48_000, 0.5);
        let before = rms_dbfs(&high);
        high_pass(&mut high, 48_000, 400.0);
        assert!((rms_dbfs(&high) - before).abs() < 1.0);
    }

    #[test]
    fn nyquist_cutoff_is_a_no_op() {
        let mut buf = sine(1_000.0, 48_000, 0.1);
        let original = buf.clone();
        low_pass(&mut buf, 48_000, 24_000.0);
        assert_eq!(buf, original);
    }

    #[test]
    fn shelf_boosts_band() {
        let mut low = sine(80.0, 48_000, 0.5);
        let before = rms_dbfs(&low);
        low_shelf(&mut low, 48_000, 300.0, 6.0);
        let gained = rms_dbfs(&low) - before;
        assert!(gained > 4.0 && gained < 8.0, "shelf gain {gained}");
    }
}
