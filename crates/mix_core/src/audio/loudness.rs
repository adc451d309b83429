//! BS.1770-style loudness metering.
//!
//! Integrated loudness and loudness range with K-weighting and EBU R128
//! gating, plus an oversampled true-peak estimate. This is the metering
//! leaf behind the loudness stages and the final report metrics; it aims
//! for fidelity to the gating structure rather than certified compliance.

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type};

use super::buffer::AudioBuffer;

/// K-weighting stage 1: high-shelf boost modelling head diffraction.
const SHELF_HZ: f32 = 1681.97;
const SHELF_GAIN_DB: f32 = 3.99984;
const SHELF_Q: f32 = 0.7071752;

/// K-weighting stage 2: revised low-frequency B-curve high-pass.
const HIGHPASS_HZ: f32 = 38.13547;
const HIGHPASS_Q: f32 = 0.5003271;

const ABSOLUTE_GATE_LUFS: f64 = -70.0;
const RELATIVE_GATE_LU: f64 = -10.0;
const LRA_RELATIVE_GATE_LU: f64 = -20.0;

/// Apply the two-stage K-weighting filter to one channel.
fn k_weight(channel: &[f32], sample_rate: u32) -> Vec<f32> {
    let fs = (sample_rate as f32).hz();
    let shelf = Coefficients::<f32>::from_params(
        Type::HighShelf(SHELF_GAIN_DB),
        fs,
        SHELF_HZ.hz(),
        SHELF_Q,
    );
    let highpass = Coefficients::<f32>::from_params(Type::HighPass, fs, HIGHPASS_HZ.hz(), HIGHPASS_Q);

    let (Ok(shelf), Ok(highpass)) = (shelf, highpass) else {
        // Sample rate below the filter corner; weighting degenerates to unity.
        return channel.to_vec();
    };

    let mut f1 = DirectForm2Transposed::<f32>::new(shelf);
    let mut f2 = DirectForm2Transposed::<f32>::new(highpass);
    channel.iter().map(|&s| f2.run(f1.run(s))).collect()
}

/// Mean-square power of weighted channels over `[start, end)` frames.
fn block_power(weighted: &[Vec<f32>], start: usize, end: usize) -> f64 {
    let len = (end - start) as f64;
    weighted
        .iter()
        .map(|ch| {
            ch[start..end]
                .iter()
                .map(|&s| (s as f64) * (s as f64))
                .sum::<f64>()
                / len
        })
        .sum()
}

fn power_to_lufs(power: f64) -> f64 {
    if power <= 0.0 {
        f64::NEG_INFINITY
    } else {
        -0.691 + 10.0 * power.log10()
    }
}

/// Windowed block loudness values (LUFS), one per hop.
fn block_loudness(buf: &AudioBuffer, sample_rate: u32, window_s: f64, hop_s: f64) -> Vec<f64> {
    if buf.is_empty() || sample_rate == 0 {
        return Vec::new();
    }
    let weighted: Vec<Vec<f32>> = (0..buf.channels() as usize)
        .map(|ch| k_weight(&buf.channel(ch), sample_rate))
        .collect();

    let frames = buf.frames();
    let window = ((window_s * sample_rate as f64) as usize).max(1);
    let hop = ((hop_s * sample_rate as f64) as usize).max(1);

    if frames < window {
        // Shorter than one gating block: measure what we have.
        return vec![power_to_lufs(block_power(&weighted, 0, frames))];
    }

    let mut blocks = Vec::new();
    let mut start = 0;
    while start + window <= frames {
        blocks.push(power_to_lufs(block_power(&weighted, start, start + window)));
        start += hop;
    }
    blocks
}

/// Integrated loudness in LUFS with absolute and relative gating.
///
/// Returns `-inf` for silence (no block passes the absolute gate).
pub fn integrated_lufs(buf: &AudioBuffer, sample_rate: u32) -> f64 {
    let blocks = block_loudness(buf, sample_rate, 0.4, 0.1);

    let above_abs: Vec<f64> = blocks
        .iter()
        .copied()
        .filter(|&l| l > ABSOLUTE_GATE_LUFS)
        .collect();
    if above_abs.is_empty() {
        return f64::NEG_INFINITY;
    }

    // Gates operate on power means, not LUFS means.
    let mean_power = |ls: &[f64]| -> f64 {
        ls.iter()
            .map(|&l| 10.0f64.powf((l + 0.691) / 10.0))
            .sum::<f64>()
            / ls.len() as f64
    };

    let relative_gate = power_to_lufs(mean_power(&above_abs)) + RELATIVE_GATE_LU;
    let gated: Vec<f64> = above_abs
        .into_iter()
        .filter(|&l| l > relative_gate)
        .collect();
    if gated.is_empty() {
        return f64::NEG_INFINITY;
    }
    power_to_lufs(mean_power(&gated))
}

/// Loudness range (LRA) in LU from gated short-term loudness percentiles.
pub fn loudness_range_lu(buf: &AudioBuffer, sample_rate: u32) -> f64 {
    let blocks = block_loudness(buf, sample_rate, 3.0, 1.0);

    let above_abs: Vec<f64> = blocks
        .iter()
        .copied()
        .filter(|&l| l > ABSOLUTE_GATE_LUFS)
        .collect();
    if above_abs.is_empty() {
        return 0.0;
    }
    let mean_power = above_abs
        .iter()
        .map(|&l| 10.0f64.powf((l + 0.691) / 10.0))
        .sum::<f64>()
        / above_abs.len() as f64;
    let gate = power_to_lufs(mean_power) + LRA_RELATIVE_GATE_LU;

    let mut gated: Vec<f64> = above_abs.into_iter().filter(|&l| l > gate).collect();
    if gated.len() < 2 {
        return 0.0;
    }
    gated.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let percentile = |p: f64| -> f64 {
        let idx = (p * (gated.len() - 1) as f64).round() as usize;
        gated[idx]
    };
    percentile(0.95) - percentile(0.10)
}

/// True peak in dBTP via 4x polyphase windowed-sinc oversampling.
///
/// Matches the common meter topology: inter-sample peaks show up above the
/// plain sample peak on anything that is not already band-limited well
/// below Nyquist.
pub fn true_peak_dbfs(buf: &AudioBuffer) -> f64 {
    const FACTOR: usize = 4;
    const TAPS_PER_PHASE: usize = 12;

    if buf.is_empty() {
        return f64::NEG_INFINITY;
    }

    // Hann-windowed sinc, cutoff at the original Nyquist.
    let total_taps = FACTOR * TAPS_PER_PHASE;
    let mid = (total_taps - 1) as f64 / 2.0;
    let kernel: Vec<f64> = (0..total_taps)
        .map(|i| {
            let x = (i as f64 - mid) / FACTOR as f64;
            let sinc = if x.abs() < 1e-12 {
                1.0
            } else {
                (std::f64::consts::PI * x).sin() / (std::f64::consts::PI * x)
            };
            let window = 0.5
                * (1.0
                    - (2.0 * std::f64::consts::PI * i as f64 / (total_taps - 1) as f64).cos());
            sinc * window
        })
        .collect();

    let mut peak = 0.0f64;
    for ch in 0..buf.channels() as usize {
        let samples: Vec<f64> = buf.channel_iter(ch).map(|s| s as f64).collect();
        for frame in 0..samples.len() {
            for phase in 0..FACTOR {
                let mut acc = 0.0f64;
                for tap in 0..TAPS_PER_PHASE {
                    let k = phase + tap * FACTOR;
                    let idx = frame as isize + tap as isize - (TAPS_PER_PHASE / 2) as isize;
                    if idx >= 0 && (idx as usize) < samples.len() {
                        acc += samples[idx as usize] * kernel[k];
                    }
                }
                peak = peak.max(acc.abs());
            }
        }
        // The direct sample peak is a lower bound the interpolation
        // must never undercut.
        peak = peak.max(samples.iter().fold(0.0f64, |m, &s| m.max(s.abs())));
    }

    super::metrics::linear_to_db(peak)
}
