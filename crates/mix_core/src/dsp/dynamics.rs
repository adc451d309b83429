//! Dynamics processing: a feed-forward compressor and a lookahead limiter.

use crate::audio::{db_to_linear, linear_to_db, AudioBuffer};

/// Feed-forward compressor parameters.
#[derive(Debug, Clone)]
pub struct CompressorParams {
    /// Level above which gain reduction starts (dBFS).
    pub threshold_db: f64,
    /// Compression ratio (e.g. 4.0 for 4:1).
    pub ratio: f64,
    /// Envelope attack time in milliseconds.
    pub attack_ms: f64,
    /// Envelope release time in milliseconds.
    pub release_ms: f64,
    /// Fixed output gain applied after compression (dB).
    pub makeup_db: f64,
}

impl Default for CompressorParams {
    fn default() -> Self {
        Self {
            threshold_db: -18.0,
            ratio: 3.0,
            attack_ms: 10.0,
            release_ms: 120.0,
            makeup_db: 0.0,
        }
    }
}

fn envelope_coeff(time_ms: f64, sample_rate: u32) -> f64 {
    if time_ms <= 0.0 {
        return 0.0;
    }
    (-1.0 / (time_ms * 1e-3 * sample_rate as f64)).exp()
}

/// Compress the buffer in place.
///
/// Detection runs on the frame maximum across channels so stereo images
/// don't wander; the same gain is applied to every channel of a frame.
/// Returns the maximum gain reduction applied, in dB (>= 0).
pub fn compress(buf: &mut AudioBuffer, sample_rate: u32, params: &CompressorParams) -> f64 {
    if buf.is_empty() || params.ratio <= 1.0 {
        return 0.0;
    }

    let attack = envelope_coeff(params.attack_ms, sample_rate);
    let release = envelope_coeff(params.release_ms, sample_rate);
    let makeup = db_to_linear(params.makeup_db) as f32;
    let channels = buf.channels() as usize;

    let mut envelope = 0.0f64;
    let mut max_reduction_db = 0.0f64;

    for frame in buf.samples_mut().chunks_exact_mut(channels) {
        let peak = frame.iter().fold(0.0f64, |m, &s| m.max(s.abs() as f64));
        let coeff = if peak > envelope { attack } else { release };
        envelope = coeff * envelope + (1.0 - coeff) * peak;

        let level_db = linear_to_db(envelope);
        let over_db = level_db - params.threshold_db;
        let gain_db = if over_db > 0.0 {
            -over_db * (1.0 - 1.0 / params.ratio)
        } else {
            0.0
        };
        max_reduction_db = max_reduction_db.max(-gain_db);

        let gain = db_to_linear(gain_db) as f32 * makeup;
        for s in frame.iter_mut() {
            *s *= gain;
        }
    }

    max_reduction_db
}

/// Lookahead brickwall limiter parameters.
#[derive(Debug, Clone)]
pub struct LimiterParams {
    /// Output ceiling (dBFS); samples never exceed this after limiting.
    pub ceiling_db: f64,
    /// Lookahead window in milliseconds.
    pub lookahead_ms: f64,
    /// Gain recovery time in milliseconds.
    pub release_ms: f64,
}

impl Default for LimiterParams {
    fn default() -> Self {
        Self {
            ceiling_db: -1.0,
            lookahead_ms: 5.0,
            release_ms: 60.0,
        }
    }
}

/// Brickwall-limit the buffer in place.
///
/// The gain computer looks ahead over a sliding window so attacks are
/// caught before they cross the ceiling, then releases exponentially.
/// Returns the maximum gain reduction applied, in dB (>= 0).
pub fn limit(buf: &mut AudioBuffer, sample_rate: u32, params: &LimiterParams) -> f64 {
    if buf.is_empty() {
        return 0.0;
    }

    let ceiling = db_to_linear(params.ceiling_db);
    let channels = buf.channels() as usize;
    let frames = buf.frames();
    let lookahead = ((params.lookahead_ms * 1e-3 * sample_rate as f64) as usize).max(1);
    let release = envelope_coeff(params.release_ms, sample_rate);

    // Per-frame peak across channels.
    let peaks: Vec<f64> = buf
        .samples()
        .chunks_exact(channels)
        .map(|frame| frame.iter().fold(0.0f64, |m, &s| m.max(s.abs() as f64)))
        .collect();

    // Required gain so that every frame within the lookahead horizon stays
    // under the ceiling.
    let mut gain = 1.0f64;
    let mut max_reduction_db = 0.0f64;
    let samples = buf.samples_mut();

    for frame in 0..frames {
        let horizon_end = (frame + lookahead).min(frames);
        let mut window_peak = 0.0f64;
        for &p in &peaks[frame..horizon_end] {
            window_peak = window_peak.max(p);
        }

        let needed = if window_peak > ceiling {
            ceiling / window_peak
        } else {
            1.0
        };

        if needed < gain {
            gain = needed; // clamp instantly on attack
        } else {
            gain = release * gain + (1.0 - release) * needed;
        }
        max_reduction_db = max_reduction_db.max(-linear_to_db(gain));

        for ch in 0..channels {
            let idx = frame * channels + ch;
            samples[idx] = (samples[idx] as f64 * gain).clamp(-ceiling, ceiling) as f32;
        }
    }

    max_reduction_db.max(0.0)
}
