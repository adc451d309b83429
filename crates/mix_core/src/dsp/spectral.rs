//! Spectral estimation leaves: band balance, musical key, tempo.
//!
//! All estimators work on a mono fold of the input and are deliberately
//! lightweight: they feed stage decisions and report metadata, not
//! musicological ground truth.

use rustfft::{num_complex::Complex, FftPlanner};

use crate::audio::{linear_to_db, AudioBuffer};

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

// Krumhansl-Schmuckler key profiles.
const MAJOR_PROFILE: [f64; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];
const MINOR_PROFILE: [f64; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

/// Hann window of length `n`.
fn hann(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / (n - 1) as f64).cos()))
        .collect()
}

/// Averaged magnitude spectrum over Hann-windowed frames.
///
/// Returns `(magnitudes, bin_hz)` with `magnitudes.len() == window / 2`.
fn mean_magnitude_spectrum(mono: &[f32], sample_rate: u32, window: usize, hop: usize) -> (Vec<f64>, f64) {
    let bin_hz = sample_rate as f64 / window as f64;
    if mono.len() < window {
        return (vec![0.0; window / 2], bin_hz);
    }

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(window);
    let win = hann(window);

    let mut mags = vec![0.0f64; window / 2];
    let mut frames = 0usize;
    let mut start = 0usize;
    let mut buf: Vec<Complex<f64>> = vec![Complex::new(0.0, 0.0); window];

    while start + window <= mono.len() {
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = Complex::new(mono[start + i] as f64 * win[i], 0.0);
        }
        fft.process(&mut buf);
        for (i, mag) in mags.iter_mut().enumerate() {
            *mag += buf[i].norm();
        }
        frames += 1;
        start += hop;
    }

    if frames > 0 {
        for mag in &mut mags {
            *mag /= frames as f64;
        }
    }
    (mags, bin_hz)
}

/// Relative energy split across low / mid / high bands.
#[derive(Debug, Clone, Copy)]
pub struct BandEnergies {
    /// Energy below 250 Hz, in dB relative to full scale magnitude.
    pub low_db: f64,
    /// Energy between 250 Hz and 4 kHz.
    pub mid_db: f64,
    /// Energy above 4 kHz.
    pub high_db: f64,
    /// Spectral tilt, `high_db - low_db`. Negative means a dark mix.
    pub tilt_db: f64,
}

/// Measure the low/mid/high band balance of a buffer.
pub fn band_energies(buf: &AudioBuffer, sample_rate: u32) -> BandEnergies {
    let mono = buf.to_mono();
    let (mags, bin_hz) = mean_magnitude_spectrum(&mono, sample_rate, 4096, 2048);

    let (mut low, mut mid, mut high) = (0.0f64, 0.0f64, 0.0f64);
    for (i, &m) in mags.iter().enumerate().skip(1) {
        let freq = i as f64 * bin_hz;
        let energy = m * m;
        if freq < 250.0 {
            low += energy;
        } else if freq < 4_000.0 {
            mid += energy;
        } else {
            high += energy;
        }
    }

    let low_db = linear_to_db(low.sqrt());
    let mid_db = linear_to_db(mid.sqrt());
    let high_db = linear_to_db(high.sqrt());
    let tilt_db = if low_db.is_finite() && high_db.is_finite() {
        high_db - low_db
    } else {
        0.0
    };

    BandEnergies {
        low_db,
        mid_db,
        high_db,
        tilt_db,
    }
}

/// Result of key estimation.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyEstimate {
    /// Tonic note name, e.g. `"A"`.
    pub key: String,
    /// `"major"` or `"minor"`.
    pub scale: String,
    /// Profile correlation of the winning candidate, 0..1-ish.
    pub confidence: f64,
}

fn pearson(a: &[f64; 12], b: &[f64; 12]) -> f64 {
    let mean_a = a.iter().sum::<f64>() / 12.0;
    let mean_b = b.iter().sum::<f64>() / 12.0;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..12 {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    let denom = (var_a * var_b).sqrt();
    if denom <= 0.0 {
        0.0
    } else {
        cov / denom
    }
}

/// Estimate the musical key of a buffer via chromagram profile matching.
///
/// Returns `None` for material with no tonal content (silence, pure noise
/// short enough that no chroma bin dominates).
pub fn detect_key(buf: &AudioBuffer, sample_rate: u32) -> Option<KeyEstimate> {
    let mono = buf.to_mono();
    let (mags, bin_hz) = mean_magnitude_spectrum(&mono, sample_rate, 4096, 2048);

    let mut chroma = [0.0f64; 12];
    for (i, &m) in mags.iter().enumerate().skip(1) {
        let freq = i as f64 * bin_hz;
        if !(55.0..=2_000.0).contains(&freq) {
            continue;
        }
        let midi = 69.0 + 12.0 * (freq / 440.0).log2();
        let pc = ((midi.round() as i64 % 12) + 12) as usize % 12;
        // MIDI 60 is C4; fold onto a C-rooted chroma index.
        chroma[pc] += m;
    }

    let total: f64 = chroma.iter().sum();
    if total <= 1e-9 {
        return None;
    }
    for c in &mut chroma {
        *c /= total;
    }

    let mut best: Option<(f64, usize, &str)> = None;
    for rotation in 0..12 {
        let mut rotated = [0.0f64; 12];
        for (i, slot) in rotated.iter_mut().enumerate() {
            *slot = chroma[(i + rotation) % 12];
        }
        for (profile, scale) in [(&MAJOR_PROFILE, "major"), (&MINOR_PROFILE, "minor")] {
            let score = pearson(&rotated, profile);
            if best.map_or(true, |(s, _, _)| score > s) {
                best = Some((score, rotation, scale));
            }
        }
    }

    let (confidence, rotation, scale) = best?;
    // MIDI pitch class 0 is C; rotation r means the tonic sits r semitones
    // above C.
    Some(KeyEstimate {
        key: NOTE_NAMES[rotation].to_string(),
        scale: scale.to_string(),
        confidence,
    })
}

/// Estimate tempo from the autocorrelation of the onset-energy envelope.
///
/// Searches 60-200 BPM; returns `None` when the input is too short or has
/// no periodic energy structure.
pub fn estimate_tempo_bpm(buf: &AudioBuffer, sample_rate: u32) -> Option<f64> {
    const HOP: usize = 512;
    const WINDOW: usize = 1024;

    let mono = buf.to_mono();
    if mono.len() < WINDOW * 8 || sample_rate == 0 {
        return None;
    }

    // Onset envelope: positive energy flux between consecutive frames.
    let mut energies = Vec::with_capacity(mono.len() / HOP);
    let mut start = 0;
    while start + WINDOW <= mono.len() {
        let e: f64 = mono[start..start + WINDOW]
            .iter()
            .map(|&s| (s as f64) * (s as f64))
            .sum();
        energies.push(e);
        start += HOP;
    }
    let flux: Vec<f64> = energies
        .windows(2)
        .map(|w| (w[1] - w[0]).max(0.0))
        .collect();
    if flux.len() < 16 {
        return None;
    }

    let frame_rate = sample_rate as f64 / HOP as f64;
    let min_lag = ((60.0 / 200.0) * frame_rate).floor().max(1.0) as usize;
    let max_lag = ((60.0 / 60.0) * frame_rate).ceil() as usize;
    if max_lag >= flux.len() {
        return None;
    }

    let mean = flux.iter().sum::<f64>() / flux.len() as f64;
    let centered: Vec<f64> = flux.iter().map(|&f| f - mean).collect();

    let mut best_lag = 0usize;
    let mut best_score = 0.0f64;
    for lag in min_lag..=max_lag {
        let mut score = 0.0;
        for i in lag..centered.len() {
            score += centered[i] * centered[i - lag];
        }
        if score > best_score {
            best_score = score;
            best_lag = lag;
        }
    }

    if best_lag == 0 || best_score <= 0.0 {
        return None;
    }
    Some(60.0 * frame_rate / best_lag as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freqs: &[f64], seconds: f64, rate: u32) -> AudioBuffer {
        let frames = (seconds * rate as f64) as usize;
        let samples: Vec<f32> = (0..frames)
            .map(|i| {
                freqs
                    .iter()
                    .map(|f| {
                        (2.0 * std::f64::consts::PI * f * i as f64 / rate as f64).sin() as f32
                    })
                    .sum::<f32>()
                    / freqs.len() as f32
            })
            .collect();
        AudioBuffer::new(1, samples)
    }

    #[test]
    fn a_minor_triad_detects_a_root() {
        // A3, C4, E4.
        let buf = tone(&[220.0, 261.63, 329.63], 2.0, 44_100);
        let estimate = detect_key(&buf, 44_100).unwrap();
        assert_eq!(estimate.key, "A");
        assert!(estimate.confidence > 0.3);
    }

    #[test]
    fn c_major_triad_detects_c_major() {
        // C4, E4, G4.
        let buf = tone(&[261.63, 329.63, 392.0], 2.0, 44_100);
        let estimate = detect_key(&buf, 44_100).unwrap();
        assert_eq!(estimate.key, "C");
        assert_eq!(estimate.scale, "major");
    }

    #[test]
    fn silence_has_no_key() {
        let buf = AudioBuffer::silent(1, 44_100);
        assert!(detect_key(&buf, 44_100).is_none());
    }

    #[test]
    fn click_track_tempo_is_recovered() {
        let rate = 44_100u32;
        let bpm = 120.0;
        let frames = rate as usize * 8;
        let mut samples = vec![0.0f32; frames];
        let period = (60.0 / bpm * rate as f64) as usize;
        let mut pos = 0;
        while pos < frames {
            for i in 0..2_000.min(frames - pos) {
                samples[pos + i] = 0.9 * (1.0 - i as f32 / 2_000.0);
            }
            pos += period;
        }
        let buf = AudioBuffer::new(1, samples);
        let tempo = estimate_tempo_bpm(&buf, rate).unwrap();
        assert!((tempo - bpm).abs() < 6.0, "estimated {tempo}");
    }

    #[test]
    fn too_short_input_reports_none() {
        let buf = AudioBuffer::silent(1, 1_024);
        assert!(estimate_tempo_bpm(&buf, 44_100).is_none());
    }

    #[test]
    fn band_energies_flag_dark_material() {
        let low = tone(&[80.0], 1.0, 44_100);
        let bands = band_energies(&low, 44_100);
        assert!(bands.tilt_db < -10.0);
    }
}
