//! Harmonic color via soft saturation.

use crate::audio::{db_to_linear, AudioBuffer};

/// Apply tanh soft saturation in place.
///
/// `drive_db` boosts into the waveshaper; the output is normalized by the
/// shaper's response at the drive level so perceived loudness stays put
/// while harmonics build up. A drive of zero is an exact no-op.
pub fn saturate(buf: &mut AudioBuffer, drive_db: f64) {
    if drive_db <= 0.0 || buf.is_empty() {
        return;
    }
    let drive = db_to_linear(drive_db) as f32;
    let norm = drive.tanh();
    for s in buf.samples_mut() {
        *s = (*s * drive).tanh() / norm;
    }
}
