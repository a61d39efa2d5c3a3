//! Float to 16-bit PCM conversion

/// Convert one float sample to signed 16-bit PCM
///
/// Out-of-range input saturates to the full 16-bit range; in-range input is
/// scaled by 32767 and truncated toward zero. NaN maps to silence.
#[inline]
pub fn sample_to_i16(sample: f32) -> i16 {
    if sample < -1.0 {
        i16::MIN
    } else if sample > 1.0 {
        i16::MAX
    } else {
        (sample * 32767.0) as i16
    }
}

/// Convert `src` into the front of `dst`, stopping at the shorter of the two
#[inline]
pub fn convert_samples(src: &[f32], dst: &mut [i16]) {
    for (out, &sample) in dst.iter_mut().zip(src) {
        *out = sample_to_i16(sample);
    }
}
