//! Mid/side stereo-image stage ("vocal mix").
//!
//! One width control sweeps from side-only (centre removed, karaoke-like)
//! through the untouched signal at 0.5 to mid-only (mono, centre
//! emphasised) at 1.0.

/// Mid and side gains for a stereo width in `[0, 1]`.
#[inline]
pub fn mid_side_gains(width: f64) -> (f32, f32) {
    #[allow(clippy::cast_possible_truncation)]
    let w = width.clamp(0.0, 1.0) as f32;
    if w < 0.5 {
        (2.0 * w, 1.0)
    } else {
        (1.0, 2.0 - 2.0 * w)
    }
}

/// Apply the stereo-image transform to one frame.
#[inline]
pub fn process_frame(left: f32, right: f32, mid_gain: f32, side_gain: f32) -> (f32, f32) {
    let mid = (left + right) * 0.5;
    let side = (left - right) * 0.5;
    (
        mid_gain * mid + side_gain * side,
        mid_gain * mid - side_gain * side,
    )
}

/// Apply the transform in place to an interleaved stereo block.
///
/// Width 0.5 leaves the block untouched.
#[allow(clippy::float_cmp)]
pub fn apply(width: f64, block: &mut [f32]) {
    let (mid_gain, side_gain) = mid_side_gains(width);
    if mid_gain == 1.0 && side_gain == 1.0 {
        return;
    }
    for frame in block.chunks_exact_mut(2) {
        let (left, right) = process_frame(frame[0], frame[1], mid_gain, side_gain);
        frame[0] = left;
        frame[1] = right;
    }
}
