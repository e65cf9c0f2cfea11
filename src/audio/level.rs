//! Frame loudness measurement.
//!
//! [`rms_level`] reduces one captured frame to a single normalized loudness
//! reading in `[0.0, 1.0]`.  Samples are normalized to `[-1.0, 1.0]` by the
//! maximum representable magnitude of `i16` (32 768) before squaring, so the
//! reading is independent of the capture bit depth.

/// Divisor that maps an `i16` sample onto `[-1.0, 1.0]`.
const I16_SCALE: f32 = 32_768.0;

/// Root-mean-square level of a frame, normalized to `[0.0, 1.0]`.
///
/// An empty or all-zero frame yields exactly `0.0` — the RMS of zeros is
/// zero, so there is no division hazard to guard against.
///
/// # Example
///
/// ```rust
/// use noise_sentry::audio::rms_level;
///
/// assert_eq!(rms_level(&[0; 480]), 0.0);
///
/// // A constant full-scale frame reads (almost) 1.0.
/// let loud = vec![i16::MAX; 480];
/// assert!((rms_level(&loud) - 1.0).abs() < 1e-3);
/// ```
pub fn rms_level(frame: &[i16]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let mean_sq: f32 = frame
        .iter()
        .map(|&s| {
            let x = f32::from(s) / I16_SCALE;
            x * x
        })
        .sum::<f32>()
        / frame.len() as f32;
    mean_sq.sqrt()
}

/// Percentage of `threshold` reached by `level`, capped at 100.
///
/// Used by the status line.  A non-positive threshold never divides: it
/// reads as 100% for any non-silent frame and 0% for silence.
pub fn percent_of_threshold(level: f32, threshold: f32) -> u32 {
    if threshold <= 0.0 {
        return if level > 0.0 { 100 } else { 0 };
    }
    ((level / threshold) * 100.0).min(100.0) as u32
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_reads_exactly_zero() {
        assert_eq!(rms_level(&[0; 1600]), 0.0);
        assert_eq!(rms_level(&[]), 0.0);
    }

    #[test]
    fn full_scale_reads_one() {
        let frame = vec![i16::MAX; 1600];
        assert!((rms_level(&frame) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn constant_amplitude_reads_its_magnitude() {
        // RMS of a constant signal equals its absolute amplitude.
        let frame = vec![16_384_i16; 1600]; // 0.5 full scale
        assert!((rms_level(&frame) - 0.5).abs() < 1e-4);
    }

    #[test]
    fn scaling_samples_scales_the_reading_linearly() {
        let frame: Vec<i16> = (0..1600)
            .map(|i| ((i % 100) * 300 - 15_000) as i16)
            .collect();
        let base = rms_level(&frame);

        for k in [0.25_f32, 0.5, 0.75] {
            let scaled: Vec<i16> = frame.iter().map(|&s| (f32::from(s) * k) as i16).collect();
            let reading = rms_level(&scaled);
            // Integer truncation introduces a little noise, hence the loose bound.
            assert!(
                (reading - base * k).abs() < 1e-3,
                "k={k}: {reading} vs {}",
                base * k
            );
        }
    }

    #[test]
    fn negative_full_scale_also_reads_one() {
        let frame = vec![i16::MIN; 1600];
        assert!((rms_level(&frame) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn percentage_is_capped_at_100() {
        assert_eq!(percent_of_threshold(0.5, 0.1), 100);
        assert_eq!(percent_of_threshold(0.05, 0.1), 50);
        assert_eq!(percent_of_threshold(0.0, 0.1), 0);
    }

    #[test]
    fn zero_threshold_never_divides() {
        assert_eq!(percent_of_threshold(0.0, 0.0), 0);
        assert_eq!(percent_of_threshold(0.3, 0.0), 100);
        assert_eq!(percent_of_threshold(0.3, -1.0), 100);
    }
}
