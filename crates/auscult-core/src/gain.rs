//! Volume/strength to device gain mapping
//!
//! Operator-facing volumes and auscultation strengths are both 0..=10.
//! The trigger device accepts gains from -70 to +10 dB, but anything below
//! about -30 is inaudible through the mannequin shell, so the calculated
//! range bottoms out at -40. -70 is reserved as the explicit "off" gain.

/// Loudest gain the device accepts.
pub const GAIN_MAX: i32 = 10;

/// Floor of the calculated gain range. Quieter settings map here, not to
/// the device floor, so a nonzero volume always remains faintly audible.
pub const GAIN_MIN: i32 = -40;

/// Device floor, used to silence a channel or track outright.
pub const GAIN_OFF: i32 = -70;

const GAIN_RANGE: i32 = GAIN_MAX - GAIN_MIN;

/// Map an operator volume and auscultation strength to a device gain.
///
/// Linear in `strength + volume` over `[GAIN_MIN, GAIN_MAX]`. The
/// intermediate truncating divisions are deliberate: boundary values
/// depend on them, and the calibrated sound set was tuned against this
/// exact mapping.
pub fn volume_to_gain(volume: i32, strength: i32) -> i32 {
    let s1 = (strength + volume) * 100;
    let g1 = s1 * GAIN_RANGE;
    let g2 = g1 / 2000;
    g2 + GAIN_MIN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_endpoints() {
        assert_eq!(volume_to_gain(0, 0), GAIN_MIN);
        assert_eq!(volume_to_gain(10, 10), GAIN_MAX);
    }

    #[test]
    fn test_gain_monotonic_and_bounded() {
        for s in 0..=10 {
            let mut prev = i32::MIN;
            for v in 0..=10 {
                let g = volume_to_gain(v, s);
                assert!(g >= prev, "not monotonic in volume at v={} s={}", v, s);
                assert!((GAIN_MIN..=GAIN_MAX).contains(&g));
                prev = g;
            }
        }
        for v in 0..=10 {
            let mut prev = i32::MIN;
            for s in 0..=10 {
                let g = volume_to_gain(v, s);
                assert!(g >= prev, "not monotonic in strength at v={} s={}", v, s);
                prev = g;
            }
        }
    }

    #[test]
    fn test_gain_truncates_toward_zero() {
        // (3+0)*100*50 = 15000, 15000/2000 = 7 (truncated), -40 + 7 = -33
        assert_eq!(volume_to_gain(3, 0), -33);
        // (1+0)*100*50 = 5000, 5000/2000 = 2 (truncated), -40 + 2 = -38
        assert_eq!(volume_to_gain(1, 0), -38);
    }
}
