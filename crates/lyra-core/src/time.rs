//! Media time helpers.
//!
//! All media positions are signed microseconds. Two sentinels sit at the very
//! bottom of the range so that they never collide with a real position.

/// Position or duration is not known.
pub const TIME_UNSET: i64 = i64::MIN + 1;

/// Loading has reached the end of the source.
pub const TIME_END_OF_SOURCE: i64 = i64::MIN;

pub const MICROS_PER_MILLI: i64 = 1_000;
pub const MICROS_PER_SECOND: i64 = 1_000_000;

/// Convert milliseconds to microseconds, preserving sentinels.
pub fn ms_to_us(ms: i64) -> i64 {
    if ms == TIME_UNSET || ms == TIME_END_OF_SOURCE {
        ms
    } else {
        ms.saturating_mul(MICROS_PER_MILLI)
    }
}

/// Convert microseconds to milliseconds, preserving sentinels.
pub fn us_to_ms(us: i64) -> i64 {
    if us == TIME_UNSET || us == TIME_END_OF_SOURCE {
        us
    } else {
        us / MICROS_PER_MILLI
    }
}

/// `Some(us)` unless `us` is one of the sentinels.
pub fn known(us: i64) -> Option<i64> {
    (us != TIME_UNSET && us != TIME_END_OF_SOURCE).then_some(us)
}

/// Media duration that plays out in `playout_us` at `speed`.
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    reason = "speed-scaled durations stay far inside i64 range"
)]
pub fn media_duration_for_playout_duration(playout_us: i64, speed: f32) -> i64 {
    if speed == 1.0 {
        return playout_us;
    }
    (playout_us as f64 * f64::from(speed)).round() as i64
}

/// Playout duration of `media_us` of media at `speed`.
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    reason = "speed-scaled durations stay far inside i64 range"
)]
pub fn playout_duration_for_media_duration(media_us: i64, speed: f32) -> i64 {
    if speed == 1.0 || speed <= 0.0 {
        return media_us;
    }
    (media_us as f64 / f64::from(speed)).round() as i64
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(1_500, 1_500_000)]
    #[case(0, 0)]
    #[case(TIME_UNSET, TIME_UNSET)]
    #[case(TIME_END_OF_SOURCE, TIME_END_OF_SOURCE)]
    fn ms_to_us_keeps_sentinels(#[case] ms: i64, #[case] us: i64) {
        assert_eq!(ms_to_us(ms), us);
    }

    #[rstest]
    #[case(2_000_000, 2.0, 4_000_000)]
    #[case(2_000_000, 1.0, 2_000_000)]
    #[case(2_000_000, 0.5, 1_000_000)]
    fn media_duration_scales_with_speed(#[case] playout: i64, #[case] speed: f32, #[case] media: i64) {
        assert_eq!(media_duration_for_playout_duration(playout, speed), media);
        assert_eq!(playout_duration_for_media_duration(media, speed), playout);
    }

    #[test]
    fn known_filters_sentinels() {
        assert_eq!(known(5), Some(5));
        assert_eq!(known(TIME_UNSET), None);
        assert_eq!(known(TIME_END_OF_SOURCE), None);
    }
}
