/*!
    Timestamp types for media timing.

    Streams carry timestamps in their own time base. Everything handed to
    callers (frame timestamps, seek targets) is expressed in the global
    time base, [`TIME_BASE_US`], i.e. microseconds.
*/

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Rational;

/**
    The global time base used for frame timestamps and seek targets.
*/
pub const TIME_BASE_US: Rational = Rational {
    num: 1,
    den: 1_000_000,
};

/**
    Presentation timestamp in time_base units.

    This is the raw timestamp value from the media stream. To convert to
    a meaningful duration, you need the stream's time base.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pts(pub i64);

impl Pts {
    /**
        Convert this PTS to a Duration using the given time base.

        Negative PTS values are clamped to zero.
    */
    #[inline]
    pub fn to_duration(self, time_base: Rational) -> Duration {
        if self.0 <= 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.to_micros(time_base).max(0) as u64)
    }

    /**
        Convert this PTS to microseconds in the global time base.
    */
    #[inline]
    pub fn to_micros(self, time_base: Rational) -> i64 {
        Rational::rescale(self.0, time_base, TIME_BASE_US)
    }

    /**
        Create a PTS in `time_base` units from a global microsecond timestamp.
    */
    #[inline]
    pub fn from_micros(micros: i64, time_base: Rational) -> Self {
        Self(Rational::rescale(micros, TIME_BASE_US, time_base))
    }
}

impl From<i64> for Pts {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Pts> for i64 {
    fn from(pts: Pts) -> Self {
        pts.0
    }
}

/**
    Duration in time_base units.

    Similar to Pts but semantically represents a duration rather than a point in time.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MediaDuration(pub i64);

impl MediaDuration {
    /**
        Convert this duration to a std Duration using the given time base.

        Negative values are clamped to zero.
    */
    #[inline]
    pub fn to_duration(self, time_base: Rational) -> Duration {
        if self.0 <= 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.to_micros(time_base).max(0) as u64)
    }

    /**
        Convert this duration to microseconds.
    */
    #[inline]
    pub fn to_micros(self, time_base: Rational) -> i64 {
        Rational::rescale(self.0, time_base, TIME_BASE_US)
    }
}

impl From<i64> for MediaDuration {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<MediaDuration> for i64 {
    fn from(duration: MediaDuration) -> Self {
        duration.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TB_1_1000: Rational = Rational { num: 1, den: 1000 };
    const TB_1_90000: Rational = Rational { num: 1, den: 90000 };

    #[test]
    fn pts_to_duration_milliseconds() {
        assert_eq!(Pts(1000).to_duration(TB_1_1000), Duration::from_secs(1));
    }

    #[test]
    fn pts_to_duration_mpeg_ts() {
        assert_eq!(Pts(90000).to_duration(TB_1_90000), Duration::from_secs(1));
    }

    #[test]
    fn pts_negative_clamps_to_zero() {
        assert_eq!(Pts(-100).to_duration(TB_1_1000), Duration::ZERO);
    }

    #[test]
    fn pts_micros_conversion() {
        assert_eq!(Pts(3600).to_micros(TB_1_90000), 40_000);
        assert_eq!(Pts::from_micros(40_000, TB_1_90000), Pts(3600));
    }

    #[test]
    fn negative_pts_keeps_sign_in_micros() {
        // Streams with edit lists may start before zero.
        assert_eq!(Pts(-90).to_micros(TB_1_90000), -1000);
    }

    #[test]
    fn media_duration_to_duration() {
        assert_eq!(MediaDuration(2000).to_duration(TB_1_1000), Duration::from_secs(2));
    }

    #[test]
    fn pts_ordering() {
        assert!(Pts(100) < Pts(200));
        assert_eq!(Pts(100), Pts(100));
    }
}
