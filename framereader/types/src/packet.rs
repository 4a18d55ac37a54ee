/*!
    Encoded packet type.
*/

use crate::{MediaDuration, Pts, Rational};

/**
    An encoded video packet.

    Contains compressed data from a single stream, with timing information.
    Packets are the unit of data between demuxer and decoder, or between
    encoder and sink.
*/
#[derive(Clone, Debug)]
pub struct Packet {
    /// Compressed data.
    pub data: Vec<u8>,
    /// Presentation timestamp (when to display).
    pub pts: Option<Pts>,
    /// Decode timestamp (differs from PTS when pictures are reordered).
    pub dts: Option<Pts>,
    /// Duration of this packet's content.
    pub duration: MediaDuration,
    /// Time base for interpreting timestamps.
    pub time_base: Rational,
    /// Whether this is a keyframe (can be decoded independently).
    pub is_keyframe: bool,
}

impl Packet {
    /**
        Create a new packet.
    */
    pub fn new(
        data: Vec<u8>,
        pts: Option<Pts>,
        dts: Option<Pts>,
        duration: MediaDuration,
        time_base: Rational,
        is_keyframe: bool,
    ) -> Self {
        Self {
            data,
            pts,
            dts,
            duration,
            time_base,
            is_keyframe,
        }
    }

    /**
        Returns the presentation time as a Duration, if PTS is set.
    */
    pub fn presentation_time(&self) -> Option<std::time::Duration> {
        self.pts.map(|pts| pts.to_duration(self.time_base))
    }

    /**
        Returns the presentation timestamp in microseconds, if PTS is set.
    */
    pub fn timestamp_micros(&self) -> Option<i64> {
        self.pts.map(|pts| pts.to_micros(self.time_base))
    }

    /**
        Returns a copy of this packet with its timestamps moved into `time_base`.
    */
    pub fn rescaled(&self, time_base: Rational) -> Self {
        let rescale = |pts: Pts| Pts(Rational::rescale(pts.0, self.time_base, time_base));
        Self {
            data: self.data.clone(),
            pts: self.pts.map(rescale),
            dts: self.dts.map(rescale),
            duration: MediaDuration(Rational::rescale(
                self.duration.0,
                self.time_base,
                time_base,
            )),
            time_base,
            is_keyframe: self.is_keyframe,
        }
    }
}

// Ensure Packet is Send + Sync
static_assertions::assert_impl_all!(Packet: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const TB_1_1000: Rational = Rational { num: 1, den: 1000 };
    const TB_1_90000: Rational = Rational { num: 1, den: 90000 };

    #[test]
    fn packet_presentation_time() {
        let packet = Packet::new(
            vec![],
            Some(Pts(1500)),
            None,
            MediaDuration(0),
            TB_1_1000,
            false,
        );
        assert_eq!(
            packet.presentation_time(),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(packet.timestamp_micros(), Some(1_500_000));
    }

    #[test]
    fn packet_rescale() {
        let packet = Packet::new(
            vec![1, 2, 3],
            Some(Pts(40)),
            Some(Pts(0)),
            MediaDuration(40),
            TB_1_1000,
            true,
        );
        let moved = packet.rescaled(TB_1_90000);
        assert_eq!(moved.pts, Some(Pts(3600)));
        assert_eq!(moved.dts, Some(Pts(0)));
        assert_eq!(moved.duration, MediaDuration(3600));
        assert_eq!(moved.data, packet.data);
        assert!(moved.is_keyframe);
    }
}
