/*!
    Codec identification.
*/

use serde::{Deserialize, Serialize};

/**
    Video codec identifiers.

    This is a subset of codecs commonly found in containers.
    Not all FFmpeg codecs are represented.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecId {
    /// H.264 / AVC
    H264,
    /// H.265 / HEVC
    H265,
    /// VP8
    Vp8,
    /// VP9
    Vp9,
    /// AV1
    Av1,
    /// MPEG-4 Part 2
    Mpeg4,
    /// MPEG-2 Video
    Mpeg2Video,
    /// Uncompressed video
    RawVideo,
    /// Something this crate does not name
    Other,
}

impl CodecId {
    /**
        Returns true if decoders for this codec may emit pictures out of
        decode order (B-frames or equivalent reference structures).
    */
    pub const fn may_reorder(self) -> bool {
        matches!(
            self,
            Self::H264 | Self::H265 | Self::Mpeg4 | Self::Mpeg2Video | Self::Other
        )
    }
}

/**
    Codecs the encoder can produce.
*/
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum EncodeType {
    /// H.264 / AVC
    #[default]
    H264,
    /// H.265 / HEVC
    H265,
}

impl EncodeType {
    /**
        The codec identifier of the produced bitstream.
    */
    pub const fn codec_id(self) -> CodecId {
        match self {
            Self::H264 => CodecId::H264,
            Self::H265 => CodecId::H265,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_type_maps_to_codec() {
        assert_eq!(EncodeType::H264.codec_id(), CodecId::H264);
        assert_eq!(EncodeType::H265.codec_id(), CodecId::H265);
    }

    #[test]
    fn reordering_codecs() {
        assert!(CodecId::H264.may_reorder());
        assert!(!CodecId::Vp8.may_reorder());
        assert!(!CodecId::RawVideo.may_reorder());
    }
}
