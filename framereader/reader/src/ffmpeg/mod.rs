/*!
    FFmpeg-backed demuxing, decoding, encoding and muxing.
*/

mod encode;
mod hw;
mod sink;
mod source;
mod video;

use std::path::Path;

use ffmpeg_next::{codec, ffi};

use framereader_types::{
    CodecId, DecodeType, EncodeType, Error, PixelFormat, Rational, Result, SurfaceFormat,
};

use crate::backend::{Demuxer, VideoDecoder};
use crate::context::DecoderContext;

pub use encode::FfmpegEncoder;
pub use hw::HwDeviceRef;
pub use sink::FileSink;
pub use source::FileSource;
pub use video::{FfmpegPicture, FfmpegVideoDecoder};

/**
    Initialize FFmpeg. Safe to call repeatedly.
*/
pub(crate) fn init() -> Result<()> {
    ffmpeg_next::init().map_err(|e| Error::unsupported_backend(format!("FFmpeg init failed: {e}")))
}

/**
    Open the container at `path` and a decoder for its best video stream.

    Device decoders keep their pictures on the device; the stream downloads
    them itself when host output is requested.
*/
pub(crate) fn open_backends(
    path: &Path,
    context: &DecoderContext,
) -> Result<(Box<dyn Demuxer>, Box<dyn VideoDecoder>)> {
    let source = FileSource::open(path)?;
    let decoder = FfmpegVideoDecoder::new(
        source.parameters(),
        source.info().time_base,
        context,
        context.format_policy(false),
    )?;
    Ok((Box::new(source), Box::new(decoder)))
}

pub(crate) fn av_error(ret: i32) -> String {
    ffmpeg_next::Error::from(ret).to_string()
}

/**
    Convert an FFmpeg rational, which may have a zero denominator.
*/
pub(crate) fn rational_from_av(value: ffmpeg_next::Rational) -> Rational {
    Rational {
        num: value.numerator(),
        den: value.denominator(),
    }
}

pub(crate) fn rational_to_av(value: Rational) -> ffmpeg_next::Rational {
    ffmpeg_next::Rational::new(value.num, value.den)
}

pub(crate) fn pixel_format_from_av(format: ffi::AVPixelFormat) -> Option<PixelFormat> {
    use ffi::AVPixelFormat::*;
    Some(match format {
        AV_PIX_FMT_YUV420P | AV_PIX_FMT_YUVJ420P => PixelFormat::Yuv420p,
        AV_PIX_FMT_YUV422P | AV_PIX_FMT_YUVJ422P => PixelFormat::Yuv422p,
        AV_PIX_FMT_YUV444P | AV_PIX_FMT_YUVJ444P => PixelFormat::Yuv444p,
        AV_PIX_FMT_NV12 => PixelFormat::Nv12,
        AV_PIX_FMT_RGB24 => PixelFormat::Rgb24,
        AV_PIX_FMT_GBRP => PixelFormat::Rgbp,
        AV_PIX_FMT_GBRPF32LE => PixelFormat::Rgbpf32,
        AV_PIX_FMT_RGBA => PixelFormat::Rgba,
        AV_PIX_FMT_BGRA => PixelFormat::Bgra,
        _ => return None,
    })
}

/**
    Map a pixel format stored as a plain integer, as in codec parameters.
*/
pub(crate) fn pixel_format_from_raw(raw: i32) -> Option<PixelFormat> {
    use ffi::AVPixelFormat::*;
    [
        AV_PIX_FMT_YUV420P,
        AV_PIX_FMT_YUVJ420P,
        AV_PIX_FMT_YUV422P,
        AV_PIX_FMT_YUVJ422P,
        AV_PIX_FMT_YUV444P,
        AV_PIX_FMT_YUVJ444P,
        AV_PIX_FMT_NV12,
        AV_PIX_FMT_RGB24,
        AV_PIX_FMT_GBRP,
        AV_PIX_FMT_GBRPF32LE,
        AV_PIX_FMT_RGBA,
        AV_PIX_FMT_BGRA,
    ]
    .into_iter()
    .find(|format| *format as i32 == raw)
    .and_then(pixel_format_from_av)
}

pub(crate) fn pixel_format_to_av(format: PixelFormat) -> ffi::AVPixelFormat {
    use ffi::AVPixelFormat::*;
    match format {
        PixelFormat::Yuv420p => AV_PIX_FMT_YUV420P,
        PixelFormat::Yuv422p => AV_PIX_FMT_YUV422P,
        PixelFormat::Yuv444p => AV_PIX_FMT_YUV444P,
        PixelFormat::Nv12 => AV_PIX_FMT_NV12,
        PixelFormat::Rgb24 => AV_PIX_FMT_RGB24,
        PixelFormat::Rgbp => AV_PIX_FMT_GBRP,
        PixelFormat::Rgbpf32 => AV_PIX_FMT_GBRPF32LE,
        PixelFormat::Rgba => AV_PIX_FMT_RGBA,
        PixelFormat::Bgra => AV_PIX_FMT_BGRA,
    }
}

/**
    FFmpeg plane index holding our plane `plane`.

    FFmpeg stores planar RGB as G, B, R.
*/
pub(crate) fn av_plane(format: PixelFormat, plane: usize) -> usize {
    match format {
        PixelFormat::Rgbp | PixelFormat::Rgbpf32 => [2, 0, 1].get(plane).copied().unwrap_or(plane),
        _ => plane,
    }
}

pub(crate) fn surface_format(format: ffi::AVPixelFormat) -> SurfaceFormat {
    if format == ffi::AVPixelFormat::AV_PIX_FMT_CUDA {
        return SurfaceFormat::Device(DecodeType::Cuda);
    }
    match pixel_format_from_av(format) {
        Some(format) => SurfaceFormat::Host(format),
        None => SurfaceFormat::Other,
    }
}

pub(crate) fn codec_from_av(id: codec::Id) -> CodecId {
    match id {
        codec::Id::H264 => CodecId::H264,
        codec::Id::HEVC => CodecId::H265,
        codec::Id::VP8 => CodecId::Vp8,
        codec::Id::VP9 => CodecId::Vp9,
        codec::Id::AV1 => CodecId::Av1,
        codec::Id::MPEG4 => CodecId::Mpeg4,
        _ => CodecId::Other,
    }
}

pub(crate) fn encode_codec_id(codec: EncodeType) -> codec::Id {
    match codec {
        EncodeType::H264 => codec::Id::H264,
        EncodeType::H265 => codec::Id::HEVC,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_formats_map_both_ways() {
        for format in [
            PixelFormat::Yuv420p,
            PixelFormat::Nv12,
            PixelFormat::Rgbp,
            PixelFormat::Rgbpf32,
            PixelFormat::Bgra,
        ] {
            assert_eq!(pixel_format_from_av(pixel_format_to_av(format)), Some(format));
        }
        assert_eq!(
            pixel_format_from_av(ffi::AVPixelFormat::AV_PIX_FMT_YUVJ420P),
            Some(PixelFormat::Yuv420p)
        );
        let raw = ffi::AVPixelFormat::AV_PIX_FMT_NV12 as i32;
        assert_eq!(pixel_format_from_raw(raw), Some(PixelFormat::Nv12));
        assert_eq!(pixel_format_from_raw(-1), None);
    }

    #[test]
    fn planar_rgb_plane_order() {
        assert_eq!(av_plane(PixelFormat::Rgbp, 0), 2);
        assert_eq!(av_plane(PixelFormat::Rgbp, 1), 0);
        assert_eq!(av_plane(PixelFormat::Yuv420p, 1), 1);
    }

    #[test]
    fn surfaces_classified() {
        assert_eq!(
            surface_format(ffi::AVPixelFormat::AV_PIX_FMT_CUDA),
            SurfaceFormat::Device(DecodeType::Cuda)
        );
        assert_eq!(
            surface_format(ffi::AVPixelFormat::AV_PIX_FMT_P010LE),
            SurfaceFormat::Other
        );
    }
}
