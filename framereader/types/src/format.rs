/*!
    Pixel formats, decode backends and surface formats.
*/

use serde::{Deserialize, Serialize};

/**
    Video pixel formats.

    The set of layouts frames can be delivered in. Decoders that produce
    anything else must convert before handing pictures to the stream.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Planar YUV 4:2:0, 12bpp (1 Cr & Cb sample per 2x2 Y samples)
    Yuv420p,
    /// Planar YUV 4:2:2, 16bpp (1 Cr & Cb sample per 2x1 Y samples)
    Yuv422p,
    /// Planar YUV 4:4:4, 24bpp
    Yuv444p,
    /// Semi-planar YUV 4:2:0, 12bpp, Y plane then interleaved UV plane
    Nv12,
    /// Packed RGB 8:8:8, 24bpp, RGBRGB...
    Rgb24,
    /// Planar RGB 4:4:4, 24bpp
    Rgbp,
    /// Planar RGB 4:4:4, IEEE-754 single precision, 96bpp
    Rgbpf32,
    /// Packed RGBA, 32bpp
    Rgba,
    /// Packed BGRA, 32bpp
    Bgra,
}

impl PixelFormat {
    /**
        Returns the number of data planes for this format.

        Planar YUV and planar RGB have 3, NV12 has 2, packed formats have 1.
    */
    pub const fn plane_count(self) -> usize {
        match self {
            Self::Yuv420p | Self::Yuv422p | Self::Yuv444p | Self::Rgbp | Self::Rgbpf32 => 3,
            Self::Nv12 => 2,
            Self::Rgb24 | Self::Rgba | Self::Bgra => 1,
        }
    }

    /**
        Returns the log2 chroma subsampling as `(horizontal, vertical)`.

        Non-YUV formats return `(0, 0)`.
    */
    pub const fn chroma_shift(self) -> (u32, u32) {
        match self {
            Self::Yuv420p | Self::Nv12 => (1, 1),
            Self::Yuv422p => (1, 0),
            _ => (0, 0),
        }
    }

    /**
        Returns the size in bytes of a single sample component.
    */
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            Self::Rgbpf32 => 4,
            _ => 1,
        }
    }

    /**
        Returns the number of interleaved components stored in the given plane.

        Returns zero for planes the format does not have.
    */
    pub const fn channels_in_plane(self, plane: usize) -> usize {
        if plane >= self.plane_count() {
            return 0;
        }
        match self {
            Self::Nv12 if plane == 1 => 2,
            Self::Rgb24 => 3,
            Self::Rgba | Self::Bgra => 4,
            _ => 1,
        }
    }

    /**
        Returns the dimensions of the given plane for a picture of
        `width` x `height` pixels.
    */
    pub const fn plane_size(self, plane: usize, width: u32, height: u32) -> (u32, u32) {
        if plane == 0 || !self.is_yuv() {
            return (width, height);
        }
        let (sx, sy) = self.chroma_shift();
        (
            (width + (1 << sx) - 1) >> sx,
            (height + (1 << sy) - 1) >> sy,
        )
    }

    /**
        Returns true if this is a YUV format.
    */
    pub const fn is_yuv(self) -> bool {
        matches!(
            self,
            Self::Yuv420p | Self::Yuv422p | Self::Yuv444p | Self::Nv12
        )
    }

    /**
        Returns true if this is a planar format.
    */
    pub const fn is_planar(self) -> bool {
        self.plane_count() > 1
    }

    /**
        Returns the number of bits per pixel for this format.

        For subsampled formats this is the average.
    */
    pub const fn bits_per_pixel(self) -> u32 {
        match self {
            Self::Yuv420p | Self::Nv12 => 12,
            Self::Yuv422p => 16,
            Self::Rgb24 | Self::Rgbp | Self::Yuv444p => 24,
            Self::Rgba | Self::Bgra => 32,
            Self::Rgbpf32 => 96,
        }
    }
}

/**
    The backend used to decode, and the memory space decoded pictures live in.
*/
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[non_exhaustive]
pub enum DecodeType {
    /// Software decoding, pictures in host memory.
    #[default]
    Software,
    /// NVIDIA CUDA/NVDEC, pictures in device memory.
    Cuda,
}

impl DecodeType {
    /**
        Returns true if this decode type requires a hardware device.
    */
    pub const fn is_hardware(self) -> bool {
        !matches!(self, Self::Software)
    }

    /**
        Short lowercase name, matching the FFmpeg hardware device type names.
    */
    pub const fn name(self) -> &'static str {
        match self {
            Self::Software => "software",
            Self::Cuda => "cuda",
        }
    }
}

/**
    A surface format offered by a decode backend during format negotiation.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SurfaceFormat {
    /// A host-memory layout.
    Host(PixelFormat),
    /// An opaque device-native surface for the given backend.
    Device(DecodeType),
    /// Anything the negotiation policy does not understand.
    Other,
}

impl SurfaceFormat {
    /**
        Returns true if this surface lives in host memory.
    */
    pub const fn is_host(self) -> bool {
        matches!(self, Self::Host(_))
    }
}
