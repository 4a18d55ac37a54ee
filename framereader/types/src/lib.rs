/*!
    Shared types for the framereader crates.

    This crate defines the vocabulary used across the reader: the types that
    describe streams, options and errors. It has no dependency on FFmpeg, so
    configuration can be built, validated and serialized without pulling in
    any media libraries.

    # Core Types

    - [`Rational`] - Rational numbers for time bases and frame rates
    - [`Pts`] and [`MediaDuration`] - Timestamps in time_base units
    - [`TIME_BASE_US`] - The microsecond time base used for frame timestamps
    - [`Packet`] - Encoded packet data

    # Format Types

    - [`PixelFormat`] - Video pixel formats
    - [`DecodeType`] and [`SurfaceFormat`] - Decode backends and their surfaces
    - [`CodecId`] and [`EncodeType`] - Codec identifiers

    # Configuration

    - [`DecoderOptions`] - Decode backend, buffering, crop/scale/format
    - [`EncoderOptions`] - Codec, quality and preset
    - [`Crop`] and [`Resolution`] - Output geometry

    # Stream Information

    - [`VideoStreamInfo`] - Stream metadata

    # Error Handling

    - [`Error`] and [`Result`] - Common error types
*/

mod codec;
mod error;
mod format;
mod geometry;
mod options;
mod packet;
mod rational;
mod stream;
mod timestamp;

pub use codec::{CodecId, EncodeType};
pub use error::{Error, Result};
pub use format::{DecodeType, PixelFormat, SurfaceFormat};
pub use geometry::{Crop, Resolution};
pub use options::{BufferPolicy, DecoderOptions, EncoderOptions, ExternalContext, Preset};
pub use packet::Packet;
pub use rational::Rational;
pub use stream::{VideoStreamInfo, display_aspect_ratio};
pub use timestamp::{MediaDuration, Pts, TIME_BASE_US};

static_assertions::assert_impl_all!(DecoderOptions: Send, Sync);
static_assertions::assert_impl_all!(EncoderOptions: Send, Sync);
static_assertions::assert_impl_all!(Error: Send, Sync);
