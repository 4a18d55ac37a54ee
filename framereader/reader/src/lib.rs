/*!
    Buffered, seekable access to the frames of a video.

    A [`Stream`] demuxes and decodes one video stream, keeping a short
    window of decoded frames so that sequential reads, small forward jumps
    and repeated lookups of nearby frames never touch the container. Frames
    are addressed by microsecond timestamp or by frame number, and can be
    cropped, scaled and converted on the way out.

    # Features

    - `ffmpeg`: Open media files, and write them, through FFmpeg

    # Example

    ```ignore
    use framereader::{DecoderOptions, PixelFormat, Stream};

    let options = DecoderOptions::default()
        .with_scale(640, 360)
        .with_format(PixelFormat::Rgb24);
    let mut stream = Stream::open("video.mp4", options)?;

    // Frame 100, then the ones right after it
    let frame = stream.get_frame_by_number(100)?;
    let next = stream.get_next_frames(5)?;

    // Random access by timestamp
    let frame = stream.get_frame_at(12_500_000)?;
    ```

    # Decode Backends

    Decoding runs in software unless [`DecoderOptions`] ask for a device.
    Device contexts are shared between streams through a [`ContextPool`],
    or built from a context the caller already owns:

    ```ignore
    let options = DecoderOptions::new(DecodeType::Cuda)
        .with_context(ExternalContext::new(CudaContext(raw_context)))
        .with_output_host(false);
    ```

    # Encoding

    An [`Encoder`] turns frames back into H.264 or H.265, either through
    FFmpeg or through any [`EncodeBackend`] and [`PacketSink`].
*/

pub use framereader_types::{
    BufferPolicy, CodecId, Crop, DecodeType, DecoderOptions, EncodeType, EncoderOptions, Error,
    ExternalContext, MediaDuration, Packet, PixelFormat, Preset, Pts, Rational, Resolution, Result,
    SurfaceFormat, TIME_BASE_US, VideoStreamInfo, display_aspect_ratio,
};

mod backend;
mod buffer;
mod context;
mod cuda;
mod encoder;
mod filter;
mod frame;
mod handles;
mod picture;
mod pool;
mod sink;
mod stream;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

#[cfg(test)]
mod testing;

pub use backend::{DecoderOutput, Demuxer, VideoDecoder};
pub use context::{DecoderContext, DeviceProbe, FormatPolicy, SystemProbe};
pub use cuda::{CudaContext, CudaDevice};
pub use encoder::{EncodeBackend, EncodeParams, Encoder, PacketSink, is_encodable};
pub use filter::Filter;
pub use frame::Frame;
pub use handles::{DeviceHandle, DeviceResource, FramePtr};
pub use picture::{DecodedPicture, HostPicture, Picture, PlaneData};
pub use pool::ContextPool;
pub use sink::StreamSink;
pub use stream::{SEEK_FORWARD_FRAMES, Stream, StreamState};
