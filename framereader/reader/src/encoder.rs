/*!
    Encoding frames back into compressed video.

    An [`Encoder`] drives an [`EncodeBackend`] (the codec) and a
    [`PacketSink`] (the container or raw output). Frames must arrive with
    strictly increasing timestamps; anything that does not match the
    configured size and pixel format is converted on the way in.
*/

use std::fmt;

use framereader_types::{
    Crop, EncodeType, EncoderOptions, Error, Packet, PixelFormat, Rational, Resolution, Result,
};

use crate::filter::Filter;
use crate::frame::Frame;
use crate::stream::Stream;

/**
    Picture and timing parameters of an encoded stream.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodeParams {
    pub width: u32,
    pub height: u32,
    /// Pixel format handed to the codec.
    pub pixel_format: PixelFormat,
    pub frame_rate: Rational,
    /// Time base of the encoded timestamps.
    pub time_base: Rational,
    pub sample_aspect_ratio: Rational,
}

impl EncodeParams {
    /**
        Parameters for a stream with square pixels, timed in frame intervals.
    */
    pub fn new(width: u32, height: u32, pixel_format: PixelFormat, frame_rate: Rational) -> Self {
        Self {
            width,
            height,
            pixel_format,
            frame_rate,
            time_base: if frame_rate.is_zero() {
                frame_rate
            } else {
                frame_rate.invert()
            },
            sample_aspect_ratio: Rational::new(1, 1),
        }
    }

    /**
        Parameters matching the frames a stream delivers, keeping its time base.

        Streams delivering a format the codecs cannot take are encoded as 4:2:0.
    */
    pub fn from_stream(stream: &Stream) -> Self {
        let info = stream.info();
        let pixel_format = stream
            .pixel_format()
            .filter(|format| is_encodable(*format))
            .unwrap_or(PixelFormat::Yuv420p);
        let sample_aspect_ratio = if stream.options().scale.is_noop() {
            info.sample_aspect_ratio
        } else {
            Rational::new(1, 1)
        };
        Self {
            width: stream.width(),
            height: stream.height(),
            pixel_format,
            frame_rate: info.frame_rate,
            time_base: info.time_base,
            sample_aspect_ratio,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::invalid_parameters(format!(
                "cannot encode {}x{} pictures",
                self.width, self.height
            )));
        }
        if self.frame_rate.is_zero() || self.time_base.is_zero() {
            return Err(Error::invalid_parameters(format!(
                "frame rate {} and time base {} must be non-zero",
                self.frame_rate, self.time_base
            )));
        }
        if !is_encodable(self.pixel_format) {
            return Err(Error::unsupported_format(format!(
                "{:?} cannot be encoded",
                self.pixel_format
            )));
        }
        Ok(())
    }
}

/**
    Returns true if the codecs accept pictures in `format`.
*/
pub fn is_encodable(format: PixelFormat) -> bool {
    matches!(
        format,
        PixelFormat::Yuv420p | PixelFormat::Yuv422p | PixelFormat::Yuv444p | PixelFormat::Nv12
    )
}

/**
    A video codec implementation.
*/
pub trait EncodeBackend: Send {
    fn supports(&self, codec: EncodeType) -> bool;

    /**
        Set up the codec. With `global_header` the parameter sets go into
        [`stream_header`](EncodeBackend::stream_header) instead of the packets.
    */
    fn configure(
        &mut self,
        options: &EncoderOptions,
        params: &EncodeParams,
        global_header: bool,
    ) -> Result<()>;

    /**
        Codec parameter sets for the container header, if any.
    */
    fn stream_header(&self) -> Option<Vec<u8>>;

    /**
        Encode one frame, returning whatever packets the codec releases.
        Timestamps of the frame are in microseconds.
    */
    fn encode(&mut self, frame: &Frame) -> Result<Vec<Packet>>;

    /**
        Drain the codec, returning every packet still held back.
    */
    fn finish(&mut self) -> Result<Vec<Packet>>;
}

/**
    Where encoded packets go.
*/
pub trait PacketSink: Send {
    /**
        Returns true if the output format wants codec parameter sets once,
        in its header, rather than repeated in the stream.
    */
    fn needs_global_header(&self) -> bool {
        false
    }

    fn write_header(
        &mut self,
        params: &EncodeParams,
        codec: EncodeType,
        extradata: Option<&[u8]>,
    ) -> Result<()>;

    fn write_packet(&mut self, packet: &Packet) -> Result<()>;

    fn write_trailer(&mut self) -> Result<()>;
}

/**
    Encodes frames into a sink.

    Dropping an encoder closes it, logging any error; call
    [`close`](Encoder::close) to see them.
*/
pub struct Encoder {
    backend: Box<dyn EncodeBackend>,
    sink: Option<Box<dyn PacketSink>>,
    options: EncoderOptions,
    params: EncodeParams,
    last_timestamp: Option<i64>,
    frames: u64,
    packets: u64,
    closed: bool,
    failed: bool,
}

impl Encoder {
    /**
        Configure `backend` and write the header to `sink`.
    */
    pub fn open(
        options: EncoderOptions,
        params: EncodeParams,
        mut backend: Box<dyn EncodeBackend>,
        mut sink: Box<dyn PacketSink>,
    ) -> Result<Self> {
        if !backend.supports(options.codec) {
            return Err(Error::unsupported_codec(format!(
                "no encoder available for {:?}",
                options.codec
            )));
        }
        params.validate()?;

        backend.configure(&options, &params, sink.needs_global_header())?;
        let header = backend.stream_header();
        sink.write_header(&params, options.codec, header.as_deref())?;

        tracing::info!(
            codec = ?options.codec,
            width = params.width,
            height = params.height,
            crf = options.crf(),
            preset = options.preset.name(),
            "opened encoder"
        );

        Ok(Self {
            backend,
            sink: Some(sink),
            options,
            params,
            last_timestamp: None,
            frames: 0,
            packets: 0,
            closed: false,
            failed: false,
        })
    }

    /**
        Like [`Encoder::open`], taking the parameters from a stream.
    */
    pub fn from_stream(
        stream: &Stream,
        options: EncoderOptions,
        backend: Box<dyn EncodeBackend>,
        sink: Box<dyn PacketSink>,
    ) -> Result<Self> {
        Self::open(options, EncodeParams::from_stream(stream), backend, sink)
    }

    /**
        Create a media file at `path`, its container picked from the
        extension, encoded with libx264 or libx265.
    */
    #[cfg(feature = "ffmpeg")]
    pub fn create(
        path: impl AsRef<std::path::Path>,
        params: EncodeParams,
        options: EncoderOptions,
    ) -> Result<Self> {
        let backend = crate::ffmpeg::FfmpegEncoder::new(options.codec)?;
        let sink = crate::ffmpeg::FileSink::create(path.as_ref())?;
        Self::open(options, params, Box::new(backend), Box::new(sink))
    }

    /**
        Encode a frame.

        Fails with [`Error::OutOfOrder`] unless the timestamp is later than
        that of the previous frame.
    */
    pub fn send_frame(&mut self, frame: Frame) -> Result<()> {
        if self.closed {
            return Err(Error::encode("encoder is closed"));
        }
        if self.failed {
            return Err(Error::encode("encoder failed on an earlier frame"));
        }
        let timestamp = frame.timestamp();
        if let Some(last) = self.last_timestamp {
            if timestamp <= last {
                return Err(Error::OutOfOrder { timestamp, last });
            }
        }

        let frame = self.prepare(frame)?;
        tracing::trace!(timestamp, frame = frame.frame_number(), "encoding frame");
        let packets = match self.backend.encode(&frame) {
            Ok(packets) => packets,
            Err(error) => {
                self.failed = true;
                return Err(error);
            }
        };
        self.last_timestamp = Some(timestamp);
        self.frames += 1;
        self.write_packets(packets)
    }

    /**
        Drain the codec, write the trailer and release the sink.

        Closing again does nothing.
    */
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = self.finish();
        self.sink = None;
        result
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn params(&self) -> &EncodeParams {
        &self.params
    }

    pub fn options(&self) -> &EncoderOptions {
        &self.options
    }

    /**
        Number of frames accepted so far.
    */
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /**
        Number of packets written so far.
    */
    pub fn packet_count(&self) -> u64 {
        self.packets
    }

    fn prepare(&self, frame: Frame) -> Result<Frame> {
        let size = Resolution::new(self.params.width, self.params.height);
        let frame = Filter::apply(frame, Crop::default(), size, Some(self.params.pixel_format))?;
        frame.into_host()
    }

    fn finish(&mut self) -> Result<()> {
        if self.failed {
            tracing::debug!("encoder failed, skipping trailer");
            return Ok(());
        }
        let packets = self.backend.finish().inspect_err(|_| self.failed = true)?;
        self.write_packets(packets)?;
        if let Some(sink) = self.sink.as_mut() {
            sink.write_trailer()?;
        }
        tracing::info!(frames = self.frames, packets = self.packets, "closed encoder");
        Ok(())
    }

    fn write_packets(&mut self, packets: Vec<Packet>) -> Result<()> {
        let Some(sink) = self.sink.as_mut() else {
            return Err(Error::encode("encoder sink already released"));
        };
        for packet in &packets {
            if let Err(error) = sink.write_packet(packet) {
                self.failed = true;
                return Err(error);
            }
            self.packets += 1;
        }
        Ok(())
    }
}

impl Drop for Encoder {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            tracing::error!(%error, "failed to close encoder");
        }
    }
}

impl fmt::Debug for Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encoder")
            .field("options", &self.options)
            .field("params", &self.params)
            .field("frames", &self.frames)
            .field("closed", &self.closed)
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(Encoder: Send);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingBackend, RecordingSink, luma_picture};
    use crate::picture::HostPicture;

    fn params() -> EncodeParams {
        EncodeParams::new(16, 8, PixelFormat::Yuv420p, Rational::new(25, 1))
    }

    fn frame(timestamp: i64) -> Frame {
        Frame::new(Box::new(luma_picture(timestamp)), timestamp, timestamp)
    }

    fn encoder(backend: RecordingBackend, sink: RecordingSink) -> Encoder {
        Encoder::open(
            EncoderOptions::default(),
            params(),
            Box::new(backend),
            Box::new(sink),
        )
        .unwrap()
    }

    #[test]
    fn rejects_out_of_order_timestamps() {
        let mut encoder = encoder(RecordingBackend::new(), RecordingSink::new());
        encoder.send_frame(frame(0)).unwrap();
        encoder.send_frame(frame(5)).unwrap();
        let result = encoder.send_frame(frame(3));
        assert!(matches!(
            result,
            Err(Error::OutOfOrder {
                timestamp: 3,
                last: 5
            })
        ));
        assert!(matches!(
            encoder.send_frame(frame(5)),
            Err(Error::OutOfOrder { .. })
        ));
        encoder.send_frame(frame(6)).unwrap();
        assert_eq!(encoder.frame_count(), 3);
    }

    #[test]
    fn close_twice_writes_one_trailer() {
        let sink = RecordingSink::new();
        let log = sink.log();
        let mut encoder = encoder(RecordingBackend::new(), sink);
        encoder.send_frame(frame(0)).unwrap();
        encoder.send_frame(frame(40_000)).unwrap();
        assert_eq!(log.lock().packets.len(), 1);

        encoder.close().unwrap();
        encoder.close().unwrap();
        assert!(encoder.is_closed());
        drop(encoder);

        let log = log.lock();
        assert_eq!(log.headers, 1);
        assert_eq!(log.trailers, 1);
        assert_eq!(log.packets.len(), 2);
        assert_eq!(log.packets[1].pts, Some(framereader_types::Pts(40_000)));
    }

    #[test]
    fn closed_encoder_rejects_frames() {
        let mut encoder = encoder(RecordingBackend::new(), RecordingSink::new());
        encoder.close().unwrap();
        assert!(matches!(encoder.send_frame(frame(0)), Err(Error::Encode { .. })));
    }

    #[test]
    fn drop_closes() {
        let sink = RecordingSink::new();
        let log = sink.log();
        let mut encoder = encoder(RecordingBackend::new(), sink);
        encoder.send_frame(frame(0)).unwrap();
        drop(encoder);
        assert_eq!(log.lock().trailers, 1);
        assert_eq!(log.lock().packets.len(), 1);
    }

    #[test]
    fn unsupported_codec() {
        let sink = RecordingSink::new();
        let log = sink.log();
        let result = Encoder::open(
            EncoderOptions::new(EncodeType::H265),
            params(),
            Box::new(RecordingBackend::new()),
            Box::new(sink),
        );
        assert!(matches!(result, Err(Error::UnsupportedCodec { .. })));
        assert_eq!(log.lock().headers, 0);
    }

    #[test]
    fn invalid_params() {
        let zero = EncodeParams::new(0, 8, PixelFormat::Yuv420p, Rational::new(25, 1));
        let rgb = EncodeParams::new(16, 8, PixelFormat::Rgb24, Rational::new(25, 1));
        for (params, invalid) in [(zero, true), (rgb, false)] {
            let result = Encoder::open(
                EncoderOptions::default(),
                params,
                Box::new(RecordingBackend::new()),
                Box::new(RecordingSink::new()),
            );
            if invalid {
                assert!(matches!(result, Err(Error::InvalidParameters { .. })));
            } else {
                assert!(matches!(result, Err(Error::UnsupportedFormat { .. })));
            }
        }
    }

    #[test]
    fn codec_checked_before_params() {
        let zero = EncodeParams::new(0, 0, PixelFormat::Rgb24, Rational::new(25, 1));
        let result = Encoder::open(
            EncoderOptions::new(EncodeType::H265),
            zero,
            Box::new(RecordingBackend::new()),
            Box::new(RecordingSink::new()),
        );
        assert!(matches!(result, Err(Error::UnsupportedCodec { .. })));
    }

    #[test]
    fn frames_converted_to_params() {
        let backend = RecordingBackend::new();
        let log = backend.log();
        let mut encoder = encoder(backend, RecordingSink::new());
        let rgb = HostPicture::new(PixelFormat::Rgb24, 32, 16);
        encoder.send_frame(Frame::new(Box::new(rgb), 0, 0)).unwrap();
        assert_eq!(log.lock().frames, vec![(0, PixelFormat::Yuv420p, 16, 8)]);
    }

    #[test]
    fn global_header_requested_by_sink() {
        let backend = RecordingBackend::new();
        let backend_log = backend.log();
        let sink = RecordingSink::new().with_global_header();
        let sink_log = sink.log();
        let _encoder = encoder(backend, sink);
        assert_eq!(
            backend_log.lock().configured,
            Some((EncodeType::H264, 26, true))
        );
        assert_eq!(sink_log.lock().extradata, Some(vec![0, 0, 0, 1]));
    }

    #[test]
    fn backend_failure_skips_trailer() {
        let sink = RecordingSink::new();
        let log = sink.log();
        let mut encoder = encoder(RecordingBackend::new().failing(), sink);
        assert!(matches!(encoder.send_frame(frame(0)), Err(Error::Encode { .. })));
        assert!(matches!(encoder.send_frame(frame(1)), Err(Error::Encode { .. })));
        encoder.close().unwrap();
        assert_eq!(log.lock().trailers, 0);
    }
}
