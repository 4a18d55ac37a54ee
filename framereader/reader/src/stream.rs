/*!
    Buffered, seekable access to the frames of a video stream.

    A [`Stream`] pulls packets from a [`Demuxer`], feeds them to a
    [`VideoDecoder`] and restores presentation order in a bounded buffer.
    Decoders may hold pictures back and emit them out of order, but never
    by more than their reorder window, so once the buffer holds more frames
    than that window its head is the next frame in presentation order.

    Seeking uses the cheapest of three strategies:

    - the target is already buffered: drop the frames before it
    - the target is a short distance ahead: keep decoding and drop frames
    - otherwise: seek the container to the keyframe before the target and
      decode forward from there
*/

use std::fmt;

use framereader_types::{
    BufferPolicy, DecodeType, DecoderOptions, Error, PixelFormat, Pts, Rational, Result,
    TIME_BASE_US, VideoStreamInfo, display_aspect_ratio,
};

use crate::backend::{DecoderOutput, Demuxer, VideoDecoder};
use crate::buffer::FrameBuffer;
use crate::context::DecoderContext;
use crate::filter::Filter;
use crate::frame::Frame;
use crate::picture::DecodedPicture;

/**
    Seeks forward by fewer than this many frame intervals decode linearly
    instead of seeking the container.
*/
pub const SEEK_FORWARD_FRAMES: i64 = 16;

/**
    How many times a container seek that lands past its target is retried
    from further back.
*/
const MAX_SEEK_RETRIES: u32 = 4;

/**
    Lifecycle of a stream.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamState {
    /// Not opened yet. Construction leaves a stream [`Ready`](StreamState::Ready).
    Uninitialized,
    /// Opened or positioned by a seek, the next frame is ready to be decoded.
    Ready,
    /// Delivering frames.
    Decoding,
    /// A seek is in progress.
    Seeking,
    /// The container is exhausted, buffered frames remain.
    Draining,
    /// Every frame has been delivered, or the stream failed.
    Ended,
    /// Buffers were dropped by [`Stream::flush`], decoding resumes on the next read.
    Flushed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Failure {
    Container,
    Decode,
}

/**
    A decoded video stream with frame-accurate seeking.

    Frames are delivered in strictly increasing timestamp order, numbered
    from zero at the first frame. A stream is driven from one thread at a
    time; separate streams may share a [`DecoderContext`] across threads.
*/
pub struct Stream {
    source: Box<dyn Demuxer>,
    decoder: Box<dyn VideoDecoder>,
    context: DecoderContext,
    options: DecoderOptions,
    info: VideoStreamInfo,
    filter: Option<Filter>,
    buffer: FrameBuffer,
    state: StreamState,
    failure: Option<Failure>,
    input_done: bool,
    decoder_drained: bool,
    reorder: usize,
    start: i64,
    interval: i64,
    // timestamp and number of the last frame handed out, or evicted
    last_delivered: Option<(i64, i64)>,
    // frames earlier than this are dropped, set by seeks
    discard_before: Option<i64>,
    // timestamp of the first picture decoded after a container seek
    landed: Option<i64>,
    resume: Option<(i64, Option<(i64, i64)>)>,
}

impl Stream {
    /**
        Create a stream over the given demuxer and decoder.

        Fails with [`Error::InvalidParameters`] for a zero buffer length, a
        scale with one zero dimension, a crop larger than the picture or a
        context that does not match the requested decode type, and with
        [`Error::Container`] if the stream has no usable frame rate.
    */
    pub fn with_backend(
        source: Box<dyn Demuxer>,
        decoder: Box<dyn VideoDecoder>,
        context: DecoderContext,
        options: DecoderOptions,
    ) -> Result<Self> {
        if options.buffer_length == 0 {
            return Err(Error::invalid_parameters("buffer length must be at least one frame"));
        }
        if context.decode_type() != options.decode_type {
            return Err(Error::invalid_parameters(format!(
                "context decodes with {} but {} was requested",
                context.decode_type().name(),
                options.decode_type.name()
            )));
        }
        let filter = Filter::from_options(&options)?;

        let info = source.info().clone();
        if info.frame_rate.is_zero() || info.frame_rate.num < 0 {
            return Err(Error::container(format!(
                "stream {} has no usable frame rate ({})",
                info.index, info.frame_rate
            )));
        }
        if options.crop.cropped_size(info.width, info.height).is_none() {
            return Err(Error::invalid_parameters(format!(
                "crop {:?} removes the whole {}x{} picture",
                options.crop, info.width, info.height
            )));
        }

        let reorder = options
            .reorder_window
            .unwrap_or_else(|| decoder.reorder_delay()) as usize;
        let capacity = buffer_capacity(&options, reorder);

        tracing::debug!(
            codec = ?info.codec,
            width = info.width,
            height = info.height,
            frame_rate = %info.frame_rate,
            decode_type = options.decode_type.name(),
            capacity,
            "opened stream"
        );

        Ok(Self {
            start: info.start_micros(),
            interval: info.frame_interval_micros().max(1),
            source,
            decoder,
            context,
            filter,
            buffer: FrameBuffer::new(capacity),
            state: StreamState::Ready,
            failure: None,
            input_done: false,
            decoder_drained: false,
            reorder,
            last_delivered: None,
            discard_before: None,
            landed: None,
            resume: None,
            info,
            options,
        })
    }

    /**
        Open the video stream of a media file, decoding with a context
        shared through the process-wide [`ContextPool`](crate::ContextPool).
    */
    #[cfg(feature = "ffmpeg")]
    pub fn open(path: impl AsRef<std::path::Path>, options: DecoderOptions) -> Result<Self> {
        let context = crate::ContextPool::global().get(
            options.decode_type,
            options.context.clone(),
            options.device,
        )?;
        Self::open_with_context(path, context, options)
    }

    /**
        Open the video stream of a media file, decoding with `context`.
    */
    #[cfg(feature = "ffmpeg")]
    pub fn open_with_context(
        path: impl AsRef<std::path::Path>,
        context: DecoderContext,
        options: DecoderOptions,
    ) -> Result<Self> {
        let (source, decoder) = crate::ffmpeg::open_backends(path.as_ref(), &context)?;
        Self::with_backend(source, decoder, context, options)
    }

    /**
        Take the next frame in presentation order.

        Returns None once every frame has been delivered.
    */
    pub fn get_frame(&mut self) -> Result<Option<Frame>> {
        self.resume_if_flushed()?;
        self.fill()?;
        let frame = self.buffer.pop_front();
        if let Some(frame) = &frame {
            tracing::trace!(
                timestamp = frame.timestamp(),
                frame = frame.frame_number(),
                "delivering frame"
            );
            self.last_delivered = Some((frame.timestamp(), frame.frame_number()));
        }
        self.update_state();
        Ok(frame)
    }

    /**
        Look at the frame the next [`get_frame`](Stream::get_frame) call
        returns, without taking it.
    */
    pub fn peek_next_frame(&mut self) -> Result<Option<&Frame>> {
        self.resume_if_flushed()?;
        self.fill()?;
        self.update_state();
        Ok(self.buffer.front())
    }

    /**
        Position the stream so the next frame delivered is the one at
        `timestamp` (microseconds), or the first one after it.
    */
    pub fn seek(&mut self, timestamp: i64) -> Result<()> {
        self.check_failed()?;
        let previous = std::mem::replace(&mut self.state, StreamState::Seeking);
        tracing::debug!(timestamp, "seeking");

        if previous == StreamState::Flushed {
            self.resume = None;
            self.seek_container(timestamp)?;
        } else if self.buffer.covers(timestamp) {
            let dropped = self.buffer.discard_before(timestamp);
            tracing::trace!(timestamp, dropped, "seek served from buffer");
            self.position_at(timestamp);
        } else if self.is_near_forward(timestamp, self.is_untouched()) {
            let dropped = self.buffer.discard_before(timestamp);
            tracing::trace!(timestamp, dropped, "seeking by decoding forward");
            self.position_at(timestamp);
        } else {
            self.seek_container(timestamp)?;
        }

        self.state = StreamState::Ready;
        Ok(())
    }

    /**
        Seek to `timestamp` and take the frame there.
    */
    pub fn get_frame_at(&mut self, timestamp: i64) -> Result<Option<Frame>> {
        self.seek(timestamp)?;
        self.get_frame()
    }

    /**
        Seek to the frame with the given number.
    */
    pub fn seek_frame(&mut self, frame_number: i64) -> Result<()> {
        self.seek(self.frame_to_time(frame_number))
    }

    /**
        Seek to and take the frame with the given number.
    */
    pub fn get_frame_by_number(&mut self, frame_number: i64) -> Result<Option<Frame>> {
        self.seek_frame(frame_number)?;
        self.get_frame()
    }

    /**
        Take up to `count` frames, fewer if the stream ends first.
    */
    pub fn get_next_frames(&mut self, count: usize) -> Result<Vec<Frame>> {
        let mut frames = Vec::with_capacity(count);
        while frames.len() < count {
            match self.get_frame()? {
                Some(frame) => frames.push(frame),
                None => break,
            }
        }
        Ok(frames)
    }

    /**
        Take the frames with the given numbers, in the order asked for.
        Numbers past the end of the stream are skipped.
    */
    pub fn get_frames(&mut self, frame_numbers: &[i64]) -> Result<Vec<Frame>> {
        let mut frames = Vec::with_capacity(frame_numbers.len());
        for &number in frame_numbers {
            if let Some(frame) = self.get_frame_by_number(number)? {
                frames.push(frame);
            }
        }
        Ok(frames)
    }

    /**
        Drop every buffered frame and reset the decoder.

        The next read resumes after the last delivered frame.
    */
    pub fn flush(&mut self) {
        let dropped = self.buffer.clear();
        self.decoder.flush();
        if self.failure.is_some() {
            tracing::debug!(dropped, "flushed failed stream");
            return;
        }
        let resume_at = self
            .last_delivered
            .map(|(timestamp, _)| timestamp + 1)
            .or(self.discard_before)
            .unwrap_or(self.start);
        self.resume = Some((resume_at, self.last_delivered));
        self.state = StreamState::Flushed;
        tracing::debug!(dropped, resume_at, "flushed stream");
    }

    /**
        Frame number of the frame presented at `timestamp` (microseconds).
    */
    pub fn time_to_frame(&self, timestamp: i64) -> i64 {
        Rational::rescale(
            timestamp - self.start,
            TIME_BASE_US,
            self.info.frame_rate.invert(),
        )
    }

    /**
        Timestamp in microseconds of the frame with the given number.
    */
    pub fn frame_to_time(&self, frame_number: i64) -> i64 {
        self.start + Rational::rescale(frame_number, self.info.frame_rate.invert(), TIME_BASE_US)
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /**
        Returns true if a container or decode failure ended the stream.
    */
    pub fn has_failed(&self) -> bool {
        self.failure.is_some()
    }

    /**
        Width of delivered frames, after cropping and scaling.
    */
    pub fn width(&self) -> u32 {
        self.output_size().0
    }

    /**
        Height of delivered frames, after cropping and scaling.
    */
    pub fn height(&self) -> u32 {
        self.output_size().1
    }

    /**
        Display aspect ratio of delivered frames.
    */
    pub fn aspect_ratio(&self) -> f64 {
        let (width, height) = self.output_size();
        let scaled = !self.options.scale.is_noop();
        let sar = if scaled {
            Rational::new(1, 1)
        } else {
            self.info.sample_aspect_ratio
        };
        display_aspect_ratio(width, height, sar)
    }

    /**
        Pixel format of delivered frames, if known before decoding.
    */
    pub fn pixel_format(&self) -> Option<PixelFormat> {
        self.options.format.or(self.info.pixel_format)
    }

    pub fn total_frames(&self) -> u64 {
        self.info.total_frames()
    }

    /**
        Stream duration in microseconds.
    */
    pub fn duration(&self) -> i64 {
        self.info.duration_micros()
    }

    pub fn frame_rate(&self) -> Rational {
        self.info.frame_rate
    }

    /**
        Average time between frames in microseconds.
    */
    pub fn frame_time(&self) -> i64 {
        self.interval
    }

    pub fn decode_type(&self) -> DecodeType {
        self.context.decode_type()
    }

    pub fn info(&self) -> &VideoStreamInfo {
        &self.info
    }

    pub fn context(&self) -> &DecoderContext {
        &self.context
    }

    pub fn options(&self) -> &DecoderOptions {
        &self.options
    }

    fn output_size(&self) -> (u32, u32) {
        self.filter
            .and_then(|filter| filter.output_size(self.info.width, self.info.height))
            .map_or((self.info.width, self.info.height), |size| {
                (size.width, size.height)
            })
    }

    fn check_failed(&self) -> Result<()> {
        match self.failure {
            None => Ok(()),
            Some(Failure::Container) => Err(Error::container(
                "stream ended after a container failure",
            )),
            Some(Failure::Decode) => Err(Error::decode("stream ended after a decode failure")),
        }
    }

    fn resume_if_flushed(&mut self) -> Result<()> {
        let Some((resume_at, last_delivered)) = self.resume.take() else {
            return Ok(());
        };
        self.check_failed()?;
        self.seek_container(resume_at)?;
        self.last_delivered = last_delivered;
        Ok(())
    }

    /**
        Returns true if `timestamp` is ahead of the decode position by less
        than the linear decode threshold.
    */
    /**
        Nothing has been decoded or delivered since the stream was opened.
    */
    fn is_untouched(&self) -> bool {
        self.last_delivered.is_none()
            && self.discard_before.is_none()
            && self.landed.is_none()
            && self.buffer.is_empty()
            && !self.input_done
    }

    fn is_near_forward(&self, timestamp: i64, fresh: bool) -> bool {
        let reachable = self
            .last_delivered
            .map(|(last, _)| last + 1)
            .or(self.discard_before)
            .or(fresh.then_some(self.start));
        reachable.is_some_and(|from| {
            timestamp >= from && timestamp - from < SEEK_FORWARD_FRAMES * self.interval
        })
    }

    fn position_at(&mut self, timestamp: i64) {
        self.last_delivered = None;
        self.discard_before = Some(timestamp);
    }

    /**
        Seek the container to the keyframe before `target` and decode up to
        the first picture, backing off further when the seek lands late.
    */
    fn seek_container(&mut self, target: i64) -> Result<()> {
        let mut seek_point = target.max(self.start);
        let mut attempt = 0;
        loop {
            self.reposition(seek_point)?;
            self.position_at(target);
            while self.landed.is_none() && self.pump()? {}

            match self.landed {
                Some(landed)
                    if landed > target && seek_point > self.start && attempt < MAX_SEEK_RETRIES =>
                {
                    let back_off = (self.interval * SEEK_FORWARD_FRAMES) << attempt;
                    seek_point = (seek_point - back_off).max(self.start);
                    attempt += 1;
                    tracing::warn!(
                        timestamp = target,
                        landed,
                        seek_point,
                        attempt,
                        "seek landed past target, seeking further back"
                    );
                }
                _ => return Ok(()),
            }
        }
    }

    fn reposition(&mut self, seek_point: i64) -> Result<()> {
        let pts = Pts::from_micros(seek_point, self.info.time_base);
        if let Err(error) = self.source.seek_keyframe(pts) {
            return Err(self.fail(Failure::Container, into_container(error)));
        }
        self.decoder.flush();
        let dropped = self.buffer.clear();
        self.input_done = false;
        self.decoder_drained = false;
        self.landed = None;
        tracing::debug!(seek_point, dropped, "seeked container");
        Ok(())
    }

    /**
        Decode until the buffer head can be delivered, or nothing more
        can be decoded.
    */
    fn fill(&mut self) -> Result<()> {
        match self.options.buffer_policy {
            BufferPolicy::Backpressure => while !self.buffer.is_full() && self.pump()? {},
            BufferPolicy::Evict => while !self.head_is_safe() && self.pump()? {},
        }
        Ok(())
    }

    /**
        Returns true if no frame that precedes the buffer head can still
        come out of the decoder.
    */
    fn head_is_safe(&self) -> bool {
        let Some(head) = self.buffer.front() else {
            return false;
        };
        if self.decoder_drained {
            return true;
        }
        let next_in_order = match (self.last_delivered, self.discard_before) {
            (Some((_, number)), _) => head.frame_number() == number + 1,
            (None, Some(floor)) => head.timestamp() == floor,
            (None, None) => head.frame_number() == 0,
        };
        next_in_order || self.buffer.len() > self.reorder
    }

    /**
        Take one picture from the decoder, feeding it packets as needed.

        Returns false once the decoder is drained.
    */
    fn pump(&mut self) -> Result<bool> {
        loop {
            if self.decoder_drained {
                return Ok(false);
            }
            match self.decoder.receive() {
                Ok(DecoderOutput::Picture(picture)) => {
                    self.admit(picture)?;
                    return Ok(true);
                }
                Ok(DecoderOutput::Drained) => {
                    tracing::debug!(buffered = self.buffer.len(), "decoder drained");
                    self.decoder_drained = true;
                    return Ok(false);
                }
                Ok(DecoderOutput::NeedInput) if self.input_done => {
                    self.decoder_drained = true;
                    return Ok(false);
                }
                Ok(DecoderOutput::NeedInput) => self.feed()?,
                Err(error) => return Err(self.fail(Failure::Decode, into_decode(error))),
            }
        }
    }

    fn feed(&mut self) -> Result<()> {
        let packet = match self.source.read_packet() {
            Ok(packet) => packet,
            Err(error) => return Err(self.fail(Failure::Container, into_container(error))),
        };
        let Some(packet) = packet else {
            tracing::debug!("end of container");
            self.input_done = true;
            if let Err(error) = self.decoder.send_eof() {
                return Err(self.fail(Failure::Decode, into_decode(error)));
            }
            return Ok(());
        };

        if let Err(error) = self.decoder.send_packet(&packet) {
            tracing::warn!(
                timestamp = packet.timestamp_micros(),
                %error,
                "decoder rejected packet, resending"
            );
            if let Err(error) = self.decoder.send_packet(&packet) {
                return Err(self.fail(Failure::Decode, into_decode(error)));
            }
        }
        Ok(())
    }

    fn admit(&mut self, decoded: DecodedPicture) -> Result<()> {
        self.refresh_reorder();

        let Some(pts) = decoded.pts else {
            tracing::warn!("dropping picture without a timestamp");
            return Ok(());
        };
        let timestamp = pts.to_micros(self.info.time_base);
        let number = self.time_to_frame(timestamp);
        self.landed.get_or_insert(timestamp);

        if self.discard_before.is_some_and(|floor| timestamp < floor)
            || self.last_delivered.is_some_and(|(last, _)| timestamp <= last)
        {
            tracing::trace!(timestamp, frame = number, "discarding frame");
            return Ok(());
        }

        let mut frame = Frame::new(decoded.picture, timestamp, number);
        if self.options.output_host && frame.residency() != DecodeType::Software {
            frame = match frame.into_host() {
                Ok(frame) => frame,
                Err(error) => return Err(self.fail(Failure::Decode, into_decode(error))),
            };
        }
        if let Some(filter) = &self.filter {
            frame = filter.process(frame)?;
        }

        tracing::trace!(timestamp, frame = number, "buffered frame");
        if let Some(duplicate) = self.buffer.insert(frame) {
            tracing::debug!(
                timestamp = duplicate.timestamp(),
                "dropping frame with duplicate timestamp"
            );
        }

        if self.options.buffer_policy == BufferPolicy::Evict
            && self.buffer.len() > self.buffer.capacity()
        {
            if let Some(evicted) = self.buffer.pop_front() {
                tracing::warn!(
                    timestamp = evicted.timestamp(),
                    frame = evicted.frame_number(),
                    "buffer full, evicting oldest frame"
                );
                self.last_delivered = Some((evicted.timestamp(), evicted.frame_number()));
            }
        }
        Ok(())
    }

    fn refresh_reorder(&mut self) {
        let reorder = self
            .options
            .reorder_window
            .unwrap_or_else(|| self.decoder.reorder_delay()) as usize;
        if reorder != self.reorder {
            tracing::debug!(from = self.reorder, to = reorder, "reorder window changed");
            self.reorder = reorder;
            self.buffer.set_capacity(buffer_capacity(&self.options, reorder));
        }
    }

    fn fail(&mut self, failure: Failure, error: Error) -> Error {
        tracing::error!(%error, buffered = self.buffer.len(), "stream failed");
        self.failure = Some(failure);
        self.state = StreamState::Ended;
        self.input_done = true;
        self.decoder_drained = true;
        error
    }

    fn update_state(&mut self) {
        self.state = if self.failure.is_some() {
            StreamState::Ended
        } else if self.decoder_drained {
            if self.buffer.is_empty() {
                StreamState::Ended
            } else {
                StreamState::Draining
            }
        } else {
            StreamState::Decoding
        };
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("state", &self.state)
            .field("decode_type", &self.context.decode_type())
            .field("width", &self.width())
            .field("height", &self.height())
            .field("buffered", &self.buffer.len())
            .field("capacity", &self.buffer.capacity())
            .field("failed", &self.failure.is_some())
            .finish_non_exhaustive()
    }
}

// both policies hold a full reorder window, so in-order reads never evict
fn buffer_capacity(options: &DecoderOptions, reorder: usize) -> usize {
    (options.buffer_length as usize).max(reorder + 1)
}

fn into_container(error: Error) -> Error {
    match error {
        Error::Container { .. } => error,
        other => Error::container(other.to_string()),
    }
}

fn into_decode(error: Error) -> Error {
    match error {
        Error::Decode { .. } => error,
        other => Error::decode(other.to_string()),
    }
}

static_assertions::assert_impl_all!(Stream: Send);
