/*!
    Scripted in-memory backends for tests.

    The scripted stream runs at 25 fps with a 1/90000 time base, so frame
    `n` has a timestamp of `n * 40_000` microseconds. Pictures come in
    groups of ten starting with a keyframe, decoded out of presentation
    order the way B-frames are.
*/

use std::any::Any;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use framereader_types::{
    CodecId, DecodeType, EncodeType, EncoderOptions, Error, MediaDuration, Packet, PixelFormat,
    Pts, Rational, Result, TIME_BASE_US, VideoStreamInfo,
};

use crate::backend::{DecoderOutput, Demuxer, VideoDecoder};
use crate::context::DeviceProbe;
use crate::encoder::{EncodeBackend, EncodeParams, PacketSink};
use crate::frame::Frame;
use crate::handles::DeviceResource;
use crate::picture::{DecodedPicture, HostPicture, Picture, PlaneData};

pub const TICKS_PER_FRAME: i64 = 3600;
pub const FRAME_MICROS: i64 = 40_000;
pub const GOP: i64 = 10;
pub const WIDTH: u32 = 16;
pub const HEIGHT: u32 = 8;

const GOP_ORDER: [i64; 10] = [0, 3, 1, 2, 6, 4, 5, 9, 7, 8];

pub fn micros(frame: i64) -> i64 {
    frame * FRAME_MICROS
}

/**
    Frame numbers in decode order for a stream of `frames` pictures.
*/
pub fn decode_order(frames: i64) -> Vec<i64> {
    (0..frames)
        .step_by(GOP as usize)
        .flat_map(|start| GOP_ORDER.iter().map(move |offset| start + offset))
        .filter(|n| *n < frames)
        .collect()
}

pub fn stream_info(frames: i64) -> VideoStreamInfo {
    VideoStreamInfo {
        index: 0,
        codec: CodecId::H264,
        width: WIDTH,
        height: HEIGHT,
        sample_aspect_ratio: Rational::new(1, 1),
        pixel_format: Some(PixelFormat::Yuv420p),
        time_base: Rational::new(1, 90000),
        start: Pts(0),
        duration: MediaDuration(frames * TICKS_PER_FRAME),
        frame_rate: Rational::new(25, 1),
        frame_count: Some(frames as u64),
    }
}

/**
    A demuxer serving one packet per frame, each carrying its frame number.
*/
pub struct ScriptedSource {
    info: VideoStreamInfo,
    order: Vec<i64>,
    position: usize,
    seeks: Arc<AtomicUsize>,
    read_failure: Option<usize>,
    late_seeks: usize,
}

impl ScriptedSource {
    pub fn new(frames: i64) -> Self {
        Self {
            info: stream_info(frames),
            order: decode_order(frames),
            position: 0,
            seeks: Arc::new(AtomicUsize::new(0)),
            read_failure: None,
            late_seeks: 0,
        }
    }

    pub fn with_info(mut self, info: VideoStreamInfo) -> Self {
        self.info = info;
        self
    }

    /**
        Fail every read once `packets` packets have been served.
    */
    pub fn with_read_failure(mut self, packets: usize) -> Self {
        self.read_failure = Some(packets);
        self
    }

    /**
        Land the next `seeks` container seeks one group past the target.
    */
    pub fn with_late_seeks(mut self, seeks: usize) -> Self {
        self.late_seeks = seeks;
        self
    }

    /**
        Counter of container seeks, readable after the source is moved.
    */
    pub fn seek_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.seeks)
    }
}

impl Demuxer for ScriptedSource {
    fn info(&self) -> &VideoStreamInfo {
        &self.info
    }

    fn read_packet(&mut self) -> Result<Option<Packet>> {
        if self.read_failure.is_some_and(|at| self.position >= at) {
            return Err(Error::container("scripted read failure"));
        }
        let Some(&frame) = self.order.get(self.position) else {
            return Ok(None);
        };
        let dts = self.position as i64 * TICKS_PER_FRAME;
        self.position += 1;
        Ok(Some(Packet::new(
            (frame as u32).to_le_bytes().to_vec(),
            Some(Pts(frame * TICKS_PER_FRAME)),
            Some(Pts(dts)),
            MediaDuration(TICKS_PER_FRAME),
            self.info.time_base,
            frame % GOP == 0,
        )))
    }

    fn seek_keyframe(&mut self, target: Pts) -> Result<()> {
        self.seeks.fetch_add(1, Ordering::SeqCst);
        let frame = (target.0 / TICKS_PER_FRAME).max(0);
        let mut keyframe = frame / GOP * GOP;
        if self.late_seeks > 0 {
            self.late_seeks -= 1;
            keyframe += GOP;
        }
        self.position = self
            .order
            .iter()
            .position(|n| *n == keyframe)
            .unwrap_or(self.order.len());
        Ok(())
    }
}

/**
    A decoder that emits each picture as soon as its packet arrives, so
    output follows decode order.
*/
pub struct ScriptedDecoder {
    pending: VecDeque<DecodedPicture>,
    eof: bool,
    need_keyframe: bool,
    failure: Option<(i64, usize)>,
    on_device: bool,
}

impl ScriptedDecoder {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            eof: false,
            need_keyframe: true,
            failure: None,
            on_device: false,
        }
    }

    /**
        Reject the packet of `frame` the next `times` times it is sent.
    */
    pub fn failing_on(mut self, frame: i64, times: usize) -> Self {
        self.failure = Some((frame, times));
        self
    }

    /**
        Emit pictures that live on a (pretend) CUDA device.
    */
    pub fn on_device(mut self) -> Self {
        self.on_device = true;
        self
    }
}

impl VideoDecoder for ScriptedDecoder {
    fn send_packet(&mut self, packet: &Packet) -> Result<()> {
        let frame = i64::from(u32::from_le_bytes([
            packet.data[0],
            packet.data[1],
            packet.data[2],
            packet.data[3],
        ]));
        if let Some((failing, times)) = self.failure.as_mut() {
            if *failing == frame && *times > 0 {
                *times -= 1;
                return Err(Error::decode(format!("scripted failure on frame {frame}")));
            }
        }
        if self.need_keyframe && !packet.is_keyframe {
            return Ok(());
        }
        self.need_keyframe = false;

        let picture = luma_picture(frame);
        let decoded = if self.on_device {
            DecodedPicture::new(DevicePicture(picture), packet.pts)
        } else {
            DecodedPicture::new(picture, packet.pts)
        };
        self.pending.push_back(decoded);
        Ok(())
    }

    fn send_eof(&mut self) -> Result<()> {
        self.eof = true;
        Ok(())
    }

    fn receive(&mut self) -> Result<DecoderOutput> {
        if let Some(picture) = self.pending.pop_front() {
            return Ok(DecoderOutput::Picture(picture));
        }
        if self.eof {
            Ok(DecoderOutput::Drained)
        } else {
            Ok(DecoderOutput::NeedInput)
        }
    }

    fn flush(&mut self) {
        self.pending.clear();
        self.eof = false;
        self.need_keyframe = true;
    }

    fn reorder_delay(&self) -> u32 {
        2
    }
}

/**
    A 16x8 4:2:0 picture whose luma holds the frame number.
*/
pub fn luma_picture(frame: i64) -> HostPicture {
    let mut picture = HostPicture::new(PixelFormat::Yuv420p, WIDTH, HEIGHT);
    picture.fill_plane(0, (frame % 256) as u8);
    picture.fill_plane(1, 128);
    picture.fill_plane(2, 128);
    picture
}

/**
    A host picture reporting CUDA residency.
*/
pub struct DevicePicture(pub HostPicture);

impl Picture for DevicePicture {
    fn width(&self) -> u32 {
        self.0.width()
    }

    fn height(&self) -> u32 {
        self.0.height()
    }

    fn format(&self) -> PixelFormat {
        self.0.format()
    }

    fn residency(&self) -> DecodeType {
        DecodeType::Cuda
    }

    fn plane(&self, index: usize) -> Option<PlaneData<'_>> {
        let data = self.0.plane_data(index)?;
        // SAFETY: the bytes outlive the returned view, which borrows self.
        Some(unsafe {
            PlaneData::device(data.as_ptr(), self.0.stride(index), data.len(), DecodeType::Cuda)
        })
    }

    fn to_host(&self) -> Result<HostPicture> {
        Ok(self.0.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/**
    A device that binds nothing.
*/
#[derive(Debug)]
pub struct FakeDevice {
    pub index: u32,
}

impl DeviceResource for FakeDevice {
    fn decode_type(&self) -> DecodeType {
        DecodeType::Cuda
    }

    fn device_index(&self) -> u32 {
        self.index
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/**
    A probe reporting a fixed number of devices, or a missing driver.
*/
pub struct FakeProbe {
    devices: Option<u32>,
    fail_bind: bool,
    binds: Arc<AtomicUsize>,
}

impl FakeProbe {
    pub fn missing() -> Self {
        Self {
            devices: None,
            fail_bind: false,
            binds: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_devices(devices: u32) -> Self {
        Self {
            devices: Some(devices),
            ..Self::missing()
        }
    }

    pub fn failing_bind(mut self) -> Self {
        self.fail_bind = true;
        self
    }

    pub fn bind_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.binds)
    }
}

impl DeviceProbe for FakeProbe {
    fn device_count(&self, decode_type: DecodeType) -> Result<u32> {
        self.devices
            .ok_or_else(|| Error::unsupported_backend(format!("no {} driver", decode_type.name())))
    }

    fn bind(&self, _decode_type: DecodeType, device: u32) -> Result<Box<dyn DeviceResource>> {
        if self.fail_bind {
            return Err(Error::device_init_failed(format!("device {device} refused")));
        }
        self.binds.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeDevice { index: device }))
    }
}

/**
    What a [`RecordingBackend`] has been asked to do.
*/
#[derive(Debug, Default)]
pub struct EncodeLog {
    pub configured: Option<(EncodeType, u32, bool)>,
    pub frames: Vec<(i64, PixelFormat, u32, u32)>,
    pub finished: usize,
}

/**
    An H.264-only encode backend emitting one packet per frame, holding
    the last frame back until finished.
*/
pub struct RecordingBackend {
    log: Arc<Mutex<EncodeLog>>,
    held: Option<Packet>,
    fail: bool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(EncodeLog::default())),
            held: None,
            fail: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn log(&self) -> Arc<Mutex<EncodeLog>> {
        Arc::clone(&self.log)
    }
}

impl EncodeBackend for RecordingBackend {
    fn supports(&self, codec: EncodeType) -> bool {
        codec == EncodeType::H264
    }

    fn configure(
        &mut self,
        options: &EncoderOptions,
        _params: &EncodeParams,
        global_header: bool,
    ) -> Result<()> {
        self.log.lock().configured = Some((options.codec, options.crf(), global_header));
        Ok(())
    }

    fn stream_header(&self) -> Option<Vec<u8>> {
        Some(vec![0, 0, 0, 1])
    }

    fn encode(&mut self, frame: &Frame) -> Result<Vec<Packet>> {
        if self.fail {
            return Err(Error::encode("scripted encode failure"));
        }
        self.log.lock().frames.push((
            frame.timestamp(),
            frame.pixel_format(),
            frame.width(),
            frame.height(),
        ));
        let packet = Packet::new(
            frame.timestamp().to_le_bytes().to_vec(),
            Some(Pts(frame.timestamp())),
            Some(Pts(frame.timestamp())),
            MediaDuration(FRAME_MICROS),
            TIME_BASE_US,
            true,
        );
        Ok(self.held.replace(packet).into_iter().collect())
    }

    fn finish(&mut self) -> Result<Vec<Packet>> {
        self.log.lock().finished += 1;
        Ok(self.held.take().into_iter().collect())
    }
}

/**
    What a [`RecordingSink`] has been handed.
*/
#[derive(Debug, Default)]
pub struct SinkLog {
    pub headers: usize,
    pub extradata: Option<Vec<u8>>,
    pub packets: Vec<Packet>,
    pub trailers: usize,
}

pub struct RecordingSink {
    log: Arc<Mutex<SinkLog>>,
    global_header: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(SinkLog::default())),
            global_header: false,
        }
    }

    pub fn with_global_header(mut self) -> Self {
        self.global_header = true;
        self
    }

    pub fn log(&self) -> Arc<Mutex<SinkLog>> {
        Arc::clone(&self.log)
    }
}

impl PacketSink for RecordingSink {
    fn needs_global_header(&self) -> bool {
        self.global_header
    }

    fn write_header(
        &mut self,
        _params: &EncodeParams,
        _codec: EncodeType,
        extradata: Option<&[u8]>,
    ) -> Result<()> {
        let mut log = self.log.lock();
        log.headers += 1;
        log.extradata = extradata.map(<[u8]>::to_vec);
        Ok(())
    }

    fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        self.log.lock().packets.push(packet.clone());
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<()> {
        self.log.lock().trailers += 1;
        Ok(())
    }
}

/**
    A writer whose bytes stay readable after it is moved into a sink.
*/
#[derive(Clone, Default)]
pub struct SharedBuffer(pub Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
