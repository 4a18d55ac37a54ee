/*!
    Video decoding.
*/

use std::any::Any;
use std::fmt;

use ffmpeg_next::{
    codec, decoder, ffi, packet::Flags as PacketFlags, util::frame::video::Video as VideoFrame,
};

use framereader_types::{DecodeType, Error, Packet, PixelFormat, Pts, Rational, Result};

use crate::backend::{DecoderOutput, VideoDecoder};
use crate::context::{DecoderContext, FormatPolicy};
use crate::picture::{DecodedPicture, HostPicture, Picture, PlaneData};

use super::hw::{HwDeviceRef, install_format_policy};
use super::{av_error, av_plane, pixel_format_from_av, rational_to_av};

/**
    Decodes packets of one video stream.
*/
pub struct FfmpegVideoDecoder {
    decoder: decoder::Video,
    time_base: Rational,
}

impl FfmpegVideoDecoder {
    /**
        Open a decoder for `parameters`, on the device bound to `context`
        if it has one.
    */
    pub fn new(
        parameters: codec::Parameters,
        time_base: Rational,
        context: &DecoderContext,
        policy: FormatPolicy,
    ) -> Result<Self> {
        super::init()?;
        let mut codec_context = codec::context::Context::from_parameters(parameters)
            .map_err(|e| Error::decode(format!("invalid codec parameters: {e}")))?;

        let device = match context.device() {
            Some(device) => Some(device.downcast_ref::<HwDeviceRef>().ok_or_else(|| {
                Error::device_init_failed("device binding is not an FFmpeg device context")
            })?),
            None => None,
        };

        unsafe {
            let ctx = codec_context.as_mut_ptr();
            (*ctx).pkt_timebase = rational_to_av(time_base).into();
            if let Some(device) = device {
                (*ctx).hw_device_ctx = device.create_ref();
            }
            install_format_policy(ctx, policy);
        }

        let id = codec_context.id();
        let decoder = codec_context.decoder().video().map_err(|e| match e {
            ffmpeg_next::Error::DecoderNotFound => {
                Error::unsupported_codec(format!("no decoder for {id:?}"))
            }
            e => Error::decode(format!("cannot open {id:?} decoder: {e}")),
        })?;
        tracing::debug!(
            codec = ?id,
            decode_type = context.decode_type().name(),
            "opened video decoder"
        );

        Ok(Self { decoder, time_base })
    }
}

impl VideoDecoder for FfmpegVideoDecoder {
    fn send_packet(&mut self, packet: &Packet) -> Result<()> {
        let rescale = |pts: Pts| Rational::rescale(pts.0, packet.time_base, self.time_base);
        let mut av_packet = ffmpeg_next::Packet::copy(&packet.data);
        av_packet.set_pts(packet.pts.map(rescale));
        av_packet.set_dts(packet.dts.map(rescale));
        av_packet.set_duration(Rational::rescale(
            packet.duration.0,
            packet.time_base,
            self.time_base,
        ));
        if packet.is_keyframe {
            av_packet.set_flags(PacketFlags::KEY);
        }
        self.decoder
            .send_packet(&av_packet)
            .map_err(|e| Error::decode(format!("cannot send packet: {e}")))
    }

    fn send_eof(&mut self) -> Result<()> {
        match self.decoder.send_eof() {
            Ok(()) | Err(ffmpeg_next::Error::Eof) => Ok(()),
            Err(e) => Err(Error::decode(format!("cannot drain decoder: {e}"))),
        }
    }

    fn receive(&mut self) -> Result<DecoderOutput> {
        let mut frame = VideoFrame::empty();
        match self.decoder.receive_frame(&mut frame) {
            Ok(()) => {
                let pts = frame.timestamp().or(frame.pts()).map(Pts);
                let picture = FfmpegPicture::from_frame(frame)?;
                Ok(DecoderOutput::Picture(DecodedPicture::new(picture, pts)))
            }
            Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::error::EAGAIN => {
                Ok(DecoderOutput::NeedInput)
            }
            Err(ffmpeg_next::Error::Eof) => Ok(DecoderOutput::Drained),
            Err(e) => Err(Error::decode(format!("cannot decode: {e}"))),
        }
    }

    fn flush(&mut self) {
        self.decoder.flush();
    }

    fn reorder_delay(&self) -> u32 {
        unsafe { (*self.decoder.as_ptr()).has_b_frames.max(0) as u32 }
    }
}

impl fmt::Debug for FfmpegVideoDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FfmpegVideoDecoder")
            .field("time_base", &self.time_base)
            .field("reorder_delay", &self.reorder_delay())
            .finish()
    }
}

// SAFETY: The codec context is only used through &mut self.
unsafe impl Send for FfmpegVideoDecoder {}

/**
    A decoded FFmpeg frame, in host memory or on a CUDA device.
*/
pub struct FfmpegPicture {
    frame: VideoFrame,
    format: PixelFormat,
    residency: DecodeType,
}

impl FfmpegPicture {
    pub(crate) fn from_frame(frame: VideoFrame) -> Result<Self> {
        let av_format = ffi::AVPixelFormat::from(frame.format());
        let (format, residency) = if av_format == ffi::AVPixelFormat::AV_PIX_FMT_CUDA {
            (device_sw_format(&frame)?, DecodeType::Cuda)
        } else {
            let format = pixel_format_from_av(av_format).ok_or_else(|| {
                Error::unsupported_format(format!("decoder produced {av_format:?}"))
            })?;
            (format, DecodeType::Software)
        };

        let linesize = unsafe { (*frame.as_ptr()).linesize };
        if linesize[..format.plane_count()].iter().any(|l| *l <= 0) {
            return Err(Error::unsupported_format("bottom-up pictures are not supported"));
        }

        Ok(Self {
            frame,
            format,
            residency,
        })
    }

    fn download(&self) -> Result<VideoFrame> {
        let mut sw_frame = VideoFrame::empty();
        unsafe {
            let ret = ffi::av_hwframe_transfer_data(sw_frame.as_mut_ptr(), self.frame.as_ptr(), 0);
            if ret < 0 {
                return Err(Error::decode(format!(
                    "cannot download device frame: {}",
                    av_error(ret)
                )));
            }
            (*sw_frame.as_mut_ptr()).pts = (*self.frame.as_ptr()).pts;
            (*sw_frame.as_mut_ptr()).sample_aspect_ratio =
                (*self.frame.as_ptr()).sample_aspect_ratio;
        }
        Ok(sw_frame)
    }

    /// Address, stride and byte length of our plane `plane`.
    fn raw_plane(&self, plane: usize) -> Option<(*const u8, usize, usize)> {
        if plane >= self.format.plane_count() {
            return None;
        }
        let index = av_plane(self.format, plane);
        let (_, rows) = self.format.plane_size(plane, self.width(), self.height());
        unsafe {
            let frame = self.frame.as_ptr();
            let data = (*frame).data[index];
            if data.is_null() {
                return None;
            }
            let stride = (*frame).linesize[index] as usize;
            Some((data as *const u8, stride, stride * rows as usize))
        }
    }
}

impl Picture for FfmpegPicture {
    fn width(&self) -> u32 {
        self.frame.width()
    }

    fn height(&self) -> u32 {
        self.frame.height()
    }

    fn format(&self) -> PixelFormat {
        self.format
    }

    fn residency(&self) -> DecodeType {
        self.residency
    }

    fn sample_aspect_ratio(&self) -> Rational {
        let sar = unsafe { (*self.frame.as_ptr()).sample_aspect_ratio };
        if sar.num > 0 && sar.den > 0 {
            Rational::new(sar.num, sar.den)
        } else {
            Rational::new(1, 1)
        }
    }

    fn plane(&self, index: usize) -> Option<PlaneData<'_>> {
        let (ptr, stride, len) = self.raw_plane(index)?;
        match self.residency {
            DecodeType::Software => {
                // SAFETY: the frame owns at least linesize * rows bytes per plane
                let data = unsafe { std::slice::from_raw_parts(ptr, len) };
                Some(PlaneData::host(data, stride))
            }
            // SAFETY: the device surface lives as long as the frame
            residency => Some(unsafe { PlaneData::device(ptr, stride, len, residency) }),
        }
    }

    fn to_host(&self) -> Result<HostPicture> {
        if self.residency != DecodeType::Software {
            return FfmpegPicture::from_frame(self.download()?)?.to_host();
        }
        let mut planes = Vec::with_capacity(self.format.plane_count());
        for index in 0..self.format.plane_count() {
            let plane = self.plane(index).and_then(|p| p.as_slice().map(|s| (s, p.stride())));
            planes.push(plane.ok_or_else(|| {
                Error::unsupported_format(format!("frame is missing plane {index}"))
            })?);
        }
        Ok(
            HostPicture::copy_from_planes(self.format, self.width(), self.height(), &planes)?
                .with_sample_aspect_ratio(self.sample_aspect_ratio()),
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for FfmpegPicture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FfmpegPicture")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("format", &self.format)
            .field("residency", &self.residency)
            .finish()
    }
}

// SAFETY: The frame is reference-counted and never shared mutably.
unsafe impl Send for FfmpegPicture {}

fn device_sw_format(frame: &VideoFrame) -> Result<PixelFormat> {
    let sw_format = unsafe {
        let frames = (*frame.as_ptr()).hw_frames_ctx;
        if frames.is_null() {
            return Err(Error::decode("device frame has no frames context"));
        }
        (*((*frames).data as *const ffi::AVHWFramesContext)).sw_format
    };
    pixel_format_from_av(sw_format)
        .ok_or_else(|| Error::unsupported_format(format!("device surface holds {sw_format:?}")))
}
