/*!
    Video encoding through libx264 and libx265.
*/

use std::fmt;

use ffmpeg_next::{
    Dictionary, codec, encoder, format::Pixel, util::frame::video::Video as VideoFrame,
};

use framereader_types::{
    EncodeType, EncoderOptions, Error, MediaDuration, Packet, Pts, Rational, Result, TIME_BASE_US,
};

use crate::encoder::{EncodeBackend, EncodeParams};
use crate::frame::Frame;
use crate::picture::Picture;

use super::{av_plane, pixel_format_to_av, rational_to_av};

/**
    An FFmpeg software encoder.
*/
pub struct FfmpegEncoder {
    kind: EncodeType,
    codec: ffmpeg_next::Codec,
    encoder: Option<encoder::video::Encoder>,
    time_base: Rational,
    clock: CodecClock,
}

/**
    Maps frame timestamps onto the codec time base.

    Frames closer together than one codec tick would share a pts, which
    the encoder rejects, so a colliding pts moves to the tick after the
    previous one.
*/
#[derive(Clone, Copy, Debug)]
struct CodecClock {
    time_base: Rational,
    last: Option<i64>,
}

impl CodecClock {
    fn new(time_base: Rational) -> Self {
        Self {
            time_base,
            last: None,
        }
    }

    fn pts(&mut self, timestamp: i64) -> i64 {
        let mut pts = Rational::rescale(timestamp, TIME_BASE_US, self.time_base);
        if let Some(last) = self.last {
            if pts <= last {
                tracing::warn!(timestamp, pts, last, "frame shares a codec tick, moving it forward");
                pts = last + 1;
            }
        }
        self.last = Some(pts);
        pts
    }
}

impl FfmpegEncoder {
    /**
        Look up the encoder for `kind`. Fails with
        [`Error::UnsupportedCodec`] if FFmpeg was built without it.
    */
    pub fn new(kind: EncodeType) -> Result<Self> {
        super::init()?;
        let name = match kind {
            EncodeType::H264 => "libx264",
            EncodeType::H265 => "libx265",
        };
        let codec = encoder::find_by_name(name)
            .ok_or_else(|| Error::unsupported_codec(format!("{name} is not available")))?;
        Ok(Self {
            kind,
            codec,
            encoder: None,
            time_base: TIME_BASE_US,
            clock: CodecClock::new(TIME_BASE_US),
        })
    }

    fn encoder(&mut self) -> Result<&mut encoder::video::Encoder> {
        self.encoder
            .as_mut()
            .ok_or_else(|| Error::encode("encoder is not configured"))
    }

    fn receive_packets(&mut self) -> Result<Vec<Packet>> {
        let time_base = self.time_base;
        let encoder = self.encoder()?;
        let mut packets = Vec::new();
        loop {
            let mut packet = ffmpeg_next::Packet::empty();
            match encoder.receive_packet(&mut packet) {
                Ok(()) => packets.push(Packet::new(
                    packet.data().map(<[u8]>::to_vec).unwrap_or_default(),
                    packet.pts().map(Pts),
                    packet.dts().map(Pts),
                    MediaDuration(packet.duration()),
                    time_base,
                    packet.is_key(),
                )),
                Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::error::EAGAIN => {
                    break;
                }
                Err(ffmpeg_next::Error::Eof) => break,
                Err(e) => return Err(Error::encode(format!("cannot receive packet: {e}"))),
            }
        }
        Ok(packets)
    }
}

impl EncodeBackend for FfmpegEncoder {
    fn supports(&self, codec: EncodeType) -> bool {
        codec == self.kind
    }

    fn configure(
        &mut self,
        options: &EncoderOptions,
        params: &EncodeParams,
        global_header: bool,
    ) -> Result<()> {
        let context = codec::context::Context::new_with_codec(self.codec);
        let mut video = context
            .encoder()
            .video()
            .map_err(|e| Error::encode(format!("cannot create encoder: {e}")))?;
        video.set_width(params.width);
        video.set_height(params.height);
        video.set_format(Pixel::from(pixel_format_to_av(params.pixel_format)));
        video.set_time_base(rational_to_av(params.time_base));
        video.set_frame_rate(Some(rational_to_av(params.frame_rate)));
        video.set_aspect_ratio(rational_to_av(params.sample_aspect_ratio));
        if global_header {
            video.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let crf = options.crf().to_string();
        let mut settings = Dictionary::new();
        settings.set("preset", options.preset.name());
        settings.set("crf", &crf);
        let opened = video.open_with(settings).map_err(|e| {
            Error::encode(format!("cannot open {}: {e}", self.codec.name()))
        })?;

        tracing::debug!(
            codec = self.codec.name(),
            crf = %crf,
            preset = options.preset.name(),
            global_header,
            "configured encoder"
        );
        self.time_base = params.time_base;
        self.clock = CodecClock::new(params.time_base);
        self.encoder = Some(opened);
        Ok(())
    }

    fn stream_header(&self) -> Option<Vec<u8>> {
        let encoder = self.encoder.as_ref()?;
        unsafe {
            let ctx = encoder.as_ptr();
            let size = usize::try_from((*ctx).extradata_size).ok()?;
            if (*ctx).extradata.is_null() || size == 0 {
                return None;
            }
            Some(std::slice::from_raw_parts((*ctx).extradata, size).to_vec())
        }
    }

    fn encode(&mut self, frame: &Frame) -> Result<Vec<Packet>> {
        let picture = frame
            .host_picture()
            .ok_or_else(|| Error::encode("frame is not in host memory"))?;
        let format = picture.format();
        let mut av_frame = VideoFrame::new(
            Pixel::from(pixel_format_to_av(format)),
            picture.width(),
            picture.height(),
        );
        for plane in 0..picture.plane_count() {
            let index = av_plane(format, plane);
            let stride = av_frame.stride(index);
            let row = picture.row_bytes(plane);
            let (_, rows) = picture.plane_size(plane);
            let data = av_frame.data_mut(index);
            for y in 0..rows as usize {
                data[y * stride..y * stride + row].copy_from_slice(picture.row(plane, y));
            }
        }
        av_frame.set_pts(Some(self.clock.pts(frame.timestamp())));

        self.encoder()?
            .send_frame(&av_frame)
            .map_err(|e| Error::encode(format!("cannot send frame: {e}")))?;
        self.receive_packets()
    }

    fn finish(&mut self) -> Result<Vec<Packet>> {
        match self.encoder()?.send_eof() {
            Ok(()) | Err(ffmpeg_next::Error::Eof) => {}
            Err(e) => return Err(Error::encode(format!("cannot drain encoder: {e}"))),
        }
        self.receive_packets()
    }
}

impl fmt::Debug for FfmpegEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FfmpegEncoder")
            .field("codec", &self.codec.name())
            .field("configured", &self.encoder.is_some())
            .finish()
    }
}

// SAFETY: The codec context is only used through &mut self.
unsafe impl Send for FfmpegEncoder {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_timestamps_get_distinct_ticks() {
        let mut clock = CodecClock::new(Rational::new(1, 25));
        assert_eq!(clock.pts(0), 0);
        assert_eq!(clock.pts(5), 1);
        assert_eq!(clock.pts(80_000), 2);
        assert_eq!(clock.pts(120_000), 3);
        assert_eq!(clock.pts(200_000), 5);
    }

    #[test]
    fn spaced_timestamps_keep_their_ticks() {
        let mut clock = CodecClock::new(Rational::new(1, 25));
        let ticks = [0, 40_000, 80_000, 160_000].map(|timestamp| clock.pts(timestamp));
        assert_eq!(ticks, [0, 1, 2, 4]);
    }
}
