/*!
    Container demuxing.
*/

use std::fmt;
use std::path::Path;

use ffmpeg_next::{codec, ffi, format, media};

use framereader_types::{
    Error, MediaDuration, Packet, Pts, Rational, Result, TIME_BASE_US, VideoStreamInfo,
};

use crate::backend::Demuxer;

use super::{av_error, codec_from_av, pixel_format_from_raw, rational_from_av};

/**
    Reads packets of the best video stream in a media file.
*/
pub struct FileSource {
    input: format::context::Input,
    parameters: codec::Parameters,
    info: VideoStreamInfo,
}

impl FileSource {
    pub fn open(path: &Path) -> Result<Self> {
        super::init()?;
        let input = format::input(path)
            .map_err(|e| Error::container(format!("cannot open {}: {e}", path.display())))?;

        let stream = input
            .streams()
            .best(media::Type::Video)
            .ok_or_else(|| Error::container(format!("{} has no video stream", path.display())))?;
        // a clone owns its data instead of borrowing the format context
        let parameters = stream.parameters().clone();
        let time_base = rational_from_av(stream.time_base());
        if time_base.num <= 0 || time_base.den <= 0 {
            return Err(Error::container("video stream has no time base"));
        }

        let (width, height, pixel_format, sample_aspect_ratio) = unsafe {
            let par = parameters.as_ptr();
            let sar = (*par).sample_aspect_ratio;
            (
                (*par).width.max(0) as u32,
                (*par).height.max(0) as u32,
                pixel_format_from_raw((*par).format),
                if sar.num > 0 && sar.den > 0 {
                    Rational::new(sar.num, sar.den)
                } else {
                    Rational::new(1, 1)
                },
            )
        };

        let start = match stream.start_time() {
            ffi::AV_NOPTS_VALUE => 0,
            start => start,
        };
        let duration = if stream.duration() > 0 {
            stream.duration()
        } else if input.duration() > 0 {
            Rational::rescale(input.duration(), TIME_BASE_US, time_base)
        } else {
            0
        };
        let mut frame_rate = rational_from_av(stream.avg_frame_rate());
        if frame_rate.num <= 0 || frame_rate.den <= 0 {
            frame_rate = rational_from_av(stream.rate());
        }

        let info = VideoStreamInfo {
            index: stream.index(),
            codec: codec_from_av(parameters.id()),
            width,
            height,
            sample_aspect_ratio,
            pixel_format,
            time_base,
            start: Pts(start),
            duration: MediaDuration(duration),
            frame_rate,
            frame_count: u64::try_from(stream.frames()).ok().filter(|n| *n > 0),
        };
        tracing::info!(
            path = %path.display(),
            codec = ?info.codec,
            width,
            height,
            frame_rate = frame_rate.to_f64(),
            "opened video stream"
        );

        Ok(Self {
            input,
            parameters,
            info,
        })
    }

    /**
        Codec parameters of the video stream, for opening a decoder.
    */
    pub fn parameters(&self) -> codec::Parameters {
        self.parameters.clone()
    }
}

impl Demuxer for FileSource {
    fn info(&self) -> &VideoStreamInfo {
        &self.info
    }

    fn read_packet(&mut self) -> Result<Option<Packet>> {
        loop {
            let mut packet = ffmpeg_next::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {}
                Err(ffmpeg_next::Error::Eof) => return Ok(None),
                Err(e) => return Err(Error::container(format!("cannot read packet: {e}"))),
            }
            if packet.stream() != self.info.index {
                continue;
            }
            return Ok(Some(Packet::new(
                packet.data().map(<[u8]>::to_vec).unwrap_or_default(),
                packet.pts().map(Pts),
                packet.dts().map(Pts),
                MediaDuration(packet.duration()),
                self.info.time_base,
                packet.is_key(),
            )));
        }
    }

    fn seek_keyframe(&mut self, target: Pts) -> Result<()> {
        let ret = unsafe {
            ffi::av_seek_frame(
                self.input.as_mut_ptr(),
                self.info.index as i32,
                target.0,
                ffi::AVSEEK_FLAG_BACKWARD as i32,
            )
        };
        if ret < 0 {
            return Err(Error::container(format!(
                "cannot seek to {}: {}",
                target.0,
                av_error(ret)
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSource")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

// SAFETY: The format context is only used through &mut self.
unsafe impl Send for FileSource {}
