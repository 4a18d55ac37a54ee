/*!
    Container muxing.
*/

use std::fmt;
use std::path::{Path, PathBuf};
use std::ptr;

use ffmpeg_next::{ffi, format, media, packet::Flags as PacketFlags};

use framereader_types::{EncodeType, Error, Packet, Rational, Result};

use crate::encoder::{EncodeParams, PacketSink};

use super::{encode_codec_id, pixel_format_to_av, rational_from_av, rational_to_av};

/**
    Writes encoded packets into a media file, the container picked from
    the file extension.
*/
pub struct FileSink {
    output: format::context::Output,
    path: PathBuf,
    stream_index: usize,
    time_base: Rational,
}

impl FileSink {
    pub fn create(path: &Path) -> Result<Self> {
        super::init()?;
        let output = format::output(path)
            .map_err(|e| Error::container(format!("cannot create {}: {e}", path.display())))?;
        Ok(Self {
            output,
            path: path.to_path_buf(),
            stream_index: 0,
            time_base: Rational::new(1, 1),
        })
    }
}

impl PacketSink for FileSink {
    fn needs_global_header(&self) -> bool {
        self.output
            .format()
            .flags()
            .contains(format::Flags::GLOBAL_HEADER)
    }

    fn write_header(
        &mut self,
        params: &EncodeParams,
        codec: EncodeType,
        extradata: Option<&[u8]>,
    ) -> Result<()> {
        let codec_id = encode_codec_id(codec);
        let mut stream = self
            .output
            .add_stream(codec_id)
            .map_err(|e| Error::container(format!("cannot add video stream: {e}")))?;
        stream.set_time_base(rational_to_av(params.time_base));
        stream.set_rate(rational_to_av(params.frame_rate));
        stream.set_avg_frame_rate(rational_to_av(params.frame_rate));

        unsafe {
            let par = (*stream.as_mut_ptr()).codecpar;
            (*par).codec_type = media::Type::Video.into();
            (*par).codec_id = codec_id.into();
            (*par).width = params.width as i32;
            (*par).height = params.height as i32;
            (*par).format = pixel_format_to_av(params.pixel_format) as i32;
            (*par).sample_aspect_ratio = rational_to_av(params.sample_aspect_ratio).into();
            if let Some(extradata) = extradata.filter(|data| !data.is_empty()) {
                let padded = extradata.len() + ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize;
                let buffer = ffi::av_mallocz(padded) as *mut u8;
                if buffer.is_null() {
                    return Err(Error::container("cannot allocate stream extradata"));
                }
                ptr::copy_nonoverlapping(extradata.as_ptr(), buffer, extradata.len());
                (*par).extradata = buffer;
                (*par).extradata_size = extradata.len() as i32;
            }
        }
        self.stream_index = stream.index();

        self.output
            .write_header()
            .map_err(|e| Error::container(format!("cannot write header: {e}")))?;
        // the muxer may pick its own time base
        self.time_base = self
            .output
            .stream(self.stream_index)
            .map(|stream| rational_from_av(stream.time_base()))
            .unwrap_or(params.time_base);
        tracing::debug!(
            path = %self.path.display(),
            ?codec,
            time_base = ?self.time_base,
            "wrote container header"
        );
        Ok(())
    }

    fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        let mut av_packet = ffmpeg_next::Packet::copy(&packet.data);
        av_packet.set_pts(packet.pts.map(|pts| pts.0));
        av_packet.set_dts(packet.dts.map(|dts| dts.0));
        av_packet.set_duration(packet.duration.0);
        if packet.is_keyframe {
            av_packet.set_flags(PacketFlags::KEY);
        }
        av_packet.set_stream(self.stream_index);
        av_packet.rescale_ts(rational_to_av(packet.time_base), rational_to_av(self.time_base));
        av_packet
            .write_interleaved(&mut self.output)
            .map_err(|e| Error::container(format!("cannot write packet: {e}")))
    }

    fn write_trailer(&mut self) -> Result<()> {
        self.output
            .write_trailer()
            .map_err(|e| Error::container(format!("cannot write trailer: {e}")))?;
        tracing::debug!(path = %self.path.display(), "finished container");
        Ok(())
    }
}

impl fmt::Debug for FileSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSink")
            .field("path", &self.path)
            .field("stream_index", &self.stream_index)
            .finish()
    }
}

// SAFETY: The format context is only used through &mut self.
unsafe impl Send for FileSink {}
