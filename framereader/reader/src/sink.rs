/*!
    Elementary stream output.
*/

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use framereader_types::{EncodeType, Packet, Result};

use crate::encoder::{EncodeParams, PacketSink};

/**
    Writes encoded packets back to back, with no container around them,
    e.g. an Annex B `.h264` or `.h265` file.

    Codec parameter sets are expected in band, so the encoder is never
    asked for a global header. Extradata the codec still reports is written
    once, ahead of the first packet.
*/
pub struct StreamSink<W: Write + Send + 'static> {
    writer: W,
    bytes: u64,
    packets: u64,
}

impl StreamSink<BufWriter<File>> {
    /**
        Create (or truncate) a file at `path` to write into.
    */
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write + Send + 'static> StreamSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            bytes: 0,
            packets: 0,
        }
    }

    /**
        Total bytes written, header included.
    */
    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    pub fn packets_written(&self) -> u64 {
        self.packets
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.bytes += data.len() as u64;
        Ok(())
    }
}

impl<W: Write + Send + 'static> PacketSink for StreamSink<W> {
    fn write_header(
        &mut self,
        params: &EncodeParams,
        codec: EncodeType,
        extradata: Option<&[u8]>,
    ) -> Result<()> {
        tracing::debug!(
            ?codec,
            width = params.width,
            height = params.height,
            extradata = extradata.map_or(0, <[u8]>::len),
            "writing elementary stream"
        );
        if let Some(extradata) = extradata {
            self.write_all(extradata)?;
        }
        Ok(())
    }

    fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        self.write_all(&packet.data)?;
        self.packets += 1;
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<()> {
        self.writer.flush()?;
        tracing::debug!(bytes = self.bytes, packets = self.packets, "finished elementary stream");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Encoder;
    use crate::frame::Frame;
    use crate::testing::{RecordingBackend, SharedBuffer, luma_picture};
    use framereader_types::{EncoderOptions, MediaDuration, PixelFormat, Pts, Rational};

    #[test]
    fn writes_header_then_packets() {
        let buffer = SharedBuffer::default();
        let mut sink = StreamSink::new(buffer.clone());
        let params = EncodeParams::new(16, 8, PixelFormat::Yuv420p, Rational::new(25, 1));
        sink.write_header(&params, EncodeType::H264, Some(&[9, 9]))
            .unwrap();
        let packet = Packet::new(
            vec![1, 2, 3],
            Some(Pts(0)),
            None,
            MediaDuration(1),
            Rational::new(1, 25),
            true,
        );
        sink.write_packet(&packet).unwrap();
        sink.write_trailer().unwrap();

        assert_eq!(*buffer.0.lock(), vec![9, 9, 1, 2, 3]);
        assert_eq!(sink.bytes_written(), 5);
        assert_eq!(sink.packets_written(), 1);
        assert!(!sink.needs_global_header());
    }

    #[test]
    fn encoder_into_stream() {
        let buffer = SharedBuffer::default();
        let params = EncodeParams::new(16, 8, PixelFormat::Yuv420p, Rational::new(25, 1));
        let mut encoder = Encoder::open(
            EncoderOptions::default(),
            params,
            Box::new(RecordingBackend::new()),
            Box::new(StreamSink::new(buffer.clone())),
        )
        .unwrap();
        for n in 0..3 {
            let frame = Frame::new(Box::new(luma_picture(n)), n * 40_000, n);
            encoder.send_frame(frame).unwrap();
        }
        encoder.close().unwrap();

        // header plus three 8 byte timestamp packets
        assert_eq!(buffer.0.lock().len(), 4 + 3 * 8);
    }
}
