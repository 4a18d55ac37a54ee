/*!
    Interfaces to the demuxing and decoding backends a stream drives.
*/

use framereader_types::{Packet, Pts, Result, VideoStreamInfo};

use crate::picture::DecodedPicture;

/**
    A container reader for a single video stream.

    Every failure is reported as [`Error::Container`](framereader_types::Error::Container).
*/
pub trait Demuxer: Send {
    /**
        Metadata of the video stream being read.
    */
    fn info(&self) -> &VideoStreamInfo;

    /**
        Read the next packet of the video stream in decode order.

        Returns None at the end of the container.
    */
    fn read_packet(&mut self) -> Result<Option<Packet>>;

    /**
        Reposition so the next packet read is the keyframe at or before
        `target`, in stream time base units.
    */
    fn seek_keyframe(&mut self, target: Pts) -> Result<()>;
}

/**
    Output of a decoder receive call.
*/
#[derive(Debug)]
pub enum DecoderOutput {
    /// A decoded picture.
    Picture(DecodedPicture),
    /// The decoder needs another packet before it can emit a picture.
    NeedInput,
    /// End of stream was signalled and every picture has been emitted.
    Drained,
}

/**
    A video decoder.

    Pictures may be emitted out of presentation order, but never displaced
    by more than [`reorder_delay`](VideoDecoder::reorder_delay) pictures.
*/
pub trait VideoDecoder: Send {
    /**
        Submit a compressed packet.
    */
    fn send_packet(&mut self, packet: &Packet) -> Result<()>;

    /**
        Signal that no more packets follow, so held pictures can be emitted.
    */
    fn send_eof(&mut self) -> Result<()>;

    /**
        Take the next decoded picture, if one is ready.
    */
    fn receive(&mut self) -> Result<DecoderOutput>;

    /**
        Drop every held picture and reset for decoding from a keyframe.
    */
    fn flush(&mut self);

    /**
        Maximum number of pictures the decoder holds back, i.e. how far a
        picture can be displaced from presentation order.
    */
    fn reorder_delay(&self) -> u32;
}
