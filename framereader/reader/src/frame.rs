/*!
    Frames handed out by a stream.
*/

use std::fmt;

use framereader_types::{DecodeType, PixelFormat, Rational, Result, display_aspect_ratio};

use crate::handles::FramePtr;
use crate::picture::{HostPicture, Picture, PlaneData};

/**
    A decoded video frame.

    Owns its picture exclusively: frames can be moved but not copied, and
    the picture is released when the frame is dropped. Timestamps are in
    microseconds.
*/
pub struct Frame {
    picture: FramePtr,
    timestamp: i64,
    frame_number: i64,
}

impl Frame {
    pub(crate) fn new(picture: Box<dyn Picture>, timestamp: i64, frame_number: i64) -> Self {
        Self {
            picture: FramePtr::new(picture),
            timestamp,
            frame_number,
        }
    }

    /**
        Presentation timestamp in microseconds.
    */
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /**
        Zero-based position of the frame in the stream.
    */
    pub fn frame_number(&self) -> i64 {
        self.frame_number
    }

    pub fn width(&self) -> u32 {
        self.picture.get().width()
    }

    pub fn height(&self) -> u32 {
        self.picture.get().height()
    }

    pub fn sample_aspect_ratio(&self) -> Rational {
        self.picture.get().sample_aspect_ratio()
    }

    /**
        Display aspect ratio, accounting for non-square pixels.
    */
    pub fn aspect_ratio(&self) -> f64 {
        display_aspect_ratio(self.width(), self.height(), self.sample_aspect_ratio())
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.picture.get().format()
    }

    /**
        Memory space holding the frame data.
    */
    pub fn residency(&self) -> DecodeType {
        self.picture.get().residency()
    }

    pub fn plane_count(&self) -> usize {
        self.pixel_format().plane_count()
    }

    /**
        View a plane of frame data, or None if `plane` is out of range.
    */
    pub fn data(&self, plane: usize) -> Option<PlaneData<'_>> {
        if plane >= self.plane_count() {
            return None;
        }
        self.picture.get().plane(plane)
    }

    pub fn picture(&self) -> &dyn Picture {
        self.picture.get()
    }

    /**
        The frame's host picture, if it is resident in host memory.
    */
    pub fn host_picture(&self) -> Option<&HostPicture> {
        self.picture.get().as_any().downcast_ref::<HostPicture>()
    }

    /**
        Move the frame into host memory. Host frames are returned as is.
    */
    pub fn into_host(self) -> Result<Frame> {
        if self.picture.get().as_any().is::<HostPicture>() {
            return Ok(self);
        }
        let host = self.picture.get().to_host()?;
        Ok(self.with_picture(Box::new(host)))
    }

    /**
        Replace the picture, keeping the timing.
    */
    pub(crate) fn with_picture(self, picture: Box<dyn Picture>) -> Frame {
        Frame {
            picture: FramePtr::new(picture),
            timestamp: self.timestamp,
            frame_number: self.frame_number,
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("timestamp", &self.timestamp)
            .field("frame_number", &self.frame_number)
            .field("width", &self.width())
            .field("height", &self.height())
            .field("format", &self.pixel_format())
            .field("residency", &self.residency())
            .finish()
    }
}

static_assertions::assert_impl_all!(Frame: Send);
static_assertions::assert_not_impl_any!(Frame: Clone);
