/*!
    Stream metadata.
*/

use crate::{CodecId, MediaDuration, PixelFormat, Pts, Rational, TIME_BASE_US};

/**
    Metadata of a video stream, read from the container header.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct VideoStreamInfo {
    /// Index of the stream within its container.
    pub index: usize,
    /// Codec of the compressed data.
    pub codec: CodecId,
    /// Coded picture width in pixels.
    pub width: u32,
    /// Coded picture height in pixels.
    pub height: u32,
    /// Shape of a single pixel, 1/1 for square pixels.
    pub sample_aspect_ratio: Rational,
    /// Pixel format the decoder produces, if known up front.
    pub pixel_format: Option<PixelFormat>,
    /// Time base of the stream's timestamps.
    pub time_base: Rational,
    /// Timestamp of the first picture.
    pub start: Pts,
    /// Stream duration.
    pub duration: MediaDuration,
    /// Average frame rate.
    pub frame_rate: Rational,
    /// Number of frames, if the container records it.
    pub frame_count: Option<u64>,
}

impl VideoStreamInfo {
    /**
        Returns the start time in microseconds.
    */
    pub fn start_micros(&self) -> i64 {
        self.start.to_micros(self.time_base)
    }

    /**
        Returns the duration in microseconds.
    */
    pub fn duration_micros(&self) -> i64 {
        self.duration.to_micros(self.time_base)
    }

    /**
        Returns the average interval between frames in microseconds.
    */
    pub fn frame_interval_micros(&self) -> i64 {
        if self.frame_rate.is_zero() {
            return 0;
        }
        Rational::rescale(1, self.frame_rate.invert(), TIME_BASE_US)
    }

    /**
        Returns the display aspect ratio, accounting for non-square pixels.
    */
    pub fn display_aspect_ratio(&self) -> f64 {
        display_aspect_ratio(self.width, self.height, self.sample_aspect_ratio)
    }

    /**
        Returns the number of frames, estimated from the duration and frame
        rate when the container does not record it.
    */
    pub fn total_frames(&self) -> u64 {
        if let Some(count) = self.frame_count.filter(|count| *count > 0) {
            return count;
        }
        if self.frame_rate.is_zero() {
            return 0;
        }
        let frames = Rational::rescale(
            self.duration_micros(),
            TIME_BASE_US,
            self.frame_rate.invert(),
        );
        frames.max(0) as u64
    }
}

/**
    Compute a display aspect ratio from a picture size and sample aspect ratio.

    A zero or invalid sample aspect ratio is treated as square pixels.
*/
pub fn display_aspect_ratio(width: u32, height: u32, sample_aspect_ratio: Rational) -> f64 {
    if height == 0 {
        return 0.0;
    }
    let sar = if sample_aspect_ratio.is_zero() || sample_aspect_ratio.num < 0 {
        1.0
    } else {
        sample_aspect_ratio.to_f64()
    };
    width as f64 * sar / height as f64
}
