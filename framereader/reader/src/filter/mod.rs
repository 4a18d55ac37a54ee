/*!
    Frame post-processing: crop, then scale, then pixel format conversion.

    Filtering runs on host memory. Frames resident on a device are copied
    to the host first, and a filter that would change nothing hands the
    input back untouched.

    With the `ffmpeg` feature, scaling and conversion go through swscale.
    The built-in implementations cover builds without FFmpeg and formats
    swscale cannot handle.
*/

mod convert;
mod crop;
mod scale;
#[cfg(feature = "ffmpeg")]
mod swscale;

use framereader_types::{Crop, DecoderOptions, Error, PixelFormat, Resolution, Result};

use crate::frame::Frame;
use crate::picture::{HostPicture, Picture};

/**
    A configured crop, scale and format conversion chain.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Filter {
    crop: Crop,
    scale: Resolution,
    format: Option<PixelFormat>,
}

impl Filter {
    /**
        Create a filter. A scale with only one non-zero dimension is
        [`Error::InvalidParameters`].
    */
    pub fn new(crop: Crop, scale: Resolution, format: Option<PixelFormat>) -> Result<Self> {
        if scale.is_partial() {
            return Err(Error::invalid_parameters(format!(
                "scale {}x{} sets only one dimension",
                scale.width, scale.height
            )));
        }
        Ok(Self {
            crop,
            scale,
            format,
        })
    }

    /**
        The filter described by decoder options, or None if they ask for no
        post-processing.
    */
    pub fn from_options(options: &DecoderOptions) -> Result<Option<Self>> {
        if !options.needs_filter() {
            return Ok(None);
        }
        Self::new(options.crop, options.scale, options.format).map(Some)
    }

    pub fn crop(&self) -> Crop {
        self.crop
    }

    pub fn scale(&self) -> Resolution {
        self.scale
    }

    pub fn format(&self) -> Option<PixelFormat> {
        self.format
    }

    /**
        Returns true if the filter never changes a frame.
    */
    pub fn is_noop(&self) -> bool {
        self.crop.is_noop() && self.scale.is_noop() && self.format.is_none()
    }

    /**
        Size of the filtered output for an input of `width` x `height`,
        or None if the crop removes the whole picture.
    */
    pub fn output_size(&self, width: u32, height: u32) -> Option<Resolution> {
        let cropped = self.crop.cropped_size(width, height)?;
        if self.scale.is_noop() {
            Some(cropped)
        } else {
            Some(self.scale)
        }
    }

    /**
        Run the filter over a frame, keeping its timestamp and frame number.
    */
    pub fn process(&self, frame: Frame) -> Result<Frame> {
        Self::apply(frame, self.crop, self.scale, self.format)
    }

    /**
        Crop, scale and convert a single frame without building a filter.
    */
    pub fn apply(
        frame: Frame,
        crop: Crop,
        scale: Resolution,
        format: Option<PixelFormat>,
    ) -> Result<Frame> {
        if scale.is_partial() {
            return Err(Error::invalid_parameters(format!(
                "scale {}x{} sets only one dimension",
                scale.width, scale.height
            )));
        }

        let cropped = crop
            .cropped_size(frame.width(), frame.height())
            .ok_or_else(|| {
                Error::invalid_parameters(format!(
                    "crop {crop:?} removes the whole {}x{} frame",
                    frame.width(),
                    frame.height()
                ))
            })?;
        let resize = !scale.is_noop() && scale != cropped;
        let reformat = format.is_some_and(|format| format != frame.pixel_format());
        if crop.is_noop() && !resize && !reformat {
            return Ok(frame);
        }

        let frame = frame.into_host()?;
        let host = frame
            .host_picture()
            .ok_or_else(|| Error::unsupported_format("frame could not be moved to host memory"))?;
        let picture = filter_picture(host, crop, resize.then_some(scale), format)?;
        Ok(frame.with_picture(Box::new(picture)))
    }
}

fn filter_picture(
    picture: &HostPicture,
    crop: Crop,
    scale: Option<Resolution>,
    format: Option<PixelFormat>,
) -> Result<HostPicture> {
    #[cfg(feature = "ffmpeg")]
    {
        let target = format.unwrap_or(picture.format());
        let reformat = target != picture.format();
        if (scale.is_some() || reformat) && swscale::is_supported(picture.format(), target) {
            return swscale::transform(picture, crop, scale, target);
        }
    }

    let mut output = if crop.is_noop() {
        None
    } else {
        Some(crop::crop(picture, crop)?)
    };
    if let Some(size) = scale {
        let source = output.as_ref().unwrap_or(picture);
        output = Some(scale::scale(source, size.width, size.height)?);
    }
    if let Some(format) = format {
        let source = output.as_ref().unwrap_or(picture);
        if source.format() != format {
            output = Some(convert::convert(source, format)?);
        }
    }
    Ok(output.unwrap_or_else(|| picture.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(format: PixelFormat, width: u32, height: u32) -> Frame {
        let mut picture = HostPicture::new(format, width, height);
        for plane in 0..format.plane_count() {
            for (i, value) in picture.plane_mut(plane).unwrap().iter_mut().enumerate() {
                *value = (i % 251) as u8;
            }
        }
        Frame::new(Box::new(picture), 120_000, 3)
    }

    #[test]
    fn partial_scale_rejected() {
        let result = Filter::new(Crop::default(), Resolution::new(640, 0), None);
        assert!(matches!(result, Err(Error::InvalidParameters { .. })));
    }

    #[test]
    fn options_without_filtering() {
        let options = DecoderOptions::default();
        assert_eq!(Filter::from_options(&options).unwrap(), None);
        let options = options.with_scale(320, 240);
        let filter = Filter::from_options(&options).unwrap().unwrap();
        assert_eq!(filter.output_size(1920, 1080), Some(Resolution::new(320, 240)));
    }

    #[test]
    fn noop_returns_input() {
        let input = frame(PixelFormat::Yuv420p, 8, 4);
        let expected = input.host_picture().unwrap().clone();
        let filter = Filter::new(
            Crop::default(),
            Resolution::new(8, 4),
            Some(PixelFormat::Yuv420p),
        )
        .unwrap();
        let output = filter.process(input).unwrap();
        assert_eq!(output.host_picture(), Some(&expected));
        assert_eq!(output.timestamp(), 120_000);
        assert_eq!(output.frame_number(), 3);
    }

    #[test]
    fn default_arguments_leave_frame_alone() {
        let input = frame(PixelFormat::Nv12, 6, 4);
        let expected = input.host_picture().unwrap().clone();
        let output = Filter::apply(input, Crop::default(), Resolution::default(), None).unwrap();
        assert_eq!(output.host_picture(), Some(&expected));
        assert_eq!(output.data(0).unwrap().as_slice(), expected.plane_data(0));
        assert_eq!(output.data(1).unwrap().as_slice(), expected.plane_data(1));
        assert_eq!((output.timestamp(), output.frame_number()), (120_000, 3));
    }

    #[test]
    fn crop_scale_convert_chain() {
        let filter = Filter::new(
            Crop::new(0, 0, 2, 2),
            Resolution::new(2, 2),
            Some(PixelFormat::Rgb24),
        )
        .unwrap();
        let output = filter.process(frame(PixelFormat::Yuv420p, 8, 4)).unwrap();
        assert_eq!((output.width(), output.height()), (2, 2));
        assert_eq!(output.pixel_format(), PixelFormat::Rgb24);
        assert_eq!(output.frame_number(), 3);
        assert_eq!(output.data(0).unwrap().len(), 12);
    }

    #[test]
    fn oversized_crop_rejected() {
        let result = Filter::apply(
            frame(PixelFormat::Rgb24, 4, 4),
            Crop::new(2, 2, 0, 0),
            Resolution::default(),
            None,
        );
        assert!(matches!(result, Err(Error::InvalidParameters { .. })));
    }
}
