/*!
    Crop, scale and pixel format conversion through swscale.

    The crop window is copied into the source frame, so swscale only ever
    sees the part of the picture that survives the crop.
*/

use ffmpeg_next::ffi;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use ffmpeg_next::util::frame::video::Video as VideoFrame;

use framereader_types::{Crop, Error, PixelFormat, Rational, Resolution, Result};

use crate::ffmpeg::{av_plane, pixel_format_to_av};
use crate::picture::{HostPicture, Picture};

use super::crop::PlaneWindow;

/**
    Returns true if swscale reads `input` and writes `output`.
*/
pub(crate) fn is_supported(input: PixelFormat, output: PixelFormat) -> bool {
    // SAFETY: both only look up static format tables.
    unsafe {
        ffi::sws_isSupportedInput(pixel_format_to_av(input)) > 0
            && ffi::sws_isSupportedOutput(pixel_format_to_av(output)) > 0
    }
}

/**
    Crop `picture`, then scale it to `scale` (if any) and convert it to
    `format` in a single swscale pass.
*/
pub(crate) fn transform(
    picture: &HostPicture,
    crop: Crop,
    scale: Option<Resolution>,
    format: PixelFormat,
) -> Result<HostPicture> {
    let cropped = crop
        .cropped_size(picture.width(), picture.height())
        .ok_or_else(|| {
            Error::invalid_parameters(format!(
                "crop {crop:?} removes the whole {}x{} frame",
                picture.width(),
                picture.height()
            ))
        })?;
    let size = scale.unwrap_or(cropped);

    let source = cropped_frame(picture, crop, cropped);
    let mut scaler = ScalingContext::get(
        source.format(),
        cropped.width,
        cropped.height,
        Pixel::from(pixel_format_to_av(format)),
        size.width,
        size.height,
        ScalingFlags::BILINEAR,
    )
    .map_err(|e| {
        Error::unsupported_format(format!(
            "cannot scale {:?} to {format:?}: {e}",
            picture.format()
        ))
    })?;
    let mut output = VideoFrame::empty();
    scaler
        .run(&source, &mut output)
        .map_err(|e| Error::unsupported_format(format!("swscale failed: {e}")))?;

    let planes = (0..format.plane_count())
        .map(|plane| {
            let index = av_plane(format, plane);
            (output.data(index), output.stride(index))
        })
        .collect::<Vec<_>>();
    let sample_aspect_ratio = if scale.is_some() {
        Rational::new(1, 1)
    } else {
        picture.sample_aspect_ratio()
    };
    Ok(HostPicture::copy_from_planes(format, size.width, size.height, &planes)?
        .with_sample_aspect_ratio(sample_aspect_ratio))
}

fn cropped_frame(picture: &HostPicture, crop: Crop, size: Resolution) -> VideoFrame {
    let format = picture.format();
    let mut frame = VideoFrame::new(
        Pixel::from(pixel_format_to_av(format)),
        size.width,
        size.height,
    );
    for plane in 0..format.plane_count() {
        let window = PlaneWindow::new(picture, plane, crop, size);
        let index = av_plane(format, plane);
        let stride = frame.stride(index);
        let data = frame.data_mut(index);
        for y in 0..window.rows {
            let row = window.row(picture, y);
            data[y * stride..y * stride + row.len()].copy_from_slice(row);
        }
    }
    frame
}
