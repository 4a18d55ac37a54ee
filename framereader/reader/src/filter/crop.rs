/*!
    Cropping.
*/

use framereader_types::{Crop, Error, Resolution, Result};

use crate::picture::{HostPicture, Picture};

/**
    Cut `crop` off the edges of a picture.
*/
pub(crate) fn crop(picture: &HostPicture, crop: Crop) -> Result<HostPicture> {
    let size = crop
        .cropped_size(picture.width(), picture.height())
        .ok_or_else(|| {
            Error::invalid_parameters(format!(
                "crop {crop:?} removes the whole {}x{} frame",
                picture.width(),
                picture.height()
            ))
        })?;

    let format = picture.format();
    let mut output = HostPicture::new(format, size.width, size.height)
        .with_sample_aspect_ratio(picture.sample_aspect_ratio());

    for plane in 0..format.plane_count() {
        let window = PlaneWindow::new(picture, plane, crop, size);
        for y in 0..window.rows {
            output.row_mut(plane, y).copy_from_slice(window.row(picture, y));
        }
    }

    Ok(output)
}

/**
    The part of one plane left by a crop, in bytes and rows.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct PlaneWindow {
    plane: usize,
    offset: usize,
    top: usize,
    row_bytes: usize,
    pub(crate) rows: usize,
}

impl PlaneWindow {
    /**
        Window of `plane` for a crop leaving `size` pixels. Chroma planes
        are cut at the subsampled offset, rounding down.
    */
    pub(crate) fn new(picture: &HostPicture, plane: usize, crop: Crop, size: Resolution) -> Self {
        let format = picture.format();
        let (shift_x, shift_y) = if plane == 0 { (0, 0) } else { format.chroma_shift() };
        let sample_bytes = format.channels_in_plane(plane) * format.bytes_per_sample();
        let (src_width, src_height) = picture.plane_size(plane);
        let (width, height) = format.plane_size(plane, size.width, size.height);
        let left = ((crop.left >> shift_x) as usize).min((src_width - width) as usize);
        let top = ((crop.top >> shift_y) as usize).min((src_height - height) as usize);
        Self {
            plane,
            offset: left * sample_bytes,
            top,
            row_bytes: width as usize * sample_bytes,
            rows: height as usize,
        }
    }

    pub(crate) fn row<'a>(&self, picture: &'a HostPicture, y: usize) -> &'a [u8] {
        &picture.row(self.plane, self.top + y)[self.offset..self.offset + self.row_bytes]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framereader_types::PixelFormat;

    fn gradient(format: PixelFormat, width: u32, height: u32) -> HostPicture {
        let mut picture = HostPicture::new(format, width, height);
        for plane in 0..format.plane_count() {
            let (_, rows) = picture.plane_size(plane);
            for y in 0..rows as usize {
                for (x, value) in picture.row_mut(plane, y).iter_mut().enumerate() {
                    *value = (y * 16 + x) as u8;
                }
            }
        }
        picture
    }

    #[test]
    fn crops_luma_and_chroma() {
        let picture = gradient(PixelFormat::Yuv420p, 8, 8);
        let cropped = crop(&picture, Crop::new(2, 2, 4, 0)).unwrap();
        assert_eq!((cropped.width(), cropped.height()), (4, 4));
        assert_eq!(cropped.row(0, 0), &[36, 37, 38, 39]);
        assert_eq!(cropped.row(1, 0), &[18, 19]);
        assert_eq!(cropped.row(2, 1), &[34, 35]);
    }

    #[test]
    fn crops_packed_pixels() {
        let picture = gradient(PixelFormat::Rgb24, 4, 2);
        let cropped = crop(&picture, Crop::new(1, 0, 1, 2)).unwrap();
        assert_eq!((cropped.width(), cropped.height()), (1, 1));
        assert_eq!(cropped.row(0, 0), &[19, 20, 21]);
    }

    #[test]
    fn rejects_crop_beyond_bounds() {
        let picture = gradient(PixelFormat::Yuv420p, 8, 8);
        let result = crop(&picture, Crop::new(4, 4, 0, 0));
        assert!(matches!(result, Err(Error::InvalidParameters { .. })));
    }
}
