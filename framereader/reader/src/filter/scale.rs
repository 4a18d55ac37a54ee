/*!
    Bilinear scaling, applied plane by plane.
*/

use framereader_types::{Rational, Result};

use crate::picture::{HostPicture, Picture};

/**
    A sample type a plane can be stored as.
*/
pub(crate) trait Sample {
    const SIZE: usize;

    fn read(bytes: &[u8]) -> f32;

    fn write(value: f32, out: &mut [u8]);
}

impl Sample for u8 {
    const SIZE: usize = 1;

    #[inline]
    fn read(bytes: &[u8]) -> f32 {
        bytes[0] as f32
    }

    #[inline]
    fn write(value: f32, out: &mut [u8]) {
        out[0] = value.round().clamp(0.0, 255.0) as u8;
    }
}

impl Sample for f32 {
    const SIZE: usize = 4;

    #[inline]
    fn read(bytes: &[u8]) -> f32 {
        f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    #[inline]
    fn write(value: f32, out: &mut [u8]) {
        out[..4].copy_from_slice(&value.to_ne_bytes());
    }
}

/**
    Geometry of one plane: dimensions in samples and interleaved channels.
*/
#[derive(Clone, Copy, Debug)]
pub(crate) struct PlaneGeometry {
    pub width: usize,
    pub height: usize,
    pub stride: usize,
    pub channels: usize,
}

/**
    Resample one plane with bilinear interpolation, pixel centres aligned.
*/
pub(crate) fn scale_plane<S: Sample>(
    src: &[u8],
    src_geometry: PlaneGeometry,
    dst: &mut [u8],
    dst_geometry: PlaneGeometry,
) {
    let PlaneGeometry {
        width: sw,
        height: sh,
        stride: src_stride,
        channels,
    } = src_geometry;
    let PlaneGeometry {
        width: dw,
        height: dh,
        stride: dst_stride,
        ..
    } = dst_geometry;
    if sw == 0 || sh == 0 || dw == 0 || dh == 0 {
        return;
    }

    let x_ratio = sw as f32 / dw as f32;
    let y_ratio = sh as f32 / dh as f32;
    let pixel = channels * S::SIZE;

    for dy in 0..dh {
        let fy = ((dy as f32 + 0.5) * y_ratio - 0.5).clamp(0.0, (sh - 1) as f32);
        let y1 = fy as usize;
        let y2 = (y1 + 1).min(sh - 1);
        let y_frac = fy - y1 as f32;
        let row1 = &src[y1 * src_stride..];
        let row2 = &src[y2 * src_stride..];
        let out = &mut dst[dy * dst_stride..];

        for dx in 0..dw {
            let fx = ((dx as f32 + 0.5) * x_ratio - 0.5).clamp(0.0, (sw - 1) as f32);
            let x1 = fx as usize;
            let x2 = (x1 + 1).min(sw - 1);
            let x_frac = fx - x1 as f32;

            for c in 0..channels {
                let at = |row: &[u8], x: usize| S::read(&row[x * pixel + c * S::SIZE..]);
                let v0 = at(row1, x1) * (1.0 - x_frac) + at(row1, x2) * x_frac;
                let v1 = at(row2, x1) * (1.0 - x_frac) + at(row2, x2) * x_frac;
                let value = v0 * (1.0 - y_frac) + v1 * y_frac;
                S::write(value, &mut out[dx * pixel + c * S::SIZE..]);
            }
        }
    }
}

/**
    Scale a picture to `width` x `height`.

    The output has square pixels: the requested size is its display shape.
*/
pub(crate) fn scale(picture: &HostPicture, width: u32, height: u32) -> Result<HostPicture> {
    let format = picture.format();
    let mut output =
        HostPicture::new(format, width, height).with_sample_aspect_ratio(Rational::new(1, 1));

    for plane in 0..format.plane_count() {
        let channels = format.channels_in_plane(plane);
        let (sw, sh) = picture.plane_size(plane);
        let (dw, dh) = output.plane_size(plane);
        let src_geometry = PlaneGeometry {
            width: sw as usize,
            height: sh as usize,
            stride: picture.stride(plane),
            channels,
        };
        let dst_geometry = PlaneGeometry {
            width: dw as usize,
            height: dh as usize,
            stride: output.stride(plane),
            channels,
        };
        let (Some(src), Some(dst)) = (picture.plane_data(plane), output.plane_mut(plane)) else {
            continue;
        };
        if format.bytes_per_sample() == 4 {
            scale_plane::<f32>(src, src_geometry, dst, dst_geometry);
        } else {
            scale_plane::<u8>(src, src_geometry, dst, dst_geometry);
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use framereader_types::PixelFormat;

    #[test]
    fn same_size_is_identity() {
        let mut picture = HostPicture::new(PixelFormat::Rgb24, 3, 2);
        for (i, value) in picture.plane_mut(0).unwrap().iter_mut().enumerate() {
            *value = (i * 13) as u8;
        }
        let scaled = scale(&picture, 3, 2).unwrap();
        assert_eq!(scaled.plane_data(0), picture.plane_data(0));
    }

    #[test]
    fn constant_plane_stays_constant() {
        let mut picture = HostPicture::new(PixelFormat::Yuv420p, 16, 16);
        picture.fill_plane(0, 200);
        picture.fill_plane(1, 90);
        picture.fill_plane(2, 30);
        let scaled = scale(&picture, 6, 4).unwrap();
        assert_eq!((scaled.width(), scaled.height()), (6, 4));
        assert!(scaled.plane_data(0).unwrap().iter().all(|v| *v == 200));
        assert_eq!(scaled.plane_data(1).unwrap().len(), 6);
        assert!(scaled.plane_data(1).unwrap().iter().all(|v| *v == 90));
        assert!(scaled.plane_data(2).unwrap().iter().all(|v| *v == 30));
    }

    #[test]
    fn upscale_interpolates() {
        let picture =
            HostPicture::from_planes(PixelFormat::Rgbp, 2, 1, vec![vec![0, 100]; 3], vec![2; 3])
                .unwrap();
        let scaled = scale(&picture, 4, 1).unwrap();
        assert_eq!(scaled.row(0, 0), &[0, 25, 75, 100]);
    }

    #[test]
    fn float_planes_scale() {
        let mut picture = HostPicture::new(PixelFormat::Rgbpf32, 2, 2);
        for plane in 0..3 {
            for chunk in picture.plane_mut(plane).unwrap().chunks_exact_mut(4) {
                chunk.copy_from_slice(&0.5f32.to_ne_bytes());
            }
        }
        let scaled = scale(&picture, 1, 1).unwrap();
        let value = <f32 as Sample>::read(scaled.plane_data(1).unwrap());
        assert!((value - 0.5).abs() < 1e-6);
    }
}
