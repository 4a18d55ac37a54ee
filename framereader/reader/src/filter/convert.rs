/*!
    Pixel format conversion.

    Conversions between YUV and RGB go through a full resolution float
    intermediate using BT.601 limited range coefficients. Conversions between
    two YUV layouts keep luma untouched and only resample chroma.
*/

use framereader_types::{PixelFormat, Result};

use crate::filter::scale::{PlaneGeometry, Sample, scale_plane};
use crate::picture::{HostPicture, Picture};

/**
    Convert a picture to `target`. Same-format conversion is a copy.
*/
pub(crate) fn convert(picture: &HostPicture, target: PixelFormat) -> Result<HostPicture> {
    let source = picture.format();
    if source == target {
        return Ok(picture.clone());
    }
    let output = if source.is_yuv() && target.is_yuv() {
        yuv_to_yuv(picture, target)
    } else {
        let mut planar = Planar::read(picture);
        if target.is_yuv() {
            planar.to_yuv();
        } else {
            planar.to_rgb();
        }
        planar.write(target)
    };
    Ok(output.with_sample_aspect_ratio(picture.sample_aspect_ratio()))
}

fn yuv_to_yuv(picture: &HostPicture, target: PixelFormat) -> HostPicture {
    let mut output = HostPicture::new(target, picture.width(), picture.height());
    for y in 0..picture.height() as usize {
        output.row_mut(0, y).copy_from_slice(picture.row(0, y));
    }

    let (src_width, src_height) = picture.plane_size(1);
    let (dst_width, dst_height) = output.plane_size(1);
    let [u, v] = chroma_planes(picture);
    let [u, v] = [u, v].map(|plane| {
        if (src_width, src_height) == (dst_width, dst_height) {
            return plane;
        }
        let mut resampled = vec![0u8; dst_width as usize * dst_height as usize];
        scale_plane::<u8>(
            &plane,
            geometry(src_width, src_height, 1),
            &mut resampled,
            geometry(dst_width, dst_height, 1),
        );
        resampled
    });
    store_chroma(&mut output, &u, &v);
    output
}

fn geometry(width: u32, height: u32, channels: usize) -> PlaneGeometry {
    PlaneGeometry {
        width: width as usize,
        height: height as usize,
        stride: width as usize * channels,
        channels,
    }
}

/**
    The U and V planes of a YUV picture, tightly packed.
*/
fn chroma_planes(picture: &HostPicture) -> [Vec<u8>; 2] {
    let (width, height) = picture.plane_size(1);
    let (width, height) = (width as usize, height as usize);
    let mut u = Vec::with_capacity(width * height);
    let mut v = Vec::with_capacity(width * height);
    for y in 0..height {
        if picture.format() == PixelFormat::Nv12 {
            for pair in picture.row(1, y).chunks_exact(2) {
                u.push(pair[0]);
                v.push(pair[1]);
            }
        } else {
            u.extend_from_slice(picture.row(1, y));
            v.extend_from_slice(picture.row(2, y));
        }
    }
    [u, v]
}

fn store_chroma(output: &mut HostPicture, u: &[u8], v: &[u8]) {
    let (width, height) = output.plane_size(1);
    let width = width as usize;
    for y in 0..height as usize {
        let (u_row, v_row) = (&u[y * width..(y + 1) * width], &v[y * width..(y + 1) * width]);
        if output.format() == PixelFormat::Nv12 {
            for (x, pair) in output.row_mut(1, y).chunks_exact_mut(2).enumerate() {
                pair[0] = u_row[x];
                pair[1] = v_row[x];
            }
        } else {
            output.row_mut(1, y).copy_from_slice(u_row);
            output.row_mut(2, y).copy_from_slice(v_row);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Family {
    Yuv,
    Rgb,
}

/**
    Full resolution 4:4:4 intermediate. YUV is held as 8-bit code values,
    RGB and alpha as 0.0..=1.0.
*/
struct Planar {
    width: usize,
    height: usize,
    family: Family,
    channels: [Vec<f32>; 3],
    alpha: Option<Vec<f32>>,
}

impl Planar {
    fn read(picture: &HostPicture) -> Self {
        let format = picture.format();
        let width = picture.width() as usize;
        let height = picture.height() as usize;
        let samples = width * height;
        let mut channels: [Vec<f32>; 3] = std::array::from_fn(|_| Vec::with_capacity(samples));
        let mut alpha = None;

        if format.is_yuv() {
            for y in 0..height {
                channels[0].extend(picture.row(0, y).iter().map(|v| *v as f32));
            }
            let (chroma_width, chroma_height) = picture.plane_size(1);
            let [u, v] = chroma_planes(picture);
            for (channel, plane) in [(1, u), (2, v)] {
                let full = if (chroma_width as usize, chroma_height as usize) == (width, height) {
                    plane
                } else {
                    let mut full = vec![0u8; samples];
                    scale_plane::<u8>(
                        &plane,
                        geometry(chroma_width, chroma_height, 1),
                        &mut full,
                        geometry(width as u32, height as u32, 1),
                    );
                    full
                };
                channels[channel].extend(full.iter().map(|v| *v as f32));
            }
            return Self {
                width,
                height,
                family: Family::Yuv,
                channels,
                alpha,
            };
        }

        match format {
            PixelFormat::Rgbp => {
                for (plane, channel) in channels.iter_mut().enumerate() {
                    for y in 0..height {
                        channel.extend(picture.row(plane, y).iter().map(|v| *v as f32 / 255.0));
                    }
                }
            }
            PixelFormat::Rgbpf32 => {
                for (plane, channel) in channels.iter_mut().enumerate() {
                    for y in 0..height {
                        channel.extend(picture.row(plane, y).chunks_exact(4).map(f32::read));
                    }
                }
            }
            _ => {
                let order = packed_order(format);
                let pixel = format.channels_in_plane(0);
                let mut alpha_values = Vec::with_capacity(samples);
                for y in 0..height {
                    for px in picture.row(0, y).chunks_exact(pixel) {
                        for (channel, offset) in channels.iter_mut().zip(order) {
                            channel.push(px[offset] as f32 / 255.0);
                        }
                        if pixel == 4 {
                            alpha_values.push(px[3] as f32 / 255.0);
                        }
                    }
                }
                if pixel == 4 {
                    alpha = Some(alpha_values);
                }
            }
        }

        Self {
            width,
            height,
            family: Family::Rgb,
            channels,
            alpha,
        }
    }

    fn to_rgb(&mut self) {
        if self.family == Family::Rgb {
            return;
        }
        for i in 0..self.width * self.height {
            let y = (self.channels[0][i] - 16.0) * 1.164_383;
            let u = self.channels[1][i] - 128.0;
            let v = self.channels[2][i] - 128.0;
            self.channels[0][i] = ((y + 1.596_027 * v) / 255.0).clamp(0.0, 1.0);
            self.channels[1][i] = ((y - 0.391_762 * u - 0.812_968 * v) / 255.0).clamp(0.0, 1.0);
            self.channels[2][i] = ((y + 2.017_232 * u) / 255.0).clamp(0.0, 1.0);
        }
        self.family = Family::Rgb;
    }

    fn to_yuv(&mut self) {
        if self.family == Family::Yuv {
            return;
        }
        for i in 0..self.width * self.height {
            let (r, g, b) = (self.channels[0][i], self.channels[1][i], self.channels[2][i]);
            self.channels[0][i] = 16.0 + 65.481 * r + 128.553 * g + 24.966 * b;
            self.channels[1][i] = 128.0 - 37.797 * r - 74.203 * g + 112.0 * b;
            self.channels[2][i] = 128.0 + 112.0 * r - 93.786 * g - 18.214 * b;
        }
        self.family = Family::Yuv;
    }

    fn write(&self, target: PixelFormat) -> HostPicture {
        let mut output = HostPicture::new(target, self.width as u32, self.height as u32);
        let to_byte = |v: f32| v.round().clamp(0.0, 255.0) as u8;

        if target.is_yuv() {
            for y in 0..self.height {
                let row = &self.channels[0][y * self.width..(y + 1) * self.width];
                for (out, value) in output.row_mut(0, y).iter_mut().zip(row) {
                    *out = to_byte(*value);
                }
            }
            let (shift_x, shift_y) = target.chroma_shift();
            let u = self.downsample(1, shift_x, shift_y);
            let v = self.downsample(2, shift_x, shift_y);
            let u: Vec<u8> = u.into_iter().map(to_byte).collect();
            let v: Vec<u8> = v.into_iter().map(to_byte).collect();
            store_chroma(&mut output, &u, &v);
            return output;
        }

        match target {
            PixelFormat::Rgbp => {
                for plane in 0..3 {
                    for y in 0..self.height {
                        let row = &self.channels[plane][y * self.width..(y + 1) * self.width];
                        for (out, value) in output.row_mut(plane, y).iter_mut().zip(row) {
                            *out = to_byte(value * 255.0);
                        }
                    }
                }
            }
            PixelFormat::Rgbpf32 => {
                for plane in 0..3 {
                    for y in 0..self.height {
                        let row = &self.channels[plane][y * self.width..(y + 1) * self.width];
                        for (out, value) in output.row_mut(plane, y).chunks_exact_mut(4).zip(row) {
                            f32::write(*value, out);
                        }
                    }
                }
            }
            _ => {
                let order = packed_order(target);
                let pixel = target.channels_in_plane(0);
                for y in 0..self.height {
                    for (x, px) in output.row_mut(0, y).chunks_exact_mut(pixel).enumerate() {
                        let i = y * self.width + x;
                        for (channel, offset) in self.channels.iter().zip(order) {
                            px[offset] = to_byte(channel[i] * 255.0);
                        }
                        if pixel == 4 {
                            let alpha = self.alpha.as_ref().map_or(1.0, |a| a[i]);
                            px[3] = to_byte(alpha * 255.0);
                        }
                    }
                }
            }
        }
        output
    }

    /**
        Box-average a full resolution channel down by the given log2 factors.
    */
    fn downsample(&self, channel: usize, shift_x: u32, shift_y: u32) -> Vec<f32> {
        let data = &self.channels[channel];
        if shift_x == 0 && shift_y == 0 {
            return data.clone();
        }
        let (step_x, step_y) = (1usize << shift_x, 1usize << shift_y);
        let out_width = self.width.div_ceil(step_x);
        let out_height = self.height.div_ceil(step_y);
        let mut out = Vec::with_capacity(out_width * out_height);
        for cy in 0..out_height {
            for cx in 0..out_width {
                let mut sum = 0.0;
                let mut count = 0.0;
                for y in cy * step_y..((cy + 1) * step_y).min(self.height) {
                    for x in cx * step_x..((cx + 1) * step_x).min(self.width) {
                        sum += data[y * self.width + x];
                        count += 1.0;
                    }
                }
                out.push(sum / count);
            }
        }
        out
    }
}

/**
    Byte offsets of R, G and B within a packed pixel.
*/
fn packed_order(format: PixelFormat) -> [usize; 3] {
    match format {
        PixelFormat::Bgra => [2, 1, 0],
        _ => [0, 1, 2],
    }
}
