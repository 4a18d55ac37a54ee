/*!
    Decoded pictures.

    A [`Picture`] is the raw output of a decode backend. It may live in host
    memory or in device memory; [`HostPicture`] is the host-memory
    implementation every other picture can be downloaded into.
*/

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use framereader_types::{DecodeType, Error, PixelFormat, Pts, Rational, Result};

/**
    A view of one plane of picture data.

    Host planes can be borrowed as a byte slice. Device planes only expose
    their address and line stride, which must be handed to the owning
    device API.
*/
#[derive(Clone, Copy)]
pub struct PlaneData<'a> {
    ptr: *const u8,
    stride: usize,
    len: usize,
    residency: DecodeType,
    _marker: PhantomData<&'a [u8]>,
}

impl<'a> PlaneData<'a> {
    /**
        Create a view of a host-memory plane.
    */
    pub fn host(data: &'a [u8], stride: usize) -> Self {
        Self {
            ptr: data.as_ptr(),
            stride,
            len: data.len(),
            residency: DecodeType::Software,
            _marker: PhantomData,
        }
    }

    /**
        Create a view of a device-memory plane.

        # Safety

        `ptr` must stay valid for `len` bytes for as long as the picture
        that produced this view is alive.
    */
    pub unsafe fn device(ptr: *const u8, stride: usize, len: usize, residency: DecodeType) -> Self {
        Self {
            ptr,
            stride,
            len,
            residency,
            _marker: PhantomData,
        }
    }

    /// Address of the first byte of the plane.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    /// Distance in bytes between the starts of two consecutive lines.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of addressable bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Memory space holding the plane.
    pub fn residency(&self) -> DecodeType {
        self.residency
    }

    /**
        Borrow the plane as bytes. Returns None for device planes.
    */
    pub fn as_slice(&self) -> Option<&'a [u8]> {
        if self.residency.is_hardware() {
            return None;
        }
        // SAFETY: host planes are only ever created from a borrowed slice
        // of `len` bytes living for 'a.
        Some(unsafe { std::slice::from_raw_parts(self.ptr, self.len) })
    }
}

impl fmt::Debug for PlaneData<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaneData")
            .field("stride", &self.stride)
            .field("len", &self.len)
            .field("residency", &self.residency)
            .finish_non_exhaustive()
    }
}

/**
    A decoded picture owned by a decode backend.

    Implementations release their native resources when dropped.
*/
pub trait Picture: Send + 'static {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /**
        Layout of the picture data. For device pictures this is the layout
        of the device surface, which is also the layout after download.
    */
    fn format(&self) -> PixelFormat;

    /// Memory space holding the picture data.
    fn residency(&self) -> DecodeType {
        DecodeType::Software
    }

    fn sample_aspect_ratio(&self) -> Rational {
        Rational::new(1, 1)
    }

    /**
        View a plane, or None if `index` is out of range.
    */
    fn plane(&self, index: usize) -> Option<PlaneData<'_>>;

    /**
        Copy the picture into host memory.
    */
    fn to_host(&self) -> Result<HostPicture>;

    fn as_any(&self) -> &dyn Any;
}

/**
    A picture emitted by a decoder, with its timestamp in stream time base
    units when the decoder knows it.
*/
pub struct DecodedPicture {
    pub picture: Box<dyn Picture>,
    pub pts: Option<Pts>,
}

impl DecodedPicture {
    pub fn new(picture: impl Picture, pts: Option<Pts>) -> Self {
        Self {
            picture: Box::new(picture),
            pts,
        }
    }
}

impl fmt::Debug for DecodedPicture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedPicture")
            .field("width", &self.picture.width())
            .field("height", &self.picture.height())
            .field("format", &self.picture.format())
            .field("pts", &self.pts)
            .finish()
    }
}

/**
    A picture in host memory, one byte vector per plane.
*/
#[derive(Clone, PartialEq)]
pub struct HostPicture {
    format: PixelFormat,
    width: u32,
    height: u32,
    sample_aspect_ratio: Rational,
    planes: Vec<Vec<u8>>,
    strides: Vec<usize>,
}

impl HostPicture {
    /**
        Allocate a zeroed, tightly packed picture.
    */
    pub fn new(format: PixelFormat, width: u32, height: u32) -> Self {
        let mut planes = Vec::with_capacity(format.plane_count());
        let mut strides = Vec::with_capacity(format.plane_count());
        for plane in 0..format.plane_count() {
            let stride = row_bytes(format, plane, width);
            let (_, rows) = format.plane_size(plane, width, height);
            planes.push(vec![0u8; stride * rows as usize]);
            strides.push(stride);
        }
        Self {
            format,
            width,
            height,
            sample_aspect_ratio: Rational::new(1, 1),
            planes,
            strides,
        }
    }

    /**
        Build a picture from existing plane buffers.

        Fails if the plane count does not match the format, or a plane is too
        small for its stride and dimensions.
    */
    pub fn from_planes(
        format: PixelFormat,
        width: u32,
        height: u32,
        planes: Vec<Vec<u8>>,
        strides: Vec<usize>,
    ) -> Result<Self> {
        if planes.len() != format.plane_count() || strides.len() != planes.len() {
            return Err(Error::unsupported_format(format!(
                "{format:?} needs {} planes, got {}",
                format.plane_count(),
                planes.len()
            )));
        }
        for (index, (data, stride)) in planes.iter().zip(&strides).enumerate() {
            let row = row_bytes(format, index, width);
            let (_, rows) = format.plane_size(index, width, height);
            let rows = rows as usize;
            if *stride < row || (rows > 0 && data.len() < stride * (rows - 1) + row) {
                return Err(Error::unsupported_format(format!(
                    "plane {index} of a {width}x{height} {format:?} picture is too small"
                )));
            }
        }
        Ok(Self {
            format,
            width,
            height,
            sample_aspect_ratio: Rational::new(1, 1),
            planes,
            strides,
        })
    }

    /**
        Copy a picture out of borrowed, possibly padded, plane buffers into a
        tightly packed one.
    */
    pub fn copy_from_planes(
        format: PixelFormat,
        width: u32,
        height: u32,
        planes: &[(&[u8], usize)],
    ) -> Result<Self> {
        if planes.len() != format.plane_count() {
            return Err(Error::unsupported_format(format!(
                "{format:?} needs {} planes, got {}",
                format.plane_count(),
                planes.len()
            )));
        }
        let mut picture = Self::new(format, width, height);
        for (index, (src, src_stride)) in planes.iter().enumerate() {
            let row = picture.strides[index];
            let (_, rows) = format.plane_size(index, width, height);
            for y in 0..rows as usize {
                let start = y * src_stride;
                let line = src.get(start..start + row).ok_or_else(|| {
                    Error::unsupported_format(format!("plane {index} is shorter than its geometry"))
                })?;
                picture.planes[index][y * row..(y + 1) * row].copy_from_slice(line);
            }
        }
        Ok(picture)
    }

    pub fn with_sample_aspect_ratio(mut self, sample_aspect_ratio: Rational) -> Self {
        self.sample_aspect_ratio = sample_aspect_ratio;
        self
    }

    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    pub fn stride(&self, plane: usize) -> usize {
        self.strides.get(plane).copied().unwrap_or(0)
    }

    /**
        Bytes of visible data in one line of the given plane.
    */
    pub fn row_bytes(&self, plane: usize) -> usize {
        row_bytes(self.format, plane, self.width)
    }

    /**
        Dimensions of the given plane in samples.
    */
    pub fn plane_size(&self, plane: usize) -> (u32, u32) {
        self.format.plane_size(plane, self.width, self.height)
    }

    pub fn plane_data(&self, plane: usize) -> Option<&[u8]> {
        self.planes.get(plane).map(Vec::as_slice)
    }

    pub fn plane_mut(&mut self, plane: usize) -> Option<&mut [u8]> {
        self.planes.get_mut(plane).map(Vec::as_mut_slice)
    }

    /**
        Borrow one line of a plane, without stride padding.
    */
    pub fn row(&self, plane: usize, y: usize) -> &[u8] {
        let stride = self.strides[plane];
        let len = self.row_bytes(plane);
        &self.planes[plane][y * stride..y * stride + len]
    }

    pub fn row_mut(&mut self, plane: usize, y: usize) -> &mut [u8] {
        let stride = self.strides[plane];
        let len = self.row_bytes(plane);
        &mut self.planes[plane][y * stride..y * stride + len]
    }

    /**
        Fill every sample of a plane with `value`.
    */
    pub fn fill_plane(&mut self, plane: usize, value: u8) {
        if let Some(data) = self.planes.get_mut(plane) {
            data.fill(value);
        }
    }
}

impl fmt::Debug for HostPicture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostPicture")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sample_aspect_ratio", &self.sample_aspect_ratio)
            .field("strides", &self.strides)
            .finish_non_exhaustive()
    }
}

impl Picture for HostPicture {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn format(&self) -> PixelFormat {
        self.format
    }

    fn sample_aspect_ratio(&self) -> Rational {
        self.sample_aspect_ratio
    }

    fn plane(&self, index: usize) -> Option<PlaneData<'_>> {
        let data = self.planes.get(index)?;
        Some(PlaneData::host(data, self.strides[index]))
    }

    fn to_host(&self) -> Result<HostPicture> {
        Ok(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/**
    Bytes of visible data in one line of `plane` for a picture `width` wide.
*/
pub(crate) fn row_bytes(format: PixelFormat, plane: usize, width: u32) -> usize {
    let (plane_width, _) = format.plane_size(plane, width, 1);
    plane_width as usize * format.channels_in_plane(plane) * format.bytes_per_sample()
}

static_assertions::assert_impl_all!(HostPicture: Send, Sync);
