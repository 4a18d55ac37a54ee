/*!
    Hardware device contexts.
*/

use std::any::Any;
use std::ffi::{CString, c_void};
use std::fmt;
use std::ptr;

use ffmpeg_next::ffi;

use framereader_types::{DecodeType, Error, Result, SurfaceFormat};

use crate::context::FormatPolicy;
use crate::cuda::CudaContext;
use crate::handles::DeviceResource;

use super::{av_error, surface_format};

/// Leading fields of `AVCUDADeviceContext`.
#[repr(C)]
struct CudaDeviceContext {
    cuda_ctx: *mut c_void,
    stream: *mut c_void,
}

/**
    A reference to an FFmpeg hardware device context.

    Cloning takes another reference to the same device context.
*/
pub struct HwDeviceRef {
    ctx: *mut ffi::AVBufferRef,
    decode_type: DecodeType,
    device: u32,
}

impl HwDeviceRef {
    /**
        Open device `device` of the given backend.
    */
    pub fn create(decode_type: DecodeType, device: u32) -> Result<Self> {
        super::init()?;
        let device_type = device_type(decode_type)?;
        let name = CString::new(device.to_string())
            .map_err(|e| Error::device_init_failed(e.to_string()))?;

        unsafe {
            let mut ctx: *mut ffi::AVBufferRef = ptr::null_mut();
            let ret = ffi::av_hwdevice_ctx_create(
                &mut ctx,
                device_type,
                name.as_ptr(),
                ptr::null_mut(),
                0,
            );
            if ret < 0 || ctx.is_null() {
                return Err(Error::device_init_failed(format!(
                    "cannot open {} device {device}: {}",
                    decode_type.name(),
                    av_error(ret)
                )));
            }
            Ok(Self {
                ctx,
                decode_type,
                device,
            })
        }
    }

    /**
        Wrap a CUDA context owned by the caller. The context must outlive
        every decoder using it.
    */
    pub fn from_cuda_context(context: CudaContext, device: u32) -> Result<Self> {
        super::init()?;
        if context.is_null() {
            return Err(Error::device_init_failed("external CUDA context is null"));
        }

        unsafe {
            let mut ctx = ffi::av_hwdevice_ctx_alloc(ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_CUDA);
            if ctx.is_null() {
                return Err(Error::device_init_failed(
                    "cannot allocate a CUDA device context",
                ));
            }
            let device_ctx = (*ctx).data as *mut ffi::AVHWDeviceContext;
            let cuda = (*device_ctx).hwctx as *mut CudaDeviceContext;
            (*cuda).cuda_ctx = context.as_ptr();
            (*cuda).stream = ptr::null_mut();

            let ret = ffi::av_hwdevice_ctx_init(ctx);
            if ret < 0 {
                ffi::av_buffer_unref(&mut ctx);
                return Err(Error::device_init_failed(format!(
                    "cannot use external CUDA context: {}",
                    av_error(ret)
                )));
            }
            Ok(Self {
                ctx,
                decode_type: DecodeType::Cuda,
                device,
            })
        }
    }

    pub fn decode_type(&self) -> DecodeType {
        self.decode_type
    }

    pub fn as_ptr(&self) -> *mut ffi::AVBufferRef {
        self.ctx
    }

    /**
        Create a reference to the context for use in a decoder.
    */
    pub(crate) fn create_ref(&self) -> *mut ffi::AVBufferRef {
        unsafe { ffi::av_buffer_ref(self.ctx) }
    }
}

impl Clone for HwDeviceRef {
    fn clone(&self) -> Self {
        Self {
            ctx: self.create_ref(),
            decode_type: self.decode_type,
            device: self.device,
        }
    }
}

impl Drop for HwDeviceRef {
    fn drop(&mut self) {
        if !self.ctx.is_null() {
            unsafe {
                ffi::av_buffer_unref(&mut self.ctx);
            }
        }
    }
}

impl fmt::Debug for HwDeviceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HwDeviceRef")
            .field("decode_type", &self.decode_type)
            .field("device", &self.device)
            .finish()
    }
}

impl DeviceResource for HwDeviceRef {
    fn decode_type(&self) -> DecodeType {
        self.decode_type
    }

    fn device_index(&self) -> u32 {
        self.device
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// SAFETY: The FFmpeg buffer reference is internally reference-counted
// and thread-safe for the operations we perform.
unsafe impl Send for HwDeviceRef {}
unsafe impl Sync for HwDeviceRef {}

fn device_type(decode_type: DecodeType) -> Result<ffi::AVHWDeviceType> {
    match decode_type {
        DecodeType::Cuda => Ok(ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_CUDA),
        other => Err(Error::unsupported_backend(format!(
            "{} has no FFmpeg device type",
            other.name()
        ))),
    }
}

const MAX_OFFERED: usize = 64;

/**
    Install `policy` as the surface format negotiation of a codec context.
*/
pub(crate) unsafe fn install_format_policy(ctx: *mut ffi::AVCodecContext, policy: FormatPolicy) {
    unsafe {
        (*ctx).opaque = policy as *mut c_void;
        (*ctx).get_format = Some(negotiate_format);
    }
}

unsafe extern "C" fn negotiate_format(
    ctx: *mut ffi::AVCodecContext,
    offered: *const ffi::AVPixelFormat,
) -> ffi::AVPixelFormat {
    let none = ffi::AVPixelFormat::AV_PIX_FMT_NONE;
    if ctx.is_null() || offered.is_null() {
        return none;
    }

    let mut raw = [none; MAX_OFFERED];
    let mut surfaces = [SurfaceFormat::Other; MAX_OFFERED];
    let mut count = 0;
    unsafe {
        while count < MAX_OFFERED && *offered.add(count) != none {
            raw[count] = *offered.add(count);
            surfaces[count] = surface_format(raw[count]);
            count += 1;
        }
    }

    let opaque = unsafe { (*ctx).opaque };
    if opaque.is_null() {
        return raw[0];
    }
    // SAFETY: opaque was set from a FormatPolicy by install_format_policy
    let policy: FormatPolicy = unsafe { std::mem::transmute::<*mut c_void, FormatPolicy>(opaque) };

    let chosen = policy(&surfaces[..count])
        .and_then(|chosen| surfaces[..count].iter().position(|s| *s == chosen));
    match chosen {
        Some(index) => {
            tracing::debug!(surface = ?surfaces[index], "negotiated decoder surface");
            raw[index]
        }
        None => {
            tracing::error!(offered = count, "no acceptable decoder surface offered");
            none
        }
    }
}
