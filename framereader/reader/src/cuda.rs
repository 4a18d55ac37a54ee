/*!
    CUDA driver access.

    The driver library is loaded at runtime, so the crate builds and runs on
    machines without NVIDIA drivers. A missing library means the backend is
    unsupported, never a build or link failure.
*/

use std::any::Any;
#[cfg(not(feature = "ffmpeg"))]
use std::ffi::{CStr, c_char};
use std::ffi::c_void;
use std::fmt;
use std::sync::OnceLock;

use framereader_types::{DecodeType, Error, Result};

use crate::handles::DeviceResource;

type CUresult = i32;
type CUdevice = i32;
type CUcontext = *mut c_void;

const CUDA_SUCCESS: CUresult = 0;

type CuInitFn = unsafe extern "C" fn(u32) -> CUresult;
#[cfg(not(feature = "ffmpeg"))]
type CuDeviceGetFn = unsafe extern "C" fn(*mut CUdevice, i32) -> CUresult;
type CuDeviceGetCountFn = unsafe extern "C" fn(*mut i32) -> CUresult;
#[cfg(not(feature = "ffmpeg"))]
type CuDeviceGetNameFn = unsafe extern "C" fn(*mut c_char, i32, CUdevice) -> CUresult;
#[cfg(not(feature = "ffmpeg"))]
type CuDevicePrimaryCtxRetainFn = unsafe extern "C" fn(*mut CUcontext, CUdevice) -> CUresult;
type CuDevicePrimaryCtxReleaseFn = unsafe extern "C" fn(CUdevice) -> CUresult;

#[cfg(target_os = "windows")]
const LIBRARY_NAMES: &[&str] = &["nvcuda.dll"];

#[cfg(target_os = "linux")]
const LIBRARY_NAMES: &[&str] = &["libcuda.so.1", "libcuda.so"];

#[cfg(not(any(target_os = "windows", target_os = "linux")))]
const LIBRARY_NAMES: &[&str] = &[];

/**
    Entry points of the CUDA driver API used to enumerate and bind devices.
*/
pub(crate) struct CudaDriver {
    _library: libloading::Library,
    cu_device_get_count: CuDeviceGetCountFn,
    // binding a primary context is left to FFmpeg when it is linked
    #[cfg(not(feature = "ffmpeg"))]
    cu_device_get: CuDeviceGetFn,
    #[cfg(not(feature = "ffmpeg"))]
    cu_device_get_name: CuDeviceGetNameFn,
    #[cfg(not(feature = "ffmpeg"))]
    cu_primary_ctx_retain: CuDevicePrimaryCtxRetainFn,
    cu_primary_ctx_release: CuDevicePrimaryCtxReleaseFn,
}

// SAFETY: the driver API is thread-safe and the function pointers stay
// valid for as long as the library is loaded, which is the process lifetime.
unsafe impl Send for CudaDriver {}
unsafe impl Sync for CudaDriver {}

static CUDA_DRIVER: OnceLock<Option<CudaDriver>> = OnceLock::new();

/**
    The process-wide CUDA driver, or None if it is not installed or does not
    initialise.
*/
pub(crate) fn driver() -> Option<&'static CudaDriver> {
    CUDA_DRIVER.get_or_init(CudaDriver::load).as_ref()
}

impl CudaDriver {
    fn load() -> Option<Self> {
        let library = LIBRARY_NAMES.iter().find_map(|name| {
            // SAFETY: loading the vendor driver runs its initialisers, which
            // have no preconditions.
            match unsafe { libloading::Library::new(name) } {
                Ok(library) => Some(library),
                Err(e) => {
                    tracing::debug!(library = name, error = %e, "CUDA driver library not loaded");
                    None
                }
            }
        })?;

        // SAFETY: the symbol types match the CUDA driver API signatures.
        unsafe {
            let cu_init: CuInitFn = *library.get(b"cuInit\0").ok()?;
            let cu_device_get_count: CuDeviceGetCountFn =
                *library.get(b"cuDeviceGetCount\0").ok()?;
            #[cfg(not(feature = "ffmpeg"))]
            let cu_device_get: CuDeviceGetFn = *library.get(b"cuDeviceGet\0").ok()?;
            #[cfg(not(feature = "ffmpeg"))]
            let cu_device_get_name: CuDeviceGetNameFn = *library.get(b"cuDeviceGetName\0").ok()?;
            #[cfg(not(feature = "ffmpeg"))]
            let cu_primary_ctx_retain: CuDevicePrimaryCtxRetainFn =
                *library.get(b"cuDevicePrimaryCtxRetain\0").ok()?;
            let cu_primary_ctx_release: CuDevicePrimaryCtxReleaseFn = *library
                .get(b"cuDevicePrimaryCtxRelease_v2\0")
                .or_else(|_| library.get(b"cuDevicePrimaryCtxRelease\0"))
                .ok()?;

            let result = cu_init(0);
            if result != CUDA_SUCCESS {
                tracing::warn!(result, "cuInit failed");
                return None;
            }

            tracing::debug!("CUDA driver loaded");

            Some(Self {
                _library: library,
                cu_device_get_count,
                #[cfg(not(feature = "ffmpeg"))]
                cu_device_get,
                #[cfg(not(feature = "ffmpeg"))]
                cu_device_get_name,
                #[cfg(not(feature = "ffmpeg"))]
                cu_primary_ctx_retain,
                cu_primary_ctx_release,
            })
        }
    }

    /**
        Number of CUDA capable devices.
    */
    pub(crate) fn device_count(&self) -> Result<u32> {
        let mut count = 0i32;
        // SAFETY: `count` is a valid out pointer.
        let result = unsafe { (self.cu_device_get_count)(&mut count) };
        if result != CUDA_SUCCESS {
            return Err(Error::unsupported_backend(format!(
                "cuDeviceGetCount failed with error {result}"
            )));
        }
        Ok(count.max(0) as u32)
    }

    #[cfg(not(feature = "ffmpeg"))]
    fn device(&self, index: u32) -> Result<CUdevice> {
        let mut device: CUdevice = 0;
        // SAFETY: `device` is a valid out pointer.
        let result = unsafe { (self.cu_device_get)(&mut device, index as i32) };
        if result != CUDA_SUCCESS {
            return Err(Error::device_init_failed(format!(
                "cuDeviceGet({index}) failed with error {result}"
            )));
        }
        Ok(device)
    }

    #[cfg(not(feature = "ffmpeg"))]
    fn device_name(&self, device: CUdevice) -> Option<String> {
        let mut name = [0 as c_char; 256];
        // SAFETY: the buffer length passed matches the buffer.
        let result = unsafe { (self.cu_device_get_name)(name.as_mut_ptr(), name.len() as i32, device) };
        if result != CUDA_SUCCESS {
            return None;
        }
        // SAFETY: the driver writes a nul-terminated string into the buffer.
        let name = unsafe { CStr::from_ptr(name.as_ptr()) };
        Some(name.to_string_lossy().into_owned())
    }

    /**
        Bind a device by retaining its primary context.
    */
    #[cfg(not(feature = "ffmpeg"))]
    pub(crate) fn retain_primary(&'static self, index: u32) -> Result<CudaDevice> {
        let device = self.device(index)?;
        let mut context: CUcontext = std::ptr::null_mut();
        // SAFETY: `context` is a valid out pointer and `device` came from cuDeviceGet.
        let result = unsafe { (self.cu_primary_ctx_retain)(&mut context, device) };
        if result != CUDA_SUCCESS || context.is_null() {
            return Err(Error::device_init_failed(format!(
                "cuDevicePrimaryCtxRetain({index}) failed with error {result}"
            )));
        }
        Ok(CudaDevice {
            index,
            device,
            context,
            name: self.device_name(device),
            owner: Some(self),
        })
    }
}

/**
    A caller-owned CUDA context (`CUcontext`), passed to a decoder context
    through [`ExternalContext`](framereader_types::ExternalContext).

    The caller keeps the context alive for as long as any decoder uses it.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CudaContext(pub *mut c_void);

// SAFETY: CUDA contexts may be used from any thread.
unsafe impl Send for CudaContext {}
unsafe impl Sync for CudaContext {}

impl CudaContext {
    pub fn as_ptr(&self) -> *mut c_void {
        self.0
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }
}

/**
    A bound CUDA device.

    When created by retaining the device's primary context, the context is
    released on drop. Contexts supplied by the caller are left alone.
*/
pub struct CudaDevice {
    index: u32,
    device: CUdevice,
    context: CUcontext,
    name: Option<String>,
    owner: Option<&'static CudaDriver>,
}

// SAFETY: see CudaContext.
unsafe impl Send for CudaDevice {}
unsafe impl Sync for CudaDevice {}

impl CudaDevice {
    /**
        Wrap a caller-owned context. Nothing is released on drop.
    */
    #[cfg(not(feature = "ffmpeg"))]
    pub(crate) fn external(context: CudaContext, index: u32) -> Self {
        Self {
            index,
            device: index as CUdevice,
            context: context.as_ptr(),
            name: None,
            owner: None,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn context(&self) -> CudaContext {
        CudaContext(self.context)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl Drop for CudaDevice {
    fn drop(&mut self) {
        if let Some(driver) = self.owner {
            // SAFETY: the primary context was retained on this device.
            let result = unsafe { (driver.cu_primary_ctx_release)(self.device) };
            if result != CUDA_SUCCESS {
                tracing::warn!(device = self.index, result, "cuDevicePrimaryCtxRelease failed");
            }
        }
    }
}

impl fmt::Debug for CudaDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CudaDevice")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("context", &self.context)
            .field("external", &self.owner.is_none())
            .finish()
    }
}

impl DeviceResource for CudaDevice {
    fn decode_type(&self) -> DecodeType {
        DecodeType::Cuda
    }

    fn device_index(&self) -> u32 {
        self.index
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(feature = "ffmpeg"))]
    fn external_context_is_not_released() {
        let mut value = 0u8;
        let context = CudaContext(&mut value as *mut u8 as *mut c_void);
        let device = CudaDevice::external(context, 1);
        assert_eq!(device.index(), 1);
        assert_eq!(device.context(), context);
        assert_eq!(device.decode_type(), DecodeType::Cuda);
        drop(device);
        assert!(!context.is_null());
    }

    #[test]
    fn driver_probe_is_cached() {
        let first = driver().map(|d| d as *const CudaDriver);
        let second = driver().map(|d| d as *const CudaDriver);
        assert_eq!(first, second);
    }
}
