/*!
    Decoder contexts.

    A [`DecoderContext`] turns a requested [`DecodeType`] into a bound
    backend: nothing for software decoding, a device binding for hardware
    decoding. It is created once per device and shared by every stream
    decoding on that device.
*/

use std::fmt;

use framereader_types::{DecodeType, Error, ExternalContext, Result, SurfaceFormat};

use crate::cuda::{self, CudaContext};
use crate::handles::{DeviceHandle, DeviceResource};

/**
    Chooses one of the surface formats a decoder offers.

    A plain function pointer: backends call it synchronously from their
    format negotiation callback, where it must not allocate or capture state.
*/
pub type FormatPolicy = fn(&[SurfaceFormat]) -> Option<SurfaceFormat>;

/**
    Discovers and binds hardware devices.

    [`SystemProbe`] talks to the installed drivers. Other implementations
    can stand in for machines with different hardware.
*/
pub trait DeviceProbe: Send + Sync {
    /**
        Number of devices for the given backend.

        Returns [`Error::UnsupportedBackend`] if the backend is not installed.
    */
    fn device_count(&self, decode_type: DecodeType) -> Result<u32>;

    /**
        Bind the device with the given index.
    */
    fn bind(&self, decode_type: DecodeType, device: u32) -> Result<Box<dyn DeviceResource>>;
}

/**
    Probes the devices installed on this machine.
*/
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemProbe;

impl DeviceProbe for SystemProbe {
    fn device_count(&self, decode_type: DecodeType) -> Result<u32> {
        match decode_type {
            DecodeType::Cuda => cuda::driver()
                .ok_or_else(|| Error::unsupported_backend("CUDA driver library not found"))?
                .device_count(),
            other => Err(Error::unsupported_backend(format!(
                "no {} devices can be probed",
                other.name()
            ))),
        }
    }

    fn bind(&self, decode_type: DecodeType, device: u32) -> Result<Box<dyn DeviceResource>> {
        match decode_type {
            #[cfg(feature = "ffmpeg")]
            DecodeType::Cuda => Ok(Box::new(crate::ffmpeg::HwDeviceRef::create(
                DecodeType::Cuda,
                device,
            )?)),
            #[cfg(not(feature = "ffmpeg"))]
            DecodeType::Cuda => {
                let driver = cuda::driver()
                    .ok_or_else(|| Error::unsupported_backend("CUDA driver library not found"))?;
                Ok(Box::new(driver.retain_primary(device)?))
            }
            other => Err(Error::unsupported_backend(format!(
                "{} devices cannot be bound",
                other.name()
            ))),
        }
    }
}

/**
    A decode backend selection and, for hardware backends, the device it is
    bound to.

    Cloning shares the device binding.
*/
#[derive(Clone)]
pub struct DecoderContext {
    decode_type: DecodeType,
    device: u32,
    handle: Option<DeviceHandle>,
    external: bool,
}

impl DecoderContext {
    /**
        Create a context for `decode_type`, optionally bound to a device
        handle the caller already owns.

        Hardware backends never fall back to software: a missing driver or a
        machine without devices is [`Error::UnsupportedBackend`], and a device
        that exists but cannot be bound is [`Error::DeviceInitFailed`].
    */
    pub fn new(
        decode_type: DecodeType,
        external: Option<ExternalContext>,
        device: u32,
    ) -> Result<Self> {
        Self::with_probe(decode_type, external, device, &SystemProbe)
    }

    /**
        Like [`DecoderContext::new`], discovering devices through `probe`.
    */
    pub fn with_probe(
        decode_type: DecodeType,
        external: Option<ExternalContext>,
        device: u32,
        probe: &dyn DeviceProbe,
    ) -> Result<Self> {
        if !decode_type.is_hardware() {
            if external.is_some() {
                tracing::warn!("ignoring external context for software decoding");
            }
            return Ok(Self {
                decode_type,
                device: 0,
                handle: None,
                external: false,
            });
        }

        if let Some(external) = external {
            let resource = bind_external(decode_type, &external, device)?;
            tracing::info!(decode_type = decode_type.name(), device, "using external device context");
            return Ok(Self {
                decode_type,
                device,
                handle: Some(DeviceHandle::new(resource)),
                external: true,
            });
        }

        let count = probe.device_count(decode_type)?;
        if count == 0 {
            return Err(Error::unsupported_backend(format!(
                "no {} devices found",
                decode_type.name()
            )));
        }
        if device >= count {
            return Err(Error::device_init_failed(format!(
                "{} device {device} requested but only {count} available",
                decode_type.name()
            )));
        }

        let resource = probe.bind(decode_type, device)?;
        tracing::info!(decode_type = decode_type.name(), device, "bound decode device");
        Ok(Self {
            decode_type,
            device,
            handle: Some(DeviceHandle::new(resource)),
            external: false,
        })
    }

    /**
        A software decoding context. Never fails.
    */
    pub fn software() -> Self {
        Self {
            decode_type: DecodeType::Software,
            device: 0,
            handle: None,
            external: false,
        }
    }

    pub fn decode_type(&self) -> DecodeType {
        self.decode_type
    }

    pub fn device_index(&self) -> u32 {
        self.device
    }

    /**
        The bound device, None for software decoding.
    */
    pub fn device(&self) -> Option<&DeviceHandle> {
        self.handle.as_ref()
    }

    /**
        Number of contexts sharing the device binding, zero for software.
    */
    pub fn device_refs(&self) -> usize {
        self.handle.as_ref().map_or(0, DeviceHandle::refs)
    }

    /**
        Returns true if the device binding came from the caller.
    */
    pub fn is_external(&self) -> bool {
        self.external
    }

    /**
        The surface format policy for decoders using this context.

        Decoding on a device selects the device-native surface unless
        `output_host` forces host pictures, in which case (and for software
        decoding) the first host format offered wins.
    */
    pub fn format_policy(&self, output_host: bool) -> FormatPolicy {
        match self.decode_type {
            DecodeType::Cuda if !output_host => prefer_cuda,
            _ => prefer_host,
        }
    }
}

impl fmt::Debug for DecoderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderContext")
            .field("decode_type", &self.decode_type)
            .field("device", &self.device)
            .field("external", &self.external)
            .field("device_refs", &self.device_refs())
            .finish()
    }
}

fn prefer_host(offered: &[SurfaceFormat]) -> Option<SurfaceFormat> {
    offered.iter().copied().find(|format| format.is_host())
}

fn prefer_cuda(offered: &[SurfaceFormat]) -> Option<SurfaceFormat> {
    offered
        .iter()
        .copied()
        .find(|format| *format == SurfaceFormat::Device(DecodeType::Cuda))
        .or_else(|| prefer_host(offered))
}

fn bind_external(
    decode_type: DecodeType,
    external: &ExternalContext,
    device: u32,
) -> Result<Box<dyn DeviceResource>> {
    if decode_type != DecodeType::Cuda {
        return Err(Error::device_init_failed(format!(
            "external contexts are not supported for {}",
            decode_type.name()
        )));
    }

    #[cfg(feature = "ffmpeg")]
    if let Some(hw) = external.downcast_ref::<crate::ffmpeg::HwDeviceRef>() {
        if hw.decode_type() != decode_type {
            return Err(Error::device_init_failed(format!(
                "external device context is {}, expected {}",
                hw.decode_type().name(),
                decode_type.name()
            )));
        }
        return Ok(Box::new(hw.clone()));
    }

    let context = external.downcast_ref::<CudaContext>().ok_or_else(|| {
        Error::device_init_failed("external context does not hold a CUDA context")
    })?;
    if context.is_null() {
        return Err(Error::device_init_failed("external CUDA context is null"));
    }

    #[cfg(feature = "ffmpeg")]
    return Ok(Box::new(crate::ffmpeg::HwDeviceRef::from_cuda_context(
        *context, device,
    )?));

    #[cfg(not(feature = "ffmpeg"))]
    Ok(Box::new(cuda::CudaDevice::external(*context, device)))
}

static_assertions::assert_impl_all!(DecoderContext: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDevice, FakeProbe};

    #[test]
    fn software_context_has_no_device() {
        let context = DecoderContext::new(DecodeType::Software, None, 0).unwrap();
        assert_eq!(context.decode_type(), DecodeType::Software);
        assert!(context.device().is_none());
        assert_eq!(context.device_refs(), 0);
        assert_eq!(context.device_index(), 0);
    }

    #[test]
    fn missing_driver_is_unsupported() {
        let result = DecoderContext::with_probe(DecodeType::Cuda, None, 0, &FakeProbe::missing());
        assert!(matches!(result, Err(Error::UnsupportedBackend { .. })));
    }

    #[test]
    fn no_devices_is_unsupported() {
        let result = DecoderContext::with_probe(DecodeType::Cuda, None, 0, &FakeProbe::with_devices(0));
        assert!(matches!(result, Err(Error::UnsupportedBackend { .. })));
    }

    #[test]
    fn bad_device_index_fails_init() {
        let result = DecoderContext::with_probe(DecodeType::Cuda, None, 2, &FakeProbe::with_devices(2));
        assert!(matches!(result, Err(Error::DeviceInitFailed { .. })));
    }

    #[test]
    fn binding_failure_fails_init() {
        let probe = FakeProbe::with_devices(1).failing_bind();
        let result = DecoderContext::with_probe(DecodeType::Cuda, None, 0, &probe);
        assert!(matches!(result, Err(Error::DeviceInitFailed { .. })));
    }

    #[test]
    fn clones_share_the_device() {
        let context =
            DecoderContext::with_probe(DecodeType::Cuda, None, 1, &FakeProbe::with_devices(2)).unwrap();
        assert_eq!(context.device_refs(), 1);
        let shared = context.clone();
        assert_eq!(context.device_refs(), 2);
        assert_eq!(shared.device_index(), 1);
        let device = shared.device().and_then(|d| d.downcast_ref::<FakeDevice>());
        assert_eq!(device.map(|d| d.index), Some(1));
        drop(shared);
        assert_eq!(context.device_refs(), 1);
    }

    #[test]
    fn external_context_must_match_type() {
        let wrong = ExternalContext::new(String::from("not a device"));
        let result = DecoderContext::with_probe(
            DecodeType::Cuda,
            Some(wrong),
            0,
            &FakeProbe::with_devices(1),
        );
        assert!(matches!(result, Err(Error::DeviceInitFailed { .. })));

        let null = ExternalContext::new(CudaContext(std::ptr::null_mut()));
        let result = DecoderContext::with_probe(DecodeType::Cuda, Some(null), 0, &FakeProbe::missing());
        assert!(matches!(result, Err(Error::DeviceInitFailed { .. })));
    }

    #[cfg(not(feature = "ffmpeg"))]
    #[test]
    fn external_context_skips_probe() {
        let mut value = 0u8;
        let handle = CudaContext(&mut value as *mut u8 as *mut std::ffi::c_void);
        let context = DecoderContext::with_probe(
            DecodeType::Cuda,
            Some(ExternalContext::new(handle)),
            0,
            &FakeProbe::missing(),
        )
        .unwrap();
        assert!(context.is_external());
        let device = context.device().and_then(|d| d.downcast_ref::<cuda::CudaDevice>());
        assert_eq!(device.map(|d| d.context()), Some(handle));
    }

    #[test]
    fn format_policy_selection() {
        let offered = [
            SurfaceFormat::Other,
            SurfaceFormat::Device(DecodeType::Cuda),
            SurfaceFormat::Host(framereader_types::PixelFormat::Nv12),
        ];
        let host = SurfaceFormat::Host(framereader_types::PixelFormat::Nv12);

        let software = DecoderContext::software();
        assert_eq!(software.format_policy(false)(&offered), Some(host));

        let cuda =
            DecoderContext::with_probe(DecodeType::Cuda, None, 0, &FakeProbe::with_devices(1)).unwrap();
        assert_eq!(
            cuda.format_policy(false)(&offered),
            Some(SurfaceFormat::Device(DecodeType::Cuda))
        );
        assert_eq!(cuda.format_policy(true)(&offered), Some(host));
        assert_eq!(cuda.format_policy(false)(&[host]), Some(host));
        assert_eq!(cuda.format_policy(false)(&[SurfaceFormat::Other]), None);
    }
}
