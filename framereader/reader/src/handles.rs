/*!
    Ownership wrappers for native resources.

    Device bindings are shared: every clone of a [`DeviceHandle`] holds a
    reference and the binding is released when the last one is dropped.
    Pictures are exclusive: a [`FramePtr`] cannot be cloned, only moved.
*/

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use framereader_types::DecodeType;

use crate::picture::Picture;

/**
    A bound hardware device.

    Implemented by every backend binding (the CUDA driver binding, FFmpeg
    device contexts). Released on drop.
*/
pub trait DeviceResource: Send + Sync + fmt::Debug {
    fn decode_type(&self) -> DecodeType;

    fn device_index(&self) -> u32;

    fn as_any(&self) -> &dyn Any;
}

/**
    Shared reference to a bound device. Cloning increments the share count.
*/
#[derive(Clone)]
pub struct DeviceHandle(Arc<dyn DeviceResource>);

impl DeviceHandle {
    pub(crate) fn new(resource: Box<dyn DeviceResource>) -> Self {
        Self(Arc::from(resource))
    }

    /**
        Number of live handles sharing this device.
    */
    pub fn refs(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn resource(&self) -> &dyn DeviceResource {
        self.0.as_ref()
    }

    /**
        Borrow the binding as its concrete backend type.
    */
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("resource", &self.0)
            .field("refs", &self.refs())
            .finish()
    }
}

/**
    Exclusive owner of a decoded picture.
*/
pub struct FramePtr(Box<dyn Picture>);

impl FramePtr {
    pub(crate) fn new(picture: Box<dyn Picture>) -> Self {
        Self(picture)
    }

    pub fn get(&self) -> &dyn Picture {
        self.0.as_ref()
    }
}

impl fmt::Debug for FramePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramePtr")
            .field("width", &self.0.width())
            .field("height", &self.0.height())
            .field("format", &self.0.format())
            .field("residency", &self.0.residency())
            .finish()
    }
}

static_assertions::assert_impl_all!(DeviceHandle: Send, Sync);
static_assertions::assert_impl_all!(FramePtr: Send);
static_assertions::assert_not_impl_any!(FramePtr: Clone);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::picture::HostPicture;
    use framereader_types::PixelFormat;

    #[derive(Debug)]
    struct Dummy;

    impl DeviceResource for Dummy {
        fn decode_type(&self) -> DecodeType {
            DecodeType::Cuda
        }

        fn device_index(&self) -> u32 {
            3
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn device_handle_counts_shares() {
        let handle = DeviceHandle::new(Box::new(Dummy));
        assert_eq!(handle.refs(), 1);
        let other = handle.clone();
        assert_eq!(handle.refs(), 2);
        drop(other);
        assert_eq!(handle.refs(), 1);
        assert!(handle.downcast_ref::<Dummy>().is_some());
        assert_eq!(handle.resource().device_index(), 3);
    }

    #[test]
    fn frame_ptr_holds_picture() {
        let ptr = FramePtr::new(Box::new(HostPicture::new(PixelFormat::Rgb24, 4, 4)));
        assert_eq!(ptr.get().width(), 4);
        let moved = ptr;
        assert_eq!(moved.get().format(), PixelFormat::Rgb24);
    }
}
