/*!
    Decoder and encoder configuration.

    Both option types are plain values with field-wise equality and
    ordering, so they can key caches and be loaded from configuration
    files through serde.
*/

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{Crop, DecodeType, EncodeType, PixelFormat, Resolution};

/**
    An externally owned device handle supplied by the caller.

    The wrapped value must match the decode type it is used with, e.g. a
    CUDA context for [`DecodeType::Cuda`]. Compared and hashed by identity.
*/
#[derive(Clone)]
pub struct ExternalContext(Arc<dyn Any + Send + Sync>);

impl ExternalContext {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /**
        Borrow the wrapped handle if it has type `T`.
    */
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    fn address(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for ExternalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExternalContext({:#x})", self.address())
    }
}

impl PartialEq for ExternalContext {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

impl Eq for ExternalContext {}

impl PartialOrd for ExternalContext {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ExternalContext {
    fn cmp(&self, other: &Self) -> Ordering {
        self.address().cmp(&other.address())
    }
}

impl Hash for ExternalContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address().hash(state);
    }
}

/**
    What the stream does when its decode buffer is full.
*/
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum BufferPolicy {
    /**
        Stop pulling pictures from the decoder until the caller consumes a
        frame. Reads ahead up to the buffer length for throughput.
    */
    #[default]
    Backpressure,
    /**
        Never stall the decoder: the oldest buffered frame is dropped to make
        room. Decodes only as far as needed to establish the next frame.
    */
    Evict,
}

/**
    Decoder configuration.
*/
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderOptions {
    /// The type of decoding to use.
    pub decode_type: DecodeType,
    /// Output cropping, all zero for none.
    pub crop: Crop,
    /// Output resolution after cropping, zero for no scaling.
    pub scale: Resolution,
    /// Output pixel format, None to keep the source format.
    pub format: Option<PixelFormat>,
    /**
        Number of frames held in the decode buffer.

        Tune to the read/seek pattern: larger buffers cost memory but raise
        decode throughput and widen the window served without re-decoding.
    */
    pub buffer_length: u32,
    /// Behaviour when the decode buffer is full.
    pub buffer_policy: BufferPolicy,
    /// Overrides the reorder window reported by the decoder.
    pub reorder_window: Option<u32>,
    /// Existing device handle to decode with. Must match `decode_type`.
    #[serde(skip)]
    pub context: Option<ExternalContext>,
    /// Device index of the desired hardware device.
    pub device: u32,
    /// Copy hardware-decoded frames back to host memory.
    pub output_host: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            decode_type: DecodeType::Software,
            crop: Crop::default(),
            scale: Resolution::default(),
            format: None,
            buffer_length: 10,
            buffer_policy: BufferPolicy::default(),
            reorder_window: None,
            context: None,
            device: 0,
            output_host: true,
        }
    }
}

impl DecoderOptions {
    /**
        Create options for the given decode type, everything else default.
    */
    pub fn new(decode_type: DecodeType) -> Self {
        Self {
            decode_type,
            ..Self::default()
        }
    }

    pub fn with_crop(mut self, crop: Crop) -> Self {
        self.crop = crop;
        self
    }

    pub fn with_scale(mut self, width: u32, height: u32) -> Self {
        self.scale = Resolution::new(width, height);
        self
    }

    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_buffer_length(mut self, frames: u32) -> Self {
        self.buffer_length = frames;
        self
    }

    pub fn with_buffer_policy(mut self, policy: BufferPolicy) -> Self {
        self.buffer_policy = policy;
        self
    }

    pub fn with_reorder_window(mut self, frames: u32) -> Self {
        self.reorder_window = Some(frames);
        self
    }

    pub fn with_context(mut self, context: ExternalContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_device(mut self, device: u32) -> Self {
        self.device = device;
        self
    }

    pub fn with_output_host(mut self, output_host: bool) -> Self {
        self.output_host = output_host;
        self
    }

    /**
        Returns true if decoded frames need the filter stage.
    */
    pub fn needs_filter(&self) -> bool {
        !self.crop.is_noop() || !self.scale.is_noop() || self.format.is_some()
    }
}

/**
    Encoder speed/size presets, from fastest to smallest output.
*/
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Preset {
    Ultrafast,
    Superfast,
    Veryfast,
    Faster,
    Fast,
    #[default]
    Medium,
    Slow,
    Slower,
    Veryslow,
    Placebo,
}

impl Preset {
    pub const ALL: [Preset; 10] = [
        Self::Ultrafast,
        Self::Superfast,
        Self::Veryfast,
        Self::Faster,
        Self::Fast,
        Self::Medium,
        Self::Slow,
        Self::Slower,
        Self::Veryslow,
        Self::Placebo,
    ];

    /**
        The x264/x265 preset name.
    */
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ultrafast => "ultrafast",
            Self::Superfast => "superfast",
            Self::Veryfast => "veryfast",
            Self::Faster => "faster",
            Self::Fast => "fast",
            Self::Medium => "medium",
            Self::Slow => "slow",
            Self::Slower => "slower",
            Self::Veryslow => "veryslow",
            Self::Placebo => "placebo",
        }
    }
}

/**
    Encoder configuration.
*/
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderOptions {
    /// The codec to encode with.
    pub codec: EncodeType,
    /// Output quality, 0 is worst and 255 is best.
    pub quality: u8,
    /// Compression preset. Slower presets give smaller files.
    pub preset: Preset,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            codec: EncodeType::H264,
            quality: 125,
            preset: Preset::Medium,
        }
    }
}

impl EncoderOptions {
    pub fn new(codec: EncodeType) -> Self {
        Self {
            codec,
            ..Self::default()
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_preset(mut self, preset: Preset) -> Self {
        self.preset = preset;
        self
    }

    /**
        Map quality onto the x264/x265 constant rate factor scale,
        where 0 is lossless and 51 is worst.
    */
    pub fn crf(&self) -> u32 {
        51 - (self.quality as u32 * 51 + 127) / 255
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn decoder_defaults() {
        let options = DecoderOptions::default();
        assert_eq!(options.decode_type, DecodeType::Software);
        assert_eq!(options.buffer_length, 10);
        assert!(options.output_host);
        assert!(options.format.is_none());
        assert!(!options.needs_filter());
    }

    #[test]
    fn decoder_options_order_field_wise() {
        let a = DecoderOptions::default();
        let b = DecoderOptions::new(DecodeType::Cuda);
        let c = DecoderOptions::default().with_buffer_length(20);
        assert!(a < b);
        assert!(a < c);
        assert_eq!(a, DecoderOptions::default());

        let set: BTreeSet<_> = [b.clone(), a.clone(), c.clone(), a.clone()].into();
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn external_context_compares_by_identity() {
        let ctx = ExternalContext::new(7u32);
        let same = DecoderOptions::default().with_context(ctx.clone());
        let also_same = DecoderOptions::default().with_context(ctx);
        let other = DecoderOptions::default().with_context(ExternalContext::new(7u32));
        assert_eq!(same, also_same);
        assert_ne!(same, other);
    }

    #[test]
    fn decoder_options_from_config() {
        let json = r#"{ "decode_type": "Cuda", "scale": { "width": 640, "height": 360 }, "device": 1 }"#;
        let options: DecoderOptions = serde_json::from_str(json).unwrap();
        assert_eq!(options.decode_type, DecodeType::Cuda);
        assert_eq!(options.scale, Resolution::new(640, 360));
        assert_eq!(options.device, 1);
        assert_eq!(options.buffer_length, 10);
        assert!(options.output_host);
        assert!(options.needs_filter());
    }

    #[test]
    fn presets_are_monotonic() {
        for pair in Preset::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(Preset::default().name(), "medium");
    }

    #[test]
    fn quality_maps_to_crf() {
        assert_eq!(EncoderOptions::default().with_quality(0).crf(), 51);
        assert_eq!(EncoderOptions::default().with_quality(255).crf(), 0);
        let mid = EncoderOptions::default().crf();
        assert!(mid > 0 && mid < 51);
    }
}
