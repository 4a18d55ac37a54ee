/*!
    Sharing decoder contexts between streams.
*/

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use parking_lot::Mutex;

use framereader_types::{DecodeType, ExternalContext, Result};

use crate::context::{DecoderContext, DeviceProbe, SystemProbe};

static GLOBAL_POOL: OnceLock<ContextPool> = OnceLock::new();

/**
    Caches one [`DecoderContext`] per decode type and device, so every
    stream decoding on a device shares a single binding.

    Contexts built around a caller-supplied handle are never cached.
*/
pub struct ContextPool {
    contexts: Mutex<HashMap<(DecodeType, u32), DecoderContext>>,
    probe: Box<dyn DeviceProbe>,
}

impl ContextPool {
    pub fn new() -> Self {
        Self::with_probe(Box::new(SystemProbe))
    }

    pub fn with_probe(probe: Box<dyn DeviceProbe>) -> Self {
        Self {
            contexts: Mutex::new(HashMap::new()),
            probe,
        }
    }

    /**
        The process-wide pool, probing the installed drivers.
    */
    pub fn global() -> &'static ContextPool {
        GLOBAL_POOL.get_or_init(ContextPool::new)
    }

    /**
        Get the context for `decode_type` on `device`, creating it on first use.

        Failures are not cached; a later call probes again.
    */
    pub fn get(
        &self,
        decode_type: DecodeType,
        external: Option<ExternalContext>,
        device: u32,
    ) -> Result<DecoderContext> {
        if external.is_some() {
            return DecoderContext::with_probe(decode_type, external, device, self.probe.as_ref());
        }
        let key = match decode_type {
            DecodeType::Software => (decode_type, 0),
            _ => (decode_type, device),
        };

        let mut contexts = self.contexts.lock();
        if let Some(context) = contexts.get(&key) {
            return Ok(context.clone());
        }
        let context = DecoderContext::with_probe(decode_type, None, device, self.probe.as_ref())?;
        tracing::debug!(decode_type = decode_type.name(), device, "caching decoder context");
        contexts.insert(key, context.clone());
        Ok(context)
    }

    pub fn len(&self) -> usize {
        self.contexts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.lock().is_empty()
    }

    /**
        Forget every cached context. Streams still holding one keep it alive.
    */
    pub fn clear(&self) {
        self.contexts.lock().clear();
    }
}

impl Default for ContextPool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ContextPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextPool")
            .field("contexts", &self.len())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(ContextPool: Send, Sync);
