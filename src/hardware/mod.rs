// Hardware device resolution
// Creates device contexts, picks one automatically per platform, and derives the
// hardware encoder that matches a device.

mod device_type;
pub mod encoder_name;
pub mod preference;

pub use device_type::DeviceType;
pub use preference::{Arch, Os, Platform};

use crate::format::{CodecId, MediaType, PixelFormat, Rational};
use crate::native::{Backend, CodecInfo, CodecOptions, NativeContext, NativeError};
use crate::stream::CodecParameters;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Nominal settings used to trial-open a candidate encoder
const TRIAL_TIME_BASE: Rational = Rational::new(1, 25);
const TRIAL_WIDTH: u32 = 100;
const TRIAL_HEIGHT: u32 = 100;

#[derive(Error, Debug)]
pub enum HardwareError {
    #[error("Failed to create {device_type} device context: {source}")]
    CreateFailed {
        device_type: DeviceType,
        #[source]
        source: NativeError,
    },
    #[error("Hardware device type not supported by this build: {0}")]
    Unsupported(DeviceType),
}

/// Options applied when creating a device context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareOptions {
    /// Device specifier, e.g. `/dev/dri/renderD128` or a GPU index
    pub device: Option<String>,
    pub options: CodecOptions,
}

/// An initialized hardware device plus the queries that depend on its type.
///
/// Engines borrow the context, so it cannot be disposed while any engine
/// built on it is alive.
pub struct HardwareContext<B: Backend> {
    backend: B,
    device_type: DeviceType,
    device: Option<B::Device>,
    encoders: Mutex<HashMap<CodecId, Option<CodecInfo>>>,
}

impl<B: Backend> HardwareContext<B> {
    /// Pick the first device that initializes, in platform preference order.
    ///
    /// Returns `None` when no hardware is usable; this is a normal software-only outcome.
    pub fn auto(backend: &B, options: &HardwareOptions) -> Option<Self> {
        Self::auto_for(backend, Platform::current(), options)
    }

    pub fn auto_for(backend: &B, platform: Platform, options: &HardwareOptions) -> Option<Self> {
        let available = backend.device_types();
        let candidates = preference::candidate_order(platform, &available);
        log::debug!("Hardware candidates: {:?}", candidates);

        for device_type in candidates {
            match Self::create(backend, device_type, options.device.as_deref(), &options.options) {
                Ok(context) => {
                    log::info!("Using {} hardware acceleration", device_type);
                    return Some(context);
                }
                Err(e) => log::debug!("{} not available: {}", device_type, e),
            }
        }

        log::info!("No hardware acceleration available, using software");
        None
    }

    /// Create exactly `device_type` or fail
    pub fn create(
        backend: &B,
        device_type: DeviceType,
        device: Option<&str>,
        options: &CodecOptions,
    ) -> Result<Self, HardwareError> {
        if !backend.device_types().contains(&device_type) {
            return Err(HardwareError::Unsupported(device_type));
        }

        let native = backend
            .create_device(device_type, device, options)
            .map_err(|source| HardwareError::CreateFailed {
                device_type,
                source,
            })?;

        log::debug!(
            "Created {} device context (device: {})",
            device_type,
            device.unwrap_or("default")
        );

        Ok(Self {
            backend: backend.clone(),
            device_type,
            device: Some(native),
            encoders: Mutex::new(HashMap::new()),
        })
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub fn device_type_name(&self) -> &'static str {
        self.device_type.name()
    }

    /// Native device handle, `None` once disposed
    pub fn device(&self) -> Option<&B::Device> {
        self.device.as_ref()
    }

    pub fn is_disposed(&self) -> bool {
        self.device.is_none()
    }

    /// Pixel format of decoded frames resident on this device
    pub fn device_pixel_format(&self) -> PixelFormat {
        self.device_type.pixel_format()
    }

    /// Whether the decoder (or encoder) for `codec` can run on this device type
    pub fn supports_codec(&self, codec: CodecId, encoder: bool) -> bool {
        self.lookup(codec, encoder)
            .is_some_and(|info| info.device_configs(self.device_type).next().is_some())
    }

    pub fn supports_pixel_format(&self, codec: CodecId, format: PixelFormat, encoder: bool) -> bool {
        self.lookup(codec, encoder).is_some_and(|info| {
            info.device_configs(self.device_type)
                .any(|config| config.pixel_format == format)
        })
    }

    fn lookup(&self, codec: CodecId, encoder: bool) -> Option<CodecInfo> {
        if encoder {
            self.backend.find_encoder(&codec)
        } else {
            self.backend.find_decoder(&codec)
        }
    }

    /// Hardware encoder for `codec` that is verified to open against this device.
    ///
    /// Never fails: a missing or non-functional encoder yields `None`.
    pub fn encoder_codec(&self, codec: CodecId) -> Option<CodecInfo> {
        if let Some(cached) = self.encoders.lock().get(&codec) {
            return cached.clone();
        }

        let resolved = self.resolve_encoder(&codec);
        self.encoders.lock().insert(codec, resolved.clone());
        resolved
    }

    fn resolve_encoder(&self, codec: &CodecId) -> Option<CodecInfo> {
        let device = self.device.as_ref()?;
        let name = encoder_name::encoder_name(codec, self.device_type, |name| {
            self.backend.find_encoder_by_name(name).is_some()
        })?;

        let Some(candidate) = self.backend.find_encoder_by_name(&name) else {
            log::debug!("Hardware encoder {} not available in this build", name);
            return None;
        };

        match self.trial_open(&candidate, device) {
            Ok(()) => {
                log::info!("Found hardware encoder: {}", name);
                Some(candidate)
            }
            Err(e) => {
                log::debug!("Hardware encoder {} failed to initialize: {}", name, e);
                None
            }
        }
    }

    /// Open and immediately release a throwaway context for `codec`
    fn trial_open(&self, codec: &CodecInfo, device: &B::Device) -> Result<(), NativeError> {
        let mut context = self.backend.alloc_context(codec)?;
        context.attach_device(device)?;

        // First format in the codec's own order, whether or not it has a named variant
        let pixel_format = codec.pixel_formats.first().cloned();
        context.set_parameters(&CodecParameters {
            media_type: MediaType::Video,
            codec_id: codec.id.clone(),
            width: TRIAL_WIDTH,
            height: TRIAL_HEIGHT,
            pixel_format,
            sample_aspect_ratio: Rational::new(1, 1),
            ..Default::default()
        })?;
        context.set_time_base(TRIAL_TIME_BASE);

        context.open(&CodecOptions::new())
    }

    /// Release the device context; further calls are no-ops
    pub fn dispose(&mut self) {
        if self.device.take().is_some() {
            self.encoders.lock().clear();
            log::debug!("Released {} device context", self.device_type);
        }
    }
}

impl<B: Backend> Drop for HardwareContext<B> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<B: Backend> fmt::Debug for HardwareContext<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardwareContext")
            .field("device_type", &self.device_type)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
