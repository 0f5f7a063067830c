// Pipeline configuration
// JSON-loadable settings for hardware selection and the decode/encode engines.

use crate::decoder::DecoderOptions;
use crate::encoder::EncoderSettings;
use crate::hardware::{DeviceType, HardwareContext, HardwareError, HardwareOptions};
use crate::native::{Backend, CodecOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// Use hardware acceleration at all
    pub enabled: bool,
    /// Exact device type to require; automatic selection when unset
    pub device_type: Option<DeviceType>,
    /// Device specifier, e.g. `/dev/dri/renderD128`
    pub device: Option<String>,
    pub options: CodecOptions,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device_type: None,
            device: None,
            options: CodecOptions::new(),
        }
    }
}

impl HardwareConfig {
    /// Build the configured device context.
    ///
    /// An explicit `device_type` must initialize or this fails; automatic
    /// selection falls back to software (`Ok(None)`).
    pub fn resolve<B: Backend>(&self, backend: &B) -> Result<Option<HardwareContext<B>>, HardwareError> {
        if !self.enabled {
            log::info!("Hardware acceleration disabled by config");
            return Ok(None);
        }

        match self.device_type {
            Some(device_type) => {
                HardwareContext::create(backend, device_type, self.device.as_deref(), &self.options)
                    .map(Some)
            }
            None => Ok(HardwareContext::auto(
                backend,
                &HardwareOptions {
                    device: self.device.clone(),
                    options: self.options.clone(),
                },
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub hardware: HardwareConfig,
    pub decoder: DecoderOptions,
    /// Encoder to use by name, e.g. `libx264`; the best available when unset
    pub encoder_name: Option<String>,
    pub encoder: EncoderSettings,
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = Self::from_json(&std::fs::read_to_string(path)?)?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
