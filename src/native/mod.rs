//! Boundary to the native codec/device library
//!
//! The engines never talk to FFmpeg directly. Everything they need (codec
//! lookup, context lifecycle, the send/receive primitives, device creation and
//! hardware-config introspection) goes through [`Backend`] and [`NativeContext`].
//! Freeing is modelled with `Drop`: every native handle is released exactly once
//! when its owner goes out of scope.

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

#[cfg(test)]
pub(crate) mod mock;

use crate::format::{CodecId, MediaType, PixelFormat, Rational};
use crate::hardware::DeviceType;
use crate::stream::CodecParameters;
use std::collections::BTreeMap;
use thiserror::Error;

/// Codec/device key-value options (a native dictionary)
pub type CodecOptions = BTreeMap<String, String>;

/// Classified native return code
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NativeError {
    /// Output is not available in the current state; more input is needed
    #[error("Resource temporarily unavailable")]
    Again,
    /// No more output will be produced
    #[error("End of stream")]
    Eof,
    #[error("{message} (code {code})")]
    Code { code: i32, message: String },
}

impl NativeError {
    pub fn code(code: i32, message: impl Into<String>) -> Self {
        NativeError::Code {
            code,
            message: message.into(),
        }
    }

    pub fn is_again(&self) -> bool {
        matches!(self, NativeError::Again)
    }

    pub fn is_eof(&self) -> bool {
        matches!(self, NativeError::Eof)
    }
}

/// Hardware configuration methods a codec advertises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HwMethods(u32);

impl HwMethods {
    pub const HW_DEVICE_CTX: HwMethods = HwMethods(0x01);
    pub const HW_FRAMES_CTX: HwMethods = HwMethods(0x02);
    pub const INTERNAL: HwMethods = HwMethods(0x04);
    pub const AD_HOC: HwMethods = HwMethods(0x08);

    pub const fn from_bits(bits: u32) -> Self {
        HwMethods(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: HwMethods) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(&self, other: HwMethods) -> bool {
        self.0 & other.0 != 0
    }
}

impl std::ops::BitOr for HwMethods {
    type Output = HwMethods;

    fn bitor(self, rhs: HwMethods) -> HwMethods {
        HwMethods(self.0 | rhs.0)
    }
}

/// One entry of a codec's hardware configuration table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HwConfig {
    pub pixel_format: PixelFormat,
    pub device_type: DeviceType,
    pub methods: HwMethods,
}

impl HwConfig {
    /// Usable with a device context alone or with a frames context derived from one
    pub fn accepts_device(&self) -> bool {
        self.methods
            .intersects(HwMethods::HW_DEVICE_CTX | HwMethods::HW_FRAMES_CTX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Decoder,
    Encoder,
}

/// Plain-data snapshot of a codec implementation
#[derive(Debug, Clone, PartialEq)]
pub struct CodecInfo {
    pub name: String,
    pub id: Option<CodecId>,
    pub media_type: MediaType,
    pub direction: Direction,
    /// The implementation is backed by dedicated hardware
    pub hardware: bool,
    /// Supported pixel formats in the library's advertised order
    pub pixel_formats: Vec<PixelFormat>,
    pub hw_configs: Vec<HwConfig>,
}

impl CodecInfo {
    pub fn is_encoder(&self) -> bool {
        self.direction == Direction::Encoder
    }

    /// Whether a device of `device_type` can be attached to this codec.
    /// Codecs that publish a hardware config table need a matching entry;
    /// hardware implementations without one accept their own device.
    pub fn can_use_device(&self, device_type: DeviceType) -> bool {
        if self.hw_configs.is_empty() {
            self.hardware
        } else {
            self.device_configs(device_type).next().is_some()
        }
    }

    /// Hardware configurations usable with a device of `device_type`
    pub fn device_configs(&self, device_type: DeviceType) -> impl Iterator<Item = &HwConfig> + '_ {
        self.hw_configs
            .iter()
            .filter(move |config| config.device_type == device_type && config.accepts_device())
    }
}

/// A reusable native unit (frame or packet)
pub trait NativeUnit: Sized {
    /// Drop the references held by this unit, leaving it empty and reusable
    fn unref(&mut self);

    /// New unit sharing this unit's reference-counted backing storage
    fn try_clone(&self) -> Result<Self, NativeError>;

    fn pts(&self) -> Option<i64>;
}

pub trait NativeFrame: NativeUnit {
    /// Pixel format of a video frame, when known
    fn pixel_format(&self) -> Option<PixelFormat>;
}

pub trait NativePacket: NativeUnit {
    fn stream_index(&self) -> usize;

    fn set_stream_index(&mut self, index: usize);
}

/// Codec context lifecycle and the asynchronous send/receive protocol
pub trait NativeContext {
    type Device;
    type Frame: NativeFrame;
    type Packet: NativePacket;
    /// Library-native stream parameters, carried as-is from the demuxer
    type Parameters;

    /// Copy stream or encoder parameters into the context
    fn set_parameters(&mut self, parameters: &CodecParameters) -> Result<(), NativeError>;

    /// Copy the complete native parameter set into the context
    fn apply_parameters(&mut self, parameters: &Self::Parameters) -> Result<(), NativeError>;

    fn set_thread_count(&mut self, threads: u32);

    fn set_packet_time_base(&mut self, time_base: Rational);

    fn set_time_base(&mut self, time_base: Rational);

    fn set_frame_rate(&mut self, frame_rate: Rational);

    /// Give the context its own reference to `device`
    fn attach_device(&mut self, device: &Self::Device) -> Result<(), NativeError>;

    fn open(&mut self, options: &CodecOptions) -> Result<(), NativeError>;

    /// `None` is the end-of-input marker
    fn send_packet(&mut self, packet: Option<&Self::Packet>) -> Result<(), NativeError>;

    fn receive_frame(&mut self, frame: &mut Self::Frame) -> Result<(), NativeError>;

    /// `None` is the end-of-input marker
    fn send_frame(&mut self, frame: Option<&Self::Frame>) -> Result<(), NativeError>;

    fn receive_packet(&mut self, packet: &mut Self::Packet) -> Result<(), NativeError>;

    /// Negotiated parameters as the context currently holds them
    fn parameters(&self) -> CodecParameters;
}

/// Entry point into a native codec/device library
pub trait Backend: Clone {
    type Device;
    type Frame: NativeFrame;
    type Packet: NativePacket;
    type Parameters;
    type Context: NativeContext<
            Device = Self::Device,
            Frame = Self::Frame,
            Packet = Self::Packet,
            Parameters = Self::Parameters,
        >;

    fn find_decoder(&self, id: &CodecId) -> Option<CodecInfo>;

    fn find_encoder(&self, id: &CodecId) -> Option<CodecInfo>;

    fn find_encoder_by_name(&self, name: &str) -> Option<CodecInfo>;

    fn alloc_context(&self, codec: &CodecInfo) -> Result<Self::Context, NativeError>;

    fn alloc_frame(&self) -> Result<Self::Frame, NativeError>;

    fn alloc_packet(&self) -> Result<Self::Packet, NativeError>;

    /// Device types compiled into the library, in the library's order
    fn device_types(&self) -> Vec<DeviceType>;

    fn create_device(
        &self,
        device_type: DeviceType,
        device: Option<&str>,
        options: &CodecOptions,
    ) -> Result<Self::Device, NativeError>;
}
