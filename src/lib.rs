// avbridge - Typed decode/encode orchestration over a native codec library
// Main library entry point

pub mod config;
pub mod decoder;
pub mod encoder;
pub mod format;
pub mod hardware;
pub mod native;
pub mod stream;

mod protocol;

pub use config::{ConfigError, HardwareConfig, PipelineConfig};
pub use decoder::{Decoder, DecoderError, DecoderOptions, OutputDescriptor};
pub use encoder::{Encoder, EncoderError, EncoderSettings};
pub use format::{ChannelLayout, CodecId, MediaType, PixelFormat, Rational, SampleFormat};
pub use hardware::{DeviceType, HardwareContext, HardwareError, HardwareOptions, Platform};
pub use native::{Backend, CodecInfo, CodecOptions, NativeError};
pub use stream::{CodecParameters, StreamDescriptor};

#[cfg(feature = "ffmpeg")]
pub use native::ffmpeg::{FfmpegBackend, FfmpegInput, FfmpegStream};
