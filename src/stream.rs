// Stream descriptors
// Immutable snapshot of a source stream's codec parameters, supplied by the demuxing side.

use crate::format::{ChannelLayout, CodecId, MediaType, PixelFormat, Rational, SampleFormat};
use serde::{Deserialize, Serialize};

/// Codec parameters shared between streams, decoders and encoders
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecParameters {
    pub media_type: MediaType,
    pub codec_id: Option<CodecId>,
    pub width: u32,
    pub height: u32,
    pub pixel_format: Option<PixelFormat>,
    pub sample_aspect_ratio: Rational,
    pub sample_rate: u32,
    pub sample_format: Option<SampleFormat>,
    pub channel_layout: ChannelLayout,
    pub bit_rate: u64,
    /// Out-of-band codec configuration (e.g. SPS/PPS for H.264)
    #[serde(skip)]
    pub extradata: Vec<u8>,
}

impl CodecParameters {
    pub fn video(codec_id: CodecId, width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        Self {
            media_type: MediaType::Video,
            codec_id: Some(codec_id),
            width,
            height,
            pixel_format: Some(pixel_format),
            sample_aspect_ratio: Rational::new(1, 1),
            ..Default::default()
        }
    }

    pub fn audio(
        codec_id: CodecId,
        sample_rate: u32,
        sample_format: SampleFormat,
        channel_layout: ChannelLayout,
    ) -> Self {
        Self {
            media_type: MediaType::Audio,
            codec_id: Some(codec_id),
            sample_rate,
            sample_format: Some(sample_format),
            channel_layout,
            ..Default::default()
        }
    }
}

/// Read-only description of one demuxed stream.
///
/// `N` is the backend's own parameter type. When present it is what the decoder
/// is configured from, so fields without a plain-data counterpart (profile,
/// block alignment, color description, ...) reach the codec intact.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor<N = ()> {
    /// Index of the stream inside its container; packets are tagged with it
    pub index: usize,
    pub time_base: Rational,
    /// Average frame rate, unset for audio and unknown rates
    pub frame_rate: Rational,
    pub parameters: CodecParameters,
    pub native: Option<N>,
}

impl<N> StreamDescriptor<N> {
    pub fn new(index: usize, time_base: Rational, parameters: CodecParameters) -> Self {
        Self {
            index,
            time_base,
            frame_rate: Rational::default(),
            parameters,
            native: None,
        }
    }

    pub fn with_frame_rate(mut self, frame_rate: Rational) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    pub fn with_native(mut self, native: N) -> Self {
        self.native = Some(native);
        self
    }

    pub fn media_type(&self) -> MediaType {
        self.parameters.media_type
    }
}
