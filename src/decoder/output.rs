// Shape of the units an engine produces, for negotiating downstream consumers

use crate::format::{ChannelLayout, PixelFormat, Rational, SampleFormat};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoOutput {
    pub width: u32,
    pub height: u32,
    /// Device format when frames stay in device memory, else the software format
    pub pixel_format: Option<PixelFormat>,
    /// Set only when decoding on a hardware device
    pub hardware_format: Option<PixelFormat>,
    pub time_base: Rational,
    pub frame_rate: Rational,
    pub sample_aspect_ratio: Rational,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioOutput {
    pub sample_rate: u32,
    pub sample_format: Option<SampleFormat>,
    pub channel_layout: ChannelLayout,
    pub time_base: Rational,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutputDescriptor {
    Video(VideoOutput),
    Audio(AudioOutput),
}

impl OutputDescriptor {
    pub fn video(&self) -> Option<&VideoOutput> {
        match self {
            OutputDescriptor::Video(video) => Some(video),
            OutputDescriptor::Audio(_) => None,
        }
    }

    pub fn audio(&self) -> Option<&AudioOutput> {
        match self {
            OutputDescriptor::Audio(audio) => Some(audio),
            OutputDescriptor::Video(_) => None,
        }
    }

    pub fn time_base(&self) -> Rational {
        match self {
            OutputDescriptor::Video(video) => video.time_base,
            OutputDescriptor::Audio(audio) => audio.time_base,
        }
    }

    pub fn is_hardware(&self) -> bool {
        self.video().is_some_and(|video| video.hardware_format.is_some())
    }
}
