// Media value types
// Backend-neutral codec ids, pixel/sample formats and rationals.
// Names match the native library's canonical names so backends can map by name.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rational number used for time bases, frame rates and aspect ratios
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Rationals with a zero numerator or denominator carry no information
    pub fn is_unset(&self) -> bool {
        self.num == 0 || self.den == 0
    }

    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }

    pub fn invert(&self) -> Self {
        Self::new(self.den, self.num)
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::new(0, 1)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Audio,
    #[default]
    Unknown,
}

/// Unknown-name error shared by the `FromStr` impls in this module
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind}: {name}")]
pub struct UnknownName {
    pub kind: &'static str,
    pub name: String,
}

macro_rules! named_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $ty:ident ($kind:literal) {
            $($variant:ident => $name:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $ty {
            $($variant),+
        }

        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            /// Canonical native library name
            pub fn name(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some($ty::$variant),)+
                    _ => None,
                }
            }
        }

        impl ::std::str::FromStr for $ty {
            type Err = $crate::format::UnknownName;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $ty::from_name(&s.to_ascii_lowercase()).ok_or_else(|| $crate::format::UnknownName {
                    kind: $kind,
                    name: s.to_string(),
                })
            }
        }

        $crate::format::named_enum!(@common $ty);
    };

    // Open set: names outside the list are carried verbatim in `$other`
    (
        $(#[$meta:meta])*
        $vis:vis enum $ty:ident ($kind:literal, other = $other:ident) {
            $($variant:ident => $name:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        $vis enum $ty {
            $($variant,)+
            /// Any other native name
            $other(String),
        }

        impl $ty {
            /// Canonical native library name
            pub fn name(&self) -> &str {
                match self {
                    $($ty::$variant => $name,)+
                    $ty::$other(name) => name,
                }
            }

            /// Never fails: unlisted names are kept verbatim
            pub fn from_name(name: &str) -> Self {
                match name {
                    $($name => $ty::$variant,)+
                    other => $ty::$other(other.to_string()),
                }
            }

            pub fn is_known(&self) -> bool {
                !matches!(self, $ty::$other(_))
            }
        }

        impl ::std::str::FromStr for $ty {
            type Err = ::std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok($ty::from_name(&s.to_ascii_lowercase()))
            }
        }

        $crate::format::named_enum!(@common $ty);
    };

    (@common $ty:ident) => {
        impl ::std::fmt::Display for $ty {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.name())
            }
        }

        impl ::serde::Serialize for $ty {
            fn serialize<S: ::serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.name())
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $ty {
            fn deserialize<D: ::serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let name = <String as ::serde::Deserialize>::deserialize(deserializer)?;
                name.parse().map_err(::serde::de::Error::custom)
            }
        }
    };
}

pub(crate) use named_enum;

named_enum! {
    /// Codec identity, by the native library's codec name
    pub enum CodecId ("codec", other = Other) {
        H264 => "h264",
        Hevc => "hevc",
        Vp8 => "vp8",
        Vp9 => "vp9",
        Av1 => "av1",
        Mpeg2Video => "mpeg2video",
        Mpeg4 => "mpeg4",
        Mjpeg => "mjpeg",
        ProRes => "prores",
        Vvc => "vvc",
        Aac => "aac",
        Mp3 => "mp3",
        Opus => "opus",
        Vorbis => "vorbis",
        Flac => "flac",
        Ac3 => "ac3",
        PcmS16le => "pcm_s16le",
    }
}

impl CodecId {
    pub fn media_type(&self) -> MediaType {
        match self {
            CodecId::H264
            | CodecId::Hevc
            | CodecId::Vp8
            | CodecId::Vp9
            | CodecId::Av1
            | CodecId::Mpeg2Video
            | CodecId::Mpeg4
            | CodecId::Mjpeg
            | CodecId::ProRes
            | CodecId::Vvc => MediaType::Video,
            CodecId::Aac
            | CodecId::Mp3
            | CodecId::Opus
            | CodecId::Vorbis
            | CodecId::Flac
            | CodecId::Ac3
            | CodecId::PcmS16le => MediaType::Audio,
            CodecId::Other(_) => MediaType::Unknown,
        }
    }

    /// Stem used by encoder implementations named `<family>_<backend>`
    pub fn family(&self) -> &str {
        match self {
            CodecId::Mpeg2Video => "mpeg2",
            other => other.name(),
        }
    }
}

named_enum! {
    /// Pixel format, including device-resident hardware formats
    pub enum PixelFormat ("pixel format", other = Other) {
        Yuv420p => "yuv420p",
        Yuvj420p => "yuvj420p",
        Yuv422p => "yuv422p",
        Yuv444p => "yuv444p",
        Yuv420p10le => "yuv420p10le",
        Yuv422p10le => "yuv422p10le",
        Yuv444p10le => "yuv444p10le",
        Nv12 => "nv12",
        P010le => "p010le",
        Rgb24 => "rgb24",
        Bgr24 => "bgr24",
        Rgba => "rgba",
        Bgra => "bgra",
        Bgr0 => "bgr0",
        Gray8 => "gray",
        Cuda => "cuda",
        Vaapi => "vaapi",
        Vdpau => "vdpau",
        Qsv => "qsv",
        Dxva2Vld => "dxva2_vld",
        D3d11 => "d3d11",
        D3d12 => "d3d12",
        Videotoolbox => "videotoolbox_vld",
        DrmPrime => "drm_prime",
        Opencl => "opencl",
        Mediacodec => "mediacodec",
        Vulkan => "vulkan",
        Amf => "amf_surface",
        Ohcodec => "ohcodec",
    }
}

impl PixelFormat {
    /// Whether frames in this format live in device memory
    pub fn is_hardware(&self) -> bool {
        matches!(
            self,
            PixelFormat::Cuda
                | PixelFormat::Vaapi
                | PixelFormat::Vdpau
                | PixelFormat::Qsv
                | PixelFormat::Dxva2Vld
                | PixelFormat::D3d11
                | PixelFormat::D3d12
                | PixelFormat::Videotoolbox
                | PixelFormat::DrmPrime
                | PixelFormat::Opencl
                | PixelFormat::Mediacodec
                | PixelFormat::Vulkan
                | PixelFormat::Amf
                | PixelFormat::Ohcodec
        )
    }
}

named_enum! {
    /// Audio sample format
    pub enum SampleFormat ("sample format") {
        U8 => "u8",
        S16 => "s16",
        S32 => "s32",
        Flt => "flt",
        Dbl => "dbl",
        U8p => "u8p",
        S16p => "s16p",
        S32p => "s32p",
        Fltp => "fltp",
        Dblp => "dblp",
        S64 => "s64",
        S64p => "s64p",
    }
}

impl SampleFormat {
    pub fn is_planar(&self) -> bool {
        matches!(
            self,
            SampleFormat::U8p
                | SampleFormat::S16p
                | SampleFormat::S32p
                | SampleFormat::Fltp
                | SampleFormat::Dblp
                | SampleFormat::S64p
        )
    }
}

/// Channel layout as a channel count plus native channel mask (0 = unspecified order)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ChannelLayout {
    pub channels: u32,
    pub mask: u64,
}

impl ChannelLayout {
    pub const MONO: ChannelLayout = ChannelLayout { channels: 1, mask: 0x4 };
    pub const STEREO: ChannelLayout = ChannelLayout { channels: 2, mask: 0x3 };

    pub fn unspecified(channels: u32) -> Self {
        Self { channels, mask: 0 }
    }
}
