// Hardware encoder naming.
// Native hardware encoders are named `<codec family>_<backend tag>`, e.g. `h264_nvenc`.

use super::DeviceType;
use crate::format::CodecId;

/// Vendor encoder tags tried for backends without encoders of their own
pub const ALTERNATIVE_SUFFIXES: [&str; 3] = ["nvenc", "qsv", "amf"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuffixRule {
    /// Always the same tag
    Fixed(&'static str),
    /// Try each of `ALTERNATIVE_SUFFIXES`
    Alternatives,
    /// Own tag for one codec family only, alternatives for everything else
    OnlyFor(CodecId, &'static str),
    /// Device type name is the tag
    DeviceName,
}

pub fn suffix_rule(device_type: DeviceType) -> SuffixRule {
    match device_type {
        DeviceType::Cuda => SuffixRule::Fixed("nvenc"),
        DeviceType::D3d11va | DeviceType::Dxva2 => SuffixRule::Alternatives,
        DeviceType::D3d12va => SuffixRule::OnlyFor(CodecId::Hevc, "d3d12va"),
        DeviceType::Opencl | DeviceType::Vdpau | DeviceType::Drm => SuffixRule::Alternatives,
        _ => SuffixRule::DeviceName,
    }
}

/// Encoder name for `codec` on `device_type`.
///
/// `exists` answers whether an encoder with a given name is compiled into the
/// library. When alternatives are tried the *last* tag in `ALTERNATIVE_SUFFIXES`
/// whose encoder exists wins; later vendors take priority when several are present.
pub fn encoder_name(
    codec: &CodecId,
    device_type: DeviceType,
    exists: impl Fn(&str) -> bool,
) -> Option<String> {
    let family = codec.family();
    let suffix = match suffix_rule(device_type) {
        SuffixRule::Fixed(suffix) => Some(suffix),
        SuffixRule::DeviceName => Some(device_type.name()),
        SuffixRule::OnlyFor(only, suffix) if only == *codec => Some(suffix),
        SuffixRule::OnlyFor(..) | SuffixRule::Alternatives => {
            let mut selected = None;
            for suffix in ALTERNATIVE_SUFFIXES {
                if exists(&format!("{}_{}", family, suffix)) {
                    selected = Some(suffix);
                }
            }
            selected
        }
    }?;

    Some(format!("{}_{}", family, suffix))
}
