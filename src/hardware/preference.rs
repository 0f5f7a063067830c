// Platform preference tables for automatic device selection.
// The ordering reflects driver reliability observed per platform; it is data, not protocol.

use super::DeviceType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    MacOs,
    Windows,
    Linux,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    Arm,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    pub const fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Platform this binary was built for
    pub fn current() -> Self {
        let os = match std::env::consts::OS {
            "macos" => Os::MacOs,
            "windows" => Os::Windows,
            "linux" => Os::Linux,
            _ => Os::Other,
        };
        let arch = match std::env::consts::ARCH {
            "aarch64" | "arm" => Arch::Arm,
            _ => Arch::Other,
        };
        Self { os, arch }
    }
}

/// (OS, architecture or any) -> preferred device types, first match wins
const PREFERENCES: &[(Os, Option<Arch>, &[DeviceType])] = &[
    (Os::MacOs, None, &[DeviceType::Videotoolbox]),
    (
        Os::Windows,
        None,
        &[
            DeviceType::Dxva2,
            DeviceType::D3d11va,
            DeviceType::D3d12va,
            DeviceType::Cuda,
            DeviceType::Vulkan,
            DeviceType::Opencl,
        ],
    ),
    (Os::Linux, Some(Arch::Arm), &[DeviceType::Drm, DeviceType::Vaapi]),
    (
        Os::Linux,
        None,
        &[
            DeviceType::Cuda,
            DeviceType::Vaapi,
            DeviceType::Qsv,
            DeviceType::Vdpau,
            DeviceType::Vulkan,
            DeviceType::Opencl,
            DeviceType::Drm,
        ],
    ),
];

pub fn preferred(platform: Platform) -> &'static [DeviceType] {
    PREFERENCES
        .iter()
        .find(|(os, arch, _)| *os == platform.os && arch.is_none_or(|arch| arch == platform.arch))
        .map(|(_, _, types)| *types)
        .unwrap_or(&[])
}

/// Candidates to try, in order: preferred types the library reports as available,
/// then any remaining available types in the library's own order.
pub fn candidate_order(platform: Platform, available: &[DeviceType]) -> Vec<DeviceType> {
    let preferred = preferred(platform);
    let mut order: Vec<DeviceType> = preferred
        .iter()
        .copied()
        .filter(|device_type| available.contains(device_type))
        .collect();

    for device_type in available {
        if !order.contains(device_type) {
            order.push(*device_type);
        }
    }

    order
}
