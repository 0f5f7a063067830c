// Hardware device types and their canonical device-resident pixel formats

use crate::format::{PixelFormat, named_enum};

named_enum! {
    /// Hardware acceleration backend, named as the native library names it
    pub enum DeviceType ("device type") {
        Vdpau => "vdpau",
        Cuda => "cuda",
        Vaapi => "vaapi",
        Dxva2 => "dxva2",
        Qsv => "qsv",
        Videotoolbox => "videotoolbox",
        D3d11va => "d3d11va",
        Drm => "drm",
        Opencl => "opencl",
        Mediacodec => "mediacodec",
        Vulkan => "vulkan",
        D3d12va => "d3d12va",
        Amf => "amf",
        Ohcodec => "ohcodec",
    }
}

impl DeviceType {
    /// Pixel format decoded frames carry when they stay on this backend.
    /// Unmapped backends fall back to NV12.
    pub fn pixel_format(&self) -> PixelFormat {
        match self {
            DeviceType::Videotoolbox => PixelFormat::Videotoolbox,
            DeviceType::Vaapi => PixelFormat::Vaapi,
            DeviceType::Cuda => PixelFormat::Cuda,
            DeviceType::Qsv => PixelFormat::Qsv,
            DeviceType::D3d11va => PixelFormat::D3d11,
            DeviceType::D3d12va => PixelFormat::D3d12,
            DeviceType::Dxva2 => PixelFormat::Dxva2Vld,
            DeviceType::Drm => PixelFormat::DrmPrime,
            DeviceType::Opencl => PixelFormat::Opencl,
            DeviceType::Mediacodec => PixelFormat::Mediacodec,
            DeviceType::Vulkan => PixelFormat::Vulkan,
            DeviceType::Vdpau => PixelFormat::Vdpau,
            DeviceType::Amf | DeviceType::Ohcodec => PixelFormat::Nv12,
        }
    }
}
