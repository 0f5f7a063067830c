//! FFmpeg implementation of the native boundary
//!
//! Codecs, contexts and device buffers are driven through `ffmpeg_next::ffi`.
//! Frames and packets are `ffmpeg_next`'s own reference-counted wrappers.
//! Codec ids and pixel formats cross the boundary by their FFmpeg names; names
//! without a dedicated variant are carried as `Other`.

mod context;
mod input;
mod units;

pub use context::{FfmpegContext, FfmpegDevice};
pub use input::{FfmpegInput, FfmpegStream};

use crate::format::{CodecId, MediaType, PixelFormat, SampleFormat};
use crate::hardware::DeviceType;
use crate::native::{Backend, CodecInfo, CodecOptions, Direction, HwConfig, HwMethods, NativeError};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::ffi;
use ffmpeg_next::{Dictionary, Frame, Packet};
use once_cell::sync::OnceCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_int, c_void};
use std::ptr;

static FFMPEG_INIT: OnceCell<()> = OnceCell::new();

/// `AV_CODEC_CAP_HARDWARE`
const CAP_HARDWARE: c_int = 1 << 18;

/// Initialize FFmpeg (runs once)
fn init_ffmpeg() -> Result<(), NativeError> {
    FFMPEG_INIT
        .get_or_try_init(|| {
            ffmpeg::init().map_err(map_error)?;
            // Enable verbose logging in debug builds
            if cfg!(debug_assertions) {
                ffmpeg::log::set_level(ffmpeg::log::Level::Info);
            }
            log::debug!("FFmpeg initialized");
            Ok(())
        })
        .map(|_| ())
}

/// Classify an `ffmpeg_next` error
pub(crate) fn map_error(err: ffmpeg::Error) -> NativeError {
    match err {
        ffmpeg::Error::Eof => NativeError::Eof,
        ffmpeg::Error::Other { errno } if errno == ffmpeg::error::EAGAIN => NativeError::Again,
        other => NativeError::code(c_int::from(other), other.to_string()),
    }
}

/// Classify a raw return code; negative values are errors
pub(crate) fn check(ret: c_int) -> Result<(), NativeError> {
    if ret >= 0 {
        Ok(())
    } else {
        Err(map_error(ffmpeg::Error::from(ret)))
    }
}

fn cstring(value: &str) -> Result<CString, NativeError> {
    CString::new(value).map_err(|_| NativeError::code(ffi::AVERROR(ffi::EINVAL), "Invalid string"))
}

unsafe fn str_from(ptr: *const std::os::raw::c_char) -> Option<&'static str> {
    if ptr.is_null() {
        None
    } else {
        unsafe { CStr::from_ptr(ptr) }.to_str().ok()
    }
}

pub(crate) fn options_dictionary(options: &CodecOptions) -> Dictionary<'static> {
    let mut dict = Dictionary::new();
    for (key, value) in options {
        dict.set(key, value);
    }
    dict
}

pub(crate) fn native_codec_id(codec: &CodecId) -> Option<ffi::AVCodecID> {
    let name = cstring(codec.name()).ok()?;
    let descriptor = unsafe { ffi::avcodec_descriptor_get_by_name(name.as_ptr()) };
    if descriptor.is_null() {
        None
    } else {
        Some(unsafe { (*descriptor).id })
    }
}

pub(crate) fn codec_id_from_native(id: ffi::AVCodecID) -> Option<CodecId> {
    if id == ffi::AVCodecID::AV_CODEC_ID_NONE {
        return None;
    }
    unsafe { str_from(ffi::avcodec_get_name(id)) }.map(CodecId::from_name)
}

pub(crate) fn native_pixel_format(format: &PixelFormat) -> ffi::AVPixelFormat {
    match cstring(format.name()) {
        Ok(name) => unsafe { ffi::av_get_pix_fmt(name.as_ptr()) },
        Err(_) => ffi::AVPixelFormat::AV_PIX_FMT_NONE,
    }
}

pub(crate) fn pixel_format_from_native(format: ffi::AVPixelFormat) -> Option<PixelFormat> {
    if format == ffi::AVPixelFormat::AV_PIX_FMT_NONE {
        return None;
    }
    unsafe { str_from(ffi::av_get_pix_fmt_name(format)) }.map(PixelFormat::from_name)
}

/// Pixel format from an untyped `format` field (frames, codec parameters).
/// Walks the descriptor table rather than casting, since `raw` may be out of range.
pub(crate) fn pixel_format_from_raw(raw: c_int) -> Option<PixelFormat> {
    if raw < 0 {
        return None;
    }
    let mut desc = ptr::null();
    loop {
        desc = unsafe { ffi::av_pix_fmt_desc_next(desc) };
        if desc.is_null() {
            return None;
        }
        if unsafe { ffi::av_pix_fmt_desc_get_id(desc) } as c_int == raw {
            return unsafe { str_from((*desc).name) }.map(PixelFormat::from_name);
        }
    }
}

pub(crate) fn native_sample_format(format: SampleFormat) -> ffi::AVSampleFormat {
    match cstring(format.name()) {
        Ok(name) => unsafe { ffi::av_get_sample_fmt(name.as_ptr()) },
        Err(_) => ffi::AVSampleFormat::AV_SAMPLE_FMT_NONE,
    }
}

pub(crate) fn sample_format_from_native(format: ffi::AVSampleFormat) -> Option<SampleFormat> {
    if format == ffi::AVSampleFormat::AV_SAMPLE_FMT_NONE {
        return None;
    }
    unsafe { str_from(ffi::av_get_sample_fmt_name(format)) }.and_then(SampleFormat::from_name)
}

pub(crate) fn sample_format_from_raw(raw: c_int) -> Option<SampleFormat> {
    if raw < 0 {
        return None;
    }
    SampleFormat::ALL
        .iter()
        .copied()
        .find(|format| native_sample_format(*format) as c_int == raw)
}

pub(crate) fn native_device_type(device_type: DeviceType) -> ffi::AVHWDeviceType {
    match cstring(device_type.name()) {
        Ok(name) => unsafe { ffi::av_hwdevice_find_type_by_name(name.as_ptr()) },
        Err(_) => ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_NONE,
    }
}

pub(crate) fn device_type_from_native(device_type: ffi::AVHWDeviceType) -> Option<DeviceType> {
    unsafe { str_from(ffi::av_hwdevice_get_type_name(device_type)) }.and_then(DeviceType::from_name)
}

fn media_type_from_native(media: ffi::AVMediaType) -> MediaType {
    match media {
        ffi::AVMediaType::AVMEDIA_TYPE_VIDEO => MediaType::Video,
        ffi::AVMediaType::AVMEDIA_TYPE_AUDIO => MediaType::Audio,
        _ => MediaType::Unknown,
    }
}

/// Snapshot of a native codec's identity and capabilities
unsafe fn codec_info(codec: *const ffi::AVCodec) -> CodecInfo {
    let raw = unsafe { &*codec };
    let direction = if unsafe { ffi::av_codec_is_encoder(codec) } != 0 {
        Direction::Encoder
    } else {
        Direction::Decoder
    };

    let mut pixel_formats = Vec::new();
    let mut configs: *const c_void = ptr::null();
    let mut count: c_int = 0;
    let ret = unsafe {
        ffi::avcodec_get_supported_config(
            ptr::null(),
            codec,
            ffi::AVCodecConfig::AV_CODEC_CONFIG_PIX_FORMAT,
            0,
            &mut configs,
            &mut count,
        )
    };
    if ret >= 0 && !configs.is_null() {
        let formats = configs as *const ffi::AVPixelFormat;
        pixel_formats.extend(
            (0..count.max(0) as usize)
                .filter_map(|i| pixel_format_from_native(unsafe { *formats.add(i) })),
        );
    }

    let mut hw_configs = Vec::new();
    for index in 0.. {
        let config = unsafe { ffi::avcodec_get_hw_config(codec, index) };
        if config.is_null() {
            break;
        }
        let config = unsafe { &*config };
        let (Some(pixel_format), Some(device_type)) = (
            pixel_format_from_native(config.pix_fmt),
            device_type_from_native(config.device_type),
        ) else {
            continue;
        };
        hw_configs.push(HwConfig {
            pixel_format,
            device_type,
            methods: HwMethods::from_bits(config.methods as u32),
        });
    }

    CodecInfo {
        name: unsafe { str_from(raw.name) }.unwrap_or_default().to_string(),
        id: codec_id_from_native(raw.id),
        media_type: media_type_from_native(raw.type_),
        direction,
        hardware: raw.capabilities & CAP_HARDWARE != 0,
        pixel_formats,
        hw_configs,
    }
}

/// Native codec pointer for a snapshot taken earlier
pub(crate) fn find_native(info: &CodecInfo) -> Option<*const ffi::AVCodec> {
    let name = cstring(&info.name).ok()?;
    let codec = unsafe {
        if info.is_encoder() {
            ffi::avcodec_find_encoder_by_name(name.as_ptr())
        } else {
            ffi::avcodec_find_decoder_by_name(name.as_ptr())
        }
    };
    (!codec.is_null()).then_some(codec)
}

/// The FFmpeg libraries linked into this process
#[derive(Debug, Clone, Copy)]
pub struct FfmpegBackend {
    _private: (),
}

impl FfmpegBackend {
    pub fn new() -> Result<Self, NativeError> {
        init_ffmpeg()?;
        Ok(Self { _private: () })
    }

    fn find(&self, codec: &CodecId, direction: Direction) -> Option<CodecInfo> {
        let id = native_codec_id(codec)?;
        let native = unsafe {
            match direction {
                Direction::Decoder => ffi::avcodec_find_decoder(id),
                Direction::Encoder => ffi::avcodec_find_encoder(id),
            }
        };
        (!native.is_null()).then(|| unsafe { codec_info(native) })
    }
}

impl Backend for FfmpegBackend {
    type Device = FfmpegDevice;
    type Frame = Frame;
    type Packet = Packet;
    type Parameters = ffmpeg::codec::Parameters;
    type Context = FfmpegContext;

    fn find_decoder(&self, id: &CodecId) -> Option<CodecInfo> {
        self.find(id, Direction::Decoder)
    }

    fn find_encoder(&self, id: &CodecId) -> Option<CodecInfo> {
        self.find(id, Direction::Encoder)
    }

    fn find_encoder_by_name(&self, name: &str) -> Option<CodecInfo> {
        let name = cstring(name).ok()?;
        let native = unsafe { ffi::avcodec_find_encoder_by_name(name.as_ptr()) };
        (!native.is_null()).then(|| unsafe { codec_info(native) })
    }

    fn alloc_context(&self, codec: &CodecInfo) -> Result<FfmpegContext, NativeError> {
        let native = find_native(codec).ok_or_else(|| {
            NativeError::code(ffi::AVERROR_ENCODER_NOT_FOUND, format!("Codec {} not found", codec.name))
        })?;
        FfmpegContext::alloc(native)
    }

    fn alloc_frame(&self) -> Result<Frame, NativeError> {
        Ok(Frame::empty())
    }

    fn alloc_packet(&self) -> Result<Packet, NativeError> {
        Ok(Packet::empty())
    }

    fn device_types(&self) -> Vec<DeviceType> {
        let mut types = Vec::new();
        let mut current = ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_NONE;
        loop {
            current = unsafe { ffi::av_hwdevice_iterate_types(current) };
            if current == ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_NONE {
                break;
            }
            match device_type_from_native(current) {
                Some(device_type) => types.push(device_type),
                None => log::debug!("Skipping unrecognized hardware device type {:?}", current),
            }
        }
        types
    }

    fn create_device(
        &self,
        device_type: DeviceType,
        device: Option<&str>,
        options: &CodecOptions,
    ) -> Result<FfmpegDevice, NativeError> {
        FfmpegDevice::create(native_device_type(device_type), device, options)
    }
}
