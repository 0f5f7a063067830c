// FFmpeg codec and device contexts
// Owned raw pointers, freed once on drop.

use super::{
    check, codec_id_from_native, cstring, native_codec_id, native_pixel_format, native_sample_format,
    options_dictionary, pixel_format_from_native, sample_format_from_native,
};
use crate::format::{ChannelLayout, MediaType, Rational};
use crate::native::{CodecOptions, NativeContext, NativeError};
use crate::stream::CodecParameters;
use ffmpeg_next::{codec, ffi};
use ffmpeg_next::packet::{Mut as _, Ref as _};
use ffmpeg_next::{Dictionary, Frame, Packet};
use std::os::raw::c_int;
use std::ptr;

fn to_native(rational: Rational) -> ffi::AVRational {
    ffi::AVRational {
        num: rational.num,
        den: rational.den,
    }
}

fn from_native(rational: ffi::AVRational) -> Rational {
    Rational::new(rational.num, rational.den)
}

/// Reference to an `AVHWDeviceContext` buffer
pub struct FfmpegDevice {
    ptr: *mut ffi::AVBufferRef,
}

impl FfmpegDevice {
    pub(crate) fn create(
        device_type: ffi::AVHWDeviceType,
        device: Option<&str>,
        options: &CodecOptions,
    ) -> Result<Self, NativeError> {
        if device_type == ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_NONE {
            return Err(NativeError::code(ffi::AVERROR(ffi::ENOSYS), "Unknown device type"));
        }

        let device = device.map(cstring).transpose()?;
        let dict = options_dictionary(options);
        let mut ptr: *mut ffi::AVBufferRef = ptr::null_mut();

        let ret = unsafe {
            let mut raw = dict.disown();
            let ret = ffi::av_hwdevice_ctx_create(
                &mut ptr,
                device_type,
                device.as_ref().map_or(ptr::null(), |d| d.as_ptr()),
                raw,
                0,
            );
            ffi::av_dict_free(&mut raw);
            ret
        };
        check(ret)?;
        if ptr.is_null() {
            return Err(NativeError::code(ffi::AVERROR(ffi::ENOMEM), "Device context is null"));
        }

        Ok(Self { ptr })
    }

    pub fn as_ptr(&self) -> *mut ffi::AVBufferRef {
        self.ptr
    }
}

impl Drop for FfmpegDevice {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                ffi::av_buffer_unref(&mut self.ptr);
            }
        }
    }
}

/// Owned `AVCodecContext` together with the codec it was allocated for
pub struct FfmpegContext {
    ptr: *mut ffi::AVCodecContext,
    codec: *const ffi::AVCodec,
}

impl FfmpegContext {
    pub(crate) fn alloc(codec: *const ffi::AVCodec) -> Result<Self, NativeError> {
        let ptr = unsafe { ffi::avcodec_alloc_context3(codec) };
        if ptr.is_null() {
            return Err(NativeError::code(ffi::AVERROR(ffi::ENOMEM), "Cannot allocate codec context"));
        }
        Ok(Self { ptr, codec })
    }

    pub fn as_ptr(&self) -> *const ffi::AVCodecContext {
        self.ptr
    }

    pub fn as_mut_ptr(&mut self) -> *mut ffi::AVCodecContext {
        self.ptr
    }
}

impl Drop for FfmpegContext {
    fn drop(&mut self) {
        unsafe {
            ffi::avcodec_free_context(&mut self.ptr);
        }
    }
}

impl NativeContext for FfmpegContext {
    type Device = FfmpegDevice;
    type Frame = Frame;
    type Packet = Packet;
    type Parameters = codec::Parameters;

    fn set_parameters(&mut self, parameters: &CodecParameters) -> Result<(), NativeError> {
        let ctx = unsafe { &mut *self.ptr };

        if let Some(id) = parameters.codec_id.as_ref().and_then(native_codec_id) {
            ctx.codec_id = id;
        }
        if parameters.bit_rate > 0 {
            ctx.bit_rate = parameters.bit_rate as i64;
        }

        match parameters.media_type {
            MediaType::Video => {
                ctx.codec_type = ffi::AVMediaType::AVMEDIA_TYPE_VIDEO;
                ctx.width = parameters.width as c_int;
                ctx.height = parameters.height as c_int;
                if let Some(format) = &parameters.pixel_format {
                    ctx.pix_fmt = native_pixel_format(format);
                }
                if !parameters.sample_aspect_ratio.is_unset() {
                    ctx.sample_aspect_ratio = to_native(parameters.sample_aspect_ratio);
                }
            }
            MediaType::Audio => {
                ctx.codec_type = ffi::AVMediaType::AVMEDIA_TYPE_AUDIO;
                ctx.sample_rate = parameters.sample_rate as c_int;
                if let Some(format) = parameters.sample_format {
                    ctx.sample_fmt = native_sample_format(format);
                }
                let layout = parameters.channel_layout;
                if layout.channels > 0 {
                    unsafe {
                        ffi::av_channel_layout_uninit(&mut ctx.ch_layout);
                        if layout.mask != 0 {
                            check(ffi::av_channel_layout_from_mask(&mut ctx.ch_layout, layout.mask))?;
                        } else {
                            ffi::av_channel_layout_default(&mut ctx.ch_layout, layout.channels as c_int);
                        }
                    }
                }
            }
            MediaType::Unknown => {}
        }

        if !parameters.extradata.is_empty() {
            let size = parameters.extradata.len();
            let padding = ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize;
            unsafe {
                ffi::av_freep(&mut ctx.extradata as *mut *mut u8 as *mut std::ffi::c_void);
                let data = ffi::av_mallocz(size + padding) as *mut u8;
                if data.is_null() {
                    return Err(NativeError::code(ffi::AVERROR(ffi::ENOMEM), "Cannot allocate extradata"));
                }
                ptr::copy_nonoverlapping(parameters.extradata.as_ptr(), data, size);
                ctx.extradata = data;
                ctx.extradata_size = size as c_int;
            }
        }

        Ok(())
    }

    fn apply_parameters(&mut self, parameters: &codec::Parameters) -> Result<(), NativeError> {
        check(unsafe { ffi::avcodec_parameters_to_context(self.ptr, parameters.as_ptr()) })
    }

    fn set_thread_count(&mut self, threads: u32) {
        unsafe { (*self.ptr).thread_count = threads as c_int };
    }

    fn set_packet_time_base(&mut self, time_base: Rational) {
        unsafe { (*self.ptr).pkt_timebase = to_native(time_base) };
    }

    fn set_time_base(&mut self, time_base: Rational) {
        unsafe { (*self.ptr).time_base = to_native(time_base) };
    }

    fn set_frame_rate(&mut self, frame_rate: Rational) {
        unsafe { (*self.ptr).framerate = to_native(frame_rate) };
    }

    fn attach_device(&mut self, device: &FfmpegDevice) -> Result<(), NativeError> {
        unsafe {
            let ctx = &mut *self.ptr;
            if !ctx.hw_device_ctx.is_null() {
                ffi::av_buffer_unref(&mut ctx.hw_device_ctx);
            }
            ctx.hw_device_ctx = ffi::av_buffer_ref(device.as_ptr());
            if ctx.hw_device_ctx.is_null() {
                return Err(NativeError::code(ffi::AVERROR(ffi::ENOMEM), "Cannot reference device"));
            }
        }
        Ok(())
    }

    fn open(&mut self, options: &CodecOptions) -> Result<(), NativeError> {
        let dict = options_dictionary(options);
        let (ret, unused) = unsafe {
            let mut raw = dict.disown();
            let ret = ffi::avcodec_open2(self.ptr, self.codec, &mut raw);
            (ret, Dictionary::own(raw))
        };
        check(ret)?;

        for (key, value) in unused.iter() {
            log::warn!("Codec option not recognized: {}={}", key, value);
        }
        Ok(())
    }

    fn send_packet(&mut self, packet: Option<&Packet>) -> Result<(), NativeError> {
        let raw = packet.map_or(ptr::null(), |packet| packet.as_ptr());
        check(unsafe { ffi::avcodec_send_packet(self.ptr, raw) })
    }

    fn receive_frame(&mut self, frame: &mut Frame) -> Result<(), NativeError> {
        check(unsafe { ffi::avcodec_receive_frame(self.ptr, frame.as_mut_ptr()) })
    }

    fn send_frame(&mut self, frame: Option<&Frame>) -> Result<(), NativeError> {
        let raw = frame.map_or(ptr::null(), |frame| unsafe { frame.as_ptr() });
        check(unsafe { ffi::avcodec_send_frame(self.ptr, raw) })
    }

    fn receive_packet(&mut self, packet: &mut Packet) -> Result<(), NativeError> {
        check(unsafe { ffi::avcodec_receive_packet(self.ptr, packet.as_mut_ptr()) })
    }

    fn parameters(&self) -> CodecParameters {
        let ctx = unsafe { &*self.ptr };
        let media_type = match ctx.codec_type {
            ffi::AVMediaType::AVMEDIA_TYPE_VIDEO => MediaType::Video,
            ffi::AVMediaType::AVMEDIA_TYPE_AUDIO => MediaType::Audio,
            _ => MediaType::Unknown,
        };

        let mask = if ctx.ch_layout.order == ffi::AVChannelOrder::AV_CHANNEL_ORDER_NATIVE {
            unsafe { ctx.ch_layout.u.mask }
        } else {
            0
        };

        CodecParameters {
            media_type,
            codec_id: codec_id_from_native(ctx.codec_id),
            width: ctx.width.max(0) as u32,
            height: ctx.height.max(0) as u32,
            pixel_format: pixel_format_from_native(ctx.pix_fmt),
            sample_aspect_ratio: from_native(ctx.sample_aspect_ratio),
            sample_rate: ctx.sample_rate.max(0) as u32,
            sample_format: sample_format_from_native(ctx.sample_fmt),
            channel_layout: ChannelLayout {
                channels: ctx.ch_layout.nb_channels.max(0) as u32,
                mask,
            },
            bit_rate: ctx.bit_rate.max(0) as u64,
            extradata: Vec::new(),
        }
    }
}
