// Frame and packet units backed by ffmpeg_next's wrappers

use super::{check, pixel_format_from_raw};
use crate::format::PixelFormat;
use crate::native::{NativeError, NativeFrame, NativePacket, NativeUnit};
use ffmpeg_next::ffi;
use ffmpeg_next::packet::{Mut as _, Ref as _};
use ffmpeg_next::{Frame, Packet};

impl NativeUnit for Frame {
    fn unref(&mut self) {
        unsafe { ffi::av_frame_unref(self.as_mut_ptr()) };
    }

    fn try_clone(&self) -> Result<Self, NativeError> {
        let ptr = unsafe { ffi::av_frame_clone(self.as_ptr()) };
        if ptr.is_null() {
            return Err(NativeError::code(ffi::AVERROR(ffi::ENOMEM), "Cannot reference frame"));
        }
        Ok(unsafe { Frame::wrap(ptr) })
    }

    fn pts(&self) -> Option<i64> {
        Frame::pts(self)
    }
}

impl NativeFrame for Frame {
    fn pixel_format(&self) -> Option<PixelFormat> {
        pixel_format_from_raw(unsafe { (*self.as_ptr()).format })
    }
}

impl NativeUnit for Packet {
    fn unref(&mut self) {
        unsafe { ffi::av_packet_unref(self.as_mut_ptr()) };
    }

    fn try_clone(&self) -> Result<Self, NativeError> {
        let mut packet = Packet::empty();
        check(unsafe { ffi::av_packet_ref(packet.as_mut_ptr(), self.as_ptr()) })?;
        Ok(packet)
    }

    fn pts(&self) -> Option<i64> {
        Packet::pts(self)
    }
}

impl NativePacket for Packet {
    fn stream_index(&self) -> usize {
        self.stream()
    }

    fn set_stream_index(&mut self, index: usize) {
        self.set_stream(index);
    }
}
