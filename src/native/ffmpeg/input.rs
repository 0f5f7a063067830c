// Demuxing packet source
// Opens a container with libavformat and exposes its streams and packets.

use super::{codec_id_from_native, init_ffmpeg, map_error, pixel_format_from_raw, sample_format_from_raw};
use crate::format::{ChannelLayout, MediaType, Rational};
use crate::native::NativeError;
use crate::stream::{CodecParameters, StreamDescriptor};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::ffi;
use ffmpeg_next::{Packet, format};
use futures::Stream;
use std::path::Path;

fn rational(value: ffmpeg::Rational) -> Rational {
    Rational::new(value.numerator(), value.denominator())
}

/// Snapshot `AVCodecParameters` into plain data
fn parameters(stream: &format::stream::Stream) -> CodecParameters {
    let raw = unsafe { &*stream.parameters().as_ptr() };
    let media_type = match raw.codec_type {
        ffi::AVMediaType::AVMEDIA_TYPE_VIDEO => MediaType::Video,
        ffi::AVMediaType::AVMEDIA_TYPE_AUDIO => MediaType::Audio,
        _ => MediaType::Unknown,
    };

    let extradata = if raw.extradata.is_null() || raw.extradata_size <= 0 {
        Vec::new()
    } else {
        unsafe { std::slice::from_raw_parts(raw.extradata, raw.extradata_size as usize) }.to_vec()
    };

    let mask = if raw.ch_layout.order == ffi::AVChannelOrder::AV_CHANNEL_ORDER_NATIVE {
        unsafe { raw.ch_layout.u.mask }
    } else {
        0
    };

    CodecParameters {
        media_type,
        codec_id: codec_id_from_native(raw.codec_id),
        width: raw.width.max(0) as u32,
        height: raw.height.max(0) as u32,
        pixel_format: match media_type {
            MediaType::Video => pixel_format_from_raw(raw.format),
            _ => None,
        },
        sample_aspect_ratio: Rational::new(raw.sample_aspect_ratio.num, raw.sample_aspect_ratio.den),
        sample_rate: raw.sample_rate.max(0) as u32,
        sample_format: match media_type {
            MediaType::Audio => sample_format_from_raw(raw.format),
            _ => None,
        },
        channel_layout: ChannelLayout {
            channels: raw.ch_layout.nb_channels.max(0) as u32,
            mask,
        },
        bit_rate: raw.bit_rate.max(0) as u64,
        extradata,
    }
}

/// Stream description carrying FFmpeg's own `AVCodecParameters`
pub type FfmpegStream = StreamDescriptor<ffmpeg::codec::Parameters>;

/// An opened media file or URL
pub struct FfmpegInput {
    input: format::context::Input,
    streams: Vec<FfmpegStream>,
}

impl FfmpegInput {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, NativeError> {
        init_ffmpeg()?;
        let input = format::input(&path.as_ref()).map_err(map_error)?;

        let streams = input
            .streams()
            .map(|stream| {
                StreamDescriptor::new(stream.index(), rational(stream.time_base()), parameters(&stream))
                    .with_frame_rate(rational(stream.avg_frame_rate()))
                    .with_native(stream.parameters().clone())
            })
            .collect::<Vec<_>>();

        log::info!("Opened {} with {} streams", path.as_ref().display(), streams.len());
        Ok(Self { input, streams })
    }

    pub fn streams(&self) -> &[FfmpegStream] {
        &self.streams
    }

    /// First stream of the given media type
    pub fn best(&self, media_type: MediaType) -> Option<&FfmpegStream> {
        self.streams.iter().find(|stream| stream.media_type() == media_type)
    }

    /// Packets of all streams in container order, until end of input
    pub fn packets(&mut self) -> impl Stream<Item = Result<Packet, NativeError>> + '_ {
        let input = &mut self.input;
        futures::stream::iter(std::iter::from_fn(move || {
            loop {
                let mut packet = Packet::empty();
                match packet.read(input) {
                    Ok(()) => return Some(Ok(packet)),
                    Err(ffmpeg::Error::Eof) => return None,
                    Err(e) => match map_error(e) {
                        NativeError::Again => continue,
                        err => return Some(Err(err)),
                    },
                }
            }
        }))
    }
}
