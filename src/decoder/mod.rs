// Video/audio decode engine
// Drives the native send/receive protocol for one stream, with optional hardware device.
//
// Decoded frames are cloned out of a single reusable scratch frame, so callers own
// every frame they receive independently of the engine's internal reuse.

mod output;

pub use output::{AudioOutput, OutputDescriptor, VideoOutput};

use crate::format::{MediaType, Rational};
use crate::hardware::HardwareContext;
use crate::native::{Backend, CodecInfo, CodecOptions, NativeContext, NativeError, NativePacket};
use crate::protocol::{self, Phase};
use crate::stream::StreamDescriptor;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecoderError {
    #[error("Decoder not found for codec: {0}")]
    NotFound(String),
    #[error("Failed to initialize decoder {codec}: {source}")]
    InitError {
        codec: String,
        #[source]
        source: NativeError,
    },
    #[error("Decoder is closed")]
    Closed,
    #[error("Decoding failed: {0}")]
    DecodeFailed(#[source] NativeError),
    #[error("Packet source failed: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Decoder configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderOptions {
    /// Number of decode threads (0 for auto)
    pub thread_count: u32,
    /// Codec-specific options
    pub options: CodecOptions,
}

/// Decode engine for a single stream.
///
/// Not internally synchronized: `decode` and `flush` take `&mut self`, so one
/// caller drives the engine at a time.
pub struct Decoder<'hw, B: Backend> {
    codec: CodecInfo,
    context: Option<B::Context>,
    frame: Option<B::Frame>,
    media_type: MediaType,
    stream_index: usize,
    time_base: Rational,
    frame_rate: Rational,
    hardware: Option<&'hw HardwareContext<B>>,
}

impl<'hw, B: Backend> Decoder<'hw, B> {
    /// Create and open a decoder for `stream`.
    ///
    /// `hardware` is attached only when the decoder has a hardware config for its
    /// device type; otherwise it is ignored and decoding runs in software.
    pub fn open(
        backend: &B,
        stream: &StreamDescriptor<B::Parameters>,
        options: &DecoderOptions,
        hardware: Option<&'hw HardwareContext<B>>,
    ) -> Result<Self, DecoderError> {
        let codec_id = stream
            .parameters
            .codec_id
            .as_ref()
            .ok_or_else(|| DecoderError::NotFound("unknown".to_string()))?;
        let codec = backend
            .find_decoder(codec_id)
            .ok_or_else(|| DecoderError::NotFound(codec_id.to_string()))?;

        let init_error = |source: NativeError| DecoderError::InitError {
            codec: codec.name.clone(),
            source,
        };

        // Dropping `context` on any early return frees it
        let mut context = backend.alloc_context(&codec).map_err(init_error)?;
        match &stream.native {
            Some(native) => context.apply_parameters(native),
            None => context.set_parameters(&stream.parameters),
        }
        .map_err(init_error)?;
        context.set_packet_time_base(stream.time_base);
        context.set_thread_count(options.thread_count);

        let hardware = hardware.filter(|hw| attach_hardware::<B>(&mut context, &codec, hw));

        context.open(&options.options).map_err(init_error)?;
        let frame = backend.alloc_frame().map_err(init_error)?;

        log::info!(
            "Decoder {} opened for stream {} ({})",
            codec.name,
            stream.index,
            hardware.map_or("software", |hw| hw.device_type_name())
        );

        Ok(Self {
            codec,
            context: Some(context),
            frame: Some(frame),
            media_type: stream.media_type(),
            stream_index: stream.index,
            time_base: stream.time_base,
            frame_rate: stream.frame_rate,
            hardware,
        })
    }

    pub fn codec(&self) -> &CodecInfo {
        &self.codec
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    pub fn is_open(&self) -> bool {
        self.context.is_some()
    }

    /// Whether a hardware device was attached at open
    pub fn is_hardware(&self) -> bool {
        self.hardware.is_some()
    }

    /// Shape of the frames this decoder produces
    pub fn output(&self) -> Result<OutputDescriptor, DecoderError> {
        let context = self.context.as_ref().ok_or(DecoderError::Closed)?;
        let parameters = context.parameters();

        if self.media_type == MediaType::Audio {
            return Ok(OutputDescriptor::Audio(AudioOutput {
                sample_rate: parameters.sample_rate,
                sample_format: parameters.sample_format,
                channel_layout: parameters.channel_layout,
                time_base: self.time_base,
            }));
        }

        let hardware_format = self.hardware.map(|hw| hw.device_pixel_format());
        Ok(OutputDescriptor::Video(VideoOutput {
            width: parameters.width,
            height: parameters.height,
            pixel_format: hardware_format.clone().or(parameters.pixel_format),
            hardware_format,
            time_base: self.time_base,
            frame_rate: self.frame_rate,
            sample_aspect_ratio: parameters.sample_aspect_ratio,
        }))
    }

    /// Feed one packet and take at most one decoded frame.
    ///
    /// `Ok(None)` means the decoder needs more input before it can output.
    /// The packet stays owned by the caller.
    pub fn decode(&mut self, packet: &B::Packet) -> Result<Option<B::Frame>, DecoderError> {
        self.step(Some(packet))
    }

    /// Signal end of input and take one buffered frame.
    ///
    /// Call until it returns `Ok(None)` to retrieve every frame held for reordering.
    pub fn flush(&mut self) -> Result<Option<B::Frame>, DecoderError> {
        self.step(None)
    }

    fn step(&mut self, packet: Option<&B::Packet>) -> Result<Option<B::Frame>, DecoderError> {
        let (Some(context), Some(frame)) = (self.context.as_mut(), self.frame.as_mut()) else {
            return Err(DecoderError::Closed);
        };

        protocol::exchange(
            context,
            frame,
            packet,
            <B::Context as NativeContext>::send_packet,
            <B::Context as NativeContext>::receive_frame,
        )
        .map_err(DecoderError::DecodeFailed)
    }

    /// Decode every packet of this decoder's stream from `packets`, then drain.
    ///
    /// Packets of other streams are skipped. Each packet is dropped as soon as it
    /// has been fed. The sequence ends after the first error.
    pub fn frames<'a, S, E>(
        &'a mut self,
        packets: S,
    ) -> impl Stream<Item = Result<B::Frame, DecoderError>> + 'a
    where
        S: Stream<Item = Result<B::Packet, E>> + 'a,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'a,
    {
        futures::stream::unfold(
            (self, Box::pin(packets), Phase::Feeding),
            |(decoder, mut packets, mut phase)| async move {
                loop {
                    match phase {
                        Phase::Feeding => match packets.next().await {
                            Some(Ok(packet)) => {
                                if packet.stream_index() != decoder.stream_index {
                                    continue;
                                }
                                match decoder.decode(&packet) {
                                    Ok(Some(frame)) => {
                                        return Some((Ok(frame), (decoder, packets, phase)));
                                    }
                                    Ok(None) => {}
                                    Err(e) => {
                                        return Some((Err(e), (decoder, packets, Phase::Done)));
                                    }
                                }
                            }
                            Some(Err(e)) => {
                                let err = DecoderError::Source(e.into());
                                return Some((Err(err), (decoder, packets, Phase::Done)));
                            }
                            None => phase = Phase::Draining,
                        },
                        Phase::Draining => {
                            return match decoder.flush() {
                                Ok(Some(frame)) => Some((Ok(frame), (decoder, packets, phase))),
                                Ok(None) => None,
                                Err(e) => Some((Err(e), (decoder, packets, Phase::Done))),
                            };
                        }
                        Phase::Done => return None,
                    }
                }
            },
        )
    }

    /// Release the codec context and scratch frame. Safe to call repeatedly.
    ///
    /// The hardware context is only borrowed and is not released here.
    pub fn close(&mut self) {
        if self.context.take().is_some() {
            self.frame = None;
            self.hardware = None;
            log::debug!("Decoder {} closed", self.codec.name);
        }
    }
}

impl<B: Backend> Drop for Decoder<'_, B> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Attach the device if the codec can use it; a refusal is not an error
fn attach_hardware<B: Backend>(
    context: &mut B::Context,
    codec: &CodecInfo,
    hardware: &HardwareContext<B>,
) -> bool {
    if !codec.can_use_device(hardware.device_type()) {
        log::debug!(
            "{} has no {} hardware config, decoding in software",
            codec.name,
            hardware.device_type_name()
        );
        return false;
    }
    let Some(device) = hardware.device() else {
        return false;
    };
    match context.attach_device(device) {
        Ok(()) => true,
        Err(e) => {
            log::warn!(
                "Failed to attach {} device to {}: {}",
                hardware.device_type_name(),
                codec.name,
                e
            );
            false
        }
    }
}
