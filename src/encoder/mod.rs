// Video/audio encode engine
// Mirror of the decoder: frames in, packets out, with an optional hardware device.

use crate::decoder::OutputDescriptor;
use crate::format::{CodecId, MediaType, PixelFormat, Rational};
use crate::hardware::HardwareContext;
use crate::native::{Backend, CodecInfo, CodecOptions, NativeContext, NativeError, NativePacket};
use crate::protocol::{self, Phase};
use crate::stream::CodecParameters;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("Encoder not found: {0}")]
    NotFound(String),
    #[error("Failed to initialize encoder {codec}: {source}")]
    InitError {
        codec: String,
        #[source]
        source: NativeError,
    },
    #[error("Encoder is closed")]
    Closed,
    #[error("Encoding failed: {0}")]
    EncodeFailed(#[source] NativeError),
    #[error("Frame source failed: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Encoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    /// Input frame shape; the codec id is taken from the encoder
    pub parameters: CodecParameters,
    pub time_base: Rational,
    pub frame_rate: Rational,
    /// Target bit rate in bits/s (0 leaves the codec default)
    pub bit_rate: u64,
    /// Keyframe interval in frames (0 leaves the codec default)
    pub gop_size: u32,
    pub thread_count: u32,
    pub options: CodecOptions,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            parameters: CodecParameters {
                media_type: MediaType::Video,
                width: 1920,
                height: 1080,
                pixel_format: Some(PixelFormat::Yuv420p),
                sample_aspect_ratio: Rational::new(1, 1),
                ..Default::default()
            },
            time_base: Rational::new(1, 60),
            frame_rate: Rational::new(60, 1),
            bit_rate: 8_000_000, // 8 Mbps
            gop_size: 60,        // 1 second at 60fps
            thread_count: 0,
            options: CodecOptions::new(),
        }
    }
}

impl EncoderSettings {
    /// Settings accepting exactly the frames a decoder produces
    pub fn from_output(output: &OutputDescriptor) -> Self {
        match output {
            OutputDescriptor::Video(video) => Self {
                parameters: CodecParameters {
                    media_type: MediaType::Video,
                    width: video.width,
                    height: video.height,
                    pixel_format: video.pixel_format.clone(),
                    sample_aspect_ratio: video.sample_aspect_ratio,
                    ..Default::default()
                },
                time_base: video.time_base,
                frame_rate: video.frame_rate,
                bit_rate: 0,
                gop_size: 0,
                ..Default::default()
            },
            OutputDescriptor::Audio(audio) => Self {
                parameters: CodecParameters {
                    media_type: MediaType::Audio,
                    sample_rate: audio.sample_rate,
                    sample_format: audio.sample_format,
                    channel_layout: audio.channel_layout,
                    ..Default::default()
                },
                time_base: audio.time_base,
                frame_rate: Rational::default(),
                bit_rate: 0,
                gop_size: 0,
                ..Default::default()
            },
        }
    }

    /// Codec options with the keyframe interval folded in
    fn codec_options(&self) -> CodecOptions {
        let mut options = self.options.clone();
        if self.gop_size > 0 {
            options
                .entry("g".to_string())
                .or_insert_with(|| self.gop_size.to_string());
        }
        options
    }
}

/// Encode engine producing packets for one output stream
pub struct Encoder<'hw, B: Backend> {
    codec: CodecInfo,
    context: Option<B::Context>,
    packet: Option<B::Packet>,
    stream_index: usize,
    time_base: Rational,
    hardware: Option<&'hw HardwareContext<B>>,
}

impl<'hw, B: Backend> Encoder<'hw, B> {
    /// Look up an encoder implementation by name, e.g. `libx264` or `h264_nvenc`
    pub fn find(backend: &B, name: &str) -> Result<CodecInfo, EncoderError> {
        backend
            .find_encoder_by_name(name)
            .filter(CodecInfo::is_encoder)
            .ok_or_else(|| EncoderError::NotFound(name.to_string()))
    }

    /// Best encoder for `codec`: the device's verified hardware encoder when there is
    /// one, otherwise the library's default encoder.
    pub fn select(
        backend: &B,
        codec: CodecId,
        hardware: Option<&HardwareContext<B>>,
    ) -> Result<CodecInfo, EncoderError> {
        if let Some(info) = hardware.and_then(|hw| hw.encoder_codec(codec.clone())) {
            return Ok(info);
        }
        log::debug!("No hardware encoder for {}, using software", codec);
        backend
            .find_encoder(&codec)
            .ok_or_else(|| EncoderError::NotFound(codec.to_string()))
    }

    /// Create and open an encoder.
    ///
    /// `hardware` is attached only when `codec` can use its device type.
    pub fn open(
        backend: &B,
        codec: &CodecInfo,
        settings: &EncoderSettings,
        hardware: Option<&'hw HardwareContext<B>>,
    ) -> Result<Self, EncoderError> {
        if !codec.is_encoder() {
            return Err(EncoderError::NotFound(codec.name.clone()));
        }

        let init_error = |source: NativeError| EncoderError::InitError {
            codec: codec.name.clone(),
            source,
        };

        let mut parameters = settings.parameters.clone();
        parameters.codec_id = codec.id.clone().or(parameters.codec_id);
        if settings.bit_rate > 0 {
            parameters.bit_rate = settings.bit_rate;
        }

        let mut context = backend.alloc_context(codec).map_err(init_error)?;
        context.set_parameters(&parameters).map_err(init_error)?;
        context.set_time_base(settings.time_base);
        if !settings.frame_rate.is_unset() {
            context.set_frame_rate(settings.frame_rate);
        }
        context.set_thread_count(settings.thread_count);

        let hardware = hardware.filter(|hw| attach_hardware::<B>(&mut context, codec, hw));

        context.open(&settings.codec_options()).map_err(init_error)?;
        let packet = backend.alloc_packet().map_err(init_error)?;

        log::info!(
            "Encoder {} opened ({}x{}, {})",
            codec.name,
            parameters.width,
            parameters.height,
            hardware.map_or("software", |hw| hw.device_type_name())
        );

        Ok(Self {
            codec: codec.clone(),
            context: Some(context),
            packet: Some(packet),
            stream_index: 0,
            time_base: settings.time_base,
            hardware,
        })
    }

    pub fn codec(&self) -> &CodecInfo {
        &self.codec
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    /// Output stream index stamped on every produced packet
    pub fn set_stream_index(&mut self, index: usize) {
        self.stream_index = index;
    }

    pub fn is_open(&self) -> bool {
        self.context.is_some()
    }

    pub fn is_hardware(&self) -> bool {
        self.hardware.is_some()
    }

    /// Feed one frame and take at most one packet
    pub fn encode(&mut self, frame: &B::Frame) -> Result<Option<B::Packet>, EncoderError> {
        self.step(Some(frame))
    }

    /// Signal end of input and take one buffered packet; repeat until `Ok(None)`
    pub fn flush(&mut self) -> Result<Option<B::Packet>, EncoderError> {
        self.step(None)
    }

    fn step(&mut self, frame: Option<&B::Frame>) -> Result<Option<B::Packet>, EncoderError> {
        let (Some(context), Some(packet)) = (self.context.as_mut(), self.packet.as_mut()) else {
            return Err(EncoderError::Closed);
        };

        let packet = protocol::exchange(
            context,
            packet,
            frame,
            <B::Context as NativeContext>::send_frame,
            <B::Context as NativeContext>::receive_packet,
        )
        .map_err(EncoderError::EncodeFailed)?;

        Ok(packet.map(|mut packet| {
            packet.set_stream_index(self.stream_index);
            packet
        }))
    }

    /// Encode every frame from `frames`, then drain. Ends after the first error.
    pub fn packets<'a, S, E>(
        &'a mut self,
        frames: S,
    ) -> impl Stream<Item = Result<B::Packet, EncoderError>> + 'a
    where
        S: Stream<Item = Result<B::Frame, E>> + 'a,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'a,
    {
        futures::stream::unfold(
            (self, Box::pin(frames), Phase::Feeding),
            |(encoder, mut frames, mut phase)| async move {
                loop {
                    match phase {
                        Phase::Feeding => match frames.next().await {
                            Some(Ok(frame)) => match encoder.encode(&frame) {
                                Ok(Some(packet)) => {
                                    return Some((Ok(packet), (encoder, frames, phase)));
                                }
                                Ok(None) => {}
                                Err(e) => return Some((Err(e), (encoder, frames, Phase::Done))),
                            },
                            Some(Err(e)) => {
                                let err = EncoderError::Source(e.into());
                                return Some((Err(err), (encoder, frames, Phase::Done)));
                            }
                            None => phase = Phase::Draining,
                        },
                        Phase::Draining => {
                            return match encoder.flush() {
                                Ok(Some(packet)) => Some((Ok(packet), (encoder, frames, phase))),
                                Ok(None) => None,
                                Err(e) => Some((Err(e), (encoder, frames, Phase::Done))),
                            };
                        }
                        Phase::Done => return None,
                    }
                }
            },
        )
    }

    /// Release the codec context and scratch packet. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.context.take().is_some() {
            self.packet = None;
            self.hardware = None;
            log::debug!("Encoder {} closed", self.codec.name);
        }
    }
}

impl<B: Backend> Drop for Encoder<'_, B> {
    fn drop(&mut self) {
        self.close();
    }
}

fn attach_hardware<B: Backend>(
    context: &mut B::Context,
    codec: &CodecInfo,
    hardware: &HardwareContext<B>,
) -> bool {
    if !codec.can_use_device(hardware.device_type()) {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{AudioOutput, VideoOutput};
    use crate::format::{ChannelLayout, SampleFormat};
    use crate::hardware::DeviceType;
    use crate::native::mock::{self, MockBackend, MockFrame};
    use crate::native::{HwConfig, HwMethods, NativeUnit};

    fn backend() -> MockBackend {
        MockBackend::new()
            .with_device_types(&[DeviceType::Cuda])
            .with_encoder(mock::encoder("libx264", CodecId::H264, false, &[PixelFormat::Yuv420p]))
            .with_encoder(mock::encoder(
                "h264_nvenc",
                CodecId::H264,
                true,
                &[PixelFormat::Nv12, PixelFormat::Cuda],
            ))
    }

    fn cuda(backend: &MockBackend) -> HardwareContext<MockBackend> {
        HardwareContext::create(backend, DeviceType::Cuda, None, &CodecOptions::new()).unwrap()
    }

    #[test]
    fn test_default_settings() {
        let settings = EncoderSettings::default();
        assert_eq!(settings.parameters.width, 1920);
        assert_eq!(settings.parameters.height, 1080);
        assert_eq!(settings.bit_rate, 8_000_000);
        assert_eq!(settings.codec_options().get("g").map(String::as_str), Some("60"));
    }

    #[test]
    fn test_explicit_gop_option_wins() {
        let mut settings = EncoderSettings::default();
        settings.options.insert("g".to_string(), "250".to_string());
        assert_eq!(settings.codec_options().get("g").map(String::as_str), Some("250"));

        settings.gop_size = 0;
        settings.options.clear();
        assert!(settings.codec_options().is_empty());
    }

    #[test]
    fn test_settings_from_video_output() {
        let output = OutputDescriptor::Video(VideoOutput {
            width: 1280,
            height: 720,
            pixel_format: Some(PixelFormat::Nv12),
            hardware_format: None,
            time_base: Rational::new(1, 90_000),
            frame_rate: Rational::new(30, 1),
            sample_aspect_ratio: Rational::new(1, 1),
        });
        let settings = EncoderSettings::from_output(&output);
        assert_eq!(settings.parameters.media_type, MediaType::Video);
        assert_eq!((settings.parameters.width, settings.parameters.height), (1280, 720));
        assert_eq!(settings.parameters.pixel_format, Some(PixelFormat::Nv12));
        assert_eq!(settings.time_base, Rational::new(1, 90_000));
        assert_eq!(settings.frame_rate, Rational::new(30, 1));
        assert_eq!(settings.bit_rate, 0);
    }

    #[test]
    fn test_settings_from_audio_output() {
        let output = OutputDescriptor::Audio(AudioOutput {
            sample_rate: 44_100,
            sample_format: Some(SampleFormat::S16),
            channel_layout: ChannelLayout::MONO,
            time_base: Rational::new(1, 44_100),
        });
        let settings = EncoderSettings::from_output(&output);
        assert_eq!(settings.parameters.media_type, MediaType::Audio);
        assert_eq!(settings.parameters.sample_rate, 44_100);
        assert_eq!(settings.parameters.channel_layout, ChannelLayout::MONO);
        assert!(settings.frame_rate.is_unset());
    }

    #[test]
    fn test_find_by_name() {
        let backend = backend();
        assert_eq!(Encoder::find(&backend, "libx264").unwrap().name, "libx264");
        let err = Encoder::find(&backend, "libx265").unwrap_err();
        assert!(matches!(err, EncoderError::NotFound(ref name) if name == "libx265"));
    }

    #[test]
    fn test_select_prefers_hardware() {
        let backend = backend();
        let hw = cuda(&backend);
        assert_eq!(Encoder::select(&backend, CodecId::H264, Some(&hw)).unwrap().name, "h264_nvenc");
        assert_eq!(Encoder::select(&backend, CodecId::H264, None).unwrap().name, "libx264");
        assert!(Encoder::select(&backend, CodecId::Av1, Some(&hw)).is_err());
    }

    #[test]
    fn test_open_software_encoder_ignores_device() {
        let backend = backend();
        let hw = cuda(&backend);
        let codec = Encoder::find(&backend, "libx264").unwrap();
        let encoder = Encoder::open(&backend, &codec, &EncoderSettings::default(), Some(&hw)).unwrap();

        assert!(!encoder.is_hardware());
        let state = backend.state();
        let record = &state.opened[0];
        assert_eq!(record.device, None);
        assert_eq!(record.parameters.codec_id, Some(CodecId::H264));
        assert_eq!(record.parameters.bit_rate, 8_000_000);
        assert_eq!(record.time_base, Rational::new(1, 60));
    }

    #[test]
    fn test_open_hardware_encoder_attaches_device() {
        let backend = backend();
        let hw = cuda(&backend);
        let codec = Encoder::find(&backend, "h264_nvenc").unwrap();
        let encoder = Encoder::open(&backend, &codec, &EncoderSettings::default(), Some(&hw)).unwrap();

        assert!(encoder.is_hardware());
        assert_eq!(backend.state().opened[0].device, Some(DeviceType::Cuda));
    }

    #[test]
    fn test_open_ignores_device_without_matching_config() {
        let backend = backend();
        let hw = cuda(&backend);
        let mut codec = mock::encoder("h264_vaapi", CodecId::H264, true, &[PixelFormat::Vaapi]);
        codec.hw_configs.push(HwConfig {
            pixel_format: PixelFormat::Vaapi,
            device_type: DeviceType::Vaapi,
            methods: HwMethods::HW_FRAMES_CTX,
        });
        let encoder = Encoder::open(&backend, &codec, &EncoderSettings::default(), Some(&hw)).unwrap();

        assert!(!encoder.is_hardware());
        assert_eq!(backend.state().opened[0].device, None);
    }

    #[test]
    fn test_open_failure_frees_context() {
        let backend = backend().with_broken_codec("libx264");
        let codec = Encoder::find(&backend, "libx264").unwrap();
        let err = Encoder::open(&backend, &codec, &EncoderSettings::default(), None)
            .err()
            .unwrap();
        assert!(matches!(err, EncoderError::InitError { .. }));

        let state = backend.state();
        assert_eq!(state.contexts_allocated, state.contexts_freed);
    }

    #[test]
    fn test_decoder_is_not_an_encoder() {
        let backend = backend();
        let codec = mock::decoder("h264", CodecId::H264, &[]);
        let err = Encoder::open(&backend, &codec, &EncoderSettings::default(), None)
            .err()
            .unwrap();
        assert!(matches!(err, EncoderError::NotFound(_)));
    }

    #[test]
    fn test_encode_and_flush_stamp_stream_index() {
        let backend = backend().with_reorder_depth(2);
        let codec = Encoder::find(&backend, "libx264").unwrap();
        let mut encoder = Encoder::open(&backend, &codec, &EncoderSettings::default(), None).unwrap();
        encoder.set_stream_index(3);

        let mut packets = Vec::new();
        for pts in 0..5 {
            packets.extend(encoder.encode(&MockFrame::new(pts)).unwrap());
        }
        assert_eq!(packets.len(), 3);
        while let Some(packet) = encoder.flush().unwrap() {
            packets.push(packet);
        }

        assert_eq!(
            packets.iter().map(|p| p.pts().unwrap()).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4]
        );
        assert!(packets.iter().all(|p| p.stream_index() == 3));
    }

    #[test]
    fn test_encode_after_close() {
        let backend = backend();
        let codec = Encoder::find(&backend, "libx264").unwrap();
        let mut encoder = Encoder::open(&backend, &codec, &EncoderSettings::default(), None).unwrap();
        encoder.close();
        encoder.close();

        assert!(!encoder.is_open());
        assert!(matches!(encoder.encode(&MockFrame::new(0)), Err(EncoderError::Closed)));
        assert!(matches!(encoder.flush(), Err(EncoderError::Closed)));
        drop(encoder);
        assert_eq!(backend.state().contexts_freed, 1);
    }

    #[tokio::test]
    async fn test_packets_stream_drains() {
        let backend = backend().with_reorder_depth(1);
        let codec = Encoder::find(&backend, "libx264").unwrap();
        let mut encoder = Encoder::open(&backend, &codec, &EncoderSettings::default(), None).unwrap();

        let frames = (0..4).map(|pts| Ok::<_, std::io::Error>(MockFrame::new(pts)));
        let packets: Vec<_> = encoder
            .packets(futures::stream::iter(frames))
            .collect::<Vec<_>>()
            .await;

        let pts: Vec<i64> = packets
            .into_iter()
            .map(|packet| packet.unwrap().pts().unwrap())
            .collect();
        assert_eq!(pts, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_packets_stream_stops_on_source_error() {
        let backend = backend();
        let codec = Encoder::find(&backend, "libx264").unwrap();
        let mut encoder = Encoder::open(&backend, &codec, &EncoderSettings::default(), None).unwrap();

        let frames = vec![
            Err(std::io::Error::other("capture lost")),
            Ok(MockFrame::new(0)),
        ];
        let items: Vec<_> = encoder
            .packets(futures::stream::iter(frames))
            .collect::<Vec<_>>()
            .await;

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(EncoderError::Source(_))));
    }
}
