// Scripted in-memory backend for tests
// Behaves like a bounded, reordering codec so the engines' state machines can be
// driven deterministically without native libraries.

use super::{
    Backend, CodecInfo, CodecOptions, Direction, HwConfig, HwMethods, NativeContext, NativeError,
    NativeFrame, NativePacket, NativeUnit,
};
use crate::format::{CodecId, PixelFormat, Rational};
use crate::hardware::DeviceType;
use crate::stream::CodecParameters;
use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) const AVERROR_INVALIDDATA: i32 = -1094995529;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OpenRecord {
    pub codec: String,
    pub device: Option<DeviceType>,
    pub parameters: CodecParameters,
    /// Parameters arrived through `apply_parameters`
    pub native_parameters: bool,
    pub time_base: Rational,
    pub threads: u32,
    pub options: CodecOptions,
}

#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub decoders: Vec<CodecInfo>,
    pub encoders: Vec<CodecInfo>,
    pub device_types: Vec<DeviceType>,
    pub failing_devices: Vec<DeviceType>,
    /// Contexts refuse every device reference
    pub failing_attach: bool,
    pub broken_codecs: Vec<String>,
    /// Units held back before the first output
    pub reorder_depth: usize,
    /// Queue length at which sends answer "try again" (0 = unbounded)
    pub queue_capacity: usize,
    pub units_per_input: usize,
    pub corrupt_pts: Option<i64>,

    pub devices_created: Vec<DeviceType>,
    pub devices_freed: usize,
    pub contexts_allocated: usize,
    pub contexts_freed: usize,
    pub opened: Vec<OpenRecord>,
}

#[derive(Clone, Default)]
pub(crate) struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        let backend = Self::default();
        backend.state().units_per_input = 1;
        backend
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock()
    }

    pub fn with_decoder(self, codec: CodecInfo) -> Self {
        self.state().decoders.push(codec);
        self
    }

    pub fn with_encoder(self, codec: CodecInfo) -> Self {
        self.state().encoders.push(codec);
        self
    }

    pub fn with_device_types(self, types: &[DeviceType]) -> Self {
        self.state().device_types = types.to_vec();
        self
    }

    pub fn with_failing_device(self, device_type: DeviceType) -> Self {
        self.state().failing_devices.push(device_type);
        self
    }

    pub fn with_failing_attach(self) -> Self {
        self.state().failing_attach = true;
        self
    }

    pub fn with_broken_codec(self, name: &str) -> Self {
        self.state().broken_codecs.push(name.to_string());
        self
    }

    pub fn with_reorder_depth(self, depth: usize) -> Self {
        self.state().reorder_depth = depth;
        self
    }

    pub fn with_queue_capacity(self, capacity: usize) -> Self {
        self.state().queue_capacity = capacity;
        self
    }

    pub fn with_units_per_input(self, units: usize) -> Self {
        self.state().units_per_input = units;
        self
    }

    pub fn with_corrupt_pts(self, pts: i64) -> Self {
        self.state().corrupt_pts = Some(pts);
        self
    }
}

pub(crate) fn decoder(name: &str, id: CodecId, hw: &[DeviceType]) -> CodecInfo {
    CodecInfo {
        name: name.to_string(),
        media_type: id.media_type(),
        id: Some(id),
        direction: Direction::Decoder,
        hardware: false,
        pixel_formats: vec![],
        hw_configs: hw
            .iter()
            .map(|device_type| HwConfig {
                pixel_format: device_type.pixel_format(),
                device_type: *device_type,
                methods: HwMethods::HW_DEVICE_CTX,
            })
            .collect(),
    }
}

pub(crate) fn encoder(name: &str, id: CodecId, hardware: bool, formats: &[PixelFormat]) -> CodecInfo {
    CodecInfo {
        name: name.to_string(),
        media_type: id.media_type(),
        id: Some(id),
        direction: Direction::Encoder,
        hardware,
        pixel_formats: formats.to_vec(),
        hw_configs: vec![],
    }
}

pub(crate) struct MockDevice {
    pub device_type: DeviceType,
    pub path: Option<String>,
    state: Arc<Mutex<MockState>>,
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.state.lock().devices_freed += 1;
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockFrame {
    pub pts: Option<i64>,
    pub format: Option<PixelFormat>,
    pub data: Option<Arc<Vec<u8>>>,
}

impl MockFrame {
    pub fn new(pts: i64) -> Self {
        Self {
            pts: Some(pts),
            format: None,
            data: Some(Arc::new(pts.to_le_bytes().to_vec())),
        }
    }
}

impl NativeUnit for MockFrame {
    fn unref(&mut self) {
        *self = MockFrame::default();
    }

    fn try_clone(&self) -> Result<Self, NativeError> {
        Ok(self.clone())
    }

    fn pts(&self) -> Option<i64> {
        self.pts
    }
}

impl NativeFrame for MockFrame {
    fn pixel_format(&self) -> Option<PixelFormat> {
        self.format.clone()
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockPacket {
    pub pts: Option<i64>,
    pub stream_index: usize,
    pub data: Option<Arc<Vec<u8>>>,
    released: Option<Arc<AtomicUsize>>,
}

impl MockPacket {
    pub fn new(stream_index: usize, pts: i64) -> Self {
        Self {
            pts: Some(pts),
            stream_index,
            data: Some(Arc::new(vec![0, 0, 1, (pts & 0xff) as u8])),
            released: None,
        }
    }

    /// Count drops of this packet in `counter`
    pub fn tracked(mut self, counter: &Arc<AtomicUsize>) -> Self {
        self.released = Some(counter.clone());
        self
    }
}

impl Drop for MockPacket {
    fn drop(&mut self) {
        if let Some(counter) = &self.released {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl NativeUnit for MockPacket {
    fn unref(&mut self) {
        self.pts = None;
        self.data = None;
    }

    fn try_clone(&self) -> Result<Self, NativeError> {
        Ok(MockPacket {
            pts: self.pts,
            stream_index: self.stream_index,
            data: self.data.clone(),
            released: None,
        })
    }

    fn pts(&self) -> Option<i64> {
        self.pts
    }
}

impl NativePacket for MockPacket {
    fn stream_index(&self) -> usize {
        self.stream_index
    }

    fn set_stream_index(&mut self, index: usize) {
        self.stream_index = index;
    }
}

pub(crate) struct MockContext {
    state: Arc<Mutex<MockState>>,
    codec: CodecInfo,
    parameters: CodecParameters,
    native_parameters: bool,
    device: Option<DeviceType>,
    time_base: Rational,
    threads: u32,
    opened: bool,
    draining: bool,
    queue: VecDeque<i64>,
}

impl MockContext {
    fn push(&mut self, pts: Option<i64>) -> Result<(), NativeError> {
        if !self.opened {
            return Err(NativeError::code(-22, "Invalid argument"));
        }
        let Some(pts) = pts else {
            if self.draining {
                return Err(NativeError::Eof);
            }
            self.draining = true;
            return Ok(());
        };
        if self.draining {
            return Err(NativeError::Eof);
        }

        let state = self.state.lock();
        if state.corrupt_pts == Some(pts) {
            return Err(NativeError::code(
                AVERROR_INVALIDDATA,
                "Invalid data found when processing input",
            ));
        }
        if state.queue_capacity > 0 && self.queue.len() >= state.queue_capacity {
            return Err(NativeError::Again);
        }
        for _ in 0..state.units_per_input.max(1) {
            self.queue.push_back(pts);
        }
        Ok(())
    }

    fn pop(&mut self) -> Result<i64, NativeError> {
        let depth = self.state.lock().reorder_depth;
        if self.queue.len() > depth || (self.draining && !self.queue.is_empty()) {
            if let Some(pts) = self.queue.pop_front() {
                return Ok(pts);
            }
        }
        if self.draining {
            Err(NativeError::Eof)
        } else {
            Err(NativeError::Again)
        }
    }
}

impl Drop for MockContext {
    fn drop(&mut self) {
        self.state.lock().contexts_freed += 1;
    }
}

impl NativeContext for MockContext {
    type Device = MockDevice;
    type Frame = MockFrame;
    type Packet = MockPacket;
    type Parameters = CodecParameters;

    fn set_parameters(&mut self, parameters: &CodecParameters) -> Result<(), NativeError> {
        self.parameters = parameters.clone();
        self.native_parameters = false;
        Ok(())
    }

    fn apply_parameters(&mut self, parameters: &CodecParameters) -> Result<(), NativeError> {
        self.parameters = parameters.clone();
        self.native_parameters = true;
        Ok(())
    }

    fn set_thread_count(&mut self, threads: u32) {
        self.threads = threads;
    }

    fn set_packet_time_base(&mut self, time_base: Rational) {
        if self.time_base.is_unset() {
            self.time_base = time_base;
        }
    }

    fn set_time_base(&mut self, time_base: Rational) {
        self.time_base = time_base;
    }

    fn set_frame_rate(&mut self, _frame_rate: Rational) {}

    fn attach_device(&mut self, device: &MockDevice) -> Result<(), NativeError> {
        if self.state.lock().failing_attach {
            return Err(NativeError::code(-22, "Invalid argument"));
        }
        self.device = Some(device.device_type);
        Ok(())
    }

    fn open(&mut self, options: &CodecOptions) -> Result<(), NativeError> {
        let mut state = self.state.lock();
        if state.broken_codecs.contains(&self.codec.name) {
            return Err(NativeError::code(-38, "Function not implemented"));
        }
        state.opened.push(OpenRecord {
            codec: self.codec.name.clone(),
            device: self.device,
            parameters: self.parameters.clone(),
            native_parameters: self.native_parameters,
            time_base: self.time_base,
            threads: self.threads,
            options: options.clone(),
        });
        self.opened = true;
        Ok(())
    }

    fn send_packet(&mut self, packet: Option<&MockPacket>) -> Result<(), NativeError> {
        match packet {
            Some(packet) => self.push(Some(packet.pts.unwrap_or(0))),
            None => self.push(None),
        }
    }

    fn receive_frame(&mut self, frame: &mut MockFrame) -> Result<(), NativeError> {
        let pts = self.pop()?;
        *frame = MockFrame::new(pts);
        frame.format = match self.device {
            Some(device_type) => Some(device_type.pixel_format()),
            None => self.parameters.pixel_format.clone(),
        };
        Ok(())
    }

    fn send_frame(&mut self, frame: Option<&MockFrame>) -> Result<(), NativeError> {
        match frame {
            Some(frame) => self.push(Some(frame.pts.unwrap_or(0))),
            None => self.push(None),
        }
    }

    fn receive_packet(&mut self, packet: &mut MockPacket) -> Result<(), NativeError> {
        let pts = self.pop()?;
        packet.pts = Some(pts);
        packet.data = Some(Arc::new(pts.to_be_bytes().to_vec()));
        Ok(())
    }

    fn parameters(&self) -> CodecParameters {
        self.parameters.clone()
    }
}

impl Backend for MockBackend {
    type Device = MockDevice;
    type Frame = MockFrame;
    type Packet = MockPacket;
    type Parameters = CodecParameters;
    type Context = MockContext;

    fn find_decoder(&self, id: &CodecId) -> Option<CodecInfo> {
        self.state().decoders.iter().find(|c| c.id.as_ref() == Some(id)).cloned()
    }

    fn find_encoder(&self, id: &CodecId) -> Option<CodecInfo> {
        self.state().encoders.iter().find(|c| c.id.as_ref() == Some(id)).cloned()
    }

    fn find_encoder_by_name(&self, name: &str) -> Option<CodecInfo> {
        self.state().encoders.iter().find(|c| c.name == name).cloned()
    }

    fn alloc_context(&self, codec: &CodecInfo) -> Result<MockContext, NativeError> {
        self.state().contexts_allocated += 1;
        Ok(MockContext {
            state: self.state.clone(),
            codec: codec.clone(),
            parameters: CodecParameters::default(),
            native_parameters: false,
            device: None,
            time_base: Rational::default(),
            threads: 0,
            opened: false,
            draining: false,
            queue: VecDeque::new(),
        })
    }

    fn alloc_frame(&self) -> Result<MockFrame, NativeError> {
        Ok(MockFrame::default())
    }

    fn alloc_packet(&self) -> Result<MockPacket, NativeError> {
        Ok(MockPacket::default())
    }

    fn device_types(&self) -> Vec<DeviceType> {
        self.state().device_types.clone()
    }

    fn create_device(
        &self,
        device_type: DeviceType,
        device: Option<&str>,
        _options: &CodecOptions,
    ) -> Result<MockDevice, NativeError> {
        let mut state = self.state();
        if state.failing_devices.contains(&device_type) {
            return Err(NativeError::code(-12, "Cannot allocate memory"));
        }
        state.devices_created.push(device_type);
        Ok(MockDevice {
            device_type,
            path: device.map(str::to_string),
            state: self.state.clone(),
        })
    }
}
