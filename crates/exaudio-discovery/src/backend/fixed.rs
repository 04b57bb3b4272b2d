//! Backend reporting a fixed device list
//!
//! Used when no real audio host is wanted: headless runs, CI, and hosts
//! without sound hardware. An empty list behaves as a host with no devices.

use exaudio_core::{DeviceRecord, Direction};
use tracing::debug;

use super::{ActiveStream, AudioBackend, BackendError, EnumeratedDevice, Enumeration};

/// Context handle issued by [`FixedBackend`]
#[derive(Debug, PartialEq, Eq)]
pub struct FixedContext {
    serial: u64,
}

/// Stream that never receives callbacks
#[derive(Debug)]
pub struct FixedStream;

impl ActiveStream for FixedStream {
    fn callback_count(&self) -> u64 {
        0
    }
}

#[derive(Debug, Default)]
pub struct FixedBackend {
    devices: Enumeration,
    next_serial: u64,
    open: usize,
}

impl FixedBackend {
    pub fn new(devices: Enumeration) -> Self {
        Self {
            devices,
            next_serial: 0,
            open: 0,
        }
    }

    /// Backend with no devices at all
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, name: &str, direction: Direction, is_default: bool) -> Self {
        let device = EnumeratedDevice::new(name, is_default);
        match direction {
            Direction::Capture => self.devices.capture.push(device),
            Direction::Playback => self.devices.playback.push(device),
        }
        self
    }

    /// Contexts opened and not yet closed
    pub fn open_contexts(&self) -> usize {
        self.open
    }
}

impl AudioBackend for FixedBackend {
    type Context = FixedContext;
    type Stream = FixedStream;

    fn open_context(&mut self) -> Result<FixedContext, BackendError> {
        let serial = self.next_serial;
        self.next_serial += 1;
        self.open += 1;
        debug!(serial, "fixed context opened");
        Ok(FixedContext { serial })
    }

    fn enumerate(&mut self, _context: &FixedContext) -> Result<Enumeration, BackendError> {
        Ok(self.devices.clone())
    }

    fn close_context(&mut self, context: FixedContext) {
        self.open = self.open.saturating_sub(1);
        debug!(serial = context.serial, "fixed context closed");
    }

    fn start_stream(
        &mut self,
        _context: &FixedContext,
        device: &DeviceRecord,
    ) -> Result<FixedStream, BackendError> {
        let known = self
            .devices
            .devices(device.direction)
            .iter()
            .any(|d| d.name == device.name);
        if known {
            Ok(FixedStream)
        } else {
            Err(BackendError::DeviceNotFound(device.name.clone()))
        }
    }
}
