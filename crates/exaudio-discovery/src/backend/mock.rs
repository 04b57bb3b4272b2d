//! Scripted backend that records every context it hands out

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use exaudio_core::{DeviceRecord, Direction};

use super::{ActiveStream, AudioBackend, BackendError, EnumeratedDevice, Enumeration};

#[derive(Debug, PartialEq, Eq)]
pub struct MockContext(pub u32);

/// Shared record of stream drops and context closes, in the order they happen
pub type EventLog = Rc<RefCell<Vec<String>>>;

#[derive(Debug)]
pub struct MockStream {
    pub name: String,
    events: EventLog,
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.events
            .borrow_mut()
            .push(format!("stream dropped {}", self.name));
    }
}

impl ActiveStream for MockStream {
    fn callback_count(&self) -> u64 {
        7
    }
}

#[derive(Debug, Default)]
pub struct MockBackend {
    pub devices: Enumeration,
    pub fail_open: bool,
    pub fail_enumerate: bool,
    pub fail_stream: bool,
    next: u32,
    pub opened: Vec<u32>,
    /// Shared so it can still be read after the backend is dropped
    pub closed: Rc<RefCell<Vec<u32>>>,
    pub streams_started: Vec<String>,
    pub events: EventLog,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plug(&mut self, name: &str, direction: Direction, is_default: bool) {
        let device = EnumeratedDevice::new(name, is_default);
        match direction {
            Direction::Capture => self.devices.capture.push(device),
            Direction::Playback => self.devices.playback.push(device),
        }
    }

    pub fn unplug(&mut self, name: &str) {
        self.devices.capture.retain(|d| d.name != name);
        self.devices.playback.retain(|d| d.name != name);
    }

    /// Contexts opened and not closed, in id order
    pub fn live(&self) -> Vec<u32> {
        let closed: BTreeSet<u32> = self.closed.borrow().iter().copied().collect();
        self.opened
            .iter()
            .copied()
            .filter(|id| !closed.contains(id))
            .collect()
    }

    /// True when no context was ever closed twice
    pub fn closed_at_most_once(&self) -> bool {
        let closed = self.closed.borrow();
        let unique: BTreeSet<u32> = closed.iter().copied().collect();
        unique.len() == closed.len()
    }
}

impl AudioBackend for MockBackend {
    type Context = MockContext;
    type Stream = MockStream;

    fn open_context(&mut self) -> Result<MockContext, BackendError> {
        if self.fail_open {
            return Err(BackendError::ContextUnavailable("scripted".into()));
        }
        let id = self.next;
        self.next += 1;
        self.opened.push(id);
        Ok(MockContext(id))
    }

    fn enumerate(&mut self, _context: &MockContext) -> Result<Enumeration, BackendError> {
        if self.fail_enumerate {
            return Err(BackendError::Enumeration("scripted".into()));
        }
        Ok(self.devices.clone())
    }

    fn close_context(&mut self, context: MockContext) {
        self.closed.borrow_mut().push(context.0);
        self.events
            .borrow_mut()
            .push(format!("context closed {}", context.0));
    }

    fn start_stream(
        &mut self,
        _context: &MockContext,
        device: &DeviceRecord,
    ) -> Result<MockStream, BackendError> {
        if self.fail_stream {
            return Err(BackendError::Stream("scripted".into()));
        }
        self.streams_started.push(device.name.clone());
        Ok(MockStream {
            name: device.name.clone(),
            events: self.events.clone(),
        })
    }
}
