//! Audio host backends
//!
//! A backend is the only thing that talks to the native audio subsystem. It
//! opens and closes contexts, lists the devices visible through a context and
//! starts streams on them. Everything else in exaudio is bookkeeping.

#[cfg(feature = "cpal")]
pub mod cpal;
#[cfg(test)]
pub(crate) mod mock;
pub mod fixed;

use exaudio_core::{DeviceRecord, Direction};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Audio context unavailable: {0}")]
    ContextUnavailable(String),
    #[error("Device enumeration failed: {0}")]
    Enumeration(String),
    #[error("Device not found on host: {0}")]
    DeviceNotFound(String),
    #[error("Stream failed: {0}")]
    Stream(String),
}

/// One device as reported by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumeratedDevice {
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
}

impl EnumeratedDevice {
    pub fn new(name: impl Into<String>, is_default: bool) -> Self {
        Self {
            name: name.into(),
            is_default,
        }
    }
}

/// Both device lists from one enumeration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enumeration {
    pub capture: Vec<EnumeratedDevice>,
    pub playback: Vec<EnumeratedDevice>,
}

impl Enumeration {
    pub fn devices(&self, direction: Direction) -> &[EnumeratedDevice] {
        match direction {
            Direction::Capture => &self.capture,
            Direction::Playback => &self.playback,
        }
    }
}

/// A running stream bound to a device
pub trait ActiveStream {
    /// Number of data callbacks the host has delivered so far
    fn callback_count(&self) -> u64;
}

/// Native audio subsystem seen through contexts
///
/// Contexts are passed back to [`close_context`](Self::close_context) by
/// value, so a context can be released at most once.
pub trait AudioBackend {
    type Context;
    type Stream: ActiveStream;

    fn open_context(&mut self) -> Result<Self::Context, BackendError>;

    fn enumerate(&mut self, context: &Self::Context) -> Result<Enumeration, BackendError>;

    fn close_context(&mut self, context: Self::Context);

    /// Open and start a stream on `device` through `context`
    fn start_stream(
        &mut self,
        context: &Self::Context,
        device: &DeviceRecord,
    ) -> Result<Self::Stream, BackendError>;
}
