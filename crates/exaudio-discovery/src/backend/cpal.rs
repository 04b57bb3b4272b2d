//! cpal-backed audio host
//!
//! A context is a `cpal::Host`. Enumeration lists the host's input and output
//! devices and flags the ones whose names match the host defaults. Streams
//! play silence out and discard input; they only count callbacks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample};
use exaudio_core::{DeviceRecord, Direction};
use tracing::{debug, info, warn};

use super::{ActiveStream, AudioBackend, BackendError, EnumeratedDevice, Enumeration};

/// Running cpal stream and its callback counter
pub struct CpalStream {
    _stream: cpal::Stream,
    callbacks: Arc<AtomicU64>,
}

impl ActiveStream for CpalStream {
    fn callback_count(&self) -> u64 {
        self.callbacks.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for CpalStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalStream")
            .field("callbacks", &self.callback_count())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct CpalBackend {
    host_id: Option<cpal::HostId>,
}

impl CpalBackend {
    /// Backend on the platform default host
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend on a specific host, e.g. JACK instead of ALSA
    pub fn with_host(host_id: cpal::HostId) -> Self {
        Self {
            host_id: Some(host_id),
        }
    }

    /// Backend on the host called `name`, matched case-insensitively
    pub fn from_host_name(name: &str) -> Result<Self, BackendError> {
        cpal::available_hosts()
            .into_iter()
            .find(|id| id.name().eq_ignore_ascii_case(name))
            .map(Self::with_host)
            .ok_or_else(|| BackendError::ContextUnavailable(format!("no audio host named {name}")))
    }
}

fn device_name(device: &cpal::Device) -> Option<String> {
    match device.name() {
        Ok(name) => Some(name),
        Err(e) => {
            warn!(error = %e, "skipping device without a name");
            None
        }
    }
}

fn list<I>(devices: I, default_name: Option<String>) -> Vec<EnumeratedDevice>
where
    I: Iterator<Item = cpal::Device>,
{
    devices
        .filter_map(|d| device_name(&d))
        .map(|name| {
            let is_default = default_name.as_deref() == Some(name.as_str());
            EnumeratedDevice::new(name, is_default)
        })
        .collect()
}

fn find_device(
    host: &cpal::Host,
    direction: Direction,
    name: &str,
) -> Result<cpal::Device, BackendError> {
    let found = match direction {
        Direction::Capture => host
            .input_devices()
            .map_err(|e| BackendError::Enumeration(e.to_string()))?
            .find(|d| d.name().is_ok_and(|n| n == name)),
        Direction::Playback => host
            .output_devices()
            .map_err(|e| BackendError::Enumeration(e.to_string()))?
            .find(|d| d.name().is_ok_and(|n| n == name)),
    };
    found.ok_or_else(|| BackendError::DeviceNotFound(name.to_string()))
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    callbacks: Arc<AtomicU64>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
{
    device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            data.fill(T::EQUILIBRIUM);
            callbacks.fetch_add(1, Ordering::Relaxed);
        },
        |err| warn!(error = %err, "output stream error"),
        None,
    )
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    callbacks: Arc<AtomicU64>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
{
    device.build_input_stream(
        config,
        move |_data: &[T], _| {
            callbacks.fetch_add(1, Ordering::Relaxed);
        },
        |err| warn!(error = %err, "input stream error"),
        None,
    )
}

impl AudioBackend for CpalBackend {
    type Context = cpal::Host;
    type Stream = CpalStream;

    fn open_context(&mut self) -> Result<cpal::Host, BackendError> {
        let host = match self.host_id {
            Some(id) => cpal::host_from_id(id)
                .map_err(|e| BackendError::ContextUnavailable(e.to_string()))?,
            None => cpal::default_host(),
        };
        debug!(host = ?host.id(), "opened audio host");
        Ok(host)
    }

    fn enumerate(&mut self, host: &cpal::Host) -> Result<Enumeration, BackendError> {
        let default_input = host.default_input_device().and_then(|d| device_name(&d));
        let default_output = host.default_output_device().and_then(|d| device_name(&d));

        let inputs = host
            .input_devices()
            .map_err(|e| BackendError::Enumeration(e.to_string()))?;
        let outputs = host
            .output_devices()
            .map_err(|e| BackendError::Enumeration(e.to_string()))?;

        let enumeration = Enumeration {
            capture: list(inputs, default_input),
            playback: list(outputs, default_output),
        };
        debug!(
            capture = enumeration.capture.len(),
            playback = enumeration.playback.len(),
            "enumerated host devices"
        );
        Ok(enumeration)
    }

    fn close_context(&mut self, host: cpal::Host) {
        debug!(host = ?host.id(), "closed audio host");
        drop(host);
    }

    fn start_stream(
        &mut self,
        host: &cpal::Host,
        record: &DeviceRecord,
    ) -> Result<CpalStream, BackendError> {
        let device = find_device(host, record.direction, &record.name)?;

        let supported = match record.direction {
            Direction::Capture => device.default_input_config(),
            Direction::Playback => device.default_output_config(),
        }
        .map_err(|e| BackendError::Stream(e.to_string()))?;

        let format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let callbacks = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&callbacks);

        let stream = match (record.direction, format) {
            (Direction::Playback, SampleFormat::F32) => build_output::<f32>(&device, &config, counter),
            (Direction::Playback, SampleFormat::I16) => build_output::<i16>(&device, &config, counter),
            (Direction::Playback, SampleFormat::U16) => build_output::<u16>(&device, &config, counter),
            (Direction::Playback, SampleFormat::I32) => build_output::<i32>(&device, &config, counter),
            (Direction::Capture, SampleFormat::F32) => build_input::<f32>(&device, &config, counter),
            (Direction::Capture, SampleFormat::I16) => build_input::<i16>(&device, &config, counter),
            (Direction::Capture, SampleFormat::U16) => build_input::<u16>(&device, &config, counter),
            (Direction::Capture, SampleFormat::I32) => build_input::<i32>(&device, &config, counter),
            (_, other) => {
                return Err(BackendError::Stream(format!(
                    "unsupported sample format: {other:?}"
                )))
            }
        }
        .map_err(|e| BackendError::Stream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| BackendError::Stream(e.to_string()))?;

        info!(
            device = %record.id,
            name = %record.name,
            rate = config.sample_rate.0,
            channels = config.channels,
            "stream started"
        );

        Ok(CpalStream {
            _stream: stream,
            callbacks,
        })
    }
}
