//! Binding devices to running streams

use exaudio_core::{ContextId, DeviceFingerprint, Direction};
use thiserror::Error;
use tracing::info;

use crate::backend::{AudioBackend, BackendError};
use crate::manager::{Binding, DeviceManager};

#[derive(Error, Debug)]
pub enum AssignError {
    #[error("No default {0} device")]
    NoDefault(Direction),
    #[error("Unknown device {0}")]
    UnknownDevice(DeviceFingerprint),
    #[error("Device {device} is not a {expected} device")]
    WrongDirection {
        device: DeviceFingerprint,
        expected: Direction,
    },
    #[error("Device {0} is detached")]
    Detached(DeviceFingerprint),
    #[error("Device {0} has no context")]
    NoContext(DeviceFingerprint),
    #[error("Device {0} is already assigned")]
    AlreadyAssigned(DeviceFingerprint),
    #[error("Context {context} of device {device} is gone")]
    ContextMissing {
        device: DeviceFingerprint,
        context: ContextId,
    },
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

impl<B: AudioBackend> DeviceManager<B> {
    /// Start a stream on a device
    ///
    /// With no `id` the default device recorded by the last scan is used.
    /// Returns the fingerprint that was bound. On error nothing changes.
    pub fn assign(
        &mut self,
        direction: Direction,
        id: Option<DeviceFingerprint>,
    ) -> Result<DeviceFingerprint, AssignError> {
        let id = match id {
            Some(id) => id,
            None => self
                .defaults
                .get(direction)
                .ok_or(AssignError::NoDefault(direction))?,
        };

        let record = self
            .directory
            .lookup(id)
            .ok_or(AssignError::UnknownDevice(id))?;
        if record.direction != direction {
            return Err(AssignError::WrongDirection {
                device: id,
                expected: direction,
            });
        }
        if !record.attached {
            return Err(AssignError::Detached(id));
        }
        if record.assigned {
            return Err(AssignError::AlreadyAssigned(id));
        }
        let owner = record.owner.ok_or(AssignError::NoContext(id))?;
        let context = self
            .pool
            .get(owner)
            .ok_or(AssignError::ContextMissing {
                device: id,
                context: owner,
            })?;

        let stream = self.backend.start_stream(context.handle(), record)?;
        info!(device = %id, name = %record.name, direction = %direction, context = %owner, "assigned");

        self.streams.insert(
            id,
            Binding {
                context: owner,
                stream,
            },
        );
        if let Some(record) = self.directory.lookup_mut(id) {
            record.assigned = true;
        }
        Ok(id)
    }
}
