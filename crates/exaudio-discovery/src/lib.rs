//! exaudio Discovery - host enumeration, scan reconciliation and assignment
//!
//! A [`DeviceManager`] wraps an [`AudioBackend`] and keeps the device
//! directory and context pool in step with what the host reports:
//! - [`DeviceManager::scan`] reconciles one enumeration
//! - [`DeviceManager::assign`] binds a device to a running stream
//! - [`DeviceManager::shutdown`] releases everything

pub mod assign;
pub mod backend;
pub mod manager;
pub mod reconciler;

pub use assign::AssignError;
#[cfg(feature = "cpal")]
pub use backend::cpal::{CpalBackend, CpalStream};
pub use backend::fixed::{FixedBackend, FixedContext, FixedStream};
pub use backend::{ActiveStream, AudioBackend, BackendError, EnumeratedDevice, Enumeration};
pub use manager::{Defaults, DeviceManager, DirectoryStatus, StreamStatus};
pub use reconciler::{ScanError, ScanReport};
