//! exaudio Core - device directory and shared context pool
//!
//! This crate holds the bookkeeping behind an exaudio scan:
//! - Device fingerprints derived from name and direction
//! - A persistent directory of every device ever observed
//! - A pool of shared hardware contexts with batch-recomputed reference counts

pub mod context;
pub mod device;

pub use context::{ContextId, ContextPool, ContextRecord, ContextSummary, Sweep};
pub use device::{
    fingerprint, DeviceDirectory, DeviceFingerprint, DeviceRecord, Direction, Observation,
    UnknownDirection,
};
