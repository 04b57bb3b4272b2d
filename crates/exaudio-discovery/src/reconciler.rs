//! Scan cycle: reconcile a live enumeration against the directory
//!
//! One scan opens a context, enumerates both directions through it, upserts
//! every device seen and detaches the rest. The context is adopted only when
//! something new or returning was found; otherwise it is closed straight away.
//! Detaches trigger a refcount rebuild and sweep, which releases contexts no
//! attached device depends on and drops streams of devices left ownerless.

use exaudio_core::{ContextId, DeviceFingerprint, Direction, Observation};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::backend::{AudioBackend, BackendError};
use crate::manager::{Defaults, DeviceManager};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Could not open audio context: {0}")]
    Context(#[source] BackendError),
    #[error("Could not enumerate devices: {0}")]
    Enumeration(#[source] BackendError),
}

/// What a single scan changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub created: Vec<DeviceFingerprint>,
    pub reattached: Vec<DeviceFingerprint>,
    pub detached: Vec<DeviceFingerprint>,
    /// Context registered by this scan, if any device adopted it
    pub adopted: Option<ContextId>,
    /// Contexts removed by the sweep and closed
    pub released: Vec<ContextId>,
    /// Devices whose owner and stream went away with a released context
    pub orphaned: Vec<DeviceFingerprint>,
    pub defaults: Defaults,
}

impl ScanReport {
    /// True when the directory and pool came out of the scan unchanged
    pub fn is_unchanged(&self) -> bool {
        self.created.is_empty()
            && self.reattached.is_empty()
            && self.detached.is_empty()
            && self.adopted.is_none()
            && self.released.is_empty()
    }
}

impl<B: AudioBackend> DeviceManager<B> {
    /// Run one scan cycle
    ///
    /// On error nothing is modified and the context opened for the scan has
    /// already been closed.
    pub fn scan(&mut self) -> Result<ScanReport, ScanError> {
        let context = self.backend.open_context().map_err(ScanError::Context)?;
        let enumeration = match self.backend.enumerate(&context) {
            Ok(enumeration) => enumeration,
            Err(e) => {
                self.backend.close_context(context);
                return Err(ScanError::Enumeration(e));
            }
        };

        let candidate = self.pool.next_id();
        let mut report = ScanReport::default();
        let mut defaults = Defaults::default();

        self.directory.begin_scan();
        for direction in Direction::ALL {
            for device in enumeration.devices(direction) {
                let observation =
                    self.directory
                        .observe(&device.name, direction, device.is_default, candidate);
                match observation {
                    Observation::Created(id) => report.created.push(id),
                    Observation::Reattached(id) => report.reattached.push(id),
                    Observation::Refreshed(_) => {}
                }
                if device.is_default {
                    defaults.set(direction, Some(observation.fingerprint()));
                }
            }
            report
                .detached
                .extend(self.directory.end_scan_direction(direction));
        }

        if report.created.is_empty() && report.reattached.is_empty() {
            debug!(context = %candidate, "no new devices, context not adopted");
            self.backend.close_context(context);
        } else {
            report.adopted = Some(self.pool.register(context));
        }

        if !report.detached.is_empty() {
            self.pool.compute_refcounts(&self.directory);
            let sweep = self.pool.sweep(&mut self.directory);
            let released: Vec<ContextId> = sweep.released.iter().map(|(id, _)| *id).collect();
            // streams go first, they still use the hardware behind the context
            self.drop_streams(&sweep.orphaned, &released);
            for (id, handle) in sweep.released {
                debug!(context = %id, "releasing context");
                self.backend.close_context(handle);
            }
            report.released = released;
            report.orphaned = sweep.orphaned;
        }

        self.defaults = defaults;
        report.defaults = defaults;

        info!(
            created = report.created.len(),
            reattached = report.reattached.len(),
            detached = report.detached.len(),
            adopted = ?report.adopted,
            released = report.released.len(),
            "scan complete"
        );
        Ok(report)
    }
}
