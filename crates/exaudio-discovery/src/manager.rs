//! Process-wide device state
//!
//! [`DeviceManager`] owns the directory, the context pool, the per-direction
//! defaults and every running stream, together with the backend that produced
//! them. Scans live in [`crate::reconciler`], assignment in [`crate::assign`].

use std::collections::HashMap;

use exaudio_core::{
    ContextId, ContextPool, ContextSummary, DeviceDirectory, DeviceFingerprint, DeviceRecord,
    Direction,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::backend::{ActiveStream, AudioBackend};

/// Default device per direction, as flagged by the host in the last scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Defaults {
    pub capture: Option<DeviceFingerprint>,
    pub playback: Option<DeviceFingerprint>,
}

impl Defaults {
    pub fn get(&self, direction: Direction) -> Option<DeviceFingerprint> {
        match direction {
            Direction::Capture => self.capture,
            Direction::Playback => self.playback,
        }
    }

    pub fn set(&mut self, direction: Direction, id: Option<DeviceFingerprint>) {
        match direction {
            Direction::Capture => self.capture = id,
            Direction::Playback => self.playback = id,
        }
    }
}

/// A running stream as reported by [`DeviceManager::status`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamStatus {
    pub device: DeviceFingerprint,
    /// Context the stream was started through
    pub context: ContextId,
    pub callbacks: u64,
}

/// Serializable snapshot of everything the manager tracks
#[derive(Debug, Clone, Serialize)]
pub struct DirectoryStatus {
    pub devices: Vec<DeviceRecord>,
    pub contexts: Vec<ContextSummary>,
    pub defaults: Defaults,
    pub streams: Vec<StreamStatus>,
}

/// A running stream and the context it was started through
///
/// The stream borrows hardware from that context, so it must be dropped
/// before the context is closed.
pub(crate) struct Binding<S> {
    pub(crate) context: ContextId,
    pub(crate) stream: S,
}

pub struct DeviceManager<B: AudioBackend> {
    pub(crate) backend: B,
    pub(crate) directory: DeviceDirectory,
    pub(crate) pool: ContextPool<B::Context>,
    pub(crate) defaults: Defaults,
    pub(crate) streams: HashMap<DeviceFingerprint, Binding<B::Stream>>,
}

impl<B: AudioBackend> DeviceManager<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            directory: DeviceDirectory::new(),
            pool: ContextPool::new(),
            defaults: Defaults::default(),
            streams: HashMap::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn directory(&self) -> &DeviceDirectory {
        &self.directory
    }

    pub fn pool(&self) -> &ContextPool<B::Context> {
        &self.pool
    }

    pub fn defaults(&self) -> Defaults {
        self.defaults
    }

    pub fn stream(&self, id: DeviceFingerprint) -> Option<&B::Stream> {
        self.streams.get(&id).map(|binding| &binding.stream)
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn status(&self) -> DirectoryStatus {
        let mut streams: Vec<StreamStatus> = self
            .streams
            .iter()
            .map(|(id, binding)| StreamStatus {
                device: *id,
                context: binding.context,
                callbacks: binding.stream.callback_count(),
            })
            .collect();
        streams.sort_by_key(|s| s.device);

        DirectoryStatus {
            devices: self.directory.snapshot(),
            contexts: self.pool.summaries(),
            defaults: self.defaults,
            streams,
        }
    }

    /// Log the directory, the pool and the stream counters
    pub fn log_state(&self) {
        info!(
            devices = self.directory.len(),
            contexts = self.pool.len(),
            streams = self.streams.len(),
            default_capture = ?self.defaults.capture,
            default_playback = ?self.defaults.playback,
            "state"
        );
        self.directory.log_summary();
        for context in self.pool.summaries() {
            debug!(context = %context.id, refs = ?context.refs, "context");
        }
        for stream in self.status().streams {
            debug!(device = %stream.device, callbacks = stream.callbacks, "stream");
        }
    }

    /// Drop streams on `devices` or started through `contexts`
    ///
    /// Devices that lose their stream here are no longer assigned.
    pub(crate) fn drop_streams(
        &mut self,
        devices: &[DeviceFingerprint],
        contexts: &[ContextId],
    ) {
        let mut doomed: Vec<DeviceFingerprint> = self
            .streams
            .iter()
            .filter(|(id, binding)| devices.contains(id) || contexts.contains(&binding.context))
            .map(|(id, _)| *id)
            .collect();
        doomed.sort();

        for id in doomed {
            if self.streams.remove(&id).is_some() {
                if let Some(record) = self.directory.lookup_mut(id) {
                    record.assigned = false;
                }
                info!(device = %id, "stream dropped");
            }
        }
    }

    /// Drop every stream and release every context
    ///
    /// Safe to call more than once; later calls find nothing to release.
    pub fn shutdown(&mut self) {
        let streams = self.streams.len();
        self.streams.clear();

        let contexts = self.pool.drain();
        let released = contexts.len();
        for (id, handle) in contexts {
            debug!(context = %id, "releasing context");
            self.backend.close_context(handle);
        }
        self.directory.clear_ownership();

        if streams > 0 || released > 0 {
            info!(streams, contexts = released, "device manager shut down");
        }
    }
}

impl<B: AudioBackend> Drop for DeviceManager<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;

    fn manager() -> DeviceManager<MockBackend> {
        let mut backend = MockBackend::new();
        backend.plug("Mic", Direction::Capture, true);
        backend.plug("Speakers", Direction::Playback, true);
        DeviceManager::new(backend)
    }

    #[test]
    fn test_defaults_get_set() {
        let mut defaults = Defaults::default();
        assert_eq!(defaults.get(Direction::Capture), None);
        defaults.set(Direction::Playback, Some(DeviceFingerprint(0x1001)));
        assert_eq!(defaults.get(Direction::Playback), Some(DeviceFingerprint(0x1001)));
        assert_eq!(defaults.get(Direction::Capture), None);
    }

    #[test]
    fn test_shutdown_releases_contexts_once() {
        let mut mgr = manager();
        mgr.scan().unwrap();
        mgr.assign(Direction::Capture, None).unwrap();
        assert_eq!(mgr.stream_count(), 1);

        mgr.backend().events.borrow_mut().clear();
        mgr.shutdown();
        assert_eq!(
            *mgr.backend().events.borrow(),
            vec!["stream dropped Mic", "context closed 0"]
        );
        assert_eq!(mgr.stream_count(), 0);
        assert!(mgr.pool().is_empty());
        assert!(mgr.backend().live().is_empty());
        assert!(mgr.directory().iter().all(|d| d.owner.is_none() && !d.assigned));

        mgr.shutdown();
        assert_eq!(mgr.backend().closed.borrow().len(), 1);
    }

    #[test]
    fn test_drop_releases_contexts() {
        let mut mgr = manager();
        mgr.scan().unwrap();
        let closed = mgr.backend().closed.clone();
        assert!(closed.borrow().is_empty());

        drop(mgr);
        assert_eq!(*closed.borrow(), vec![0]);
    }

    #[test]
    fn test_status_serializes() {
        let mut mgr = manager();
        mgr.scan().unwrap();
        let mic = mgr.defaults().capture.unwrap();
        mgr.assign(Direction::Capture, Some(mic)).unwrap();

        let status = mgr.status();
        assert_eq!(status.devices.len(), 2);
        assert_eq!(status.contexts.len(), 1);
        assert_eq!(
            status.streams,
            vec![StreamStatus {
                device: mic,
                context: ContextId(0),
                callbacks: 7
            }]
        );

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["defaults"]["capture"], mic.value());
        // no detach yet, so counts were never computed
        assert!(json["contexts"][0]["refs"].is_null());
        assert_eq!(json["devices"][0]["assigned"], true);
    }
}
