//! Pool of shared hardware contexts
//!
//! A context is an open handle to the host audio subsystem. One context is
//! adopted per scan that finds new or returning devices, and every device found
//! in that scan points back at it. Reference counts are never adjusted in
//! place: [`ContextPool::compute_refcounts`] rebuilds them from the directory
//! and [`ContextPool::sweep`] removes whatever ends up at zero.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::device::{DeviceDirectory, DeviceFingerprint};

/// Sequential context identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(pub u32);

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered context and the handle it owns
#[derive(Debug)]
pub struct ContextRecord<H> {
    pub id: ContextId,
    refs: Option<usize>,
    handle: H,
}

impl<H> ContextRecord<H> {
    /// Reference count from the last recomputation, `None` if never computed
    pub fn refs(&self) -> Option<usize> {
        self.refs
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }
}

/// Reportable view of a context record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSummary {
    pub id: ContextId,
    pub refs: Option<usize>,
}

/// Result of a [`ContextPool::sweep`]
#[derive(Debug)]
pub struct Sweep<H> {
    /// Removed contexts; each handle must be released by the caller
    pub released: Vec<(ContextId, H)>,
    /// Devices whose owner was cleared because their context went away
    pub orphaned: Vec<DeviceFingerprint>,
}

impl<H> Default for Sweep<H> {
    fn default() -> Self {
        Self {
            released: Vec::new(),
            orphaned: Vec::new(),
        }
    }
}

/// Registry of live contexts keyed by id
#[derive(Debug)]
pub struct ContextPool<H> {
    contexts: HashMap<ContextId, ContextRecord<H>>,
    next_id: u32,
}

impl<H> Default for ContextPool<H> {
    fn default() -> Self {
        Self {
            contexts: HashMap::new(),
            next_id: 0,
        }
    }
}

impl<H> ContextPool<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id the next [`register`](Self::register) call will hand out
    pub fn next_id(&self) -> ContextId {
        ContextId(self.next_id)
    }

    /// Adopt a handle under a fresh sequential id
    pub fn register(&mut self, handle: H) -> ContextId {
        let id = ContextId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.contexts.insert(
            id,
            ContextRecord {
                id,
                refs: None,
                handle,
            },
        );
        info!(context = %id, "context registered");
        id
    }

    /// Rebuild every reference count from the attached devices in `directory`
    pub fn compute_refcounts(&mut self, directory: &DeviceDirectory) {
        for context in self.contexts.values_mut() {
            context.refs = Some(0);
        }
        for device in directory.iter() {
            if !device.attached {
                continue;
            }
            if let Some(context) = device.owner.and_then(|id| self.contexts.get_mut(&id)) {
                context.refs = Some(context.refs.unwrap_or(0) + 1);
            }
        }
        for context in self.contexts.values() {
            debug!(context = %context.id, refs = ?context.refs, "refcount");
        }
    }

    /// Remove every context whose computed reference count is zero
    ///
    /// Contexts whose count was never computed are kept. Devices still
    /// pointing at a removed context lose their owner and assignment.
    pub fn sweep(&mut self, directory: &mut DeviceDirectory) -> Sweep<H> {
        let mut dead: Vec<ContextId> = self
            .contexts
            .values()
            .filter(|c| c.refs == Some(0))
            .map(|c| c.id)
            .collect();
        dead.sort();

        let mut sweep = Sweep::default();
        for id in dead {
            if let Some(context) = self.contexts.remove(&id) {
                info!(context = %id, "context removed");
                sweep.released.push((id, context.handle));
            }
        }

        for device in directory.iter_mut() {
            let orphaned = device
                .owner
                .is_some_and(|owner| sweep.released.iter().any(|(id, _)| *id == owner));
            if orphaned {
                debug!(device = %device.id, "owner cleared");
                device.owner = None;
                device.assigned = false;
                sweep.orphaned.push(device.id);
            }
        }
        sweep.orphaned.sort();

        for context in self.contexts.values() {
            debug!(context = %context.id, refs = ?context.refs, "context kept");
        }

        sweep
    }

    /// Remove every context, for shutdown
    pub fn drain(&mut self) -> Vec<(ContextId, H)> {
        let mut drained: Vec<(ContextId, H)> = self
            .contexts
            .drain()
            .map(|(id, record)| (id, record.handle))
            .collect();
        drained.sort_by_key(|(id, _)| *id);
        drained
    }

    pub fn get(&self, id: ContextId) -> Option<&ContextRecord<H>> {
        self.contexts.get(&id)
    }

    pub fn contains(&self, id: ContextId) -> bool {
        self.contexts.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Sorted summaries of every live context
    pub fn summaries(&self) -> Vec<ContextSummary> {
        let mut summaries: Vec<ContextSummary> = self
            .contexts
            .values()
            .map(|c| ContextSummary {
                id: c.id,
                refs: c.refs,
            })
            .collect();
        summaries.sort_by_key(|s| s.id);
        summaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Direction;

    #[test]
    fn test_register_is_sequential() {
        let mut pool = ContextPool::new();
        assert_eq!(pool.next_id(), ContextId(0));
        assert_eq!(pool.register("a"), ContextId(0));
        assert_eq!(pool.register("b"), ContextId(1));
        assert_eq!(pool.next_id(), ContextId(2));
        assert_eq!(pool.get(ContextId(1)).unwrap().refs(), None);
    }

    #[test]
    fn test_compute_refcounts_counts_attached_only() {
        let mut pool = ContextPool::new();
        let mut dir = DeviceDirectory::new();
        let ctx = pool.register("ctx");

        dir.observe("Mic", Direction::Capture, false, ctx);
        dir.observe("Line In", Direction::Capture, false, ctx);
        dir.observe("Speakers", Direction::Playback, false, ctx);

        pool.compute_refcounts(&dir);
        assert_eq!(pool.get(ctx).unwrap().refs(), Some(3));

        dir.begin_scan();
        dir.observe("Mic", Direction::Capture, false, ContextId(9));
        dir.end_scan_direction(Direction::Capture);
        pool.compute_refcounts(&dir);
        // "Line In" detached; "Mic" and "Speakers" remain
        assert_eq!(pool.get(ctx).unwrap().refs(), Some(2));
    }

    #[test]
    fn test_compute_refcounts_is_not_cumulative() {
        let mut pool = ContextPool::new();
        let mut dir = DeviceDirectory::new();
        let ctx = pool.register(());
        dir.observe("Mic", Direction::Capture, false, ctx);

        pool.compute_refcounts(&dir);
        pool.compute_refcounts(&dir);
        assert_eq!(pool.get(ctx).unwrap().refs(), Some(1));
    }

    #[test]
    fn test_sweep_releases_unreferenced_and_clears_owner() {
        let mut pool = ContextPool::new();
        let mut dir = DeviceDirectory::new();
        let old = pool.register("old");
        let mic = dir.observe("Mic", Direction::Capture, false, old).fingerprint();
        dir.lookup_mut(mic).unwrap().assigned = true;

        let new = pool.register("new");
        let spk = dir.observe("Speakers", Direction::Playback, false, new).fingerprint();

        dir.begin_scan();
        dir.observe("Speakers", Direction::Playback, false, pool.next_id());
        dir.end_scan_direction(Direction::Capture);
        dir.end_scan_direction(Direction::Playback);

        pool.compute_refcounts(&dir);
        let sweep = pool.sweep(&mut dir);

        assert_eq!(sweep.released.len(), 1);
        assert_eq!(sweep.released[0], (old, "old"));
        assert_eq!(sweep.orphaned, vec![mic]);
        assert!(!pool.contains(old));
        assert!(pool.contains(new));

        let record = dir.lookup(mic).unwrap();
        assert_eq!(record.owner, None);
        assert!(!record.attached);
        assert!(!record.assigned);
        assert_eq!(dir.lookup(spk).unwrap().owner, Some(new));
    }

    #[test]
    fn test_sweep_keeps_context_shared_with_detached_device() {
        let mut pool = ContextPool::new();
        let mut dir = DeviceDirectory::new();
        let ctx = pool.register(());
        let mic = dir.observe("Mic", Direction::Capture, false, ctx).fingerprint();
        dir.observe("Speakers", Direction::Playback, false, ctx);

        dir.begin_scan();
        dir.observe("Speakers", Direction::Playback, false, pool.next_id());
        dir.end_scan_direction(Direction::Capture);
        dir.end_scan_direction(Direction::Playback);

        pool.compute_refcounts(&dir);
        let sweep = pool.sweep(&mut dir);
        assert!(sweep.released.is_empty());
        assert!(sweep.orphaned.is_empty());
        // detached device still names a live context
        assert_eq!(dir.lookup(mic).unwrap().owner, Some(ctx));
    }

    #[test]
    fn test_sweep_without_refcounts_keeps_everything() {
        let mut pool = ContextPool::new();
        let mut dir = DeviceDirectory::new();
        pool.register(());
        let sweep = pool.sweep(&mut dir);
        assert!(sweep.released.is_empty());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_drain_returns_every_handle() {
        let mut pool = ContextPool::new();
        pool.register(10);
        pool.register(20);
        let drained = pool.drain();
        assert_eq!(drained, vec![(ContextId(0), 10), (ContextId(1), 20)]);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_summaries_sorted() {
        let mut pool = ContextPool::new();
        pool.register(());
        pool.register(());
        let ids: Vec<_> = pool.summaries().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![ContextId(0), ContextId(1)]);
    }
}
