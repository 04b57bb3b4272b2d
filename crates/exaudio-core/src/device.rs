//! Device directory for tracking discovered audio endpoints
//!
//! Devices are keyed by a [`DeviceFingerprint`] derived from their name and
//! direction. Records are never removed: a device that vanishes from the host
//! is only flagged detached, so its identity and assignment survive until it
//! shows up again.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

use crate::context::ContextId;

/// Seed for the 12-bit name hash
const HASH_SEED: u16 = 0x0c1;

/// Multiplier for the 12-bit name hash
const HASH_MULTIPLIER: u16 = 31;

/// Mask keeping the low 12 bits of the name hash
const HASH_MASK: u16 = 0x0fff;

/// Direction bit OR-ed into playback fingerprints
const PLAYBACK_TAG: u16 = 0x1000;

/// Whether an endpoint records or plays audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Capture,
    Playback,
}

impl Direction {
    /// Both directions, in scan order
    pub const ALL: [Direction; 2] = [Direction::Capture, Direction::Playback];

    /// The tag bit this direction contributes to a fingerprint
    pub fn tag(self) -> u16 {
        match self {
            Direction::Capture => 0,
            Direction::Playback => PLAYBACK_TAG,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Capture => "capture",
            Direction::Playback => "playback",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown direction: {0}")]
pub struct UnknownDirection(pub String);

impl FromStr for Direction {
    type Err = UnknownDirection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "capture" => Ok(Direction::Capture),
            "playback" => Ok(Direction::Playback),
            other => Err(UnknownDirection(other.to_string())),
        }
    }
}

/// Stable 13-bit identity of a device: a 12-bit name hash plus a direction bit
///
/// Two distinct names can hash to the same value. Such devices are treated as
/// one identity; there is no collision resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceFingerprint(pub u16);

impl DeviceFingerprint {
    /// Compute the fingerprint for a device name and direction
    pub fn new(name: &str, direction: Direction) -> Self {
        let hash = name
            .bytes()
            .enumerate()
            .fold(HASH_SEED, |acc, (position, byte)| {
                let mixed = u16::from(byte ^ position as u8);
                acc.wrapping_mul(HASH_MULTIPLIER).wrapping_add(mixed) & HASH_MASK
            });
        Self(hash | direction.tag())
    }

    /// Reinterpret a raw id received over the wire
    ///
    /// Returns `None` when the value cannot be a fingerprint at all.
    pub fn from_raw(raw: i32) -> Option<Self> {
        u16::try_from(raw)
            .ok()
            .filter(|v| *v <= (HASH_MASK | PLAYBACK_TAG))
            .map(Self)
    }

    /// The direction encoded in the tag bit
    pub fn direction(self) -> Direction {
        if self.0 & PLAYBACK_TAG != 0 {
            Direction::Playback
        } else {
            Direction::Capture
        }
    }

    pub fn value(self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for DeviceFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Free-function form of [`DeviceFingerprint::new`]
pub fn fingerprint(name: &str, direction: Direction) -> DeviceFingerprint {
    DeviceFingerprint::new(name, direction)
}

/// A known audio endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Fingerprint identity
    pub id: DeviceFingerprint,
    /// Capture or playback
    pub direction: Direction,
    /// Name as reported by the host
    pub name: String,
    /// Whether the host flagged this device as its default in the last scan
    pub is_default: bool,
    /// Whether the device was present in the most recent scan
    pub attached: bool,
    /// Scan-local marker, meaningless outside a scan
    #[serde(skip)]
    pub visited: bool,
    /// Context the device was discovered through, if still held
    pub owner: Option<ContextId>,
    /// Whether a live stream is bound to this device
    pub assigned: bool,
}

impl DeviceRecord {
    fn new(id: DeviceFingerprint, name: &str, direction: Direction, owner: ContextId) -> Self {
        Self {
            id,
            direction,
            name: name.to_string(),
            is_default: false,
            attached: true,
            visited: false,
            owner: Some(owner),
            assigned: false,
        }
    }
}

/// What [`DeviceDirectory::observe`] did to the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First sighting, a record was created
    Created(DeviceFingerprint),
    /// A detached record came back
    Reattached(DeviceFingerprint),
    /// Already attached, only flags were refreshed
    Refreshed(DeviceFingerprint),
}

impl Observation {
    pub fn fingerprint(self) -> DeviceFingerprint {
        match self {
            Observation::Created(id) | Observation::Reattached(id) | Observation::Refreshed(id) => id,
        }
    }

    /// True when the device now depends on the context it was observed through
    pub fn adopts_context(self) -> bool {
        !matches!(self, Observation::Refreshed(_))
    }
}

/// Registry of every device ever observed, keyed by fingerprint
#[derive(Debug, Clone, Default)]
pub struct DeviceDirectory {
    devices: HashMap<DeviceFingerprint, DeviceRecord>,
}

impl DeviceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the visited flag on every record
    pub fn begin_scan(&mut self) {
        for device in self.devices.values_mut() {
            device.visited = false;
        }
    }

    /// Upsert a device seen in the current enumeration
    ///
    /// `context` is the context the enumeration ran through; it becomes the
    /// owner of created and reattached records.
    pub fn observe(
        &mut self,
        name: &str,
        direction: Direction,
        is_default: bool,
        context: ContextId,
    ) -> Observation {
        let id = DeviceFingerprint::new(name, direction);

        let observation = match self.devices.get_mut(&id) {
            None => {
                info!(device = %id, name = %name, direction = %direction, "attach");
                self.devices
                    .insert(id, DeviceRecord::new(id, name, direction, context));
                Observation::Created(id)
            }
            Some(device) if !device.attached => {
                info!(device = %id, name = %name, direction = %direction, "reattach");
                device.attached = true;
                device.owner = Some(context);
                Observation::Reattached(id)
            }
            Some(_) => Observation::Refreshed(id),
        };

        if let Some(device) = self.devices.get_mut(&id) {
            device.visited = true;
            device.is_default = is_default;
        }

        observation
    }

    /// Detach every record of `direction` not visited in this scan
    ///
    /// Owners are left in place for the cleanup sweep. Returns the
    /// fingerprints that went from attached to detached.
    pub fn end_scan_direction(&mut self, direction: Direction) -> Vec<DeviceFingerprint> {
        let mut detached = Vec::new();
        for device in self.devices.values_mut() {
            if device.direction == direction && !device.visited && device.attached {
                info!(device = %device.id, name = %device.name, "detach");
                device.attached = false;
                detached.push(device.id);
            }
        }
        detached.sort();
        detached
    }

    pub fn lookup(&self, id: DeviceFingerprint) -> Option<&DeviceRecord> {
        self.devices.get(&id)
    }

    pub fn lookup_mut(&mut self, id: DeviceFingerprint) -> Option<&mut DeviceRecord> {
        self.devices.get_mut(&id)
    }

    /// All records, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut DeviceRecord> {
        self.devices.values_mut()
    }

    /// Drop every owner and assignment, once no context is left to back them
    pub fn clear_ownership(&mut self) {
        for device in self.devices.values_mut() {
            device.owner = None;
            device.assigned = false;
        }
    }

    /// All records sorted by fingerprint, for stable reporting
    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        let mut devices: Vec<DeviceRecord> = self.devices.values().cloned().collect();
        devices.sort_by_key(|d| d.id);
        devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Log one line per record
    pub fn log_summary(&self) {
        for device in self.snapshot() {
            debug!(
                device = %device.id,
                name = %device.name,
                direction = %device.direction,
                attached = device.attached,
                default = device.is_default,
                owner = ?device.owner,
                assigned = device.assigned,
                "device"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CTX0: ContextId = ContextId(0);
    const CTX1: ContextId = ContextId(1);

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = fingerprint("Built-in Microphone", Direction::Capture);
        let b = fingerprint("Built-in Microphone", Direction::Capture);
        assert_eq!(a, b);
        assert!(a.value() <= 0x1fff);
    }

    #[test]
    fn test_fingerprint_known_value() {
        // "ab": ((0x0c1 * 31 + 'a') * 31 + ('b' ^ 1)) & 0xfff
        let expected = ((((0x0c1u32 * 31 + 97) & 0xfff) * 31 + (98 ^ 1)) & 0xfff) as u16;
        assert_eq!(fingerprint("ab", Direction::Capture).value(), expected);
        assert_eq!(
            fingerprint("ab", Direction::Playback).value(),
            expected | 0x1000
        );
    }

    #[test]
    fn test_fingerprint_empty_name_is_seed() {
        assert_eq!(fingerprint("", Direction::Capture).value(), 0x0c1);
    }

    #[test]
    fn test_fingerprint_position_sensitive() {
        let ab = fingerprint("ab", Direction::Capture);
        let ba = fingerprint("ba", Direction::Capture);
        assert_ne!(ab, ba);
    }

    #[test]
    fn test_fingerprint_direction_bit() {
        let capture = fingerprint("Speakers", Direction::Capture);
        let playback = fingerprint("Speakers", Direction::Playback);
        assert_ne!(capture, playback);
        assert_eq!(capture.direction(), Direction::Capture);
        assert_eq!(playback.direction(), Direction::Playback);
        assert_eq!(capture.value() & 0x0fff, playback.value() & 0x0fff);
    }

    #[test]
    fn test_fingerprint_from_raw() {
        assert_eq!(DeviceFingerprint::from_raw(0x1abc), Some(DeviceFingerprint(0x1abc)));
        assert_eq!(DeviceFingerprint::from_raw(-1), None);
        assert_eq!(DeviceFingerprint::from_raw(0x2000), None);
    }

    #[test]
    fn test_direction_from_str() {
        assert_eq!("capture".parse::<Direction>(), Ok(Direction::Capture));
        assert_eq!("playback".parse::<Direction>(), Ok(Direction::Playback));
        assert!("duplex".parse::<Direction>().is_err());
    }

    #[test]
    fn test_observe_creates_record() {
        let mut dir = DeviceDirectory::new();
        dir.begin_scan();
        let obs = dir.observe("Mic", Direction::Capture, true, CTX0);
        assert!(matches!(obs, Observation::Created(_)));
        assert!(obs.adopts_context());

        let record = dir.lookup(obs.fingerprint()).unwrap();
        assert_eq!(record.name, "Mic");
        assert!(record.attached);
        assert!(record.visited);
        assert!(record.is_default);
        assert!(!record.assigned);
        assert_eq!(record.owner, Some(CTX0));
    }

    #[test]
    fn test_observe_attached_record_keeps_owner() {
        let mut dir = DeviceDirectory::new();
        dir.observe("Mic", Direction::Capture, false, CTX0);
        dir.begin_scan();
        let obs = dir.observe("Mic", Direction::Capture, true, CTX1);
        assert!(matches!(obs, Observation::Refreshed(_)));
        assert!(!obs.adopts_context());

        let record = dir.lookup(obs.fingerprint()).unwrap();
        assert_eq!(record.owner, Some(CTX0));
        assert!(record.is_default);
    }

    #[test]
    fn test_end_scan_detaches_unvisited_only_in_direction() {
        let mut dir = DeviceDirectory::new();
        let mic = dir.observe("Mic", Direction::Capture, false, CTX0).fingerprint();
        let spk = dir.observe("Speakers", Direction::Playback, false, CTX0).fingerprint();

        dir.begin_scan();
        let detached = dir.end_scan_direction(Direction::Capture);
        assert_eq!(detached, vec![mic]);

        let record = dir.lookup(mic).unwrap();
        assert!(!record.attached);
        assert_eq!(record.owner, Some(CTX0));
        assert!(dir.lookup(spk).unwrap().attached);

        // already detached: no second transition
        dir.begin_scan();
        assert!(dir.end_scan_direction(Direction::Capture).is_empty());
    }

    #[test]
    fn test_reattach_restores_identity() {
        let mut dir = DeviceDirectory::new();
        let mic = dir.observe("Mic", Direction::Capture, false, CTX0).fingerprint();
        dir.begin_scan();
        dir.end_scan_direction(Direction::Capture);

        dir.begin_scan();
        let obs = dir.observe("Mic", Direction::Capture, false, CTX1);
        assert_eq!(obs, Observation::Reattached(mic));
        let record = dir.lookup(mic).unwrap();
        assert!(record.attached);
        assert_eq!(record.owner, Some(CTX1));
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let mut dir = DeviceDirectory::new();
        dir.observe("b", Direction::Playback, false, CTX0);
        dir.observe("a", Direction::Capture, false, CTX0);
        dir.observe("c", Direction::Capture, false, CTX0);
        let ids: Vec<_> = dir.snapshot().iter().map(|d| d.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_clear_ownership_keeps_records() {
        let mut dir = DeviceDirectory::new();
        let mic = dir.observe("Mic", Direction::Capture, false, CTX0).fingerprint();
        dir.lookup_mut(mic).unwrap().assigned = true;

        dir.clear_ownership();
        let record = dir.lookup(mic).unwrap();
        assert_eq!(record.owner, None);
        assert!(!record.assigned);
        assert!(record.attached);
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_record_serializes_without_visited() {
        let mut dir = DeviceDirectory::new();
        let id = dir.observe("Mic", Direction::Capture, false, CTX0).fingerprint();
        let json = serde_json::to_value(dir.lookup(id).unwrap()).unwrap();
        assert_eq!(json["direction"], "capture");
        assert_eq!(json["owner"], 0);
        assert!(json.get("visited").is_none());
    }
}
