//! Device enumeration: scan the slot range, name each present device and
//! decide whether it can currently stream.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tracing::debug;

use crate::device::{CameraDevice, DeviceProbe, device_path};
use crate::naming::{DeviceIdentity, NamingPolicy};

/// Scans `0..max_slots` on every call. Holds no state between passes.
pub struct DeviceEnumerator<P> {
    probe: P,
    naming: Box<dyn NamingPolicy>,
    max_slots: u32,
    probe_timeout: Duration,
    probe_enabled: bool,
}

impl<P: DeviceProbe> DeviceEnumerator<P> {
    pub fn new(probe: P, naming: Box<dyn NamingPolicy>, max_slots: u32) -> Self {
        Self {
            probe,
            naming,
            max_slots,
            probe_timeout: Duration::from_secs(1),
            probe_enabled: true,
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_probing(mut self, enabled: bool) -> Self {
        self.probe_enabled = enabled;
        self
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Present, streamable devices keyed by derived name.
    ///
    /// `in_use` maps names that currently have a mount to their device path.
    /// A slot whose name and path match an `in_use` entry skips the probe and
    /// is reported as present, so an active stream is never disturbed.
    ///
    /// When two slots derive the same name, a slot holding that name's
    /// active mount keeps it. Otherwise the lowest slot wins.
    pub fn enumerate(&self, in_use: &HashMap<String, String>) -> BTreeMap<String, CameraDevice> {
        let mut candidates = Vec::new();
        for slot_id in 0..self.max_slots {
            if !self.probe.device_exists(slot_id) {
                continue;
            }
            let identity = match self.probe.read_identity(slot_id) {
                Ok(identity) => Some(identity),
                Err(e) => {
                    debug!("{e}; using default name");
                    None
                }
            };
            let name = self.naming.name_for(slot_id, identity.as_ref());
            let path = device_path(slot_id);
            let mounted = in_use.get(&name).is_some_and(|mounted_path| *mounted_path == path);
            candidates.push(Candidate {
                slot_id,
                path,
                name,
                identity,
                mounted,
            });
        }

        // Mounted slots claim their names first; the stable sort keeps slot
        // order within each group.
        candidates.sort_by_key(|candidate| !candidate.mounted);

        let mut devices: BTreeMap<String, CameraDevice> = BTreeMap::new();
        for candidate in candidates {
            let Candidate {
                slot_id,
                path,
                name,
                identity,
                mounted,
            } = candidate;

            if let Some(existing) = devices.get(&name) {
                debug!(
                    "Slot {slot_id} also named '{name}', keeping {}",
                    existing.device_path
                );
                continue;
            }

            let streamable = if mounted {
                debug!("Skipping probe of {path}, '{name}' is in use");
                true
            } else if self.probe_enabled {
                match self.probe.probe(&path, self.probe_timeout) {
                    Ok(()) => true,
                    Err(e) => {
                        debug!("{path} not streamable: {e}");
                        false
                    }
                }
            } else {
                true
            };

            if !streamable {
                continue;
            }

            let (vendor_id, product_id) = identity
                .map(|identity| (identity.vendor_id, identity.product_id))
                .unwrap_or_default();

            devices.insert(
                name.clone(),
                CameraDevice {
                    slot_id,
                    device_path: path,
                    vendor_id,
                    product_id,
                    derived_name: name,
                    streamable,
                },
            );
        }

        if devices.is_empty() {
            debug!("No streamable cameras in /dev/video0..{}", self.max_slots);
        }
        devices
    }
}

/// A present slot, named but not yet probed.
struct Candidate {
    slot_id: u32,
    path: String,
    name: String,
    identity: Option<DeviceIdentity>,
    mounted: bool,
}
