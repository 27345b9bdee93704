//! Shared fakes for integration tests: scriptable hardware and a pipeline
//! factory that records every call.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use camhub::device::{CameraDevice, DeviceProbe, device_path};
use camhub::enumerator::DeviceEnumerator;
use camhub::error::{IdentityLookupFailure, ProbeError};
use camhub::naming::{DeviceIdentity, NamingConfig};
use camhub::orchestrator::ReconciliationOrchestrator;
use camhub::pipeline::{CameraClass, MediaPipelineFactory, PipelineError};
use camhub::registry::CameraRegistry;

/// Hardware state shared between a test and the probe owned by the enumerator.
#[derive(Default)]
pub struct MockHardware {
    present: Mutex<BTreeMap<u32, Option<DeviceIdentity>>>,
    timing_out: Mutex<HashSet<String>>,
    pub open_handles: AtomicUsize,
    pub peak_handles: AtomicUsize,
    pub probe_calls: Mutex<Vec<String>>,
}

impl MockHardware {
    pub fn plug(&self, slot_id: u32) {
        self.present.lock().unwrap().insert(slot_id, None);
    }

    pub fn plug_identified(&self, slot_id: u32, vendor_id: &str, product_id: &str) {
        self.present.lock().unwrap().insert(
            slot_id,
            Some(DeviceIdentity {
                vendor_id: Some(vendor_id.to_string()),
                product_id: Some(product_id.to_string()),
                descriptor: None,
            }),
        );
    }

    pub fn unplug(&self, slot_id: u32) {
        self.present.lock().unwrap().remove(&slot_id);
    }

    pub fn unplug_all(&self) {
        self.present.lock().unwrap().clear();
    }

    /// Make the probe of `device_path` time out.
    pub fn stall(&self, device_path: &str) {
        self.timing_out.lock().unwrap().insert(device_path.to_string());
    }

    pub fn unstall(&self, device_path: &str) {
        self.timing_out.lock().unwrap().remove(device_path);
    }

    pub fn probes_of(&self, device_path: &str) -> usize {
        self.probe_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|path| *path == device_path)
            .count()
    }
}

/// Counts itself in `open_handles` for as long as it lives.
struct ProbeHandle<'a> {
    hardware: &'a MockHardware,
}

impl<'a> ProbeHandle<'a> {
    fn open(hardware: &'a MockHardware) -> Self {
        let open = hardware.open_handles.fetch_add(1, Ordering::SeqCst) + 1;
        hardware.peak_handles.fetch_max(open, Ordering::SeqCst);
        Self { hardware }
    }
}

impl Drop for ProbeHandle<'_> {
    fn drop(&mut self) {
        self.hardware.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
pub struct MockProbe {
    pub hardware: Arc<MockHardware>,
}

impl DeviceProbe for MockProbe {
    fn device_exists(&self, slot_id: u32) -> bool {
        self.hardware.present.lock().unwrap().contains_key(&slot_id)
    }

    fn read_identity(&self, slot_id: u32) -> Result<DeviceIdentity, IdentityLookupFailure> {
        self.hardware
            .present
            .lock()
            .unwrap()
            .get(&slot_id)
            .cloned()
            .flatten()
            .ok_or_else(|| IdentityLookupFailure {
                device_path: device_path(slot_id),
                reason: "no udev properties".to_string(),
            })
    }

    fn probe(&self, device_path: &str, timeout: Duration) -> Result<(), ProbeError> {
        self.hardware
            .probe_calls
            .lock()
            .unwrap()
            .push(device_path.to_string());

        let _capture = ProbeHandle::open(&self.hardware);
        let _pipeline = ProbeHandle::open(&self.hardware);

        if self.hardware.timing_out.lock().unwrap().contains(device_path) {
            std::thread::sleep(timeout.min(Duration::from_millis(2)));
            return Err(ProbeError::Timeout {
                device_path: device_path.to_string(),
                timeout,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FactoryLog {
    /// `(name, descriptor)` for every successful start.
    pub started: Vec<(String, String)>,
    pub stopped: Vec<String>,
    pub refuse: HashSet<String>,
    /// Handles whose pipeline has died since it was started.
    pub exited: HashSet<String>,
}

#[derive(Clone, Default)]
pub struct MockFactory {
    pub log: Arc<Mutex<FactoryLog>>,
}

impl MockFactory {
    pub fn starts(&self) -> usize {
        self.log.lock().unwrap().started.len()
    }

    pub fn stops(&self) -> usize {
        self.log.lock().unwrap().stopped.len()
    }

    pub fn refuse(&self, name: &str) {
        self.log.lock().unwrap().refuse.insert(name.to_string());
    }

    pub fn allow(&self, name: &str) {
        self.log.lock().unwrap().refuse.remove(name);
    }

    /// Make the running pipeline for `name` exit on its own.
    pub fn crash(&self, name: &str) {
        self.log.lock().unwrap().exited.insert(name.to_string());
    }
}

impl MediaPipelineFactory for MockFactory {
    type Handle = String;

    fn build_descriptor(
        &self,
        device_path: &str,
        class: CameraClass,
    ) -> Result<String, PipelineError> {
        Ok(format!("{class:?} {device_path}"))
    }

    fn start(
        &mut self,
        name: &str,
        _mount_path: &str,
        descriptor: &str,
    ) -> Result<String, PipelineError> {
        let mut log = self.log.lock().unwrap();
        if log.refuse.contains(name) {
            return Err(PipelineError::Launch(format!("{name} refused")));
        }
        log.exited.remove(name);
        log.started.push((name.to_string(), descriptor.to_string()));
        Ok(name.to_string())
    }

    fn stop(&mut self, handle: String) -> Result<(), PipelineError> {
        self.log.lock().unwrap().stopped.push(handle);
        Ok(())
    }

    fn is_running(&mut self, handle: &mut String) -> bool {
        !self.log.lock().unwrap().exited.contains(handle.as_str())
    }
}

pub struct Harness {
    pub hardware: Arc<MockHardware>,
    pub factory: MockFactory,
    pub orchestrator: ReconciliationOrchestrator<MockProbe, MockFactory>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_interval(Duration::from_secs(5))
    }

    pub fn with_interval(interval: Duration) -> Self {
        let probe = MockProbe::default();
        let hardware = Arc::clone(&probe.hardware);
        let factory = MockFactory::default();
        let enumerator = DeviceEnumerator::new(probe, NamingConfig::default().build(), 10)
            .with_probe_timeout(Duration::from_millis(50));
        let orchestrator = ReconciliationOrchestrator::new(
            enumerator,
            factory.clone(),
            CameraRegistry::new(),
            interval,
        );
        Self {
            hardware,
            factory,
            orchestrator,
        }
    }

    pub fn registry(&self) -> CameraRegistry {
        self.orchestrator.registry().clone()
    }

    pub fn registry_names(&self) -> Vec<String> {
        self.orchestrator.registry().snapshot().names()
    }

    pub fn mount_names(&self) -> Vec<String> {
        self.orchestrator.streams().names()
    }
}

/// Enumeration result built by hand, for driving `reconcile` directly.
pub fn devices(entries: &[(&str, &str)]) -> BTreeMap<String, CameraDevice> {
    entries
        .iter()
        .enumerate()
        .map(|(slot, (name, path))| {
            (
                name.to_string(),
                CameraDevice {
                    slot_id: slot as u32,
                    device_path: path.to_string(),
                    vendor_id: None,
                    product_id: None,
                    derived_name: name.to_string(),
                    streamable: true,
                },
            )
        })
        .collect()
}

pub fn in_use_map(registry: &CameraRegistry) -> HashMap<String, bool> {
    registry
        .snapshot()
        .entries
        .values()
        .map(|entry| (entry.name.clone(), entry.in_use))
        .collect()
}
