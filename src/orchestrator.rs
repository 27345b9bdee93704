//! Reconciliation loop: keep the mount table and the registry in step with
//! the devices that are actually present.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::device::{CameraDevice, DeviceProbe};
use crate::enumerator::DeviceEnumerator;
use crate::error::MountError;
use crate::pipeline::MediaPipelineFactory;
use crate::registry::CameraRegistry;
use crate::streams::StreamLifecycleManager;
use crate::{HubError, HubResult};

/// What one pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Names whose mount could not be created; retried next pass.
    pub failed: Vec<String>,
}

impl PassReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.failed.is_empty()
    }
}

pub struct ReconciliationOrchestrator<P, F: MediaPipelineFactory> {
    enumerator: Arc<DeviceEnumerator<P>>,
    streams: StreamLifecycleManager<F>,
    registry: CameraRegistry,
    interval: Duration,
}

impl<P, F> ReconciliationOrchestrator<P, F>
where
    P: DeviceProbe + 'static,
    F: MediaPipelineFactory,
{
    pub fn new(
        enumerator: DeviceEnumerator<P>,
        factory: F,
        registry: CameraRegistry,
        interval: Duration,
    ) -> Self {
        Self {
            enumerator: Arc::new(enumerator),
            streams: StreamLifecycleManager::new(factory),
            registry,
            interval,
        }
    }

    pub fn registry(&self) -> &CameraRegistry {
        &self.registry
    }

    pub fn streams(&self) -> &StreamLifecycleManager<F> {
        &self.streams
    }

    pub fn enumerator(&self) -> &DeviceEnumerator<P> {
        &self.enumerator
    }

    /// Names the registry currently marks in use, with their device paths.
    fn in_use(&self) -> HashMap<String, String> {
        self.registry
            .snapshot()
            .entries
            .values()
            .filter(|entry| entry.in_use)
            .map(|entry| (entry.name.clone(), entry.device_path.clone()))
            .collect()
    }

    /// Enumerate devices on the blocking pool, then reconcile.
    pub async fn run_pass(&mut self) -> HubResult<PassReport> {
        let enumerator = Arc::clone(&self.enumerator);
        let in_use = self.in_use();
        let current = tokio::task::spawn_blocking(move || enumerator.enumerate(&in_use))
            .await
            .map_err(|e| HubError::App(format!("Enumeration task failed: {e}")))?;
        Ok(self.reconcile(&current))
    }

    /// Apply one enumeration result to the mount table and publish the
    /// resulting registry.
    pub fn reconcile(&mut self, current: &BTreeMap<String, CameraDevice>) -> PassReport {
        let mut report = PassReport::default();
        let mut draft = self.registry.draft();

        // Dead pipelines leave first so their names are re-added below.
        for name in self.streams.reap_exited() {
            draft.remove(&name);
            report.removed.push(name);
        }

        // A name that moved to another node keeps a stale pipeline; retire
        // it so it is re-added against the new path below.
        for (name, device) in current {
            let moved = self
                .streams
                .get(name)
                .is_some_and(|mount| mount.device_path != device.device_path);
            if moved {
                info!("Camera {name} moved to {}", device.device_path);
                self.retire(name, &mut report);
                draft.remove(name);
            }
        }

        for (name, device) in current {
            if self.streams.contains(name) {
                continue;
            }
            info!("New camera detected: {name} ({})", device.device_path);
            match self.streams.add(name, &device.device_path) {
                Ok(mount) => {
                    debug!("Pipeline for {}: {}", mount.mount_path, mount.pipeline_descriptor);
                    draft.upsert(name, &device.device_path, true);
                    report.added.push(name.clone());
                }
                Err(e) => {
                    log_mount_error(&e);
                    report.failed.push(name.clone());
                }
            }
        }

        for name in self.streams.names() {
            if current.contains_key(&name) {
                continue;
            }
            info!("Camera disconnected: {name}");
            if self.retire(&name, &mut report) {
                draft.remove(&name);
            }
        }

        draft.retain(|entry| current.contains_key(&entry.name));
        for (name, device) in current {
            draft.upsert(name, &device.device_path, self.streams.contains(name));
        }
        self.registry.publish(draft);

        report
    }

    fn retire(&mut self, name: &str, report: &mut PassReport) -> bool {
        match self.streams.remove(name) {
            Ok(()) => {
                report.removed.push(name.to_string());
                true
            }
            Err(e) => {
                log_mount_error(&e);
                false
            }
        }
    }

    /// Tear down every mount and publish an empty registry.
    pub fn shutdown(&mut self) {
        let removed = self.streams.remove_all();
        info!("Removed {} mounts on shutdown", removed.len());
        let mut draft = self.registry.draft();
        draft.retain(|_| false);
        self.registry.publish(draft);
    }

    /// Reconcile every interval until `shutdown` turns true or its sender is
    /// dropped. A failed pass is retried at the next tick.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> HubResult<()> {
        info!("Starting camera reconciliation every {:?}", self.interval);

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_pass().await {
                        Ok(report) if report.is_noop() => debug!("Reconciliation pass: no changes"),
                        Ok(report) => info!(
                            "Reconciliation pass: added {:?}, removed {:?}, failed {:?}",
                            report.added, report.removed, report.failed
                        ),
                        Err(e) => error!("Reconciliation pass failed: {e}"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.shutdown();
        info!("Camera reconciliation stopped");
        Ok(())
    }
}

fn log_mount_error(e: &MountError) {
    if e.is_contract_violation() {
        error!("Registry and mount table diverged: {e}");
    } else {
        warn!("{e}; retrying next pass");
    }
}
