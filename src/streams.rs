//! Stream lifecycle: the mount table and its add/remove contract.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::error::MountError;
use crate::pipeline::{CameraClass, MediaPipelineFactory};

/// Mount path for a logical camera name.
pub fn mount_path(name: &str) -> String {
    format!("/{name}")
}

/// A published endpoint.
#[derive(Debug)]
pub struct StreamMount<H> {
    pub mount_path: String,
    pub device_path: String,
    pub pipeline_descriptor: String,
    /// Several consumers may attach to one pipeline.
    pub shared: bool,
    handle: H,
}

/// Owns the mount table. Only the reconciliation task holds one, so the table
/// itself needs no lock.
pub struct StreamLifecycleManager<F: MediaPipelineFactory> {
    factory: F,
    mounts: BTreeMap<String, StreamMount<F::Handle>>,
}

impl<F: MediaPipelineFactory> StreamLifecycleManager<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            mounts: BTreeMap::new(),
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn contains(&self, name: &str) -> bool {
        self.mounts.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&StreamMount<F::Handle>> {
        self.mounts.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.mounts.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }

    /// Build, start and record a shared mount at `/<name>`.
    pub fn add(&mut self, name: &str, device_path: &str) -> Result<&StreamMount<F::Handle>, MountError> {
        if self.mounts.contains_key(name) {
            return Err(MountError::Duplicate {
                name: name.to_string(),
            });
        }

        let creation = |reason: String| MountError::Creation {
            name: name.to_string(),
            reason,
        };

        let class = CameraClass::from_name(name);
        let descriptor = self
            .factory
            .build_descriptor(device_path, class)
            .map_err(|e| creation(e.to_string()))?;

        let mount_path = mount_path(name);
        let handle = self
            .factory
            .start(name, &mount_path, &descriptor)
            .map_err(|e| creation(e.to_string()))?;

        info!("Mounted {mount_path} for {device_path} ({class:?})");
        let mount = self.mounts.entry(name.to_string()).or_insert(StreamMount {
            mount_path,
            device_path: device_path.to_string(),
            pipeline_descriptor: descriptor,
            shared: true,
            handle,
        });
        Ok(mount)
    }

    /// Withdraw the mount for `name` and stop its pipeline.
    ///
    /// The mount leaves the table before the pipeline is stopped, so it is
    /// gone from discovery even when stopping fails. Connected consumers are
    /// left to the serving layer.
    pub fn remove(&mut self, name: &str) -> Result<(), MountError> {
        let mount = self.mounts.remove(name).ok_or_else(|| MountError::Unknown {
            name: name.to_string(),
        })?;

        if let Err(e) = self.factory.stop(mount.handle) {
            warn!("Pipeline for {} did not stop cleanly: {e}", mount.mount_path);
        }
        info!("Unmounted {}", mount.mount_path);
        Ok(())
    }

    /// Withdraw mounts whose pipeline has stopped on its own.
    pub fn reap_exited(&mut self) -> Vec<String> {
        let factory = &mut self.factory;
        let exited: Vec<String> = self
            .mounts
            .iter_mut()
            .filter_map(|(name, mount)| {
                (!factory.is_running(&mut mount.handle)).then(|| name.clone())
            })
            .collect();

        for name in &exited {
            warn!("Pipeline for /{name} exited");
            if let Err(e) = self.remove(name) {
                warn!("Failed to withdraw /{name}: {e}");
            }
        }
        exited
    }

    /// Remove every mount. Used on shutdown.
    pub fn remove_all(&mut self) -> Vec<String> {
        let names = self.names();
        for name in &names {
            if let Err(e) = self.remove(name) {
                warn!("Failed to remove {name} during teardown: {e}");
            }
        }
        names
    }
}
