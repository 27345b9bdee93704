//! Shared camera registry.
//!
//! Readers take the lock only long enough to clone an `Arc` to the current
//! snapshot. The reconciliation loop stages its edits in a [`RegistryDraft`]
//! and publishes it as a complete replacement under the same lock, so a reader
//! sees either the old or the new snapshot in full.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Cross-pass record for one logical camera.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraRegistryEntry {
    pub name: String,
    pub device_path: String,
    /// A mount exists for this name and has not been retired.
    pub in_use: bool,
}

/// Immutable view of the registry at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub entries: BTreeMap<String, CameraRegistryEntry>,
    /// Completed reconciliation passes that produced this view.
    pub generation: u64,
    pub published_at: Option<DateTime<Utc>>,
}

impl RegistrySnapshot {
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<&CameraRegistryEntry> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CameraRegistry {
    current: Arc<Mutex<Arc<RegistrySnapshot>>>,
}

impl CameraRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Arc<RegistrySnapshot>> {
        self.current.lock().unwrap_or_else(|e| {
            error!("Camera registry mutex poisoned: {e}");
            e.into_inner()
        })
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        Arc::clone(&self.lock())
    }

    /// Start a pass-local working copy of the current entries.
    pub(crate) fn draft(&self) -> RegistryDraft {
        RegistryDraft {
            entries: self.snapshot().entries.clone(),
        }
    }

    /// Replace the whole registry with the draft and count a completed pass.
    pub(crate) fn publish(&self, draft: RegistryDraft) {
        let mut current = self.lock();
        let next = RegistrySnapshot {
            entries: draft.entries,
            generation: current.generation + 1,
            published_at: Some(Utc::now()),
        };
        *current = Arc::new(next);
    }
}

/// Registry edits staged during one reconciliation pass. Nothing is visible to
/// readers until the draft is published.
#[derive(Debug, Clone, Default)]
pub struct RegistryDraft {
    entries: BTreeMap<String, CameraRegistryEntry>,
}

impl RegistryDraft {
    pub fn upsert(&mut self, name: &str, device_path: &str, in_use: bool) {
        self.entries.insert(
            name.to_string(),
            CameraRegistryEntry {
                name: name.to_string(),
                device_path: device_path.to_string(),
                in_use,
            },
        );
    }

    pub fn remove(&mut self, name: &str) -> Option<CameraRegistryEntry> {
        self.entries.remove(name)
    }

    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&CameraRegistryEntry) -> bool,
    {
        self.entries.retain(|_, entry| keep(entry));
    }

    pub fn get(&self, name: &str) -> Option<&CameraRegistryEntry> {
        self.entries.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn entry(name: &str, path: &str) -> CameraRegistryEntry {
        CameraRegistryEntry {
            name: name.to_string(),
            device_path: path.to_string(),
            in_use: true,
        }
    }

    fn publish_all(registry: &CameraRegistry, entries: &[CameraRegistryEntry]) {
        let mut draft = registry.draft();
        draft.retain(|_| false);
        for entry in entries {
            draft.upsert(&entry.name, &entry.device_path, entry.in_use);
        }
        registry.publish(draft);
    }

    #[test]
    fn test_draft_is_invisible_until_published() {
        let registry = CameraRegistry::new();
        let mut draft = registry.draft();
        draft.upsert("camera_0", "/dev/video0", true);
        draft.upsert("camera_0", "/dev/video2", true);
        assert!(registry.snapshot().is_empty());
        assert_eq!(registry.snapshot().generation, 0);

        registry.publish(draft);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("camera_0").unwrap().device_path, "/dev/video2");
        assert_eq!(snapshot.generation, 1);
        assert!(snapshot.published_at.is_some());

        let mut draft = registry.draft();
        assert!(draft.remove("camera_0").is_some());
        assert!(draft.remove("camera_0").is_none());
        registry.publish(draft);
        assert!(registry.snapshot().is_empty());

        // Earlier snapshots are unaffected by later writes.
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_publish_replaces_everything() {
        let registry = CameraRegistry::new();
        publish_all(&registry, &[entry("stale", "/dev/video9")]);
        publish_all(
            &registry,
            &[entry("web", "/dev/video0"), entry("usb", "/dev/video2")],
        );

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.names(), vec!["usb".to_string(), "web".to_string()]);
        assert_eq!(snapshot.generation, 2);
    }

    #[test]
    fn test_readers_never_see_mixed_snapshots() {
        let registry = CameraRegistry::new();
        let first: Vec<_> = (0..8)
            .map(|i| entry(&format!("camera_{i}"), &format!("/dev/a{i}")))
            .collect();
        let second: Vec<_> = (0..8)
            .map(|i| entry(&format!("camera_{i}"), &format!("/dev/b{i}")))
            .collect();
        publish_all(&registry, &first);

        let writer = {
            let registry = registry.clone();
            thread::spawn(move || {
                for round in 0..500 {
                    if round % 2 == 0 {
                        publish_all(&registry, &second);
                    } else {
                        publish_all(&registry, &first);
                    }
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        let snapshot = registry.snapshot();
                        assert_eq!(snapshot.len(), 8);
                        let prefixes: std::collections::HashSet<&str> = snapshot
                            .entries
                            .values()
                            .map(|e| &e.device_path[..6])
                            .collect();
                        assert_eq!(prefixes.len(), 1, "mixed snapshot: {snapshot:?}");
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(registry.snapshot().generation, 501);
    }
}
