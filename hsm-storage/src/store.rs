//! Persistence trait for archived machine instances, plus an in-memory
//! reference implementation.

use crate::archive::ArchiveEntry;
use async_trait::async_trait;
use hsm_core::{ArchiveConflict, HsmResult, RootEventId};
use std::collections::HashMap;
use std::sync::RwLock;

/// Durable storage for `ArchiveEntry` rows, keyed uniquely by
/// `root_event_id`. A real backend (e.g. a database) implements this trait;
/// `InMemoryMachineStore` is the reference implementation used by tests and
/// as a default before one is wired in.
#[async_trait]
pub trait MachineStore: Send + Sync {
    /// Insert a new archive row. Fails with `ArchiveConflict` if
    /// `root_event_id` is already archived.
    async fn archive(&self, entry: ArchiveEntry) -> HsmResult<()>;

    /// Fetch an archive row by its machine instance id.
    async fn load(&self, root_event_id: RootEventId) -> HsmResult<Option<ArchiveEntry>>;

    /// Remove an archive row, returning whether one was present.
    async fn delete(&self, root_event_id: RootEventId) -> HsmResult<bool>;

    /// List all archive rows for a machine definition, most recent first.
    async fn list_by_machine(&self, machine_id: &str) -> HsmResult<Vec<ArchiveEntry>>;
}

/// `RwLock<HashMap<...>>`-backed `MachineStore`. Not persistent across
/// process restarts.
#[derive(Default)]
pub struct InMemoryMachineStore {
    entries: RwLock<HashMap<RootEventId, ArchiveEntry>>,
}

impl InMemoryMachineStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MachineStore for InMemoryMachineStore {
    async fn archive(&self, entry: ArchiveEntry) -> HsmResult<()> {
        let mut entries = self.entries.write().expect("machine store lock poisoned");
        if entries.contains_key(&entry.root_event_id) {
            return Err(ArchiveConflict(entry.root_event_id).into());
        }
        entries.insert(entry.root_event_id, entry);
        Ok(())
    }

    async fn load(&self, root_event_id: RootEventId) -> HsmResult<Option<ArchiveEntry>> {
        Ok(self.entries.read().expect("machine store lock poisoned").get(&root_event_id).cloned())
    }

    async fn delete(&self, root_event_id: RootEventId) -> HsmResult<bool> {
        Ok(self.entries.write().expect("machine store lock poisoned").remove(&root_event_id).is_some())
    }

    async fn list_by_machine(&self, machine_id: &str) -> HsmResult<Vec<ArchiveEntry>> {
        let mut matches: Vec<ArchiveEntry> = self
            .entries
            .read()
            .expect("machine store lock poisoned")
            .values()
            .filter(|e| e.machine_id == machine_id)
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsm_core::EntityIdType;

    fn entry(root: RootEventId, machine_id: &str) -> ArchiveEntry {
        ArchiveEntry {
            root_event_id: root,
            machine_id: machine_id.to_string(),
            events_data: vec![1, 2, 3],
            event_count: 1,
            original_size: 10,
            compressed_size: 3,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn archive_then_load_round_trips() {
        let store = InMemoryMachineStore::new();
        let root = RootEventId::now_v7();
        store.archive(entry(root, "traffic_light")).await.unwrap();

        let loaded = store.load(root).await.unwrap();
        assert_eq!(loaded.unwrap().machine_id, "traffic_light");
    }

    #[tokio::test]
    async fn duplicate_archive_is_rejected() {
        let store = InMemoryMachineStore::new();
        let root = RootEventId::now_v7();
        store.archive(entry(root, "traffic_light")).await.unwrap();
        assert!(store.archive(entry(root, "traffic_light")).await.is_err());
    }

    #[tokio::test]
    async fn delete_reports_whether_a_row_existed() {
        let store = InMemoryMachineStore::new();
        let root = RootEventId::now_v7();
        assert!(!store.delete(root).await.unwrap());
        store.archive(entry(root, "traffic_light")).await.unwrap();
        assert!(store.delete(root).await.unwrap());
        assert!(store.load(root).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_by_machine_filters_and_orders_recent_first() {
        let store = InMemoryMachineStore::new();
        let a = RootEventId::now_v7();
        let b = RootEventId::now_v7();
        let other = RootEventId::now_v7();
        store.archive(entry(a, "traffic_light")).await.unwrap();
        store.archive(entry(b, "traffic_light")).await.unwrap();
        store.archive(entry(other, "counter")).await.unwrap();

        let listed = store.list_by_machine("traffic_light").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|e| e.machine_id == "traffic_light"));
    }
}
