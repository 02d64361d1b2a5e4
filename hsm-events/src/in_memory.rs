//! Reference `EventLog` implementation backed by an in-process `RwLock`.

use crate::dag::EventLog;
use hsm_core::{EventId, EventRecord, HsmResult, RootEventId};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
struct Shard {
    /// Records for one root, kept sorted by `sequence_number`.
    records: Vec<EventRecord>,
}

/// An in-memory `EventLog`. Not persistent across process restarts; intended
/// for tests and as the default backend before a durable store is wired in.
#[derive(Default)]
pub struct InMemoryEventLog {
    by_root: RwLock<HashMap<RootEventId, Shard>>,
    by_id: RwLock<HashMap<EventId, (RootEventId, usize)>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventLog for InMemoryEventLog {
    fn append(&self, record: EventRecord) -> HsmResult<()> {
        let mut by_root = self.by_root.write().expect("event log lock poisoned");
        let shard = by_root.entry(record.root_event_id).or_default();

        let expected = shard.records.len() as u64 + 1;
        if record.sequence_number != expected {
            tracing::warn!(
                root_event_id = %record.root_event_id,
                expected,
                got = record.sequence_number,
                "out-of-order event append rejected"
            );
            return Err(hsm_core::SequenceOutOfOrder {
                root_event_id: record.root_event_id,
                expected,
                got: record.sequence_number,
            }
            .into());
        }

        let index = shard.records.len();
        let id = record.id;
        let root = record.root_event_id;
        shard.records.push(record);
        drop(by_root);

        self.by_id
            .write()
            .expect("event log id-index lock poisoned")
            .insert(id, (root, index));
        Ok(())
    }

    fn get(&self, id: EventId) -> Option<EventRecord> {
        let by_id = self.by_id.read().expect("event log id-index lock poisoned");
        let (root, index) = *by_id.get(&id)?;
        drop(by_id);
        let by_root = self.by_root.read().expect("event log lock poisoned");
        by_root.get(&root)?.records.get(index).cloned()
    }

    fn by_root(&self, root_event_id: RootEventId) -> Vec<EventRecord> {
        self.by_root
            .read()
            .expect("event log lock poisoned")
            .get(&root_event_id)
            .map(|shard| shard.records.clone())
            .unwrap_or_default()
    }

    fn next_sequence_number(&self, root_event_id: RootEventId) -> u64 {
        self.by_root
            .read()
            .expect("event log lock poisoned")
            .get(&root_event_id)
            .map(|shard| shard.records.len() as u64 + 1)
            .unwrap_or(1)
    }

    fn root_count(&self) -> usize {
        self.by_root.read().expect("event log lock poisoned").len()
    }

    fn delete_root(&self, root_event_id: RootEventId) -> Vec<EventRecord> {
        let removed = self
            .by_root
            .write()
            .expect("event log lock poisoned")
            .remove(&root_event_id)
            .map(|shard| shard.records)
            .unwrap_or_default();

        if !removed.is_empty() {
            let mut by_id = self.by_id.write().expect("event log id-index lock poisoned");
            for record in &removed {
                by_id.remove(&record.id);
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsm_core::{EntityIdType, EventSource};

    fn root_record(root: EventId) -> EventRecord {
        EventRecord::root(root, "traffic_light", 1, "traffic_light.start", vec![], None, None)
    }

    #[test]
    fn append_and_fetch_by_root() {
        let log = InMemoryEventLog::new();
        let root = EventId::now_v7();
        log.append(root_record(root)).unwrap();
        log.append(EventRecord::next(
            root,
            2,
            "traffic_light",
            1,
            EventSource::External,
            "NEXT",
            vec!["traffic_light.yellow".into()],
            None,
            None,
        ))
        .unwrap();

        let records = log.by_root(root);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sequence_number, 1);
        assert_eq!(records[1].sequence_number, 2);
    }

    #[test]
    fn rejects_out_of_order_sequence() {
        let log = InMemoryEventLog::new();
        let root = EventId::now_v7();
        log.append(root_record(root)).unwrap();
        let bad = EventRecord::next(
            root,
            5,
            "traffic_light",
            1,
            EventSource::External,
            "NEXT",
            vec![],
            None,
            None,
        );
        assert!(log.append(bad).is_err());
    }

    #[test]
    fn delete_root_removes_from_both_indices() {
        let log = InMemoryEventLog::new();
        let root = EventId::now_v7();
        let rec = root_record(root);
        let id = rec.id;
        log.append(rec).unwrap();

        let removed = log.delete_root(root);
        assert_eq!(removed.len(), 1);
        assert!(log.get(id).is_none());
        assert_eq!(log.root_count(), 0);
    }

    #[test]
    fn next_sequence_number_starts_at_one() {
        let log = InMemoryEventLog::new();
        assert_eq!(log.next_sequence_number(EventId::now_v7()), 1);
    }
}
