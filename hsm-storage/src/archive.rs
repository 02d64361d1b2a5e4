//! Snapshot an entire machine instance's event sequence into one compressed
//! blob, keyed by `root_event_id`, and restore it field-exact.

use crate::compression::CompressionCodec;
use chrono::{DateTime, Utc};
use hsm_core::{EventRecord, HsmResult, InvalidData, RootEventId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One archived machine instance: `root_event_id` is unique across the
/// store, `events_data` is the compressed JSON array of its event sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub root_event_id: RootEventId,
    pub machine_id: String,
    pub events_data: Vec<u8>,
    pub event_count: usize,
    pub original_size: usize,
    pub compressed_size: usize,
    pub created_at: DateTime<Utc>,
}

/// Builds and restores `ArchiveEntry`s. Holds no state of its own beyond the
/// codec; uniqueness of `root_event_id` is a `MachineStore` concern, not
/// this type's.
#[derive(Debug, Clone)]
pub struct Archiver {
    codec: CompressionCodec,
}

impl Archiver {
    pub fn new(codec: CompressionCodec) -> Self {
        Self { codec }
    }

    /// Archive a single machine instance's events. All records must share
    /// one `root_event_id`; they are sorted by `sequence_number` before
    /// serialization regardless of input order.
    pub fn archive_one(&self, mut events: Vec<EventRecord>) -> HsmResult<ArchiveEntry> {
        events.sort_by_key(|e| e.sequence_number);
        let root_event_id = events.first().map(|e| e.root_event_id).unwrap_or_else(RootEventId::nil);
        let machine_id = events.first().map(|e| e.machine_id.clone()).unwrap_or_default();

        let serialized = serde_json::to_vec(&events).expect("EventRecord always serializes");
        let original_size = serialized.len();
        let compressed = self.codec.encode(&serialized);

        Ok(ArchiveEntry {
            root_event_id,
            machine_id,
            compressed_size: compressed.len(),
            events_data: compressed,
            event_count: events.len(),
            original_size,
            created_at: Utc::now(),
        })
    }

    /// Archive a mixed batch of events spanning multiple machine instances,
    /// grouping by `root_event_id` and archiving each group independently.
    /// Group order follows first appearance in `events`.
    pub fn archive(&self, events: Vec<EventRecord>) -> HsmResult<Vec<ArchiveEntry>> {
        let mut groups: BTreeMap<RootEventId, Vec<EventRecord>> = BTreeMap::new();
        let mut order = Vec::new();
        for event in events {
            let root = event.root_event_id;
            if !groups.contains_key(&root) {
                order.push(root);
            }
            groups.entry(root).or_default().push(event);
        }

        order
            .into_iter()
            .map(|root| self.archive_one(groups.remove(&root).expect("root was just inserted")))
            .collect()
    }

    /// Restore a machine instance's events from an archive entry,
    /// field-exact with what was originally archived.
    pub fn restore(&self, entry: &ArchiveEntry) -> HsmResult<Vec<EventRecord>> {
        let raw = self.codec.decode(&entry.events_data)?;
        serde_json::from_slice(&raw).map_err(|e| InvalidData::Json { reason: e.to_string() }.into())
    }
}
