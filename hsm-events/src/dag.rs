//! `EventLog` trait: the contract for append-only, sequence-ordered storage
//! of `EventRecord`s.
//!
//! Events for one machine instance flow forward only: appended in
//! `sequence_number` order, never mutated, never reordered. The trait is
//! storage-agnostic; `InMemoryEventLog` is the reference implementation used
//! by tests and by `Actor` when no other backend is configured.

use hsm_core::{EventId, EventRecord, EventSource, HsmResult, RootEventId};

/// Storage and lookup contract for a machine's event history.
pub trait EventLog: Send + Sync {
    /// Append a record. The caller is responsible for having assigned a
    /// `sequence_number` one greater than the log's current length for this
    /// `root_event_id`; implementations MUST reject out-of-order appends.
    fn append(&self, record: EventRecord) -> HsmResult<()>;

    /// Fetch a single record by id.
    fn get(&self, id: EventId) -> Option<EventRecord>;

    /// All records for a machine instance, in ascending `sequence_number`
    /// order.
    fn by_root(&self, root_event_id: RootEventId) -> Vec<EventRecord>;

    /// The next `sequence_number` to use for a new record under this root
    /// (1 if the root has no records yet).
    fn next_sequence_number(&self, root_event_id: RootEventId) -> u64;

    /// Total number of distinct machine instances (roots) tracked.
    fn root_count(&self) -> usize;

    /// Remove all records for a root (used after a successful archive).
    fn delete_root(&self, root_event_id: RootEventId) -> Vec<EventRecord>;
}

/// Convenience methods layered over any `EventLog`, following the
/// extension-trait-over-a-core-trait pattern.
pub trait EventLogExt: EventLog {
    /// Records for a root with `source == EXTERNAL` only, in order.
    fn external_events(&self, root_event_id: RootEventId) -> Vec<EventRecord> {
        self.by_root(root_event_id)
            .into_iter()
            .filter(|e| e.source == EventSource::External)
            .collect()
    }

    /// The most recently appended record for a root, if any.
    fn latest(&self, root_event_id: RootEventId) -> Option<EventRecord> {
        self.by_root(root_event_id).into_iter().last()
    }

    /// Whether any records exist for this root.
    fn has_root(&self, root_event_id: RootEventId) -> bool {
        self.next_sequence_number(root_event_id) > 1
    }
}

impl<T: EventLog + ?Sized> EventLogExt for T {}
