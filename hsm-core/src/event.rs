//! `EventRecord`: the immutable, append-only unit of the event log.

use crate::{EntityIdType, EventId, EventSource, RootEventId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// An immutable, sequenced event entry.
///
/// `EventRecord`s are never mutated after creation. Ordering is defined by
/// `sequence_number`, and `id` (a UUIDv7) is guaranteed to sort identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Lexicographically sortable unique identifier; defines total order.
    pub id: EventId,
    /// Monotonic integer, strictly increasing within a machine instance.
    pub sequence_number: u64,
    /// Wall-clock creation time.
    pub created_at: Timestamp,
    /// Identifier of the machine *definition* this event belongs to.
    pub machine_id: String,
    /// Identity of the machine *instance*: the `id` of its first event.
    pub root_event_id: RootEventId,
    /// Schema/config version of the definition that produced this event.
    pub version: u32,
    /// Whether this event was dispatched externally or raised internally.
    pub source: EventSource,
    /// Event type string, e.g. `ORDER_SUBMITTED` or `<machine>.state.<key>.enter`.
    pub event_type: String,
    /// Snapshot of `active_leaves` at record time.
    pub machine_value: Vec<String>,
    /// Event payload, if any.
    pub payload: Option<Json>,
    /// Context *delta* (not the full context) written during this event.
    pub context: Option<Json>,
    /// Opaque metadata.
    pub meta: Option<Json>,
}

impl EventRecord {
    /// Build the first (root) event of a new machine instance.
    ///
    /// The caller supplies the id up front so `root_event_id` can reference it.
    #[allow(clippy::too_many_arguments)]
    pub fn root(
        id: EventId,
        machine_id: impl Into<String>,
        version: u32,
        event_type: impl Into<String>,
        machine_value: Vec<String>,
        payload: Option<Json>,
        context: Option<Json>,
    ) -> Self {
        Self {
            id,
            sequence_number: 1,
            created_at: Utc::now(),
            machine_id: machine_id.into(),
            root_event_id: id,
            version,
            source: EventSource::Internal,
            event_type: event_type.into(),
            machine_value,
            payload,
            context,
            meta: None,
        }
    }

    /// Build a follow-up event continuing an existing machine instance.
    #[allow(clippy::too_many_arguments)]
    pub fn next(
        root_event_id: RootEventId,
        sequence_number: u64,
        machine_id: impl Into<String>,
        version: u32,
        source: EventSource,
        event_type: impl Into<String>,
        machine_value: Vec<String>,
        payload: Option<Json>,
        context: Option<Json>,
    ) -> Self {
        Self {
            id: EventId::now_v7(),
            sequence_number,
            created_at: Utc::now(),
            machine_id: machine_id.into(),
            root_event_id,
            version,
            source,
            event_type: event_type.into(),
            machine_value,
            payload,
            context,
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: Json) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn is_root(&self) -> bool {
        self.id == self.root_event_id
    }
}

/// Canonical trace-record type strings emitted by the transition engine.
/// Keeping these in one place keeps the exact wording the engine and its
/// tests agree on in sync.
pub mod trace {
    pub fn machine_start(mid: &str) -> String {
        format!("{mid}.start")
    }

    pub fn state_enter(mid: &str, leaf: &str) -> String {
        format!("{mid}.state.{leaf}.enter")
    }

    pub fn entry_start(mid: &str, leaf: &str) -> String {
        format!("{mid}.state.{leaf}.entry.start")
    }

    pub fn entry_finish(mid: &str, leaf: &str) -> String {
        format!("{mid}.state.{leaf}.entry.finish")
    }

    pub fn exit_start(mid: &str, leaf: &str) -> String {
        format!("{mid}.state.{leaf}.exit.start")
    }

    pub fn exit_finish(mid: &str, leaf: &str) -> String {
        format!("{mid}.state.{leaf}.exit.finish")
    }

    pub fn state_exit(mid: &str, leaf: &str) -> String {
        format!("{mid}.state.{leaf}.exit")
    }

    pub fn transition_start(mid: &str, src: &str, event: &str) -> String {
        format!("{mid}.transition.{src}.{event}.start")
    }

    pub fn transition_finish(mid: &str, src: &str, event: &str) -> String {
        format!("{mid}.transition.{src}.{event}.finish")
    }

    pub fn transition_fail(mid: &str, src: &str, event: &str) -> String {
        format!("{mid}.transition.{src}.{event}.fail")
    }

    pub fn guard_start(mid: &str, name: &str) -> String {
        format!("{mid}.guard.{name}.start")
    }

    pub fn guard_pass(mid: &str, name: &str) -> String {
        format!("{mid}.guard.{name}.pass")
    }

    pub fn guard_fail(mid: &str, name: &str) -> String {
        format!("{mid}.guard.{name}.fail")
    }

    pub fn calculator_fail(mid: &str, name: &str) -> String {
        format!("{mid}.calculator.{name}.fail")
    }

    pub fn action_start(mid: &str, name: &str) -> String {
        format!("{mid}.action.{name}.start")
    }

    pub fn action_finish(mid: &str, name: &str) -> String {
        format!("{mid}.action.{name}.finish")
    }

    pub fn event_raised(mid: &str, action_name: &str, raised_type: &str) -> String {
        format!("{mid}.action.{action_name}.event.{raised_type}.raised")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_event_is_its_own_root() {
        let id = EventId::now_v7();
        let rec = EventRecord::root(id, "traffic_light", 1, "traffic_light.start", vec![], None, None);
        assert!(rec.is_root());
        assert_eq!(rec.sequence_number, 1);
    }

    #[test]
    fn next_event_references_root() {
        let root_id = EventId::now_v7();
        let rec = EventRecord::next(
            root_id,
            2,
            "traffic_light",
            1,
            EventSource::External,
            "NEXT",
            vec!["traffic_light.yellow".into()],
            None,
            None,
        );
        assert!(!rec.is_root());
        assert_eq!(rec.root_event_id, root_id);
    }

    #[test]
    fn trace_strings_match_canonical_grammar() {
        assert_eq!(trace::machine_start("m"), "m.start");
        assert_eq!(trace::state_enter("m", "m.green"), "m.state.m.green.enter");
        assert_eq!(trace::transition_fail("m", "m.a", "EVT"), "m.transition.m.a.EVT.fail");
    }
}
