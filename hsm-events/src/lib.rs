//! Event log trait and operations for the state-machine engine.
//!
//! This crate defines the `EventLog` trait for persistent event storage and
//! traversal, plus `InMemoryEventLog`, the reference implementation used by
//! tests and by `Actor` when no durable backend is configured.
//!
//! Events for a given machine instance (identified by `root_event_id`) flow
//! forward only, strictly ordered by `sequence_number`.

mod dag;
mod in_memory;

pub use dag::{EventLog, EventLogExt};
pub use in_memory::InMemoryEventLog;

pub use hsm_core::{EventId, EventRecord, EventSource, RootEventId};
