//! The incoming event shape accepted by `Actor::send` and the transition
//! engine, distinct from the persisted `EventRecord`.

use hsm_core::EventSource;
use serde_json::Value as Json;

/// An event dispatched to a running machine: `{type, payload?, source?,
/// isTransactional?}` with `source` defaulting to `External` and
/// `isTransactional` defaulting to `true`.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_type: String,
    pub payload: Option<Json>,
    pub source: EventSource,
    pub is_transactional: bool,
}

impl Event {
    /// Build an externally dispatched, transactional event.
    pub fn external(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            payload: None,
            source: EventSource::External,
            is_transactional: true,
        }
    }

    pub fn with_payload(mut self, payload: Json) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn non_transactional(mut self) -> Self {
        self.is_transactional = false;
        self
    }

    pub fn with_payload_opt(mut self, payload: Option<Json>) -> Self {
        self.payload = payload;
        self
    }

    pub(crate) fn internal(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            payload: None,
            source: EventSource::Internal,
            is_transactional: true,
        }
    }
}

pub const ALWAYS_EVENT: &str = hsm_dsl::ALWAYS_EVENT;
pub const ALWAYS_TRAVERSAL_CAP: u32 = 64;
