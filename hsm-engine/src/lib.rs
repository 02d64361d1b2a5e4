//! Behavior registry, transition engine, and actor runtime for the
//! hierarchical state-machine engine.
//!
//! [`hsm_dsl`] parses and validates a [`hsm_dsl::MachineDefinition`]; this
//! crate runs one. [`behavior`] resolves named guards/actions/calculators,
//! [`transition`] is the dispatch/LCCA/`@always` engine that drives one
//! step, and [`actor`] wraps both with single-writer locking and
//! event-sourced persistence via an [`hsm_events::EventLog`].

mod actor;
mod behavior;
mod event;
mod transition;

pub use actor::Actor;
pub use behavior::{ActionFn, BehaviorCtx, BehaviorRef, BehaviorRegistry, CalculatorFn, GuardFn, ResultFn};
pub use event::{Event, ALWAYS_EVENT, ALWAYS_TRAVERSAL_CAP};
pub use transition::{RuntimeState, StepReport, TransitionEngine};

pub use hsm_context::{ContextManager, ContextSchema, Delta, FieldSchema, FieldType};
pub use hsm_core::{EventRecord, EventSource, HsmError, HsmResult, MachineId, RootEventId};
pub use hsm_dsl::MachineDefinition;
pub use hsm_events::{EventLog, EventLogExt, InMemoryEventLog};
