//! Error taxonomy for the state-machine engine.

use crate::EventId;
use thiserror::Error;

/// Errors raised while building or resolving a `MachineDefinition`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown top-level key '{0}' in machine definition")]
    UnknownKey(String),

    #[error("unknown key '{key}' in transition for event '{event}'")]
    UnknownTransitionKey { event: String, key: String },

    #[error("transitions including @always must be defined under `on`")]
    TransitionsOutsideOn,

    #[error("`on` must be a mapping of event name to transition, at state '{state}'")]
    OnNotAMapping { state: String },

    #[error(
        "transition for event '{event}' at state '{state}' must be a string target or a \
         mapping with keys {{target, guards, actions, description, calculators}}"
    )]
    InvalidTransitionValue { state: String, event: String },

    #[error("final state '{state}' may not declare children")]
    FinalStateHasChildren { state: String },

    #[error("final state '{state}' may not declare outgoing transitions")]
    FinalStateHasTransitions { state: String },

    #[error("parallel state '{state}' must declare at least one region")]
    ParallelStateEmpty { state: String },

    #[error("parallel state '{state}' must not declare `initial`")]
    ParallelStateHasInitial { state: String },

    #[error("region '{region}' of parallel state '{state}' must be compound")]
    ParallelRegionNotCompound { state: String, region: String },

    #[error("compound state '{state}' must declare `initial`")]
    CompoundStateMissingInitial { state: String },

    #[error("state '{state}' declares `initial` = '{initial}', which is not one of its children")]
    InitialNotAChild { state: String, initial: String },

    #[error("transition target '{target}' (event '{event}' at state '{state}') does not resolve to any state")]
    UnresolvedTarget {
        state: String,
        event: String,
        target: String,
    },

    #[error("duplicate child key '{key}' under state '{state}'")]
    DuplicateChildKey { state: String, key: String },

    #[error("invalid version: {0} (must become 1 when non-positive, and this value could not be normalized)")]
    InvalidVersion(i64),

    #[error("invalid state type '{0}': must be one of atomic, compound, parallel, final")]
    InvalidStateType(String),

    #[error("failed to parse machine definition: {0}")]
    Deserialize(String),
}

/// Raised when `resolveStateByString` matches more than one state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("state id '{query}' is ambiguous: matches {matches:?}")]
pub struct AmbiguousState {
    pub query: String,
    pub matches: Vec<String>,
}

/// Errors raised by `ContextManager`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("required field missing: {path}")]
    RequiredFieldMissing { path: String },

    #[error("field '{path}' failed validation: {reason}")]
    InvalidValue { path: String, reason: String },

    #[error("path '{path}' does not resolve to a value")]
    PathNotFound { path: String },

    #[error("path '{path}' cannot be navigated: {reason}")]
    InvalidPath { path: String, reason: String },
}

/// A behavior's declared required context was not satisfied.
///
/// Carries the first offending path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("missing context: {0}")]
pub struct MissingContext(pub String);

/// Raised when a guard fails and carries an explicit diagnostic message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("guard '{guard}' rejected the transition: {message}")]
pub struct ValidationGuardError {
    pub guard: String,
    pub message: String,
}

/// Raised when an event's payload fails its declared schema.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("event '{event_type}' failed validation: {reason}")]
pub struct EventValidationError {
    pub event_type: String,
    pub reason: String,
}

/// Errors raised by `BehaviorRegistry` lookups.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("behavior not found: {kind}.{name}")]
pub struct BehaviorNotFound {
    pub kind: String,
    pub name: String,
}

/// Raised when the transition engine cannot find a handler for an event.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("no transition definition for event '{event_type}' from state '{from_state}'")]
pub struct NoTransitionDefinition {
    pub from_state: String,
    pub event_type: String,
}

/// Raised when a transition target cannot be resolved to a state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("no state definition for target '{target}'")]
pub struct NoStateDefinition {
    pub target: String,
}

/// Raised when the single-writer lock for a machine instance is held elsewhere.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("machine {root_event_id} already running: lock held until {held_until}")]
pub struct MachineAlreadyRunning {
    pub root_event_id: EventId,
    pub held_until: crate::Timestamp,
}

/// Raised when a stored blob cannot be decoded (corruption, truncation, bad JSON).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvalidData {
    #[error("compressed blob did not inflate to valid data: {reason}")]
    Decompression { reason: String },

    #[error("decoded bytes are not valid JSON: {reason}")]
    Json { reason: String },
}

/// Raised when an archive attempt targets a `root_event_id` that is already archived.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("an archive already exists for root_event_id {0}")]
pub struct ArchiveConflict(pub EventId);

/// Raised when an `EventLog` append would break `sequence_number` monotonicity.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("out-of-order append for root_event_id {root_event_id}: expected sequence_number {expected}, got {got}")]
pub struct SequenceOutOfOrder {
    pub root_event_id: EventId,
    pub expected: u64,
    pub got: u64,
}

/// Master error type for the engine.
#[derive(Debug, Clone, Error)]
pub enum HsmError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    AmbiguousState(#[from] AmbiguousState),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    MissingContext(#[from] MissingContext),

    #[error(transparent)]
    ValidationGuard(#[from] ValidationGuardError),

    #[error(transparent)]
    EventValidation(#[from] EventValidationError),

    #[error(transparent)]
    BehaviorNotFound(#[from] BehaviorNotFound),

    #[error(transparent)]
    NoTransitionDefinition(#[from] NoTransitionDefinition),

    #[error(transparent)]
    NoStateDefinition(#[from] NoStateDefinition),

    #[error(transparent)]
    MachineAlreadyRunning(#[from] MachineAlreadyRunning),

    #[error(transparent)]
    InvalidData(#[from] InvalidData),

    #[error(transparent)]
    ArchiveConflict(#[from] ArchiveConflict),

    #[error(transparent)]
    SequenceOutOfOrder(#[from] SequenceOutOfOrder),

    #[error("behavior invocation failed: {0}")]
    BehaviorFailed(String),
}

/// Result alias used throughout the engine.
pub type HsmResult<T> = Result<T, HsmError>;
