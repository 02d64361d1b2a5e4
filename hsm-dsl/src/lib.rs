//! Machine definition builder and validator.
//!
//! Raw, `serde`-deserializable configuration ([`config`]) is loaded from
//! JSON or YAML and built into a validated, arena-indexed
//! [`MachineDefinition`] ([`definition`]).

pub mod config;
pub mod definition;

pub use config::{
    from_json, from_yaml, BehaviorRefs, BranchConfig, CompressionConfig, MachineConfig, StateConfig,
    TransitionConfig,
};
pub use definition::{Branch, MachineDefinition, StateDefinition, TransitionDefinition, ALWAYS_EVENT};
pub use hsm_core::{AmbiguousState, ConfigError};
