//! Small enum types shared across the state-machine engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The shape of a state node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateType {
    /// Leaf state with no children.
    Atomic,
    /// Has children and an `initial_child`.
    Compound,
    /// Every child region is active simultaneously.
    Parallel,
    /// Terminal: no children, no outgoing transitions.
    Final,
}

impl StateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateType::Atomic => "atomic",
            StateType::Compound => "compound",
            StateType::Parallel => "parallel",
            StateType::Final => "final",
        }
    }

    pub fn is_leaf_capable(&self) -> bool {
        matches!(self, StateType::Atomic | StateType::Final)
    }
}

impl fmt::Display for StateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StateType {
    type Err = StateTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "atomic" => Ok(StateType::Atomic),
            "compound" => Ok(StateType::Compound),
            "parallel" => Ok(StateType::Parallel),
            "final" => Ok(StateType::Final),
            other => Err(StateTypeParseError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTypeParseError(pub String);

impl fmt::Display for StateTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid state type: {}", self.0)
    }
}

impl std::error::Error for StateTypeParseError {}

/// Origin of an `EventRecord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventSource {
    /// Dispatched by a caller through `Actor::send`.
    External,
    /// Produced internally: machine lifecycle markers, trace entries, raised events.
    Internal,
}

impl Default for EventSource {
    fn default() -> Self {
        EventSource::External
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventSource::External => write!(f, "EXTERNAL"),
            EventSource::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// The four kinds of named behavior a `BehaviorRegistry` resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BehaviorKind {
    Action,
    Guard,
    Calculator,
    Result,
}

impl BehaviorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BehaviorKind::Action => "action",
            BehaviorKind::Guard => "guard",
            BehaviorKind::Calculator => "calculator",
            BehaviorKind::Result => "result",
        }
    }
}

impl fmt::Display for BehaviorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
