//! Raw, `serde`-deserializable shape of a machine definition.
//!
//! `MachineConfig` mirrors the authoritative configuration schema table
//! exactly. It performs no validation of its own — `MachineDefinition::define`
//! (in `definition.rs`) is the sole validator, so a config loaded from JSON
//! and one built programmatically behave identically.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Top-level machine definition as written by a user.
///
/// `deny_unknown_fields` is how unknown top-level keys are rejected: the
/// struct's field set *is* the allowed-keys list, so the check lives at
/// the type boundary instead of a separate manual scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MachineConfig {
    pub id: String,
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub initial: Option<String>,
    #[serde(default)]
    pub context: Option<Json>,
    #[serde(default)]
    pub states: IndexMap<String, StateConfig>,
    /// Raw, unvalidated `on` value. Kept as `Json` rather than
    /// `IndexMap<String, TransitionConfig>` so a malformed shape (not an
    /// object at all) can be rejected by `MachineDefinition::define` with
    /// the enclosing state's id attached, instead of a bare serde error.
    #[serde(default = "default_on")]
    pub on: Json,
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub meta: Option<Json>,
    #[serde(default)]
    pub entry: Option<BehaviorRefs>,
    #[serde(default)]
    pub exit: Option<BehaviorRefs>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub scenarios_enabled: bool,
    #[serde(default = "default_true")]
    pub should_persist: bool,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default)]
    pub compression: CompressionConfig,
}

fn default_true() -> bool {
    true
}

fn default_delimiter() -> String {
    ".".to_string()
}

fn default_on() -> Json {
    Json::Object(serde_json::Map::new())
}

/// A nested state node as written by a user. Structurally identical to
/// `MachineConfig` minus the machine-wide `id`/`version`/`delimiter`/
/// `compression` fields, which only make sense at the root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateConfig {
    #[serde(default)]
    pub initial: Option<String>,
    #[serde(default)]
    pub context: Option<Json>,
    #[serde(default)]
    pub states: IndexMap<String, StateConfig>,
    #[serde(default = "default_on")]
    pub on: Json,
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub meta: Option<Json>,
    #[serde(default)]
    pub entry: Option<BehaviorRefs>,
    #[serde(default)]
    pub exit: Option<BehaviorRefs>,
    #[serde(default)]
    pub description: Option<String>,
}

/// One or more behavior references (`name` or `name:arg1,arg2`), always
/// normalized to an ordered list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BehaviorRefs {
    One(String),
    Many(Vec<String>),
}

impl BehaviorRefs {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            BehaviorRefs::One(s) => vec![s],
            BehaviorRefs::Many(v) => v,
        }
    }
}

/// A transition as written: either a bare target string (or `null` for a
/// forbidden transition), a single branch object, or (an extension beyond
/// the single-branch case) an ordered array of branch objects.
///
/// A value that matches none of these shapes parses to `Invalid` rather
/// than failing deserialization outright — `MachineDefinition::define` is
/// the one that raises `InvalidTransitionValue`, since it (unlike this
/// type) knows which state and event the bad value belongs to.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TransitionConfig {
    Target(Option<String>),
    Branch(BranchConfig),
    Branches(Vec<BranchConfig>),
    Invalid(Json),
}

impl TransitionConfig {
    pub(crate) fn from_json_value(value: Json) -> Self {
        match value {
            Json::Null => TransitionConfig::Target(None),
            Json::String(s) => TransitionConfig::Target(Some(s)),
            Json::Array(_) => match serde_json::from_value::<Vec<BranchConfig>>(value.clone()) {
                Ok(branches) => TransitionConfig::Branches(branches),
                Err(_) => TransitionConfig::Invalid(value),
            },
            Json::Object(_) => match serde_json::from_value::<BranchConfig>(value.clone()) {
                Ok(branch) => TransitionConfig::Branch(branch),
                Err(_) => TransitionConfig::Invalid(value),
            },
            other => TransitionConfig::Invalid(other),
        }
    }
}

impl<'de> Deserialize<'de> for TransitionConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Json::deserialize(deserializer)?;
        Ok(TransitionConfig::from_json_value(value))
    }
}

/// One alternative of a transition. `extra` catches keys outside this set
/// (via `flatten`, since `deny_unknown_fields` cannot combine with it) so
/// `MachineDefinition::define` can reject them as `UnknownTransitionKey`
/// with the event name attached, rather than here where it isn't known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchConfig {
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub guards: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub calculators: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Json>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default = "default_fields")]
    pub fields: Vec<String>,
    #[serde(default = "default_threshold")]
    pub threshold: usize,
}

fn default_level() -> u32 {
    6
}

fn default_fields() -> Vec<String> {
    vec!["payload".into(), "context".into(), "meta".into()]
}

fn default_threshold() -> usize {
    100
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: default_level(),
            fields: default_fields(),
            threshold: default_threshold(),
        }
    }
}

/// Parse a `MachineConfig` from JSON text.
pub fn from_json(text: &str) -> Result<MachineConfig, hsm_core::ConfigError> {
    serde_json::from_str(text).map_err(|e| to_config_error(&e.to_string()))
}

/// Parse a `MachineConfig` from YAML text.
pub fn from_yaml(text: &str) -> Result<MachineConfig, hsm_core::ConfigError> {
    serde_yaml::from_str(text).map_err(|e| to_config_error(&e.to_string()))
}

fn to_config_error(message: &str) -> hsm_core::ConfigError {
    if let Some(field) = message
        .split("unknown field `")
        .nth(1)
        .and_then(|rest| rest.split('`').next())
    {
        if field == crate::definition::ALWAYS_EVENT {
            return hsm_core::ConfigError::TransitionsOutsideOn;
        }
        hsm_core::ConfigError::UnknownKey(field.to_string())
    } else {
        hsm_core::ConfigError::Deserialize(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_target_parses_as_transition_config() {
        let cfg: TransitionConfig = serde_json::from_str("\"yellow\"").unwrap();
        assert!(matches!(cfg, TransitionConfig::Target(Some(t)) if t == "yellow"));
    }

    #[test]
    fn null_target_parses_as_forbidden() {
        let cfg: TransitionConfig = serde_json::from_str("null").unwrap();
        assert!(matches!(cfg, TransitionConfig::Target(None)));
    }

    #[test]
    fn single_branch_object_parses() {
        let cfg: TransitionConfig =
            serde_json::from_str(r#"{"target":"b","guards":["isEven"]}"#).unwrap();
        assert!(matches!(cfg, TransitionConfig::Branch(_)));
    }

    #[test]
    fn behavior_refs_normalize_to_vec() {
        let one: BehaviorRefs = serde_json::from_str("\"log\"").unwrap();
        assert_eq!(one.into_vec(), vec!["log".to_string()]);

        let many: BehaviorRefs = serde_json::from_str(r#"["log","notify"]"#).unwrap();
        assert_eq!(many.into_vec(), vec!["log".to_string(), "notify".to_string()]);
    }

    #[test]
    fn default_compression_matches_documented_defaults() {
        let cfg = CompressionConfig::default();
        assert!(!cfg.enabled);
        assert_eq!(cfg.level, 6);
        assert_eq!(cfg.threshold, 100);
        assert_eq!(cfg.fields, vec!["payload", "context", "meta"]);
    }

    #[test]
    fn unknown_top_level_key_is_rejected() {
        let err = from_json(r#"{"id":"m","bogus_key":1}"#).unwrap_err();
        assert!(matches!(err, hsm_core::ConfigError::UnknownKey(ref k) if k == "bogus_key"));
    }

    #[test]
    fn always_event_outside_on_is_rejected() {
        let err =
            from_json(r#"{"id":"m","initial":"a","states":{"a":{"@always":"b"},"b":{}}}"#)
                .unwrap_err();
        assert!(matches!(err, hsm_core::ConfigError::TransitionsOutsideOn));
    }

    #[test]
    fn non_mapping_transition_value_parses_as_invalid() {
        let cfg = TransitionConfig::from_json_value(serde_json::json!(42));
        assert!(matches!(cfg, TransitionConfig::Invalid(_)));
    }

    #[test]
    fn unknown_branch_key_is_captured_in_extra() {
        let cfg: TransitionConfig = serde_json::from_str(r#"{"target":"b","bogus":1}"#).unwrap();
        let TransitionConfig::Branch(b) = cfg else { panic!("expected branch") };
        assert!(b.extra.contains_key("bogus"));
    }

    #[test]
    fn full_machine_config_round_trips_through_json() {
        let json = r#"{
            "id": "traffic_light",
            "initial": "green",
            "states": {
                "green": {"on": {"NEXT": "yellow"}},
                "yellow": {"on": {"NEXT": "red"}},
                "red": {}
            }
        }"#;
        let cfg = from_json(json).unwrap();
        assert_eq!(cfg.id, "traffic_light");
        assert_eq!(cfg.initial.as_deref(), Some("green"));
        assert_eq!(cfg.states.len(), 3);
    }
}
