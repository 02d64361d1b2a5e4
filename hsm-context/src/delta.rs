//! Incremental context deltas: only the dot-paths touched since the last
//! commit, persisted in an `EventRecord`'s `context` field.

use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::BTreeMap;

/// Reserved wire marker for a removed path. JSON has no native "absent"
/// value distinct from `null`, so a removal and a write of `Json::Null`
/// would otherwise collapse to the same thing on a serialize/deserialize
/// round-trip — this sentinel keeps them apart.
const REMOVED_MARKER_KEY: &str = "$removed";

fn removed_marker() -> Json {
    let mut obj = serde_json::Map::new();
    obj.insert(REMOVED_MARKER_KEY.to_string(), Json::Bool(true));
    Json::Object(obj)
}

fn is_removed_marker(value: &Json) -> bool {
    matches!(value, Json::Object(obj) if obj.len() == 1 && obj.get(REMOVED_MARKER_KEY) == Some(&Json::Bool(true)))
}

/// A set of dot-path writes (`Some(value)`) and removals (`None`),
/// serialized as a flat map so a stored `EventRecord` need not carry the
/// whole context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delta(BTreeMap<String, Option<Json>>);

impl Delta {
    pub fn insert(&mut self, path: String, value: Json) {
        self.0.insert(path, Some(value));
    }

    pub fn insert_removed(&mut self, path: String) {
        self.0.insert(path, None);
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &Option<Json>)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl Serialize for Delta {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (path, value) in &self.0 {
            match value {
                Some(v) => map.serialize_entry(path, v)?,
                None => map.serialize_entry(path, &removed_marker())?,
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Delta {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: BTreeMap<String, Json> = BTreeMap::deserialize(deserializer)?;
        let mut out = BTreeMap::new();
        for (path, value) in raw {
            if is_removed_marker(&value) {
                out.insert(path, None);
            } else {
                out.insert(path, Some(value));
            }
        }
        Ok(Delta(out))
    }
}
