//! Dot-path context store for the state-machine engine.
//!
//! `ContextManager` wraps a `serde_json::Value` object as a typed,
//! schema-validated key/value bag addressed by dotted paths (`a.b.0.c`),
//! with dirty-set tracking so only the paths touched since the last commit
//! are extracted as a delta for persistence.

mod delta;
mod path;
mod schema;

pub use delta::Delta;
pub use path::{PathError, PathSegment};
pub use schema::{ContextSchema, FieldSchema, FieldType};

use hsm_core::ContextError;
use serde_json::Value as Json;
use std::collections::BTreeSet;
use std::sync::Arc;

/// A pure function computing a derived value from the current context.
/// Computed accessors are never persisted and never appear in a delta.
pub type ComputedFn = Arc<dyn Fn(&Json) -> Json + Send + Sync>;

/// Typed, validated key/value store addressed by dot-paths.
#[derive(Clone)]
pub struct ContextManager {
    data: Json,
    schema: Option<ContextSchema>,
    dirty: BTreeSet<String>,
    computed: std::collections::HashMap<String, ComputedFn>,
}

impl std::fmt::Debug for ContextManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextManager")
            .field("data", &self.data)
            .field("dirty", &self.dirty)
            .field("computed", &self.computed.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new(Json::Object(Default::default()))
    }
}

impl ContextManager {
    /// Build a context from an initial mapping (schema-free).
    pub fn new(initial: Json) -> Self {
        Self {
            data: initial,
            schema: None,
            dirty: BTreeSet::new(),
            computed: std::collections::HashMap::new(),
        }
    }

    /// Attach a schema used by `self_validate`.
    pub fn with_schema(mut self, schema: ContextSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Register a computed (non-persisted) accessor under `name`.
    pub fn with_computed(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&Json) -> Json + Send + Sync + 'static,
    ) -> Self {
        self.computed.insert(name.into(), Arc::new(f));
        self
    }

    /// Evaluate a computed accessor by name.
    pub fn computed(&self, name: &str) -> Option<Json> {
        self.computed.get(name).map(|f| f(&self.data))
    }

    /// Read a value at `path`, or `None` if it does not resolve.
    pub fn get(&self, dotted_path: &str) -> Option<&Json> {
        path::navigate(&self.data, dotted_path).ok()
    }

    /// Whether `path` resolves, optionally requiring a specific `FieldType`.
    pub fn has(&self, dotted_path: &str, expected: Option<FieldType>) -> bool {
        match self.get(dotted_path) {
            Some(value) => expected.map_or(true, |ty| ty.matches(value)),
            None => false,
        }
    }

    /// Write a value at `path`, creating intermediate objects as needed.
    /// Marks `path` dirty for the next delta extraction.
    pub fn set(&mut self, dotted_path: &str, value: Json) -> Result<(), ContextError> {
        path::write(&mut self.data, dotted_path, value).map_err(|e| ContextError::InvalidPath {
            path: dotted_path.to_string(),
            reason: e.to_string(),
        })?;
        self.dirty.insert(dotted_path.to_string());
        Ok(())
    }

    /// Remove the value at `path`, returning it if present.
    pub fn remove(&mut self, dotted_path: &str) -> Option<Json> {
        let removed = path::remove(&mut self.data, dotted_path);
        if removed.is_some() {
            self.dirty.insert(dotted_path.to_string());
        }
        removed
    }

    /// The full underlying mapping.
    pub fn to_mapping(&self) -> &Json {
        &self.data
    }

    /// Validate every schema field against the current data.
    pub fn self_validate(&self) -> Result<(), ContextError> {
        let Some(schema) = &self.schema else {
            return Ok(());
        };
        for (path, field) in schema.fields() {
            let value = self.get(path);
            match value {
                None => {
                    if field.required {
                        return Err(ContextError::RequiredFieldMissing {
                            path: path.clone(),
                        });
                    }
                }
                Some(value) => {
                    if let Err(reason) = field.validate(value) {
                        return Err(ContextError::InvalidValue {
                            path: path.clone(),
                            reason,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// The first path among `required` that is absent or type-mismatched,
    /// if any. Used to gate behavior invocation on required context.
    pub fn first_missing(&self, required: &[(String, FieldType)]) -> Option<String> {
        required
            .iter()
            .find(|(path, ty)| !self.has(path, Some(*ty)))
            .map(|(path, _)| path.clone())
    }

    /// Extract the delta (paths written since the last call) and clear the
    /// dirty set. Returns an object containing only the dirty paths.
    pub fn take_delta(&mut self) -> Delta {
        let mut out = Delta::default();
        for path in std::mem::take(&mut self.dirty) {
            if let Some(value) = self.get(&path) {
                out.insert(path, value.clone());
            } else {
                out.insert_removed(path);
            }
        }
        out
    }

    /// Fold a previously extracted delta back into this context, without
    /// marking the written paths dirty (used when replaying history).
    pub fn apply_delta(&mut self, delta: &Delta) -> Result<(), ContextError> {
        for (path, value) in delta.entries() {
            match value {
                Some(value) => {
                    path::write(&mut self.data, path, value.clone()).map_err(|e| {
                        ContextError::InvalidPath {
                            path: path.clone(),
                            reason: e.to_string(),
                        }
                    })?;
                }
                None => {
                    path::remove(&mut self.data, path);
                }
            }
        }
        Ok(())
    }

    /// Paths dirty since the last `take_delta`.
    pub fn dirty_paths(&self) -> impl Iterator<Item = &str> {
        self.dirty.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dot_path_get_set_through_maps_and_arrays() {
        let mut ctx = ContextManager::new(json!({"a": {"b": [{"c": 1}]}}));
        assert_eq!(ctx.get("a.b.0.c"), Some(&json!(1)));
        ctx.set("a.b.0.c", json!(2)).unwrap();
        assert_eq!(ctx.get("a.b.0.c"), Some(&json!(2)));
    }

    #[test]
    fn set_creates_intermediate_objects() {
        let mut ctx = ContextManager::default();
        ctx.set("order.total", json!(42)).unwrap();
        assert_eq!(ctx.get("order.total"), Some(&json!(42)));
    }

    #[test]
    fn has_checks_type() {
        let ctx = ContextManager::new(json!({"count": 1}));
        assert!(ctx.has("count", Some(FieldType::Integer)));
        assert!(!ctx.has("count", Some(FieldType::String)));
        assert!(!ctx.has("missing", None));
    }

    #[test]
    fn remove_clears_value_and_marks_dirty() {
        let mut ctx = ContextManager::new(json!({"count": 1}));
        let removed = ctx.remove("count");
        assert_eq!(removed, Some(json!(1)));
        assert_eq!(ctx.get("count"), None);
        assert!(ctx.dirty_paths().any(|p| p == "count"));
    }

    #[test]
    fn delta_round_trips_into_fresh_context() {
        let mut ctx = ContextManager::new(json!({"count": 1}));
        ctx.set("count", json!(2)).unwrap();
        ctx.set("name", json!("a")).unwrap();
        let delta = ctx.take_delta();

        let mut restored = ContextManager::default();
        restored.apply_delta(&delta).unwrap();
        assert_eq!(restored.get("count"), Some(&json!(2)));
        assert_eq!(restored.get("name"), Some(&json!("a")));
    }

    #[test]
    fn take_delta_clears_dirty_set() {
        let mut ctx = ContextManager::new(json!({"count": 1}));
        ctx.set("count", json!(2)).unwrap();
        let _ = ctx.take_delta();
        assert_eq!(ctx.dirty_paths().count(), 0);
    }

    #[test]
    fn first_missing_reports_first_absent_path() {
        let ctx = ContextManager::new(json!({"a": 1}));
        let required = vec![
            ("a".to_string(), FieldType::Integer),
            ("b".to_string(), FieldType::String),
        ];
        assert_eq!(ctx.first_missing(&required), Some("b".to_string()));
    }

    #[test]
    fn self_validate_enforces_required_fields() {
        let schema = ContextSchema::new().with_field(
            "name",
            FieldSchema::new().required(true).field_type(FieldType::String),
        );
        let ctx = ContextManager::default().with_schema(schema);
        assert!(ctx.self_validate().is_err());
    }

    #[test]
    fn computed_accessor_is_never_persisted() {
        let ctx = ContextManager::new(json!({"count": 3}))
            .with_computed("doubled", |data| {
                let n = data.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
                json!(n * 2)
            });
        assert_eq!(ctx.computed("doubled"), Some(json!(6)));
        assert_eq!(ctx.to_mapping().get("doubled"), None);
    }
}
