//! Proptest strategies for JSON contexts, event types, and deltas.

use proptest::prelude::*;
use serde_json::Value as Json;

/// A scalar JSON leaf: null, bool, integer, or short ASCII string.
pub fn arb_json_scalar() -> impl Strategy<Value = Json> {
    prop_oneof![
        Just(Json::Null),
        any::<bool>().prop_map(Json::Bool),
        any::<i64>().prop_map(|n| Json::from(n)),
        "[a-zA-Z0-9 ]{0,20}".prop_map(Json::String),
    ]
}

/// Arbitrary JSON nested up to `depth` levels, used to exercise
/// `ContextManager`/`Delta`/`CompressionCodec` against shapes the engine
/// doesn't special-case for.
pub fn arb_json(depth: u32) -> impl Strategy<Value = Json> {
    arb_json_scalar().prop_recursive(depth, 64, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..8).prop_map(Json::Array),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..8)
                .prop_map(|m| Json::Object(m.into_iter().collect())),
        ]
    })
}

/// A JSON object suitable as a context's top-level mapping, with `fields`
/// scalar entries.
pub fn arb_context_object(fields: usize) -> impl Strategy<Value = Json> {
    prop::collection::vec(("[a-z][a-z0-9_]{0,10}", arb_json_scalar()), 0..=fields)
        .prop_map(|entries| Json::Object(entries.into_iter().collect()))
}

/// An uppercase, underscore-separated event type, e.g. `NEXT` or `ORDER_SUBMITTED`.
pub fn arb_event_type() -> impl Strategy<Value = String> {
    "[A-Z][A-Z_]{0,10}"
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn arb_json_is_always_serializable(value in arb_json(4)) {
            let bytes = serde_json::to_vec(&value).unwrap();
            let back: Json = serde_json::from_slice(&bytes).unwrap();
            prop_assert_eq!(value, back);
        }

        #[test]
        fn arb_context_object_is_always_an_object(ctx in arb_context_object(10)) {
            prop_assert!(ctx.is_object());
        }
    }
}
