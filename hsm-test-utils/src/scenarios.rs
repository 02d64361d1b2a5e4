//! Fixture `MachineDefinition`s for the six end-to-end scenarios (traffic
//! light, guarded counter, `@always` routing, forbidden-transition ancestor
//! override, raised events, and compression+archive round-trip data).

use hsm_dsl::{from_json, MachineDefinition};
use hsm_engine::{BehaviorRegistry, Event};
use serde_json::json;

fn define(text: &str) -> MachineDefinition {
    let config = from_json(text).expect("fixture definition is valid config");
    MachineDefinition::define(config).expect("fixture definition is well-formed")
}

/// S1: `green --NEXT--> yellow --NEXT--> red`.
pub fn traffic_light() -> MachineDefinition {
    define(
        r#"{
            "id": "traffic_light",
            "initial": "green",
            "states": {
                "green": {"on": {"NEXT": "yellow"}},
                "yellow": {"on": {"NEXT": "red"}},
                "red": {}
            }
        }"#,
    )
}

/// S2: `{count:1}`, `MUT` guarded by `isEven` doubling count, `INC` adding one.
pub fn guarded_counter() -> (MachineDefinition, BehaviorRegistry) {
    let def = define(
        r#"{
            "id": "guarded_counter",
            "initial": "active",
            "context": {"count": 1},
            "states": {
                "active": {
                    "on": {
                        "MUT": {"target": "active", "guards": ["isEven"], "actions": ["multiplyByTwo"]},
                        "INC": {"target": "active", "actions": ["incrementByOne"]}
                    }
                }
            }
        }"#,
    );

    let mut registry = BehaviorRegistry::new();
    registry.register_guard("isEven", |ctx| {
        Ok(ctx.context.get("count").and_then(|v| v.as_i64()).unwrap_or(0) % 2 == 0)
    });
    registry.register_action("multiplyByTwo", |ctx| {
        let n = ctx.context.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
        ctx.context.set("count", json!(n * 2)).map_err(Into::into)
    });
    registry.register_action("incrementByOne", |ctx| {
        let n = ctx.context.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
        ctx.context.set("count", json!(n + 1)).map_err(Into::into)
    });

    (def, registry)
}

/// S3: `stateA --EVENT--> stateB --@always--> stateC`.
pub fn always_routing() -> MachineDefinition {
    define(
        r#"{
            "id": "always_routing",
            "initial": "stateA",
            "states": {
                "stateA": {"on": {"EVENT": "stateB"}},
                "stateB": {"on": {"@always": "stateC"}},
                "stateC": {}
            }
        }"#,
    )
}

/// S4: ancestor `a` allows `EVENT`; deep descendant `a.b.c.d` forbids it.
/// Initial leaf is `a.b.c.d`; dispatching `EVENT` must leave it unchanged.
pub fn forbidden_override() -> MachineDefinition {
    define(
        r#"{
            "id": "forbidden_override",
            "initial": "a",
            "states": {
                "a": {
                    "initial": "b",
                    "on": {"EVENT": "x"},
                    "states": {
                        "b": {
                            "initial": "c",
                            "states": {
                                "c": {
                                    "initial": "d",
                                    "states": {
                                        "d": {"on": {"EVENT": null}}
                                    }
                                }
                            }
                        }
                    }
                },
                "x": {}
            }
        }"#,
    )
}

/// S5: entry of `a` appends `'x'` to `context.value` and raises `x`; `x`'s
/// entry appends `'y'` and raises `y`; `y` is terminal. From a fresh start
/// the final leaf is `y` and `context.value == "xy"`.
pub fn raised_events() -> (MachineDefinition, BehaviorRegistry) {
    let def = define(
        r#"{
            "id": "raised_events",
            "initial": "a",
            "context": {"value": ""},
            "states": {
                "a": {"entry": "appendAndRaise:x,value", "on": {"x": "x"}},
                "x": {"entry": "appendAndRaise:y,value", "on": {"y": "y"}},
                "y": {}
            }
        }"#,
    );

    let mut registry = BehaviorRegistry::new();
    registry.register_action("appendAndRaise", |ctx| {
        let letter = ctx.args.first().cloned().unwrap_or_default();
        let path = ctx.args.get(1).cloned().unwrap_or_else(|| "value".to_string());
        let current = ctx.context.get(&path).and_then(|v| v.as_str()).unwrap_or("").to_string();
        ctx.context.set(&path, json!(format!("{current}{letter}")))?;
        ctx.raised.push(Event::external(letter));
        Ok(())
    });

    (def, registry)
}

/// S6 supporting data: a ~1KB JSON context blob, and the Unicode-only
/// payload the archive round-trip must decode identically.
pub fn kilobyte_context(seed: u64) -> serde_json::Value {
    json!({
        "seed": seed,
        "padding": "x".repeat(1024),
    })
}

pub fn unicode_payload() -> serde_json::Value {
    json!({"text": "Türkçe 中文 🚀"})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traffic_light_has_three_atomic_states() {
        let def = traffic_light();
        assert_eq!(def.state_by_id("traffic_light.green").unwrap().id, "traffic_light.green");
        assert_eq!(def.state_by_id("traffic_light.red").unwrap().id, "traffic_light.red");
    }

    #[test]
    fn forbidden_override_resolves_the_full_ancestor_chain() {
        let def = forbidden_override();
        assert!(def.state_by_id("forbidden_override.a.b.c.d").is_some());
        assert!(def.state_by_id("forbidden_override.x").is_some());
    }

    #[test]
    fn raised_events_registry_appends_and_raises() {
        let (_, registry) = raised_events();
        let mut context = hsm_context::ContextManager::new(json!({"value": ""}));
        let event = Event::external("raised_events.start");
        let mut raised = Vec::new();
        let mut ctx = hsm_engine::BehaviorCtx {
            context: &mut context,
            event: &event,
            active_leaves: &[],
            args: &[],
            raised: &mut raised,
        };
        registry.invoke_action("appendAndRaise:x,value", &mut ctx).unwrap();
        assert_eq!(context.get("value").and_then(|v| v.as_str()), Some("x"));
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].event_type, "x");
    }
}
