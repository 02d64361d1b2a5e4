//! Drives a real `Actor` through each named end-to-end scenario and asserts
//! the exact final leaf, context, and trace outcomes.

use hsm_context::{ContextManager, Delta};
use hsm_engine::{Actor, Event};
use hsm_test_utils::assertions::{assert_context_path, assert_single_leaf, assert_trace_contains};
use hsm_test_utils::scenarios::{always_routing, forbidden_override, guarded_counter, raised_events, traffic_light};
use serde_json::json;

fn record_context(initial: serde_json::Value, delta_json: Option<&serde_json::Value>) -> ContextManager {
    let mut context = ContextManager::new(initial);
    if let Some(delta_json) = delta_json {
        let delta: Delta = serde_json::from_value(delta_json.clone()).expect("delta deserializes");
        context.apply_delta(&delta).expect("delta applies");
    }
    context
}

#[test]
fn traffic_light_advances_on_each_next() {
    let def = traffic_light();
    let actor = Actor::new(def, hsm_engine::BehaviorRegistry::new());
    let started = actor.start(None).unwrap();
    assert_single_leaf(&started.machine_value, "traffic_light.green");

    let step1 = actor.send(started.root_event_id, Event::external("NEXT")).unwrap();
    assert_single_leaf(&step1.machine_value, "traffic_light.yellow");

    let step2 = actor.send(started.root_event_id, Event::external("NEXT")).unwrap();
    assert_single_leaf(&step2.machine_value, "traffic_light.red");
}

#[test]
fn guarded_counter_only_doubles_on_even() {
    let (def, registry) = guarded_counter();
    let actor = Actor::new(def, registry);
    let started = actor.start(None).unwrap();

    let mut context = record_context(json!({"count": 1}), started.context.as_ref());
    assert_context_path(&context, "count", &json!(1));

    // count is odd: MUT's isEven guard must reject, leaving count unchanged.
    let after_mut = actor.send(started.root_event_id, Event::external("MUT")).unwrap();
    assert!(after_mut.context.is_none());
    assert_single_leaf(&after_mut.machine_value, "guarded_counter.active");

    let after_inc = actor.send(started.root_event_id, Event::external("INC")).unwrap();
    context.apply_delta(&serde_json::from_value(after_inc.context.clone().unwrap()).unwrap()).unwrap();
    assert_context_path(&context, "count", &json!(2));

    let after_mut2 = actor.send(started.root_event_id, Event::external("MUT")).unwrap();
    context.apply_delta(&serde_json::from_value(after_mut2.context.clone().unwrap()).unwrap()).unwrap();
    assert_context_path(&context, "count", &json!(4));
}

#[test]
fn always_routing_settles_past_the_always_transition() {
    let def = always_routing();
    let actor = Actor::new(def, hsm_engine::BehaviorRegistry::new());
    let started = actor.start(None).unwrap();
    assert_single_leaf(&started.machine_value, "always_routing.stateA");

    let after_event = actor.send(started.root_event_id, Event::external("EVENT")).unwrap();
    assert_single_leaf(&after_event.machine_value, "always_routing.stateC");
}

#[test]
fn forbidden_override_blocks_the_ancestor_transition() {
    let def = forbidden_override();
    let actor = Actor::new(def, hsm_engine::BehaviorRegistry::new());
    let started = actor.start(None).unwrap();
    assert_single_leaf(&started.machine_value, "forbidden_override.a.b.c.d");

    let after_event = actor.send(started.root_event_id, Event::external("EVENT")).unwrap();
    assert_single_leaf(&after_event.machine_value, "forbidden_override.a.b.c.d");
}

#[test]
fn raised_events_chain_through_to_the_terminal_leaf() {
    let (def, registry) = raised_events();
    let actor = Actor::new(def, registry);
    let started = actor.start(None).unwrap();

    assert_single_leaf(&started.machine_value, "raised_events.y");
    let context = record_context(json!({"value": ""}), started.context.as_ref());
    assert_context_path(&context, "value", &json!("xy"));
    assert_trace_contains(&started.meta.as_ref().unwrap()["trace"].as_array().unwrap().iter().map(|v| v.as_str().unwrap().to_string()).collect::<Vec<_>>(), "raised_events.state.y.enter");
}
