//! `Actor`: the executable runtime wrapping a `MachineDefinition` with
//! single-writer locking, event-sourced state rehydration, and
//! transactional/non-transactional commit semantics.

use crate::behavior::BehaviorRegistry;
use crate::event::Event;
use crate::transition::{RuntimeState, StepReport, TransitionEngine};
use chrono::Utc;
use hsm_context::{ContextManager, Delta};
use hsm_core::{Acquired, EntityIdType, EventRecord, HsmError, HsmResult, Lock, MachineAlreadyRunning, RootEventId};
use hsm_dsl::MachineDefinition;
use hsm_events::{EventLog, InMemoryEventLog};
use serde_json::{json, Value as Json};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Runs a single `MachineDefinition` against an `EventLog`, enforcing that
/// at most one `send`/`start` is in flight per machine instance at a time.
pub struct Actor {
    def: MachineDefinition,
    registry: BehaviorRegistry,
    log: Arc<dyn EventLog>,
    locks: Mutex<HashMap<RootEventId, Lock<Acquired>>>,
    holder: String,
}

impl Actor {
    pub fn new(def: MachineDefinition, registry: BehaviorRegistry) -> Self {
        Self::with_log(def, registry, Arc::new(InMemoryEventLog::new()))
    }

    pub fn with_log(def: MachineDefinition, registry: BehaviorRegistry, log: Arc<dyn EventLog>) -> Self {
        Self {
            def,
            registry,
            log,
            locks: Mutex::new(HashMap::new()),
            holder: format!("actor-{}", RootEventId::now_v7()),
        }
    }

    pub fn definition(&self) -> &MachineDefinition {
        &self.def
    }

    /// Start a brand new machine instance: run initial entry hooks, the
    /// `@always` fixed point, and commit the root `EventRecord`.
    pub fn start(&self, payload: Option<Json>) -> HsmResult<EventRecord> {
        let root_event_id = RootEventId::now_v7();
        let event = Event::internal(format!("{}.start", self.def.id)).with_payload_opt(payload);
        self.run(root_event_id, event, true)
    }

    /// Dispatch `event` against a running instance.
    pub fn send(&self, root_event_id: RootEventId, event: Event) -> HsmResult<EventRecord> {
        self.run(root_event_id, event, false)
    }

    fn run(&self, root_event_id: RootEventId, event: Event, is_start: bool) -> HsmResult<EventRecord> {
        let _guard = self.acquire(root_event_id)?;
        let span = tracing::info_span!("actor.run", machine = %self.def.id, %root_event_id, event = %event.event_type);
        let _enter = span.enter();

        let (pre_leaves, pre_context) = self.rebuild(root_event_id);
        let mut leaves = pre_leaves.clone();
        let mut context = pre_context.clone();
        let mut report = StepReport::default();

        let outcome = self.drive(&mut leaves, &mut context, &event, is_start, &mut report);

        match outcome {
            Ok(()) => {
                tracing::debug!(trace_len = report.trace.len(), "transition committed");
                self.commit(root_event_id, &event, &leaves, &mut context, &report, None)
            }
            Err(err) => {
                tracing::warn!(error = %err, transactional = event.is_transactional, "transition failed");
                let record = if event.is_transactional {
                    let mut rolled_back = pre_context.clone();
                    self.commit(root_event_id, &event, &pre_leaves, &mut rolled_back, &report, Some(&err))
                } else {
                    self.commit(root_event_id, &event, &leaves, &mut context, &report, Some(&err))
                };
                record?;
                Err(err)
            }
        }
    }

    /// Dispatch the triggering event (or run initial entry, for a fresh
    /// instance), then drain the `@always` fixed point and the raised-event
    /// FIFO queue.
    fn drive(
        &self,
        leaves: &mut Vec<usize>,
        context: &mut ContextManager,
        event: &Event,
        is_start: bool,
        report: &mut StepReport,
    ) -> HsmResult<()> {
        let mut state = RuntimeState { active_leaves: leaves, context };

        if is_start {
            TransitionEngine::enter_initial(&self.def, &self.registry, &mut state, event, report)?;
        } else {
            TransitionEngine::dispatch(&self.def, &self.registry, &mut state, event, report)?;
        }
        TransitionEngine::run_always(&self.def, &self.registry, &mut state, report)?;

        let mut queue: VecDeque<Event> = report.raised.drain(..).collect();
        while let Some(raised) = queue.pop_front() {
            let mut sub_report = StepReport::default();
            let result = TransitionEngine::dispatch(&self.def, &self.registry, &mut state, &raised, &mut sub_report)
                .and_then(|()| TransitionEngine::run_always(&self.def, &self.registry, &mut state, &mut sub_report));

            match result {
                Ok(()) => {
                    report.trace.extend(sub_report.trace);
                    queue.extend(sub_report.raised);
                }
                Err(err) => {
                    // Raised events are isolated from the triggering event:
                    // drop this one, keep its fail trace, keep draining the
                    // rest of the queue.
                    tracing::warn!(error = %err, raised = %raised.event_type, "raised event dropped after failed dispatch");
                    report.trace.extend(sub_report.trace);
                    report.trace.push(format!("{}.event.{}.dropped", self.def.id, raised.event_type));
                }
            }
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn commit(
        &self,
        root_event_id: RootEventId,
        event: &Event,
        leaves: &[usize],
        context: &mut ContextManager,
        report: &StepReport,
        error: Option<&HsmError>,
    ) -> HsmResult<EventRecord> {
        let machine_value = leaf_ids(&self.def, leaves);
        let delta = context.take_delta();
        let sequence_number = self.log.next_sequence_number(root_event_id);
        let event_type = match error {
            Some(_) => format!("{}.fail", event.event_type),
            None => event.event_type.clone(),
        };

        let mut meta = json!({ "trace": report.trace });
        if let Some(err) = error {
            meta["error"] = json!(err.to_string());
        }

        let context_delta = if delta.is_empty() { None } else { Some(serde_json::to_value(&delta).expect("delta serializes")) };

        let record = if sequence_number == 1 {
            EventRecord::root(root_event_id, self.def.id.clone(), self.def.version, event_type, machine_value, event.payload.clone(), context_delta)
                .with_meta(meta)
        } else {
            EventRecord::next(
                root_event_id,
                sequence_number,
                self.def.id.clone(),
                self.def.version,
                event.source,
                event_type,
                machine_value,
                event.payload.clone(),
                context_delta,
            )
            .with_meta(meta)
        };

        if self.def.should_persist {
            self.log.append(record.clone())?;
        }
        Ok(record)
    }

    /// Rehydrate an instance by re-dispatching only its *external* events
    /// through the engine, starting from the definition's initial state —
    /// unlike `rebuild`, which folds stored leaf/delta snapshots and is
    /// what `run` uses on every `send`. Returns the trace this replay
    /// produced, so a caller can check it against the one originally
    /// recorded.
    pub fn restore(&self, root_event_id: RootEventId) -> (Vec<usize>, ContextManager, Vec<String>) {
        let mut leaves = self.def.initial_leaves_from(self.def.root_index());
        let mut context =
            ContextManager::new(self.def.context.clone().unwrap_or_else(|| Json::Object(Default::default())));
        let mut trace = Vec::new();

        let records = self.log.by_root(root_event_id);
        let Some(root_record) = records.first() else {
            return (leaves, context, trace);
        };

        let start_event = Event::internal(root_record.event_type.clone()).with_payload_opt(root_record.payload.clone());
        self.replay_step(&mut leaves, &mut context, &start_event, true, &mut trace);

        for record in records.iter().filter(|r| r.source == hsm_core::EventSource::External) {
            let event = Event::external(record.event_type.clone()).with_payload_opt(record.payload.clone());
            self.replay_step(&mut leaves, &mut context, &event, false, &mut trace);
        }

        (leaves, context, trace)
    }

    /// Drive one replayed event, mirroring `run`'s rollback-on-transactional-
    /// failure policy. Errors are swallowed (the original `.fail` trace
    /// entry is already in `trace`) so replay continues through the rest of
    /// the log, the same way a live instance keeps accepting events after a
    /// failed one.
    fn replay_step(
        &self,
        leaves: &mut Vec<usize>,
        context: &mut ContextManager,
        event: &Event,
        is_start: bool,
        trace: &mut Vec<String>,
    ) {
        let pre_leaves = leaves.clone();
        let pre_context = context.clone();
        let mut report = StepReport::default();
        let outcome = self.drive(leaves, context, event, is_start, &mut report);
        trace.extend(report.trace);
        if outcome.is_err() && event.is_transactional {
            *leaves = pre_leaves;
            *context = pre_context;
        }
    }

    /// Rebuild `active_leaves`/context by folding every committed delta for
    /// this instance. A root with no records yet starts from the
    /// definition's initial leaves and declared default context.
    fn rebuild(&self, root_event_id: RootEventId) -> (Vec<usize>, ContextManager) {
        let mut context = ContextManager::new(self.def.context.clone().unwrap_or_else(|| Json::Object(Default::default())));
        let mut leaves = self.def.initial_leaves_from(self.def.root_index());

        for record in self.log.by_root(root_event_id) {
            if let Some(delta_json) = &record.context {
                if let Ok(delta) = serde_json::from_value::<Delta>(delta_json.clone()) {
                    let _ = context.apply_delta(&delta);
                }
            }
            if !record.machine_value.is_empty() {
                leaves = record.machine_value.iter().filter_map(|id| self.def.state_by_id(id).map(|s| s.index)).collect();
            }
        }
        (leaves, context)
    }

    fn acquire(&self, root_event_id: RootEventId) -> HsmResult<LockGuard<'_>> {
        let now = Utc::now();
        let mut locks = self.locks.lock().expect("lock table poisoned");
        if let Some(existing) = locks.get(&root_event_id) {
            if !existing.is_expired(now) {
                return Err(MachineAlreadyRunning { root_event_id, held_until: existing.expires_at() }.into());
            }
        }
        locks.insert(root_event_id, Lock::acquire(root_event_id, self.holder.clone(), now));
        Ok(LockGuard { actor: self, root_event_id })
    }

    fn release(&self, root_event_id: RootEventId) {
        self.locks.lock().expect("lock table poisoned").remove(&root_event_id);
    }
}

/// Releases the single-writer lock when dropped, including on early return
/// from a failed transition.
struct LockGuard<'a> {
    actor: &'a Actor,
    root_event_id: RootEventId,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.actor.release(self.root_event_id);
    }
}

fn leaf_ids(def: &MachineDefinition, leaves: &[usize]) -> Vec<String> {
    leaves.iter().map(|&i| def.state(i).id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsm_dsl::from_json;

    fn traffic_light() -> MachineDefinition {
        MachineDefinition::define(
            from_json(
                r#"{
                    "id": "traffic_light",
                    "initial": "green",
                    "states": {
                        "green": {"on": {"NEXT": "yellow"}},
                        "yellow": {"on": {"NEXT": "red"}},
                        "red": {"on": {"NEXT": "green"}}
                    }
                }"#,
            )
            .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn start_persists_root_record_at_initial_leaf() {
        let actor = Actor::new(traffic_light(), BehaviorRegistry::new());
        let record = actor.start(None).unwrap();
        assert!(record.is_root());
        assert_eq!(record.machine_value, vec!["traffic_light.green".to_string()]);
    }

    #[test]
    fn send_advances_and_is_replayable() {
        let actor = Actor::new(traffic_light(), BehaviorRegistry::new());
        let root = actor.start(None).unwrap();
        let next = actor.send(root.id, Event::external("NEXT")).unwrap();
        assert_eq!(next.machine_value, vec!["traffic_light.yellow".to_string()]);

        let (leaves, _) = actor.rebuild(root.id);
        assert_eq!(leaves, vec![actor.definition().state_by_id("traffic_light.yellow").unwrap().index]);
    }

    #[test]
    fn restore_replays_external_events_to_the_same_leaf_as_rebuild() {
        let actor = Actor::new(traffic_light(), BehaviorRegistry::new());
        let root = actor.start(None).unwrap();
        actor.send(root.id, Event::external("NEXT")).unwrap();
        actor.send(root.id, Event::external("NEXT")).unwrap();

        let (folded_leaves, _) = actor.rebuild(root.id);
        let (replayed_leaves, _, trace) = actor.restore(root.id);
        assert_eq!(replayed_leaves, folded_leaves);
        assert_eq!(replayed_leaves, vec![actor.definition().state_by_id("traffic_light.red").unwrap().index]);
        assert!(trace.iter().any(|t| t.contains("transition")));
    }

    #[test]
    fn restore_reproduces_trace_recorded_during_the_live_run() {
        let actor = Actor::new(traffic_light(), BehaviorRegistry::new());
        let root = actor.start(None).unwrap();
        let sent = actor.send(root.id, Event::external("NEXT")).unwrap();

        let live_trace: Vec<String> =
            serde_json::from_value(sent.meta.as_ref().unwrap()["trace"].clone()).unwrap();
        let (_, _, replayed_trace) = actor.restore(root.id);

        assert!(replayed_trace.ends_with(&live_trace));
    }

    #[test]
    fn concurrent_send_on_same_root_is_rejected() {
        let actor = Actor::new(traffic_light(), BehaviorRegistry::new());
        let root = actor.start(None).unwrap();
        let _held = actor.acquire(root.id).unwrap();
        let err = actor.send(root.id, Event::external("NEXT")).unwrap_err();
        assert!(matches!(err, HsmError::MachineAlreadyRunning(_)));
    }

    #[test]
    fn transactional_failure_rolls_back_but_persists_fail_trace() {
        // `boom` fails on entry to `b`, after `active_leaves` already holds
        // `b` in memory — a transactional commit must still persist the
        // pre-dispatch leaf, since the mutated in-memory state is discarded.
        let mut registry = BehaviorRegistry::new();
        registry.register_action("boom", |_| Err(HsmError::BehaviorFailed("boom".into())));
        let def = MachineDefinition::define(
            from_json(r#"{"id":"m","initial":"a","states":{"a":{"on":{"GO":"b"}},"b":{"entry":"boom"}}}"#).unwrap(),
        )
        .unwrap();
        let actor = Actor::new(def, registry);
        let root = actor.start(None).unwrap();
        let err = actor.send(root.id, Event::external("GO")).unwrap_err();
        assert!(matches!(err, HsmError::BehaviorFailed(_)));

        let (leaves, _) = actor.rebuild(root.id);
        assert_eq!(leaves, vec![actor.definition().state_by_id("m.a").unwrap().index]);

        let records = actor.log.by_root(root.id);
        assert!(records.last().unwrap().event_type.ends_with(".fail"));
    }

    #[test]
    fn non_transactional_failure_persists_partial_progress() {
        // `boom` fails on entry to `b`, after the new leaf is already
        // spliced into `active_leaves` — this is what distinguishes a
        // non-transactional commit (persists the post-failure leaf) from a
        // transactional one (always persists the pre-dispatch leaf).
        let mut registry = BehaviorRegistry::new();
        registry.register_action("boom", |_| Err(HsmError::BehaviorFailed("boom".into())));
        let def = MachineDefinition::define(
            from_json(r#"{"id":"m","initial":"a","states":{"a":{"on":{"GO":"b"}},"b":{"entry":"boom"}}}"#).unwrap(),
        )
        .unwrap();
        let actor = Actor::new(def, registry);
        let root = actor.start(None).unwrap();
        let err = actor.send(root.id, Event::external("GO").non_transactional()).unwrap_err();
        assert!(matches!(err, HsmError::BehaviorFailed(_)));

        let (leaves, _) = actor.rebuild(root.id);
        assert_eq!(leaves, vec![actor.definition().state_by_id("m.b").unwrap().index]);
    }
}
