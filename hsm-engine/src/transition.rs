//! `TransitionEngine`: event dispatch, ancestor fallback, guarded
//! multi-branch selection, exit/entry ordering via LCCA, `@always`
//! eventless transitions, and the raised-event FIFO queue.

use crate::behavior::{BehaviorCtx, BehaviorRegistry};
use crate::event::{Event, ALWAYS_EVENT, ALWAYS_TRAVERSAL_CAP};
use hsm_context::ContextManager;
use hsm_core::{trace, EventValidationError, HsmResult, StateType};
use hsm_dsl::{MachineDefinition, TransitionDefinition};
use serde_json::Value as Json;

/// Mutable, in-progress machine state threaded through a dispatch.
pub struct RuntimeState<'a> {
    pub active_leaves: &'a mut Vec<usize>,
    pub context: &'a mut ContextManager,
}

/// One dispatch's outcome: the ordered canonical trace strings it produced
/// and any events raised by its actions, queued for the caller to drain.
#[derive(Debug, Default)]
pub struct StepReport {
    pub trace: Vec<String>,
    pub raised: Vec<Event>,
}

pub struct TransitionEngine;

impl TransitionEngine {
    /// Dispatch a single event against every currently active leaf
    /// (ancestor fallback per leaf), mutating `state` in place.
    ///
    /// A leaf with no applicable transition (none of its ancestors define
    /// the event) is left untouched and produces no trace. A leaf whose
    /// resolved transition is `Forbidden` is left untouched but does
    /// produce a trace pair (consumes the event without dispatching
    /// further up).
    ///
    /// Accumulates into the caller-owned `report` rather than returning a
    /// fresh one, so a failure partway through still leaves the caller
    /// holding every trace entry emitted before the error — the fail-trace
    /// record an `Actor` persists on a transactional rollback.
    pub fn dispatch(
        def: &MachineDefinition,
        registry: &BehaviorRegistry,
        state: &mut RuntimeState,
        event: &Event,
        report: &mut StepReport,
    ) -> HsmResult<()> {
        let mid = &def.id;

        if let Some(schema) = def.event_schema(&event.event_type) {
            let payload = event.payload.clone().unwrap_or_else(|| Json::Object(Default::default()));
            let scratch = ContextManager::new(payload).with_schema(schema.clone());
            scratch.self_validate().map_err(|e| EventValidationError {
                event_type: event.event_type.clone(),
                reason: e.to_string(),
            })?;
        }

        let snapshot: Vec<usize> = state.active_leaves.clone();
        for leaf in snapshot {
            if !state.active_leaves.contains(&leaf) {
                // already folded into another region's transition this round
                continue;
            }
            let Some((handler_idx, transition)) = find_transition(def, leaf, &event.event_type) else {
                continue;
            };

            match transition {
                TransitionDefinition::Forbidden => {
                    report.trace.push(trace::transition_start(mid, &def.state(handler_idx).id, &event.event_type));
                    report.trace.push(trace::transition_fail(mid, &def.state(handler_idx).id, &event.event_type));
                }
                TransitionDefinition::Branches(branches) => {
                    let src_id = def.state(handler_idx).id.clone();
                    report.trace.push(trace::transition_start(mid, &src_id, &event.event_type));

                    let mut selected = None;
                    'branch: for branch in branches {
                        for calc in &branch.calculators {
                            let leaves = leaf_ids(def, state.active_leaves);
                            let mut raised = Vec::new();
                            let mut ctx = BehaviorCtx {
                                context: state.context,
                                event,
                                active_leaves: &leaves,
                                args: &[],
                                raised: &mut raised,
                            };
                            if registry.invoke_calculator(calc, &mut ctx).is_err() {
                                report.raised.extend(raised);
                                report.trace.push(trace::calculator_fail(mid, calc));
                                continue 'branch;
                            }
                            report.raised.extend(raised);
                        }

                        let mut all_pass = true;
                        for guard in &branch.guards {
                            report.trace.push(trace::guard_start(mid, guard));
                            let leaves = leaf_ids(def, state.active_leaves);
                            let mut raised = Vec::new();
                            let mut ctx = BehaviorCtx {
                                context: state.context,
                                event,
                                active_leaves: &leaves,
                                args: &[],
                                raised: &mut raised,
                            };
                            let passed = registry.invoke_guard(guard, &mut ctx)?;
                            report.raised.extend(raised);
                            report.trace.push(if passed { trace::guard_pass(mid, guard) } else { trace::guard_fail(mid, guard) });
                            if !passed {
                                all_pass = false;
                                break;
                            }
                        }

                        if all_pass {
                            selected = Some(branch);
                            break;
                        }
                    }

                    let Some(branch) = selected else {
                        report.trace.push(trace::transition_fail(mid, &src_id, &event.event_type));
                        continue;
                    };

                    match branch.target {
                        None => {
                            run_hooks(def, registry, state, event, &branch.actions, mid, report)?;
                            report.trace.push(trace::transition_finish(mid, &src_id, &event.event_type));
                        }
                        Some(target_idx) => {
                            let lcca = lcca_for_transition(def, leaf, target_idx);
                            let exit_root = child_toward(def, lcca, leaf);

                            let exits = exit_chain(def, leaf, lcca);
                            for &s in &exits {
                                let id = def.state(s).id.clone();
                                report.trace.push(trace::exit_start(mid, &id));
                                run_hooks(def, registry, state, event, &def.state(s).exit, mid, report)?;
                                report.trace.push(trace::exit_finish(mid, &id));
                                report.trace.push(trace::state_exit(mid, &id));
                            }

                            run_hooks(def, registry, state, event, &branch.actions, mid, report)?;

                            let new_leaves = def.initial_leaves_from(target_idx);
                            state.active_leaves.retain(|&l| !is_under(def, l, exit_root));
                            state.active_leaves.extend(&new_leaves);

                            let entries = entry_chain(def, lcca, target_idx);
                            for &s in &entries {
                                let id = def.state(s).id.clone();
                                report.trace.push(trace::entry_start(mid, &id));
                                run_hooks(def, registry, state, event, &def.state(s).entry, mid, report)?;
                                report.trace.push(trace::entry_finish(mid, &id));
                                if def.state(s).is_leaf_capable() {
                                    report.trace.push(trace::state_enter(mid, &id));
                                }
                            }

                            report.trace.push(trace::transition_finish(mid, &src_id, &event.event_type));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Repeatedly dispatch the reserved `@always` event until no active
    /// leaf has an applicable eventless transition, or the traversal cap is
    /// hit (whichever comes first). The cap bounds a pathological cycle of
    /// `@always` transitions that never settle.
    pub fn run_always(
        def: &MachineDefinition,
        registry: &BehaviorRegistry,
        state: &mut RuntimeState,
        report: &mut StepReport,
    ) -> HsmResult<()> {
        let always_event = Event::internal(ALWAYS_EVENT);
        for round in 0..ALWAYS_TRAVERSAL_CAP {
            let before = state.active_leaves.clone();
            let before_trace_len = report.trace.len();
            Self::dispatch(def, registry, state, &always_event, report)?;
            let changed = *state.active_leaves != before || report.trace.len() != before_trace_len;
            if !changed {
                return Ok(());
            }
            if round == ALWAYS_TRAVERSAL_CAP - 1 {
                tracing::warn!(mid = %def.id, cap = ALWAYS_TRAVERSAL_CAP, "@always traversal cap reached");
            }
        }
        Ok(())
    }

    /// Run entry hooks for every state from the root down through the
    /// definition's initial leaves. Used once, when an `Actor` starts a
    /// fresh instance — `state.active_leaves` must already hold the result
    /// of `def.initial_leaves_from(def.root_index())`.
    pub fn enter_initial(
        def: &MachineDefinition,
        registry: &BehaviorRegistry,
        state: &mut RuntimeState,
        event: &Event,
        report: &mut StepReport,
    ) -> HsmResult<()> {
        let mid = &def.id;
        let mut entries = Vec::new();
        descend(def, def.root_index(), &mut entries);
        for &s in &entries {
            let id = def.state(s).id.clone();
            report.trace.push(trace::entry_start(mid, &id));
            run_hooks(def, registry, state, event, &def.state(s).entry, mid, report)?;
            report.trace.push(trace::entry_finish(mid, &id));
            if def.state(s).is_leaf_capable() {
                report.trace.push(trace::state_enter(mid, &id));
            }
        }
        Ok(())
    }
}

fn run_hooks(
    def: &MachineDefinition,
    registry: &BehaviorRegistry,
    state: &mut RuntimeState,
    event: &Event,
    names: &[String],
    mid: &str,
    report: &mut StepReport,
) -> HsmResult<()> {
    for name in names {
        report.trace.push(trace::action_start(mid, name));
        let leaves = leaf_ids(def, state.active_leaves);
        let mut raised = Vec::new();
        let mut ctx = BehaviorCtx {
            context: state.context,
            event,
            active_leaves: &leaves,
            args: &[],
            raised: &mut raised,
        };
        registry.invoke_action(name, &mut ctx)?;
        for r in &raised {
            report.trace.push(trace::event_raised(mid, name, &r.event_type));
        }
        report.raised.extend(raised);
        report.trace.push(trace::action_finish(mid, name));
    }
    Ok(())
}

/// Fully-qualified state ids for the currently active leaves, the shape
/// behaviors actually see rather than raw arena indices.
fn leaf_ids(def: &MachineDefinition, active_leaves: &[usize]) -> Vec<String> {
    active_leaves.iter().map(|&i| def.state(i).id.clone()).collect()
}

fn find_transition<'d>(def: &'d MachineDefinition, leaf: usize, event_type: &str) -> Option<(usize, &'d TransitionDefinition)> {
    for &idx in def.ancestors(leaf).iter().rev() {
        if let Some(t) = def.state(idx).transitions.get(event_type) {
            return Some((idx, t));
        }
    }
    None
}

/// LCCA adjusted for self-transitions: when `a == b`, use the parent so the
/// state is still exited and re-entered rather than treated as a no-op.
fn lcca_for_transition(def: &MachineDefinition, a: usize, b: usize) -> usize {
    if a == b {
        def.state(a).parent.unwrap_or(def.root_index())
    } else {
        def.lcca(a, b)
    }
}

/// The child of `ancestor` that lies on `descendant`'s path (or
/// `descendant` itself if `ancestor == descendant`'s parent already).
fn child_toward(def: &MachineDefinition, ancestor: usize, descendant: usize) -> usize {
    let chain = def.ancestors(descendant);
    let pos = chain.iter().position(|&i| i == ancestor).unwrap_or(0);
    chain.get(pos + 1).copied().unwrap_or(descendant)
}

fn is_under(def: &MachineDefinition, leaf: usize, ancestor: usize) -> bool {
    def.ancestors(leaf).contains(&ancestor)
}

/// States exited between `leaf` and `lcca`, innermost first. Per the
/// parallel-region exit-action resolution: a compound state whose *parent*
/// is a parallel state is a region wrapper and is skipped — only the leaf
/// and (when the whole parallel region is exited) the parallel node itself
/// fire exit hooks.
fn exit_chain(def: &MachineDefinition, leaf: usize, lcca: usize) -> Vec<usize> {
    let mut chain = Vec::new();
    let mut current = leaf;
    while current != lcca {
        let s = def.state(current);
        let is_region_wrapper = s.state_type == StateType::Compound
            && s.parent.map(|p| def.state(p).state_type == StateType::Parallel).unwrap_or(false);
        if !is_region_wrapper {
            chain.push(current);
        }
        current = s.parent.expect("exit chain must reach lcca before the root");
    }
    chain
}

/// States entered between `lcca` and `target`, outermost first, continuing
/// down through `target`'s own initial descendants (and all parallel
/// regions, in definition order) to reach the new active leaves.
fn entry_chain(def: &MachineDefinition, lcca: usize, target: usize) -> Vec<usize> {
    let ancestors = def.ancestors(target);
    let lcca_pos = ancestors.iter().position(|&i| i == lcca).unwrap_or(0);
    let mut chain: Vec<usize> = ancestors[lcca_pos + 1..ancestors.len().saturating_sub(1)].to_vec();
    descend(def, target, &mut chain);
    chain
}

fn descend(def: &MachineDefinition, from: usize, out: &mut Vec<usize>) {
    out.push(from);
    let state = def.state(from);
    match state.state_type {
        StateType::Atomic | StateType::Final => {}
        StateType::Compound => {
            if let Some(child) = state.initial_child_index() {
                descend(def, child, out);
            }
        }
        StateType::Parallel => {
            for &child in state.children.values() {
                descend(def, child, out);
            }
        }
    }
}
