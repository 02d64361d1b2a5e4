//! `BehaviorRegistry`: resolves `name` / `name:arg1,arg2` references to one
//! of four behavior kinds sharing a uniform invocation envelope.
//!
//! Registries are explicit, per-instance state — never a global singleton —
//! so tests can construct an isolated set of fakes without cross-test
//! interference.

use crate::event::Event;
use hsm_context::{ContextManager, FieldType};
use hsm_core::{BehaviorKind, BehaviorNotFound, HsmResult, MissingContext};
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything a behavior invocation can see or touch.
pub struct BehaviorCtx<'a> {
    pub context: &'a mut ContextManager,
    pub event: &'a Event,
    pub active_leaves: &'a [String],
    pub args: &'a [String],
    /// Events raised by an action during this invocation, appended to the
    /// engine's FIFO queue once the invocation returns successfully.
    pub raised: &'a mut Vec<Event>,
}

pub type ActionFn = Arc<dyn Fn(&mut BehaviorCtx) -> HsmResult<()> + Send + Sync>;
pub type GuardFn = Arc<dyn Fn(&mut BehaviorCtx) -> HsmResult<bool> + Send + Sync>;
pub type CalculatorFn = Arc<dyn Fn(&mut BehaviorCtx) -> HsmResult<()> + Send + Sync>;
pub type ResultFn = Arc<dyn Fn(&mut BehaviorCtx) -> HsmResult<Json> + Send + Sync>;

/// A parsed `name:arg1,arg2` behavior reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BehaviorRef {
    pub name: String,
    pub args: Vec<String>,
}

impl BehaviorRef {
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((name, args)) => BehaviorRef {
                name: name.to_string(),
                args: args.split(',').map(str::trim).map(str::to_string).collect(),
            },
            None => BehaviorRef { name: raw.to_string(), args: vec![] },
        }
    }
}

/// Named behavior implementations, keyed by kind, resolved from config
/// references at transition time. Construct with `register_*` and pass the
/// same registry to every `Actor`/`TransitionEngine` call so fakes stay
/// scoped to one test or one process.
#[derive(Default)]
pub struct BehaviorRegistry {
    actions: HashMap<String, ActionFn>,
    guards: HashMap<String, GuardFn>,
    calculators: HashMap<String, CalculatorFn>,
    results: HashMap<String, ResultFn>,
    /// `{path -> type}` a behavior declares it needs present before it runs,
    /// keyed by behavior name across all four kinds.
    required_context: HashMap<String, Vec<(String, FieldType)>>,
}

impl BehaviorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the context paths/types `name` requires. Checked against the
    /// live context immediately before every `invoke_*` call for `name`;
    /// a missing or mismatched path surfaces `MissingContext` instead of
    /// running the behavior.
    pub fn require_context(&mut self, name: impl Into<String>, required: Vec<(String, FieldType)>) -> &mut Self {
        self.required_context.insert(name.into(), required);
        self
    }

    fn check_required(&self, name: &str, context: &ContextManager) -> HsmResult<()> {
        let Some(required) = self.required_context.get(name) else {
            return Ok(());
        };
        if let Some(path) = context.first_missing(required) {
            return Err(MissingContext(path).into());
        }
        Ok(())
    }

    pub fn register_action(&mut self, name: impl Into<String>, f: impl Fn(&mut BehaviorCtx) -> HsmResult<()> + Send + Sync + 'static) -> &mut Self {
        self.actions.insert(name.into(), Arc::new(f));
        self
    }

    pub fn register_guard(&mut self, name: impl Into<String>, f: impl Fn(&mut BehaviorCtx) -> HsmResult<bool> + Send + Sync + 'static) -> &mut Self {
        self.guards.insert(name.into(), Arc::new(f));
        self
    }

    pub fn register_calculator(&mut self, name: impl Into<String>, f: impl Fn(&mut BehaviorCtx) -> HsmResult<()> + Send + Sync + 'static) -> &mut Self {
        self.calculators.insert(name.into(), Arc::new(f));
        self
    }

    pub fn register_result(&mut self, name: impl Into<String>, f: impl Fn(&mut BehaviorCtx) -> HsmResult<Json> + Send + Sync + 'static) -> &mut Self {
        self.results.insert(name.into(), Arc::new(f));
        self
    }

    pub fn invoke_action(&self, reference: &str, ctx: &mut BehaviorCtx) -> HsmResult<()> {
        let r = BehaviorRef::parse(reference);
        let f = self.actions.get(&r.name).ok_or_else(|| BehaviorNotFound {
            kind: BehaviorKind::Action.to_string(),
            name: r.name.clone(),
        })?;
        self.check_required(&r.name, ctx.context)?;
        let mut scoped = BehaviorCtx { args: &r.args, ..reborrow(ctx) };
        f(&mut scoped)
    }

    pub fn invoke_guard(&self, reference: &str, ctx: &mut BehaviorCtx) -> HsmResult<bool> {
        let r = BehaviorRef::parse(reference);
        let f = self.guards.get(&r.name).ok_or_else(|| BehaviorNotFound {
            kind: BehaviorKind::Guard.to_string(),
            name: r.name.clone(),
        })?;
        self.check_required(&r.name, ctx.context)?;
        let mut scoped = BehaviorCtx { args: &r.args, ..reborrow(ctx) };
        f(&mut scoped)
    }

    pub fn invoke_calculator(&self, reference: &str, ctx: &mut BehaviorCtx) -> HsmResult<()> {
        let r = BehaviorRef::parse(reference);
        let f = self.calculators.get(&r.name).ok_or_else(|| BehaviorNotFound {
            kind: BehaviorKind::Calculator.to_string(),
            name: r.name.clone(),
        })?;
        self.check_required(&r.name, ctx.context)?;
        let mut scoped = BehaviorCtx { args: &r.args, ..reborrow(ctx) };
        f(&mut scoped)
    }

    pub fn invoke_result(&self, reference: &str, ctx: &mut BehaviorCtx) -> HsmResult<Json> {
        let r = BehaviorRef::parse(reference);
        let f = self.results.get(&r.name).ok_or_else(|| BehaviorNotFound {
            kind: BehaviorKind::Result.to_string(),
            name: r.name.clone(),
        })?;
        self.check_required(&r.name, ctx.context)?;
        let mut scoped = BehaviorCtx { args: &r.args, ..reborrow(ctx) };
        f(&mut scoped)
    }
}

/// Rebuild a `BehaviorCtx` with the same borrows but a different `args`
/// slice — `BehaviorCtx` holds no owned data, so this is a plain reborrow.
fn reborrow<'a, 'b: 'a>(ctx: &'a mut BehaviorCtx<'b>) -> BehaviorCtx<'a> {
    BehaviorCtx {
        context: &mut *ctx.context,
        event: ctx.event,
        active_leaves: ctx.active_leaves,
        args: ctx.args,
        raised: &mut *ctx.raised,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use hsm_core::EventSource;
    use serde_json::json;

    fn event() -> Event {
        Event { event_type: "NEXT".into(), payload: None, source: EventSource::External, is_transactional: true }
    }

    #[test]
    fn parses_name_with_args() {
        let r = BehaviorRef::parse("setCount:1,2");
        assert_eq!(r.name, "setCount");
        assert_eq!(r.args, vec!["1".to_string(), "2".to_string()]);
    }

    #[test]
    fn parses_bare_name() {
        let r = BehaviorRef::parse("log");
        assert_eq!(r.name, "log");
        assert!(r.args.is_empty());
    }

    #[test]
    fn invokes_registered_guard() {
        let mut registry = BehaviorRegistry::new();
        registry.register_guard("isEven", |ctx| {
            let n = ctx.context.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
            Ok(n % 2 == 0)
        });
        let mut context = ContextManager::new(json!({"count": 4}));
        let ev = event();
        let mut raised = Vec::new();
        let mut ctx = BehaviorCtx {
            context: &mut context,
            event: &ev,
            active_leaves: &[],
            args: &[],
            raised: &mut raised,
        };
        assert!(registry.invoke_guard("isEven", &mut ctx).unwrap());
    }

    #[test]
    fn declared_required_context_blocks_invocation_when_missing() {
        let mut registry = BehaviorRegistry::new();
        registry.register_guard("isEven", |ctx| {
            let n = ctx.context.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
            Ok(n % 2 == 0)
        });
        registry.require_context("isEven", vec![("count".to_string(), hsm_context::FieldType::Integer)]);

        let mut context = ContextManager::default();
        let ev = event();
        let mut raised = Vec::new();
        let mut ctx = BehaviorCtx { context: &mut context, event: &ev, active_leaves: &[], args: &[], raised: &mut raised };
        let err = registry.invoke_guard("isEven", &mut ctx).unwrap_err();
        assert!(matches!(err, hsm_core::HsmError::MissingContext(ref m) if m.0 == "count"));
    }

    #[test]
    fn declared_required_context_allows_invocation_when_present() {
        let mut registry = BehaviorRegistry::new();
        registry.register_guard("isEven", |ctx| {
            let n = ctx.context.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
            Ok(n % 2 == 0)
        });
        registry.require_context("isEven", vec![("count".to_string(), hsm_context::FieldType::Integer)]);

        let mut context = ContextManager::new(json!({"count": 4}));
        let ev = event();
        let mut raised = Vec::new();
        let mut ctx = BehaviorCtx { context: &mut context, event: &ev, active_leaves: &[], args: &[], raised: &mut raised };
        assert!(registry.invoke_guard("isEven", &mut ctx).unwrap());
    }

    #[test]
    fn unknown_behavior_returns_not_found() {
        let registry = BehaviorRegistry::new();
        let mut context = ContextManager::default();
        let ev = event();
        let mut raised = Vec::new();
        let mut ctx = BehaviorCtx {
            context: &mut context,
            event: &ev,
            active_leaves: &[],
            args: &[],
            raised: &mut raised,
        };
        assert!(registry.invoke_action("missing", &mut ctx).is_err());
    }

    #[test]
    fn action_can_raise_events() {
        let mut registry = BehaviorRegistry::new();
        registry.register_action("raiseFollowUp", |ctx| {
            ctx.raised.push(Event {
                event_type: "FOLLOW_UP".into(),
                payload: None,
                source: EventSource::Internal,
                is_transactional: true,
            });
            Ok(())
        });
        let mut context = ContextManager::default();
        let ev = event();
        let mut raised = Vec::new();
        let mut ctx = BehaviorCtx {
            context: &mut context,
            event: &ev,
            active_leaves: &[],
            args: &[],
            raised: &mut raised,
        };
        registry.invoke_action("raiseFollowUp", &mut ctx).unwrap();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].event_type, "FOLLOW_UP");
    }
}
