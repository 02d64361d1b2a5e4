//! `MachineDefinition`: the validated, immutable tree of states and
//! transitions built from a `MachineConfig`.

use crate::config::{BranchConfig, MachineConfig, StateConfig, TransitionConfig};
use hsm_context::ContextSchema;
use hsm_core::{ConfigError, StateType};
use indexmap::IndexMap;
use serde_json::Value as Json;
use std::collections::HashMap;

pub const ALWAYS_EVENT: &str = "@always";

/// One alternative within a matched `TransitionDefinition`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    /// `None` = internal transition: actions run, no exit/entry, no state change.
    pub target: Option<usize>,
    pub guards: Vec<String>,
    pub actions: Vec<String>,
    pub calculators: Vec<String>,
    pub description: Option<String>,
}

/// What a state does with a given event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionDefinition {
    /// Explicitly mapped to `null`: consumes the event, no ancestor fallback,
    /// no state change.
    Forbidden,
    Branches(Vec<Branch>),
}

/// A node in the state tree. Indices (`parent`, children, branch targets)
/// reference other nodes in the same `MachineDefinition` arena — the
/// non-owning back-pointer `parent` avoids a reference cycle.
#[derive(Debug, Clone)]
pub struct StateDefinition {
    pub index: usize,
    pub key: String,
    pub id: String,
    pub path: Vec<String>,
    pub state_type: StateType,
    pub parent: Option<usize>,
    pub children: IndexMap<String, usize>,
    pub initial_child: Option<String>,
    pub entry: Vec<String>,
    pub exit: Vec<String>,
    pub transitions: IndexMap<String, TransitionDefinition>,
    pub meta: Option<Json>,
    pub description: Option<String>,
    pub order: usize,
    pending: IndexMap<String, PendingTransition>,
}

impl StateDefinition {
    pub fn is_leaf_capable(&self) -> bool {
        self.state_type.is_leaf_capable()
    }

    pub fn initial_child_index(&self) -> Option<usize> {
        self.initial_child.as_ref().and_then(|k| self.children.get(k).copied())
    }
}

/// The validated, immutable state-machine definition.
#[derive(Debug, Clone)]
pub struct MachineDefinition {
    pub id: String,
    pub version: u32,
    pub delimiter: String,
    pub context: Option<Json>,
    pub should_persist: bool,
    pub compression: crate::config::CompressionConfig,
    states: Vec<StateDefinition>,
    root: usize,
    event_schemas: HashMap<String, ContextSchema>,
}

struct BuildCtx {
    states: Vec<StateDefinition>,
    delimiter: String,
}

impl MachineDefinition {
    /// Build and validate a definition from a parsed config.
    pub fn define(config: MachineConfig) -> Result<Self, ConfigError> {
        let delimiter = config.delimiter.clone();
        let version = normalize_version(config.version);

        let mut ctx = BuildCtx { states: Vec::new(), delimiter: delimiter.clone() };

        let root_type = infer_type(config.r#type.as_deref(), &config.states, true)?;
        let root_config = StateConfig {
            initial: config.initial.clone(),
            context: None,
            states: config.states.clone(),
            on: config.on.clone(),
            r#type: Some(root_type.as_str().to_string()),
            meta: config.meta.clone(),
            entry: config.entry.clone(),
            exit: config.exit.clone(),
            description: config.description.clone(),
        };

        let root = build_node(&mut ctx, &config.id, vec![], None, &root_config, 0)?;

        let mut def = MachineDefinition {
            id: config.id,
            version,
            delimiter,
            context: config.context,
            should_persist: config.should_persist,
            compression: config.compression,
            states: ctx.states,
            root,
            event_schemas: HashMap::new(),
        };

        def.resolve_transition_targets()?;
        def.validate_invariants()?;
        Ok(def)
    }

    /// Declare the payload schema an event type must satisfy. Checked by
    /// `TransitionEngine::dispatch` before branch selection; an event type
    /// with no declared schema is never validated.
    pub fn with_event_schema(mut self, event_type: impl Into<String>, schema: ContextSchema) -> Self {
        self.event_schemas.insert(event_type.into(), schema);
        self
    }

    pub fn event_schema(&self, event_type: &str) -> Option<&ContextSchema> {
        self.event_schemas.get(event_type)
    }

    pub fn root(&self) -> &StateDefinition {
        &self.states[self.root]
    }

    pub fn root_index(&self) -> usize {
        self.root
    }

    pub fn state(&self, index: usize) -> &StateDefinition {
        &self.states[index]
    }

    pub fn states(&self) -> &[StateDefinition] {
        &self.states
    }

    pub fn state_by_id(&self, id: &str) -> Option<&StateDefinition> {
        self.states.iter().find(|s| s.id == id)
    }

    /// Ordered sequence of ancestor indices from the root down to (and
    /// including) `index`.
    pub fn ancestors(&self, index: usize) -> Vec<usize> {
        let mut chain = vec![index];
        let mut current = index;
        while let Some(parent) = self.states[current].parent {
            chain.push(parent);
            current = parent;
        }
        chain.reverse();
        chain
    }

    /// The least common compound ancestor of two state indices. Falls back
    /// to the root when the states share no closer compound ancestor.
    pub fn lcca(&self, a: usize, b: usize) -> usize {
        let a_chain = self.ancestors(a);
        let b_chain = self.ancestors(b);
        let mut lcca = self.root;
        for (x, y) in a_chain.iter().zip(b_chain.iter()) {
            if x == y {
                lcca = *x;
            } else {
                break;
            }
        }
        lcca
    }

    /// Compute the initial `active_leaves` by descending from `index`
    /// through initial children / parallel regions. Pure structure only —
    /// no entry actions are invoked here (that is `TransitionEngine`'s job).
    pub fn initial_leaves_from(&self, index: usize) -> Vec<usize> {
        let state = &self.states[index];
        match state.state_type {
            StateType::Atomic | StateType::Final => vec![index],
            StateType::Compound => match state.initial_child_index() {
                Some(child) => self.initial_leaves_from(child),
                None => vec![index],
            },
            StateType::Parallel => {
                state.children.values().flat_map(|&child| self.initial_leaves_from(child)).collect()
            }
        }
    }

    /// Resolve a possibly-ambiguous partial state id.
    pub fn resolve_state_by_string(
        &self,
        query: &str,
    ) -> Result<Option<&StateDefinition>, hsm_core::AmbiguousState> {
        let trimmed = query.strip_prefix(&self.delimiter).unwrap_or(query);
        let query_segs: Vec<&str> =
            if trimmed.is_empty() { vec![] } else { trimmed.split(&self.delimiter as &str).collect() };

        let matches: Vec<&StateDefinition> = self
            .states
            .iter()
            .filter(|s| {
                let id_segs: Vec<&str> = s.id.split(&self.delimiter as &str).collect();
                query_segs.len() <= id_segs.len()
                    && id_segs[id_segs.len() - query_segs.len()..] == query_segs[..]
            })
            .collect();

        match matches.len() {
            0 => Ok(None),
            1 => Ok(Some(matches[0])),
            _ => Err(hsm_core::AmbiguousState {
                query: query.to_string(),
                matches: matches.into_iter().map(|s| s.id.clone()).collect(),
            }),
        }
    }

    fn resolve_transition_targets(&mut self) -> Result<(), ConfigError> {
        let raw: Vec<(usize, IndexMap<String, PendingTransition>)> =
            self.states.iter().map(|s| (s.index, s.pending.clone())).collect();

        for (state_index, transitions) in raw {
            let mut resolved = IndexMap::new();
            for (event, pending) in transitions {
                let def = match pending {
                    PendingTransition::Forbidden => TransitionDefinition::Forbidden,
                    PendingTransition::Branches(branch_configs) => {
                        let mut branches = Vec::with_capacity(branch_configs.len());
                        for b in branch_configs {
                            let target = match &b.target {
                                None => None,
                                Some(t) => Some(self.resolve_target(state_index, &event, t)?),
                            };
                            branches.push(Branch {
                                target,
                                guards: b.guards,
                                actions: b.actions,
                                calculators: b.calculators,
                                description: b.description,
                            });
                        }
                        TransitionDefinition::Branches(branches)
                    }
                };
                resolved.insert(event, def);
            }
            self.states[state_index].transitions = resolved;
        }
        Ok(())
    }

    fn resolve_target(&self, state_index: usize, event: &str, target: &str) -> Result<usize, ConfigError> {
        match self.resolve_state_by_string(target) {
            Ok(Some(s)) => Ok(s.index),
            Ok(None) | Err(_) => Err(ConfigError::UnresolvedTarget {
                state: self.states[state_index].id.clone(),
                event: event.to_string(),
                target: target.to_string(),
            }),
        }
    }

    fn validate_invariants(&self) -> Result<(), ConfigError> {
        for state in &self.states {
            match state.state_type {
                StateType::Final => {
                    if !state.children.is_empty() {
                        return Err(ConfigError::FinalStateHasChildren { state: state.id.clone() });
                    }
                    if !state.transitions.is_empty() {
                        return Err(ConfigError::FinalStateHasTransitions { state: state.id.clone() });
                    }
                }
                StateType::Parallel => {
                    if state.children.is_empty() {
                        return Err(ConfigError::ParallelStateEmpty { state: state.id.clone() });
                    }
                    if state.initial_child.is_some() {
                        return Err(ConfigError::ParallelStateHasInitial { state: state.id.clone() });
                    }
                    for (region_key, &region_idx) in &state.children {
                        let region = &self.states[region_idx];
                        if region.state_type != StateType::Compound {
                            return Err(ConfigError::ParallelRegionNotCompound {
                                state: state.id.clone(),
                                region: region_key.clone(),
                            });
                        }
                    }
                }
                StateType::Compound => {
                    if state.initial_child.is_none() {
                        return Err(ConfigError::CompoundStateMissingInitial { state: state.id.clone() });
                    }
                }
                StateType::Atomic => {}
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum PendingTransition {
    Forbidden,
    Branches(Vec<BranchConfig>),
}

/// Parse a state's raw `on` value, attaching `state` context to any
/// structural error. `on`'s declared type is a catch-all `Json` rather than
/// a typed map precisely so this function — not serde — gets to decide
/// what a non-mapping `on` means.
fn parse_on(state: &str, on: &Json) -> Result<IndexMap<String, TransitionConfig>, ConfigError> {
    match on {
        Json::Object(map) => {
            let mut parsed = IndexMap::new();
            for (event, value) in map {
                parsed.insert(event.clone(), TransitionConfig::from_json_value(value.clone()));
            }
            Ok(parsed)
        }
        _ => Err(ConfigError::OnNotAMapping { state: state.to_string() }),
    }
}

fn to_pending(state: &str, event: &str, cfg: TransitionConfig) -> Result<PendingTransition, ConfigError> {
    match cfg {
        TransitionConfig::Target(None) => Ok(PendingTransition::Forbidden),
        TransitionConfig::Target(Some(t)) => Ok(PendingTransition::Branches(vec![BranchConfig {
            target: Some(t),
            guards: vec![],
            actions: vec![],
            calculators: vec![],
            description: None,
            extra: IndexMap::new(),
        }])),
        TransitionConfig::Branch(b) => {
            reject_unknown_branch_key(event, &b)?;
            Ok(PendingTransition::Branches(vec![b]))
        }
        TransitionConfig::Branches(bs) => {
            for b in &bs {
                reject_unknown_branch_key(event, b)?;
            }
            Ok(PendingTransition::Branches(bs))
        }
        TransitionConfig::Invalid(_) => {
            Err(ConfigError::InvalidTransitionValue { state: state.to_string(), event: event.to_string() })
        }
    }
}

fn reject_unknown_branch_key(event: &str, branch: &BranchConfig) -> Result<(), ConfigError> {
    if let Some((key, _)) = branch.extra.iter().next() {
        return Err(ConfigError::UnknownTransitionKey { event: event.to_string(), key: key.clone() });
    }
    Ok(())
}

fn normalize_version(version: i64) -> u32 {
    if version <= 0 {
        1
    } else {
        version as u32
    }
}

fn infer_type(
    declared: Option<&str>,
    children: &IndexMap<String, StateConfig>,
    is_root: bool,
) -> Result<StateType, ConfigError> {
    match declared {
        Some(s) => s.parse().map_err(|_| ConfigError::InvalidStateType(s.to_string())),
        None => {
            if is_root || !children.is_empty() {
                Ok(StateType::Compound)
            } else {
                Ok(StateType::Atomic)
            }
        }
    }
}

fn build_node(
    ctx: &mut BuildCtx,
    key: &str,
    path: Vec<String>,
    parent: Option<usize>,
    config: &StateConfig,
    order: usize,
) -> Result<usize, ConfigError> {
    let mut full_path = path;
    full_path.push(key.to_string());
    let id = full_path.join(&ctx.delimiter);

    let state_type = infer_type(config.r#type.as_deref(), &config.states, false)?;

    let mut pending: IndexMap<String, PendingTransition> = IndexMap::new();
    for (event, cfg) in parse_on(&id, &config.on)? {
        pending.insert(event.clone(), to_pending(&id, &event, cfg)?);
    }

    let index = ctx.states.len();
    ctx.states.push(StateDefinition {
        index,
        key: key.to_string(),
        id: id.clone(),
        path: full_path.clone(),
        state_type,
        parent,
        children: IndexMap::new(),
        initial_child: config.initial.clone(),
        entry: config.entry.clone().map(|r| r.into_vec()).unwrap_or_default(),
        exit: config.exit.clone().map(|r| r.into_vec()).unwrap_or_default(),
        transitions: IndexMap::new(),
        meta: config.meta.clone(),
        description: config.description.clone(),
        order,
        pending,
    });

    let mut child_order = 0usize;
    let mut children = IndexMap::new();
    for (child_key, child_config) in &config.states {
        if children.contains_key(child_key) {
            return Err(ConfigError::DuplicateChildKey { state: id.clone(), key: child_key.clone() });
        }
        let child_index = build_node(ctx, child_key, full_path.clone(), Some(index), child_config, child_order)?;
        children.insert(child_key.clone(), child_index);
        child_order += 1;
    }
    ctx.states[index].children = children;

    if let Some(initial_key) = &config.initial {
        if !ctx.states[index].children.contains_key(initial_key) {
            return Err(ConfigError::InitialNotAChild { state: id.clone(), initial: initial_key.clone() });
        }
    } else if state_type == StateType::Compound {
        if let Some((first_key, _)) = ctx.states[index].children.first() {
            ctx.states[index].initial_child = Some(first_key.clone());
        }
    }

    Ok(index)
}
