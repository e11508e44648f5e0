//! State machine definitions.
//!
//! A [`StateMachine`] is a named, immutable registry built once at
//! application startup via [`MachineBuilder`]: state resolvers, an ordered
//! transition rule list, and the `on_complete` / `on_transition_error`
//! lifecycle hooks.

use crate::errors::{CallFlowError, Result};
use crate::render::Directive;
use crate::types::{CallInput, MachineId, Options, State, StateName};
use std::collections::HashMap;
use std::sync::Arc;

use super::rules::{NextAction, RulePattern, TransitionRule};

/// Maps `(input, options)` to the directives describing one state.
pub type StateResolver = Arc<dyn Fn(&CallInput, &Options) -> Result<Vec<Directive>> + Send + Sync>;

/// Side-effect hook invoked once when a call reaches a terminal status.
pub type CompleteHook = Arc<dyn Fn(&State, &CallInput, &Options) + Send + Sync>;

/// Recovery hook invoked when a transition fails; returns the state to
/// render instead.
pub type TransitionErrorHook =
    Arc<dyn Fn(&CallFlowError, &StateName, &CallInput, &Options) -> Result<Recovery> + Send + Sync>;

/// Target returned by a recovery hook. The rule engine resolves it through
/// the normal state-resolution path so the rendered-markup invariant holds.
#[derive(Debug, Clone)]
pub struct Recovery {
    pub state: StateName,
    pub options: Options,
}

impl Recovery {
    pub fn to_state(state: impl Into<StateName>, options: Options) -> Self {
        Self {
            state: state.into(),
            options,
        }
    }
}

/// A complete, immutable state machine definition.
pub struct StateMachine {
    id: MachineId,
    initial_state: StateName,
    resolvers: HashMap<StateName, StateResolver>,
    default_resolver: Option<StateResolver>,
    rules: Vec<TransitionRule>,
    on_complete: Option<CompleteHook>,
    on_transition_error: Option<TransitionErrorHook>,
}

impl StateMachine {
    pub fn id(&self) -> &MachineId {
        &self.id
    }

    pub fn initial_state(&self) -> &StateName {
        &self.initial_state
    }

    /// Exact resolver for the state, falling back to the machine's default.
    pub fn resolver_for(&self, state: &StateName) -> Option<&StateResolver> {
        self.resolvers
            .get(state)
            .or(self.default_resolver.as_ref())
    }

    pub fn rules(&self) -> &[TransitionRule] {
        &self.rules
    }

    pub fn on_complete(&self) -> Option<&CompleteHook> {
        self.on_complete.as_ref()
    }

    pub fn on_transition_error(&self) -> Option<&TransitionErrorHook> {
        self.on_transition_error.as_ref()
    }

    /// Structural checks over the definition. Delegation targets are
    /// checked at the registry level, where all machines are known.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.resolver_for(&self.initial_state).is_none() {
            errors.push(format!(
                "Machine '{}': initial state '{}' has no resolver",
                self.id, self.initial_state
            ));
        }

        // Goto targets must be resolvable on this machine.
        for rule in &self.rules {
            if let NextAction::Goto { state, .. } = &rule.action {
                if self.resolver_for(state).is_none() {
                    errors.push(format!(
                        "Machine '{}': rule on state '{}' targets unresolvable state '{}'",
                        self.id, rule.pattern.state, state
                    ));
                }
            }
        }

        // A catch-all shadows every later rule for the same state.
        let mut catch_all_seen: Vec<&StateName> = Vec::new();
        for rule in &self.rules {
            if catch_all_seen.contains(&&rule.pattern.state) {
                errors.push(format!(
                    "Machine '{}': rule on state '{}' is unreachable behind an earlier catch-all",
                    self.id, rule.pattern.state
                ));
            }
            if rule.pattern.is_catch_all() {
                catch_all_seen.push(&rule.pattern.state);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl std::fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine")
            .field("id", &self.id)
            .field("initial_state", &self.initial_state)
            .field("states", &self.resolvers.keys().collect::<Vec<_>>())
            .field("rules", &self.rules.len())
            .finish()
    }
}

/// Builder for [`StateMachine`] definitions.
pub struct MachineBuilder {
    id: MachineId,
    initial_state: StateName,
    resolvers: HashMap<StateName, StateResolver>,
    default_resolver: Option<StateResolver>,
    rules: Vec<TransitionRule>,
    on_complete: Option<CompleteHook>,
    on_transition_error: Option<TransitionErrorHook>,
}

impl MachineBuilder {
    pub fn new(id: impl Into<MachineId>, initial_state: impl Into<StateName>) -> Self {
        Self {
            id: id.into(),
            initial_state: initial_state.into(),
            resolvers: HashMap::new(),
            default_resolver: None,
            rules: Vec::new(),
            on_complete: None,
            on_transition_error: None,
        }
    }

    /// Register a resolver for an exact state name.
    pub fn state<F>(mut self, name: impl Into<StateName>, resolver: F) -> Self
    where
        F: Fn(&CallInput, &Options) -> Result<Vec<Directive>> + Send + Sync + 'static,
    {
        self.resolvers.insert(name.into(), Arc::new(resolver));
        self
    }

    /// Register the fallback resolver used when no exact state matches.
    pub fn default_state<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&CallInput, &Options) -> Result<Vec<Directive>> + Send + Sync + 'static,
    {
        self.default_resolver = Some(Arc::new(resolver));
        self
    }

    /// Append a transition rule. Declaration order is evaluation order.
    pub fn rule(mut self, pattern: RulePattern, action: NextAction) -> Self {
        self.rules.push(TransitionRule { pattern, action });
        self
    }

    pub fn on_complete<F>(mut self, hook: F) -> Self
    where
        F: Fn(&State, &CallInput, &Options) + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(hook));
        self
    }

    pub fn on_transition_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&CallFlowError, &StateName, &CallInput, &Options) -> Result<Recovery>
            + Send
            + Sync
            + 'static,
    {
        self.on_transition_error = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Arc<StateMachine> {
        Arc::new(StateMachine {
            id: self.id,
            initial_state: self.initial_state,
            resolvers: self.resolvers,
            default_resolver: self.default_resolver,
            rules: self.rules,
            on_complete: self.on_complete,
            on_transition_error: self.on_transition_error,
        })
    }
}
