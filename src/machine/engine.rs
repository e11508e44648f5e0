//! Rule engine: state resolution and transition resolution.
//!
//! `resolve_state` turns a state name into a rendered [`State`] via the
//! machine's resolvers and the markup collaborator. `resolve_transition`
//! walks the machine's ordered rule list, executes the first match, and
//! owns the transition-boundary error contract: failures are routed through
//! the machine's `on_transition_error` hook before anything reaches the
//! caller.

use crate::errors::{CallFlowError, Result};
use crate::render::MarkupRenderer;
use crate::types::{merge_options, CallInput, Options, State, StateName};
use std::sync::Arc;
use tracing::{debug, warn};

use super::definition::StateMachine;
use super::registry::MachineRegistry;
use super::rules::NextAction;

/// Result of one transition, with the recovery hook's involvement made
/// observable to the processor.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub state: State,
    /// `Some(error)` when the transition failed and the recovery hook
    /// produced this state instead.
    pub recovered_from: Option<String>,
}

pub struct RuleEngine {
    registry: Arc<MachineRegistry>,
    renderer: Arc<dyn MarkupRenderer>,
}

impl RuleEngine {
    pub fn new(registry: Arc<MachineRegistry>, renderer: Arc<dyn MarkupRenderer>) -> Self {
        Self { registry, renderer }
    }

    pub fn registry(&self) -> &Arc<MachineRegistry> {
        &self.registry
    }

    /// Resolve a state name into a rendered [`State`].
    ///
    /// Looks up the exact resolver, falls back to the machine's default,
    /// and fails with [`CallFlowError::UndefinedState`] if neither exists.
    pub fn resolve_state(
        &self,
        machine: &StateMachine,
        state: &StateName,
        input: &CallInput,
        options: &Options,
    ) -> Result<State> {
        let resolver =
            machine
                .resolver_for(state)
                .ok_or_else(|| CallFlowError::UndefinedState {
                    machine: machine.id().clone(),
                    state: state.clone(),
                })?;
        let directives = resolver(input, options)?;
        let rendered = self.renderer.render(&directives)?;
        debug!(
            "Resolved state '{}' on machine '{}' ({} directives)",
            state,
            machine.id(),
            directives.len()
        );
        Ok(State::new(
            machine.id().clone(),
            state.clone(),
            options.clone(),
            rendered,
        ))
    }

    /// Resolve one transition from `state` given the request input.
    ///
    /// Rules are evaluated in declaration order; the first match executes.
    /// Any failure while selecting or executing a rule is converted into a
    /// recovery-hook invocation; only a missing or failing hook surfaces to
    /// the caller, as [`CallFlowError::FatalTransition`].
    pub fn resolve_transition(
        &self,
        machine: &StateMachine,
        state: &StateName,
        input: &CallInput,
        options: &Options,
    ) -> Result<Resolution> {
        match self.try_transition(machine, state, input, options) {
            Ok(next) => Ok(Resolution {
                state: next,
                recovered_from: None,
            }),
            Err(err) => self.recover(machine, err, state, input, options),
        }
    }

    fn try_transition(
        &self,
        machine: &StateMachine,
        state: &StateName,
        input: &CallInput,
        options: &Options,
    ) -> Result<State> {
        let rule = machine
            .rules()
            .iter()
            .find(|rule| rule.pattern.matches(state, input, options))
            .ok_or_else(|| CallFlowError::UndefinedTransition {
                machine: machine.id().clone(),
                state: state.clone(),
            })?;

        match &rule.action {
            NextAction::Goto {
                state: next,
                options: updates,
            } => {
                let merged = merge_options(options, updates);
                self.resolve_state(machine, next, input, &merged)
            }
            NextAction::Delegate {
                machine: target,
                state: target_state,
            } => {
                let target_machine = self
                    .registry
                    .get(target)
                    .ok_or_else(|| CallFlowError::UnknownMachine(target.clone()))?;
                let next = target_state
                    .clone()
                    .unwrap_or_else(|| target_machine.initial_state().clone());
                debug!(
                    "Delegating call {} from machine '{}' to '{}' state '{}'",
                    input.call_id,
                    machine.id(),
                    target,
                    next
                );
                self.resolve_state(&target_machine, &next, input, options)
            }
        }
    }

    fn recover(
        &self,
        machine: &StateMachine,
        err: CallFlowError,
        state: &StateName,
        input: &CallInput,
        options: &Options,
    ) -> Result<Resolution> {
        let fatal = |source: CallFlowError| CallFlowError::FatalTransition {
            machine: machine.id().clone(),
            state: state.clone(),
            source: Box::new(source),
        };

        let hook = match machine.on_transition_error() {
            Some(hook) => hook,
            None => return Err(fatal(err)),
        };

        warn!(
            "Transition failed on machine '{}' at state '{}', invoking recovery hook: {}",
            machine.id(),
            state,
            err
        );

        let recovery = hook(&err, state, input, options).map_err(&fatal)?;
        // The hook's options are updates layered over the call's
        // accumulated options, same as a Goto action; recovery must not
        // lose what the application has collected so far.
        let merged = merge_options(options, &recovery.options);
        let recovered = self
            .resolve_state(machine, &recovery.state, input, &merged)
            .map_err(&fatal)?;

        Ok(Resolution {
            state: recovered,
            recovered_from: Some(err.to_string()),
        })
    }
}
