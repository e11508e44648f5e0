//! Call processor: ties one inbound request to its session and drives one
//! transition.
//!
//! For a given call id, requests are processed strictly in arrival order
//! under the store's per-call lock; requests for different calls run fully
//! in parallel. Session updates are all-or-nothing: a failed transition
//! leaves the stored session exactly as it was.

use crate::errors::{CallFlowError, Result};
use crate::events::{CallEvent, EventBus};
use crate::machine::{MachineRegistry, RuleEngine, StateMachine};
use crate::render::MarkupRenderer;
use crate::session::{Session, SessionStore};
use crate::types::{merge_options, CallInput, MachineId, Options, State};
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of one processed request.
#[derive(Debug, Clone)]
pub struct ProcessedCall {
    /// The state whose rendered markup the transport returns to the
    /// provider.
    pub state: State,
    /// True when the transition failed and the machine's recovery hook
    /// produced this state instead.
    pub recovered: bool,
    /// True when this request carried a terminal call status and the
    /// session was completed and removed.
    pub completed: bool,
}

pub struct CallProcessor {
    registry: Arc<MachineRegistry>,
    engine: RuleEngine,
    store: Arc<SessionStore>,
    events: Arc<EventBus>,
}

impl CallProcessor {
    pub fn new(registry: Arc<MachineRegistry>, renderer: Arc<dyn MarkupRenderer>) -> Self {
        let engine = RuleEngine::new(registry.clone(), renderer);
        Self {
            registry,
            engine,
            store: Arc::new(SessionStore::new()),
            events: Arc::new(EventBus::new()),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn registry(&self) -> &Arc<MachineRegistry> {
        &self.registry
    }

    /// Process one provider request against `machine`.
    ///
    /// New call ids are resolved to the machine's initial state; known ids
    /// get one transition from their stored state. A terminal call status
    /// runs the active machine's `on_complete` hook and removes the
    /// session, so a later request with the same id starts a new call.
    pub async fn process(
        &self,
        machine: &MachineId,
        input: CallInput,
        options: Options,
    ) -> Result<ProcessedCall> {
        if input.call_id.as_str().trim().is_empty() {
            return Err(CallFlowError::InvalidInput(
                "request is missing a call id".to_string(),
            ));
        }
        let machine = self
            .registry
            .get(machine)
            .ok_or_else(|| CallFlowError::UnknownMachine(machine.clone()))?;

        let call_id = input.call_id.clone();
        let _guard = self.store.lock(&call_id).await;

        let (state, recovered) = match self.store.get(&call_id) {
            None => {
                debug!("New call {} on machine '{}'", call_id, machine.id());
                // First contact: show the initial state. Input fields like
                // digits only drive transitions, never the first resolve.
                let state = self.engine.resolve_state(
                    &machine,
                    machine.initial_state(),
                    &input,
                    &options,
                )?;
                self.events
                    .publish(CallEvent::CallStarted {
                        call_id: call_id.clone(),
                        state: state.name.clone(),
                    })
                    .await;
                (state, false)
            }
            Some(session) => {
                // The session may have been handed off to another machine;
                // transitions always run on the machine it is parked on.
                let current = self
                    .registry
                    .get(&session.machine)
                    .ok_or_else(|| CallFlowError::UnknownMachine(session.machine.clone()))?;
                let merged = merge_options(&session.options, &options);
                let resolution =
                    self.engine
                        .resolve_transition(&current, &session.state_name, &input, &merged)?;

                match &resolution.recovered_from {
                    Some(error) => {
                        self.events
                            .publish(CallEvent::TransitionError {
                                call_id: call_id.clone(),
                                state: session.state_name.clone(),
                                error: error.clone(),
                            })
                            .await;
                    }
                    None => {
                        self.events
                            .publish(CallEvent::Transitioned {
                                call_id: call_id.clone(),
                                from: session.state_name.clone(),
                                to: resolution.state.name.clone(),
                            })
                            .await;
                    }
                }
                (resolution.state, resolution.recovered_from.is_some())
            }
        };

        let completed = input.call_status.is_terminal();
        if completed {
            self.complete(&state, &input).await;
        } else {
            self.store.upsert(Session::new(
                call_id.clone(),
                state.machine.clone(),
                state.name.clone(),
                state.options.clone(),
            ));
        }

        Ok(ProcessedCall {
            state,
            recovered,
            completed,
        })
    }

    async fn complete(&self, state: &State, input: &CallInput) {
        info!(
            "Call {} ended with status {:?} at state '{}'",
            input.call_id, input.call_status, state.name
        );
        // The hook belongs to the machine the call ended on, which differs
        // from the entry machine after a delegation.
        let owner: Option<Arc<StateMachine>> = self.registry.get(&state.machine);
        if let Some(hook) = owner.as_ref().and_then(|m| m.on_complete()) {
            hook(state, input, &state.options);
        }
        self.events
            .publish(CallEvent::CallCompleted {
                call_id: input.call_id.clone(),
                terminal_state: state.name.clone(),
            })
            .await;
        self.store.delete(&input.call_id);
    }
}
