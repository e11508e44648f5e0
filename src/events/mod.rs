//! Lifecycle events and the bus that carries them.

pub mod bus;

pub use bus::{CallEventHandler, EventBus, EventLogger};

use crate::types::{CallId, StateName};
use serde::Serialize;

/// Lifecycle notifications published by the call processor. Carried off
/// the processing path; no subscriber can delay or fail call handling.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallEvent {
    CallStarted {
        call_id: CallId,
        state: StateName,
    },
    Transitioned {
        call_id: CallId,
        from: StateName,
        to: StateName,
    },
    TransitionError {
        call_id: CallId,
        state: StateName,
        error: String,
    },
    CallCompleted {
        call_id: CallId,
        terminal_state: StateName,
    },
}

impl CallEvent {
    pub fn call_id(&self) -> &CallId {
        match self {
            CallEvent::CallStarted { call_id, .. }
            | CallEvent::Transitioned { call_id, .. }
            | CallEvent::TransitionError { call_id, .. }
            | CallEvent::CallCompleted { call_id, .. } => call_id,
        }
    }
}
