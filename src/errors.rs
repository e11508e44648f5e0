//! Error types for call flow processing

use crate::types::{MachineId, StateName};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CallFlowError {
    /// The inbound request is unusable (e.g. missing call id). Rejected
    /// before the session store is touched.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The machine has no resolver (exact or default) for this state.
    #[error("Machine '{machine}' has no resolver for state '{state}'")]
    UndefinedState { machine: MachineId, state: StateName },

    /// No transition rule matched and no catch-all rule is declared.
    #[error("Machine '{machine}' has no transition rule matching state '{state}'")]
    UndefinedTransition { machine: MachineId, state: StateName },

    /// A delegation target is not registered.
    #[error("Unknown machine: {0}")]
    UnknownMachine(MachineId),

    /// The markup collaborator failed to render a state's directives.
    #[error("Markup rendering failed: {0}")]
    Render(String),

    /// The recovery hook failed, or was absent when a transition error
    /// needed it. The underlying error is preserved as the source.
    #[error("Fatal transition on machine '{machine}' at state '{state}': {source}")]
    FatalTransition {
        machine: MachineId,
        state: StateName,
        #[source]
        source: Box<CallFlowError>,
    },

    /// A state resolver or application hook failed.
    #[error("Resolver error: {0}")]
    Resolver(String),
}

pub type Result<T> = std::result::Result<T, CallFlowError>;
