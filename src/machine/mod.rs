//! State machine definitions and the rule engine that runs them.

pub mod definition;
pub mod engine;
pub mod registry;
pub mod rules;

pub use definition::{
    CompleteHook, MachineBuilder, Recovery, StateMachine, StateResolver, TransitionErrorHook,
};
pub use engine::{Resolution, RuleEngine};
pub use registry::MachineRegistry;
pub use rules::{FieldMatch, MatchPredicate, NextAction, RulePattern, TransitionRule};
