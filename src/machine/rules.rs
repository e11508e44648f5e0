//! Transition rules and pattern matching.
//!
//! A machine's rules form an ordered list; the first rule whose pattern
//! matches the `(state, input, options)` triple wins, and declaration order
//! is the tie-break contract. A pattern with no field constraints is a
//! catch-all for its state and should be declared last.

use crate::types::{CallInput, MachineId, Options, StateName};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Predicate applied to one input or option field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MatchPredicate {
    /// Field must exist and equal this value.
    Equals(Value),
    /// Field must exist; any value accepted.
    Present,
}

/// A single field constraint within a pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMatch {
    pub key: String,
    pub predicate: MatchPredicate,
}

impl FieldMatch {
    fn matches_str(&self, actual: Option<&str>) -> bool {
        match (&self.predicate, actual) {
            (MatchPredicate::Present, Some(_)) => true,
            (MatchPredicate::Equals(expected), Some(actual)) => value_matches(expected, actual),
            (_, None) => false,
        }
    }

    fn matches_value(&self, actual: Option<&Value>) -> bool {
        match (&self.predicate, actual) {
            (MatchPredicate::Present, Some(_)) => true,
            (MatchPredicate::Equals(expected), Some(actual)) => expected == actual,
            (_, None) => false,
        }
    }
}

/// Compare a pattern value against a provider field, which is always a
/// string on the wire.
fn value_matches(expected: &Value, actual: &str) -> bool {
    match expected {
        Value::String(s) => s == actual,
        Value::Number(n) => n.to_string() == actual,
        Value::Bool(b) => b.to_string() == actual,
        _ => false,
    }
}

/// Pattern over `(state, input, options)`.
///
/// The state name must match exactly; input and option constraints narrow
/// the match further. Matching is deterministic and side-effect-free.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulePattern {
    pub state: StateName,
    pub input: Vec<FieldMatch>,
    pub options: Vec<FieldMatch>,
}

impl RulePattern {
    pub fn on(state: impl Into<StateName>) -> Self {
        Self {
            state: state.into(),
            input: Vec::new(),
            options: Vec::new(),
        }
    }

    pub fn when_input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.input.push(FieldMatch {
            key: key.into(),
            predicate: MatchPredicate::Equals(value.into()),
        });
        self
    }

    pub fn when_input_present(mut self, key: impl Into<String>) -> Self {
        self.input.push(FieldMatch {
            key: key.into(),
            predicate: MatchPredicate::Present,
        });
        self
    }

    pub fn when_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.push(FieldMatch {
            key: key.into(),
            predicate: MatchPredicate::Equals(value.into()),
        });
        self
    }

    pub fn when_option_present(mut self, key: impl Into<String>) -> Self {
        self.options.push(FieldMatch {
            key: key.into(),
            predicate: MatchPredicate::Present,
        });
        self
    }

    /// True when the pattern constrains nothing beyond the state name.
    pub fn is_catch_all(&self) -> bool {
        self.input.is_empty() && self.options.is_empty()
    }

    pub fn matches(&self, state: &StateName, input: &CallInput, options: &Options) -> bool {
        if &self.state != state {
            return false;
        }
        if !self.input.iter().all(|m| m.matches_str(input.field(&m.key))) {
            return false;
        }
        self.options
            .iter()
            .all(|m| m.matches_value(options.get(&m.key)))
    }
}

/// What a matched rule does.
#[derive(Debug, Clone)]
pub enum NextAction {
    /// Render a state on the same machine, merging in option updates.
    Goto {
        state: StateName,
        options: Options,
    },
    /// Hand the call to another machine's named or initial state.
    Delegate {
        machine: MachineId,
        state: Option<StateName>,
    },
}

impl NextAction {
    pub fn goto(state: impl Into<StateName>) -> Self {
        NextAction::Goto {
            state: state.into(),
            options: Options::new(),
        }
    }

    pub fn goto_with(state: impl Into<StateName>, options: Options) -> Self {
        NextAction::Goto {
            state: state.into(),
            options,
        }
    }

    pub fn delegate(machine: impl Into<MachineId>) -> Self {
        NextAction::Delegate {
            machine: machine.into(),
            state: None,
        }
    }

    pub fn delegate_to(machine: impl Into<MachineId>, state: impl Into<StateName>) -> Self {
        NextAction::Delegate {
            machine: machine.into(),
            state: Some(state.into()),
        }
    }
}

/// One entry in a machine's ordered rule list.
#[derive(Debug, Clone)]
pub struct TransitionRule {
    pub pattern: RulePattern,
    pub action: NextAction,
}
