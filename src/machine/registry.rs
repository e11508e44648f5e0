//! Registry of machine definitions.
//!
//! Cross-machine delegation is a lookup-and-call through this registry, so
//! machines reference each other by id rather than by module.

use crate::types::MachineId;
use dashmap::DashMap;
use std::sync::Arc;

use super::definition::StateMachine;
use super::rules::NextAction;

#[derive(Default)]
pub struct MachineRegistry {
    machines: DashMap<MachineId, Arc<StateMachine>>,
}

impl MachineRegistry {
    pub fn new() -> Self {
        Self {
            machines: DashMap::new(),
        }
    }

    pub fn register(&self, machine: Arc<StateMachine>) {
        tracing::debug!("Registered machine '{}'", machine.id());
        self.machines.insert(machine.id().clone(), machine);
    }

    pub fn get(&self, id: &MachineId) -> Option<Arc<StateMachine>> {
        self.machines.get(id).map(|m| m.value().clone())
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    /// Validate every registered machine, including delegation targets,
    /// which can only be checked once all machines are known.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for entry in self.machines.iter() {
            let machine = entry.value();
            if let Err(machine_errors) = machine.validate() {
                errors.extend(machine_errors);
            }

            for rule in machine.rules() {
                if let NextAction::Delegate { machine: target, state } = &rule.action {
                    match self.machines.get(target) {
                        None => errors.push(format!(
                            "Machine '{}': delegation target '{}' is not registered",
                            machine.id(),
                            target
                        )),
                        Some(target_machine) => {
                            let state = state.as_ref().unwrap_or(target_machine.initial_state());
                            if target_machine.resolver_for(state).is_none() {
                                errors.push(format!(
                                    "Machine '{}': delegation to '{}' targets unresolvable state '{}'",
                                    machine.id(),
                                    target,
                                    state
                                ));
                            }
                        }
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
