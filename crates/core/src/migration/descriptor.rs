//! Static description of a migration: its states and its steps.

use serde::{Deserialize, Serialize};

use super::error::MigrationError;

/// A state a migration's data can be in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDescriptor {
    pub id: String,
    pub description: String,
}

/// A named, idempotent unit of migration work moving data between two states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDescriptor {
    pub id: String,
    pub from_state: String,
    pub to_state: String,
    pub description: String,
}

/// Identity, states and steps of a migration.
///
/// States are kept in declaration order, which is the order the data
/// progresses through (oldest first). State deduction relies on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationDescriptor {
    pub id: String,
    pub description: String,
    pub states: Vec<StateDescriptor>,
    pub steps: Vec<StepDescriptor>,
}

impl MigrationDescriptor {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            states: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// Declare the next state. Call in progression order.
    pub fn with_state(mut self, id: impl Into<String>, description: impl Into<String>) -> Self {
        self.states.push(StateDescriptor {
            id: id.into(),
            description: description.into(),
        });
        self
    }

    pub fn with_step(
        mut self,
        id: impl Into<String>,
        from_state: impl Into<String>,
        to_state: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.steps.push(StepDescriptor {
            id: id.into(),
            from_state: from_state.into(),
            to_state: to_state.into(),
            description: description.into(),
        });
        self
    }

    pub fn step(&self, id: &str) -> Option<&StepDescriptor> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn has_state(&self, id: &str) -> bool {
        self.states.iter().any(|s| s.id == id)
    }

    /// State ids in declaration order.
    pub fn state_ids(&self) -> impl Iterator<Item = &str> {
        self.states.iter().map(|s| s.id.as_str())
    }

    /// Look up a step, failing with [`MigrationError::UnknownStep`].
    pub fn require_step(&self, id: &str) -> Result<&StepDescriptor, MigrationError> {
        self.step(id).ok_or_else(|| MigrationError::UnknownStep {
            migration: self.id.clone(),
            step: id.to_string(),
        })
    }

    /// Check the descriptor is internally consistent.
    pub fn validate(&self) -> Result<(), MigrationError> {
        let invalid = |reason: String| MigrationError::InvalidDescriptor {
            migration: self.id.clone(),
            reason,
        };

        if self.id.trim().is_empty() {
            return Err(invalid("migration id is empty".to_string()));
        }
        if self.states.is_empty() {
            return Err(invalid("no state declared".to_string()));
        }

        for (i, state) in self.states.iter().enumerate() {
            if self.states[..i].iter().any(|s| s.id == state.id) {
                return Err(invalid(format!("duplicate state {}", state.id)));
            }
        }

        for (i, step) in self.steps.iter().enumerate() {
            if self.steps[..i].iter().any(|s| s.id == step.id) {
                return Err(invalid(format!("duplicate step {}", step.id)));
            }
            for state in [&step.from_state, &step.to_state] {
                if !self.has_state(state) {
                    return Err(invalid(format!(
                        "step {} refers to undeclared state {}",
                        step.id, state
                    )));
                }
            }
        }

        Ok(())
    }
}
