use std::collections::BTreeMap;

use serde_json::Value;

use crate::wizard::step::{FieldError, DONE_STEP, LOADING_STEP};

/// Values of one step, keyed by field name.
pub type FieldMap = serde_json::Map<String, Value>;

/// Accumulated form values, keyed by step id (or an auxiliary context key).
pub type FormData = BTreeMap<String, FieldMap>;

/// Where the wizard currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Uninitialized,
    Loading,
    Active(&'static str),
    Done,
}

impl Position {
    /// Step id as shown to hosts, including the `loading`/`done` pseudo-steps.
    pub fn label(&self) -> &'static str {
        match *self {
            Position::Uninitialized => "uninitialized",
            Position::Loading => LOADING_STEP,
            Position::Active(id) => id,
            Position::Done => DONE_STEP,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    Idle,
    Submitting,
    Succeeded,
    Failed,
}

/// Mutable state threaded through a wizard run.
#[derive(Debug, Clone)]
pub struct WizardState {
    pub(crate) position: Position,
    pub(crate) sequence: Vec<&'static str>,
    pub(crate) form_data: FormData,
    pub(crate) validation_errors: BTreeMap<String, String>,
    pub(crate) submission_status: SubmissionStatus,
}

impl Default for WizardState {
    fn default() -> Self {
        Self {
            position: Position::Uninitialized,
            sequence: Vec::new(),
            form_data: FormData::new(),
            validation_errors: BTreeMap::new(),
            submission_status: SubmissionStatus::Idle,
        }
    }
}

impl WizardState {
    pub fn position(&self) -> Position {
        self.position
    }

    pub fn current_step(&self) -> Option<&'static str> {
        match self.position {
            Position::Active(id) => Some(id),
            _ => None,
        }
    }

    pub fn sequence(&self) -> &[&'static str] {
        &self.sequence
    }

    pub fn form_data(&self) -> &FormData {
        &self.form_data
    }

    pub fn value(&self, step: &str, field: &str) -> Option<&Value> {
        self.form_data.get(step).and_then(|values| values.get(field))
    }

    pub fn validation_errors(&self) -> &BTreeMap<String, String> {
        &self.validation_errors
    }

    pub fn submission_status(&self) -> SubmissionStatus {
        self.submission_status
    }

    pub fn is_done(&self) -> bool {
        self.position == Position::Done
    }

    /// Zero-based index of the active step within the sequence.
    pub fn step_index(&self) -> Option<usize> {
        let current = self.current_step()?;
        self.sequence.iter().position(|id| *id == current)
    }

    pub fn is_first_step(&self) -> bool {
        self.step_index() == Some(0)
    }

    pub fn is_last_step(&self) -> bool {
        matches!(self.step_index(), Some(index) if index + 1 == self.sequence.len())
    }

    /// Fraction of the sequence reached, for display only.
    pub fn progress(&self) -> f32 {
        match self.position {
            Position::Done => 1.0,
            Position::Active(_) => match self.step_index() {
                Some(index) if !self.sequence.is_empty() => {
                    (index + 1) as f32 / self.sequence.len() as f32
                }
                _ => 0.0,
            },
            _ => 0.0,
        }
    }

    pub(crate) fn set_errors(&mut self, errors: &[FieldError]) {
        self.validation_errors = errors
            .iter()
            .map(|error| (error.field.clone(), error.message.clone()))
            .collect();
    }
}
