use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use uuid::Uuid;

use crate::errors::{Result, WizardError};
use crate::remote::RemoteGateway;
use crate::wizard::notify::{Notice, Notifier, TracingNotifier};
use crate::wizard::state::{FieldMap, FormData, Position, SubmissionStatus, WizardState};
use crate::wizard::step::{check_definitions, compute_step_sequence, FieldError, StepDefinition};
use crate::wizard::submission::{
    execute_plan, RetainedCaptures, SubmissionPlanner, SubmissionReport,
};

/// Pause between the success notice and the completion callback.
pub const DEFAULT_COMPLETION_DELAY: Duration = Duration::from_millis(800);

pub type CompletionCallback = Box<dyn FnOnce() + Send>;

/// Initial data for a wizard run, usually built from a one-time fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Seed {
    /// The owner already finished this flow; the wizard goes straight to `done`.
    pub completed: bool,
    pub form_data: FormData,
}

impl Seed {
    pub fn blank() -> Self {
        Self::default()
    }

    pub fn completed() -> Self {
        Self {
            completed: true,
            form_data: FormData::new(),
        }
    }

    pub fn with_values(mut self, key: impl Into<String>, values: FieldMap) -> Self {
        self.form_data.entry(key.into()).or_default().extend(values);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Completed,
    Failed { message: String },
}

/// Result of a forward-navigation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextOutcome {
    Advanced(&'static str),
    Rejected(Vec<FieldError>),
    Submitted(SubmitOutcome),
}

/// Drives one wizard run: step sequence, validation gates and submission.
pub struct WizardEngine {
    id: Uuid,
    name: &'static str,
    definitions: Vec<StepDefinition>,
    state: WizardState,
    planner: Arc<dyn SubmissionPlanner>,
    gateway: Arc<dyn RemoteGateway>,
    notifier: Arc<dyn Notifier>,
    on_complete: Option<CompletionCallback>,
    completion_delay: Duration,
    last_report: Option<SubmissionReport>,
    retained: RetainedCaptures,
}

impl WizardEngine {
    pub fn new(
        name: &'static str,
        definitions: Vec<StepDefinition>,
        planner: Arc<dyn SubmissionPlanner>,
        gateway: Arc<dyn RemoteGateway>,
    ) -> Result<Self> {
        check_definitions(&definitions)?;
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            definitions,
            state: WizardState::default(),
            planner,
            gateway,
            notifier: Arc::new(TracingNotifier),
            on_complete: None,
            completion_delay: DEFAULT_COMPLETION_DELAY,
            last_report: None,
            retained: RetainedCaptures::default(),
        })
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_completion_delay(mut self, delay: Duration) -> Self {
        self.completion_delay = delay;
        self
    }

    /// Callback fired once, after a successful submission and the display delay.
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    pub fn definitions(&self) -> &[StepDefinition] {
        &self.definitions
    }

    pub fn definition(&self, id: &str) -> Option<&StepDefinition> {
        self.definitions.iter().find(|definition| definition.id == id)
    }

    pub fn current_definition(&self) -> Option<&StepDefinition> {
        self.state.current_step().and_then(|id| self.definition(id))
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub fn notify(&self, notice: Notice) {
        self.notifier.notify(notice);
    }

    /// Report of the last successful submission.
    pub fn last_report(&self) -> Option<&SubmissionReport> {
        self.last_report.as_ref()
    }

    /// Marks the wizard as fetching its seed.
    pub fn begin_loading(&mut self) -> Result<()> {
        self.ensure_not_done()?;
        self.state.position = Position::Loading;
        tracing::debug!(wizard = self.name, id = %self.id, "loading seed");
        Ok(())
    }

    pub fn initialize(&mut self, seed: Seed) -> Result<()> {
        self.ensure_not_done()?;
        self.state = WizardState::default();
        self.retained = RetainedCaptures::default();

        if seed.completed {
            tracing::info!(wizard = self.name, id = %self.id, "flow already completed, skipping");
            self.state.position = Position::Done;
            return Ok(());
        }

        self.state.form_data = seed.form_data;
        let sequence = compute_step_sequence(&self.definitions, &self.state.form_data);
        let first = *sequence.first().ok_or(WizardError::EmptySequence)?;
        tracing::debug!(wizard = self.name, id = %self.id, ?sequence, "wizard initialized");
        self.state.sequence = sequence;
        self.state.position = Position::Active(first);
        Ok(())
    }

    /// Recomputes the step sequence from the current form data. When the
    /// active step drops out, the nearest earlier step that remains becomes
    /// active (or the first step when none precedes it).
    pub fn refresh_sequence(&mut self) -> Result<()> {
        let current = self.active_step()?;
        let sequence = compute_step_sequence(&self.definitions, &self.state.form_data);
        let first = *sequence.first().ok_or(WizardError::EmptySequence)?;

        if !sequence.contains(&current) {
            let declared = |id: &str| self.definitions.iter().position(|d| d.id == id);
            let current_rank = declared(current);
            let fallback = sequence
                .iter()
                .rev()
                .find(|id| declared(**id) < current_rank)
                .copied()
                .unwrap_or(first);
            tracing::debug!(
                wizard = self.name,
                from = current,
                to = fallback,
                "active step left the sequence"
            );
            self.state.position = Position::Active(fallback);
            self.state.validation_errors.clear();
        }
        self.state.sequence = sequence;
        Ok(())
    }

    /// Merges a field value into `step`'s data, applying the field's mask and
    /// clearing any error reported for that field.
    pub fn update_field(&mut self, step: &str, field: &str, value: impl Into<Value>) -> Result<()> {
        self.ensure_not_done()?;
        let definition = self
            .definition(step)
            .ok_or_else(|| WizardError::UnknownStep(step.to_string()))?;
        let value = value.into();
        let value = match definition.field(&self.state.form_data, field) {
            Some(descriptor) => descriptor.normalize(value),
            None => value,
        };
        self.state
            .form_data
            .entry(step.to_string())
            .or_default()
            .insert(field.to_string(), value);
        self.state.validation_errors.remove(field);
        Ok(())
    }

    /// Validates the active step, then advances or, from the last step, submits.
    pub async fn go_next(&mut self) -> Result<NextOutcome> {
        let current = self.active_step()?;
        let errors = self
            .definition(current)
            .map(|definition| definition.validate(&self.state.form_data))
            .unwrap_or_default();

        if let Some(first) = errors.first() {
            tracing::debug!(
                wizard = self.name,
                step = current,
                errors = errors.len(),
                "step rejected"
            );
            self.notifier.notify(Notice::Error(first.message.clone()));
            self.state.set_errors(&errors);
            return Ok(NextOutcome::Rejected(errors));
        }

        self.state.validation_errors.clear();
        if self.state.is_last_step() {
            let outcome = self.submit().await?;
            return Ok(NextOutcome::Submitted(outcome));
        }

        let next = self
            .state
            .step_index()
            .and_then(|index| self.state.sequence.get(index + 1).copied())
            .ok_or(WizardError::NoActiveStep)?;
        tracing::debug!(wizard = self.name, from = current, to = next, "advanced");
        self.state.position = Position::Active(next);
        Ok(NextOutcome::Advanced(next))
    }

    /// Moves to the previous step without validating. Returns the step moved to.
    pub fn go_back(&mut self) -> Option<&'static str> {
        let index = self.state.step_index()?;
        if index == 0 {
            return None;
        }
        let previous = self.state.sequence[index - 1];
        self.state.position = Position::Active(previous);
        self.state.validation_errors.clear();
        Some(previous)
    }

    /// Runs the submission plan built from the collected data. Values captured
    /// by calls that succeeded on a failed attempt are reused on the next one.
    pub async fn submit(&mut self) -> Result<SubmitOutcome> {
        self.active_step()?;
        if self.state.submission_status == SubmissionStatus::Submitting {
            return Err(WizardError::SubmissionInProgress);
        }
        self.state.submission_status = SubmissionStatus::Submitting;
        tracing::info!(wizard = self.name, id = %self.id, "submitting");

        let plan = match self.planner.plan(&self.state.form_data) {
            Ok(plan) => plan,
            Err(err) => {
                let message = match err {
                    WizardError::Plan(message) => message,
                    other => other.to_string(),
                };
                return Ok(self.fail_submission(message));
            }
        };

        match execute_plan(self.gateway.as_ref(), &plan, &self.retained).await {
            Ok(report) => {
                self.retained = RetainedCaptures::default();
                self.state.submission_status = SubmissionStatus::Succeeded;
                self.state.position = Position::Done;
                self.last_report = Some(report);
                tracing::info!(wizard = self.name, id = %self.id, "submission succeeded");
                self.notifier.notify(Notice::Success(plan.success_message.clone()));

                if let Some(callback) = self.on_complete.take() {
                    if !self.completion_delay.is_zero() {
                        tokio::time::sleep(self.completion_delay).await;
                    }
                    callback();
                }
                Ok(SubmitOutcome::Completed)
            }
            Err(failure) => {
                self.retained = failure.retained;
                Ok(self.fail_submission(failure.message))
            }
        }
    }

    fn fail_submission(&mut self, message: String) -> SubmitOutcome {
        tracing::warn!(wizard = self.name, id = %self.id, %message, "submission failed");
        self.state.submission_status = SubmissionStatus::Failed;
        self.notifier.notify(Notice::Error(message.clone()));
        SubmitOutcome::Failed { message }
    }

    fn active_step(&self) -> Result<&'static str> {
        match self.state.position {
            Position::Active(id) => Ok(id),
            Position::Done => Err(WizardError::AlreadyDone),
            _ => Err(WizardError::NoActiveStep),
        }
    }

    fn ensure_not_done(&self) -> Result<()> {
        if self.state.is_done() {
            Err(WizardError::AlreadyDone)
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for WizardEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WizardEngine")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .finish()
    }
}
