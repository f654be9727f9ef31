//! Rendering-independent wizard engine.
//!
//! Hosts describe their steps with [`StepDefinition`]s, seed the engine with
//! previously saved data and forward user actions (`update_field`, `go_next`,
//! `go_back`). The engine owns navigation, validation gates and the final
//! multi-call submission.

pub mod engine;
pub mod masks;
pub mod notify;
pub mod state;
pub mod step;
pub mod submission;

pub use engine::{NextOutcome, Seed, SubmitOutcome, WizardEngine, DEFAULT_COMPLETION_DELAY};
pub use masks::Mask;
pub use notify::{MemoryNotifier, Notice, Notifier, TracingNotifier};
pub use state::{FieldMap, FormData, Position, SubmissionStatus, WizardState};
pub use step::{
    compute_step_sequence, FieldDescriptor, FieldError, FieldKind, StepDefinition, Validator,
    DONE_STEP, LOADING_STEP,
};
pub use submission::{
    execute_plan, CallPhase, PlannedCall, RetainedCaptures, SubmissionFailure, SubmissionPlan,
    SubmissionPlanner, SubmissionReport,
};
