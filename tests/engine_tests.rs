mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{notifier, values, FakeGateway};
use onboarding_core::errors::{Result, WizardError};
use onboarding_core::remote::{Method, RemoteRequest};
use onboarding_core::wizard::{
    FieldDescriptor, FieldKind, FormData, Mask, NextOutcome, Notice, PlannedCall, Position, Seed,
    StepDefinition, SubmissionPlan, SubmissionStatus, SubmitOutcome, Validator, WizardEngine,
};
use serde_json::json;

fn text(key: &str) -> FieldDescriptor {
    FieldDescriptor::new(key, key, FieldKind::Text, Validator::None)
}

fn definitions() -> Vec<StepDefinition> {
    vec![
        StepDefinition::new(
            "address",
            "Address",
            vec![
                text("cep").with_mask(Mask::Cep).with_required_message("Postal code is required"),
                text("numero").with_required_message("Number is required"),
            ],
        ),
        StepDefinition::new(
            "extra",
            "Extra",
            vec![text("note").with_required_message("Note is required")],
        )
        .included_when(|data| {
            data.get("context")
                .map_or(false, |ctx| ctx.contains_key("extra"))
        }),
        StepDefinition::new("review", "Review", vec![]),
    ]
}

fn patch(path: &str, body: serde_json::Value) -> RemoteRequest {
    RemoteRequest::patch(path, body)
}

fn plan(_: &FormData) -> Result<SubmissionPlan> {
    Ok(SubmissionPlan::new("Saved!")
        .call(PlannedCall::primary("entity", patch("/entity/1", json!({ "a": 1 }))))
        .call(PlannedCall::secondary("side-a", patch("/side/a", json!({}))))
        .call(PlannedCall::secondary("side-b", patch("/side/b", json!({}))))
        .call(PlannedCall::completion("flag", patch("/flag", json!({ "done": true })))))
}

fn engine(gateway: Arc<FakeGateway>) -> WizardEngine {
    WizardEngine::new("test", definitions(), Arc::new(plan), gateway)
        .unwrap()
        .with_completion_delay(Duration::ZERO)
}

fn filled_address() -> Seed {
    Seed::blank().with_values("address", values(json!({ "cep": "01310-100", "numero": "10" })))
}

#[test]
fn sequence_is_fixed_until_refreshed() {
    let mut engine = engine(FakeGateway::new());
    engine.initialize(Seed::blank()).unwrap();
    assert_eq!(engine.state().sequence(), ["address", "review"]);
    assert_eq!(engine.state().position(), Position::Active("address"));

    let extra = Seed::blank().with_values("context", values(json!({ "extra": true })));
    engine.initialize(extra).unwrap();
    assert_eq!(engine.state().sequence(), ["address", "extra", "review"]);
}

#[tokio::test]
async fn next_is_gated_by_validation() {
    let gateway = FakeGateway::new();
    let notices = notifier();
    let mut engine = engine(gateway.clone()).with_notifier(notices.clone());
    engine.initialize(Seed::blank()).unwrap();
    engine.update_field("address", "complemento", "apto 12").unwrap();
    let before = engine.state().form_data().clone();

    let outcome = engine.go_next().await.unwrap();
    assert!(matches!(outcome, NextOutcome::Rejected(ref errors) if errors.len() == 2));
    assert_eq!(engine.state().form_data(), &before);
    assert_eq!(engine.state().current_step(), Some("address"));
    assert_eq!(
        engine.state().validation_errors().get("cep").map(String::as_str),
        Some("Postal code is required")
    );
    assert_eq!(notices.errors(), vec!["Postal code is required".to_string()]);

    engine.update_field("address", "cep", "01310100").unwrap();
    assert!(!engine.state().validation_errors().contains_key("cep"));
    assert!(engine.state().validation_errors().contains_key("numero"));
    assert!(gateway.requests().is_empty());
}

#[tokio::test]
async fn back_navigation_keeps_data() {
    let mut engine = engine(FakeGateway::new());
    engine.initialize(filled_address()).unwrap();
    assert_eq!(engine.go_back(), None);

    assert_eq!(engine.go_next().await.unwrap(), NextOutcome::Advanced("review"));
    let before = engine.state().form_data().clone();
    assert_eq!(engine.go_back(), Some("address"));
    assert_eq!(engine.state().form_data(), &before);
    assert!(engine.state().validation_errors().is_empty());
    assert_eq!(engine.state().submission_status(), SubmissionStatus::Idle);
}

#[tokio::test]
async fn back_navigation_clears_rejection_errors() {
    let mut engine = engine(FakeGateway::new());
    let seed = filled_address().with_values("context", values(json!({ "extra": true })));
    engine.initialize(seed).unwrap();
    assert_eq!(engine.go_next().await.unwrap(), NextOutcome::Advanced("extra"));

    let outcome = engine.go_next().await.unwrap();
    assert!(matches!(outcome, NextOutcome::Rejected(ref errors) if errors.len() == 1));
    assert_eq!(
        engine.state().validation_errors().get("note").map(String::as_str),
        Some("Note is required")
    );
    let before = engine.state().form_data().clone();

    assert_eq!(engine.go_back(), Some("address"));
    assert!(engine.state().validation_errors().is_empty());
    assert_eq!(engine.state().form_data(), &before);
    assert_eq!(engine.state().position(), Position::Active("address"));
    assert_eq!(engine.state().submission_status(), SubmissionStatus::Idle);
}

#[test]
fn repeated_edits_are_idempotent() {
    let mut engine = engine(FakeGateway::new());
    engine.initialize(Seed::blank()).unwrap();
    engine.update_field("address", "cep", "01310100").unwrap();
    let once = engine.state().form_data().clone();
    engine.update_field("address", "cep", "01310100").unwrap();
    assert_eq!(engine.state().form_data(), &once);
    assert_eq!(engine.state().value("address", "cep"), Some(&json!("01310-100")));
}

#[tokio::test]
async fn secondary_failures_still_complete() {
    let gateway = FakeGateway::new();
    gateway.fail(Method::Patch, "/side/a", 500, json!({}));
    let notices = notifier();
    let mut engine = engine(gateway.clone()).with_notifier(notices.clone());
    engine.initialize(filled_address()).unwrap();
    engine.go_next().await.unwrap();

    let outcome = engine.go_next().await.unwrap();
    assert_eq!(outcome, NextOutcome::Submitted(SubmitOutcome::Completed));
    assert_eq!(engine.state().position(), Position::Done);
    assert_eq!(engine.state().submission_status(), SubmissionStatus::Succeeded);
    assert!(gateway.mutated_paths().contains("/flag"));
    assert_eq!(gateway.paths(Method::Patch).last().map(String::as_str), Some("/flag"));
    assert_eq!(notices.notices(), vec![Notice::Success("Saved!".into())]);
    let report = engine.last_report().unwrap();
    assert_eq!(report.best_effort_failures.len(), 1);
    assert!(matches!(engine.update_field("address", "numero", "1"), Err(WizardError::AlreadyDone)));
}

#[tokio::test]
async fn primary_failure_blocks_and_is_recoverable() {
    let gateway = FakeGateway::new();
    gateway.fail(Method::Patch, "/entity/1", 400, json!({ "message": "CPF já cadastrado" }));
    let notices = notifier();
    let fired = Arc::new(AtomicBool::new(false));
    let flag = fired.clone();
    let mut engine = engine(gateway.clone())
        .with_notifier(notices.clone())
        .on_complete(move || flag.store(true, Ordering::SeqCst));
    engine.initialize(filled_address()).unwrap();
    engine.go_next().await.unwrap();

    let outcome = engine.go_next().await.unwrap();
    assert_eq!(
        outcome,
        NextOutcome::Submitted(SubmitOutcome::Failed {
            message: "CPF já cadastrado".into()
        })
    );
    assert_eq!(engine.state().submission_status(), SubmissionStatus::Failed);
    assert_eq!(engine.state().current_step(), Some("review"));
    assert_eq!(gateway.paths(Method::Patch), vec!["/entity/1".to_string()]);
    assert_eq!(notices.errors(), vec!["CPF já cadastrado".to_string()]);
    assert!(!fired.load(Ordering::SeqCst));

    let outcome = engine.go_next().await.unwrap();
    assert!(matches!(outcome, NextOutcome::Submitted(SubmitOutcome::Failed { .. })));
}

#[tokio::test]
async fn completed_seed_short_circuits() {
    let gateway = FakeGateway::new();
    let mut engine = engine(gateway.clone());
    engine.begin_loading().unwrap();
    assert_eq!(engine.state().position().label(), "loading");
    engine.initialize(Seed::completed()).unwrap();
    assert!(engine.state().is_done());
    assert!(engine.state().sequence().is_empty());
    assert!(matches!(engine.go_next().await, Err(WizardError::AlreadyDone)));
    assert!(gateway.requests().is_empty());
}

fn toggled_definitions() -> Vec<StepDefinition> {
    let wants_extra = |data: &FormData| {
        data.get("first").and_then(|values| values.get("toggle")) == Some(&json!("yes"))
    };
    vec![
        StepDefinition::new("first", "First", vec![text("toggle").with_optional()]),
        StepDefinition::new("extra", "Extra", vec![]).included_when(wants_extra),
        StepDefinition::new("last", "Last", vec![]),
    ]
}

#[tokio::test]
async fn refresh_falls_back_to_an_earlier_step() {
    let mut engine =
        WizardEngine::new("test", toggled_definitions(), Arc::new(plan), FakeGateway::new())
            .unwrap();
    engine
        .initialize(Seed::blank().with_values("first", values(json!({ "toggle": "yes" }))))
        .unwrap();
    assert_eq!(engine.go_next().await.unwrap(), NextOutcome::Advanced("extra"));

    engine.update_field("first", "toggle", "no").unwrap();
    assert_eq!(engine.state().sequence(), ["first", "extra", "last"]);

    engine.refresh_sequence().unwrap();
    assert_eq!(engine.state().sequence(), ["first", "last"]);
    assert_eq!(engine.state().current_step(), Some("first"));
}

#[tokio::test(start_paused = true)]
async fn completion_callback_waits_for_display_delay() {
    let gateway = FakeGateway::new();
    let fired = Arc::new(AtomicBool::new(false));
    let flag = fired.clone();
    let mut engine = WizardEngine::new("test", definitions(), Arc::new(plan), gateway)
        .unwrap()
        .on_complete(move || flag.store(true, Ordering::SeqCst));
    engine.initialize(filled_address()).unwrap();
    engine.go_next().await.unwrap();

    let start = tokio::time::Instant::now();
    let outcome = engine.go_next().await.unwrap();
    assert_eq!(outcome, NextOutcome::Submitted(SubmitOutcome::Completed));
    assert!(fired.load(Ordering::SeqCst));
    assert!(start.elapsed() >= Duration::from_millis(800));
}

#[test]
fn invalid_definitions_are_rejected() {
    let duplicate = vec![
        StepDefinition::new("a", "A", vec![]),
        StepDefinition::new("a", "A", vec![]),
    ];
    let err = WizardEngine::new("test", duplicate, Arc::new(plan), FakeGateway::new()).unwrap_err();
    assert!(matches!(err, WizardError::DuplicateStep(_)));
}
