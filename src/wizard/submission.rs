//! Ordered, multi-call submission with declared blocking semantics.
//!
//! A [`SubmissionPlan`] lists remote calls in three phases. Primary calls run
//! one after another, secondary calls run concurrently once every primary
//! call succeeded, and completion calls run after every secondary call has
//! settled. Each call declares whether it is `required`: a required failure
//! aborts the submission, any other failure is logged and skipped.

use std::collections::BTreeMap;

use futures::future::join_all;
use serde_json::Value;

use crate::errors::{RemoteError, WizardError};
use crate::remote::{RemoteGateway, RemoteRequest};
use crate::wizard::state::FormData;

pub const DEFAULT_FAILURE_MESSAGE: &str = "Could not save. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CallPhase {
    Primary,
    Secondary,
    Completion,
}

#[derive(Debug, Clone, PartialEq)]
struct Capture {
    key: String,
    response_field: String,
}

#[derive(Debug, Clone, PartialEq)]
struct Injection {
    body_field: String,
    key: String,
}

#[derive(Debug, Clone, PartialEq)]
struct Retained {
    request: RemoteRequest,
    value: Value,
}

/// Values captured by calls that already succeeded, kept between attempts.
///
/// A later attempt reuses a value only when the call resolves to the same
/// request that produced it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetainedCaptures {
    entries: BTreeMap<String, Retained>,
}

impl RetainedCaptures {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    fn reusable(&self, key: &str, request: &RemoteRequest) -> Option<&Value> {
        self.entries
            .get(key)
            .filter(|entry| entry.request == *request)
            .map(|entry| &entry.value)
    }

    fn keep(&mut self, key: &str, request: RemoteRequest, value: Value) {
        self.entries.insert(key.to_string(), Retained { request, value });
    }
}

/// One remote call of a submission.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedCall {
    pub label: String,
    pub phase: CallPhase,
    pub required: bool,
    pub request: RemoteRequest,
    pub failure_message: Option<String>,
    capture: Option<Capture>,
    injections: Vec<Injection>,
}

impl PlannedCall {
    fn new(
        label: impl Into<String>,
        phase: CallPhase,
        required: bool,
        request: RemoteRequest,
    ) -> Self {
        Self {
            label: label.into(),
            phase,
            required,
            request,
            failure_message: None,
            capture: None,
            injections: Vec::new(),
        }
    }

    /// Blocking call persisting the core entity.
    pub fn primary(label: impl Into<String>, request: RemoteRequest) -> Self {
        Self::new(label, CallPhase::Primary, true, request)
    }

    /// Best-effort enrichment call.
    pub fn secondary(label: impl Into<String>, request: RemoteRequest) -> Self {
        Self::new(label, CallPhase::Secondary, false, request)
    }

    /// Blocking call that marks the flow as finished.
    pub fn completion(label: impl Into<String>, request: RemoteRequest) -> Self {
        Self::new(label, CallPhase::Completion, true, request)
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Message shown when this call fails without a backend message.
    pub fn with_failure_message(mut self, message: impl Into<String>) -> Self {
        self.failure_message = Some(message.into());
        self
    }

    /// Stores `response_field` of this call's response under `key`.
    pub fn capture(mut self, key: impl Into<String>, response_field: impl Into<String>) -> Self {
        self.capture = Some(Capture {
            key: key.into(),
            response_field: response_field.into(),
        });
        self
    }

    /// Sets `body_field` from a captured value; omitted when nothing was captured.
    pub fn inject(mut self, body_field: impl Into<String>, key: impl Into<String>) -> Self {
        self.injections.push(Injection {
            body_field: body_field.into(),
            key: key.into(),
        });
        self
    }

    fn resolve(&self, captured: &BTreeMap<String, Value>) -> RemoteRequest {
        let mut request = self.request.clone();
        if let Some(Value::Object(body)) = request.body.as_mut() {
            for injection in &self.injections {
                if let Some(value) = captured.get(&injection.key) {
                    body.insert(injection.body_field.clone(), value.clone());
                }
            }
        }
        request
    }
}

/// Calls to run when the wizard submits, plus the messages to show.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionPlan {
    calls: Vec<PlannedCall>,
    pub success_message: String,
    pub fallback_message: String,
}

impl SubmissionPlan {
    pub fn new(success_message: impl Into<String>) -> Self {
        Self {
            calls: Vec::new(),
            success_message: success_message.into(),
            fallback_message: DEFAULT_FAILURE_MESSAGE.into(),
        }
    }

    pub fn with_fallback_message(mut self, message: impl Into<String>) -> Self {
        self.fallback_message = message.into();
        self
    }

    pub fn call(mut self, call: PlannedCall) -> Self {
        self.calls.push(call);
        self
    }

    pub fn push(&mut self, call: PlannedCall) {
        self.calls.push(call);
    }

    pub fn calls(&self) -> &[PlannedCall] {
        &self.calls
    }

    pub fn phase(&self, phase: CallPhase) -> impl Iterator<Item = &PlannedCall> {
        self.calls.iter().filter(move |call| call.phase == phase)
    }
}

/// Turns the collected form data into a plan.
pub trait SubmissionPlanner: Send + Sync {
    fn plan(&self, data: &FormData) -> Result<SubmissionPlan, WizardError>;
}

impl<F> SubmissionPlanner for F
where
    F: Fn(&FormData) -> Result<SubmissionPlan, WizardError> + Send + Sync,
{
    fn plan(&self, data: &FormData) -> Result<SubmissionPlan, WizardError> {
        self(data)
    }
}

/// Outcome of a plan whose blocking calls all succeeded.
#[derive(Debug, Clone, Default)]
pub struct SubmissionReport {
    pub succeeded: Vec<String>,
    pub best_effort_failures: Vec<(String, RemoteError)>,
    pub captured: BTreeMap<String, Value>,
    pub retained: RetainedCaptures,
}

/// The blocking call that stopped a submission.
#[derive(Debug, Clone)]
pub struct SubmissionFailure {
    pub label: String,
    pub phase: CallPhase,
    pub error: RemoteError,
    /// User-facing text: the backend message verbatim, or the configured fallback.
    pub message: String,
    /// Captures from the calls that succeeded before the failure.
    pub retained: RetainedCaptures,
}

impl SubmissionFailure {
    fn new(
        call: &PlannedCall,
        error: RemoteError,
        plan: &SubmissionPlan,
        report: &SubmissionReport,
    ) -> Self {
        let fallback = call.failure_message.as_deref().unwrap_or(&plan.fallback_message);
        Self {
            label: call.label.clone(),
            phase: call.phase,
            message: error.user_message(fallback),
            error,
            retained: report.retained.clone(),
        }
    }
}

/// Runs `plan`. Calls whose capture is already in `retained` for the same
/// request are not sent again; the retained value is used instead.
pub async fn execute_plan(
    gateway: &dyn RemoteGateway,
    plan: &SubmissionPlan,
    retained: &RetainedCaptures,
) -> Result<SubmissionReport, SubmissionFailure> {
    let mut report = SubmissionReport::default();
    tracing::info!(calls = plan.calls.len(), "running submission plan");

    for call in plan.phase(CallPhase::Primary) {
        run_sequential(gateway, call, plan, retained, &mut report).await?;
    }

    let mut pending = Vec::new();
    for call in plan.phase(CallPhase::Secondary) {
        let request = call.resolve(&report.captured);
        if !reuse(call, &request, retained, &mut report) {
            pending.push((call, request));
        }
    }
    if !pending.is_empty() {
        let results = join_all(pending.iter().map(|(_, request)| gateway.send(request))).await;

        let mut blocking = None;
        for ((call, request), result) in pending.into_iter().zip(results) {
            match result {
                Ok(response) => record_success(call, request, response, &mut report),
                Err(error) if call.required => {
                    tracing::warn!(call = %call.label, %error, "required secondary call failed");
                    if blocking.is_none() {
                        blocking = Some(SubmissionFailure::new(call, error, plan, &report));
                    }
                }
                Err(error) => record_best_effort(call, error, &mut report),
            }
        }
        if let Some(mut failure) = blocking {
            failure.retained = report.retained;
            return Err(failure);
        }
    }

    for call in plan.phase(CallPhase::Completion) {
        run_sequential(gateway, call, plan, retained, &mut report).await?;
    }

    tracing::info!(
        succeeded = report.succeeded.len(),
        skipped = report.best_effort_failures.len(),
        "submission plan finished"
    );
    Ok(report)
}

async fn run_sequential(
    gateway: &dyn RemoteGateway,
    call: &PlannedCall,
    plan: &SubmissionPlan,
    retained: &RetainedCaptures,
    report: &mut SubmissionReport,
) -> Result<(), SubmissionFailure> {
    let request = call.resolve(&report.captured);
    if reuse(call, &request, retained, report) {
        return Ok(());
    }
    match gateway.send(&request).await {
        Ok(response) => {
            record_success(call, request, response, report);
            Ok(())
        }
        Err(error) if call.required => {
            tracing::warn!(call = %call.label, %error, "blocking call failed");
            Err(SubmissionFailure::new(call, error, plan, report))
        }
        Err(error) => {
            record_best_effort(call, error, report);
            Ok(())
        }
    }
}

fn reuse(
    call: &PlannedCall,
    request: &RemoteRequest,
    retained: &RetainedCaptures,
    report: &mut SubmissionReport,
) -> bool {
    let Some(capture) = &call.capture else {
        return false;
    };
    let Some(value) = retained.reusable(&capture.key, request) else {
        return false;
    };
    tracing::debug!(
        call = %call.label,
        key = %capture.key,
        "reusing value from an earlier attempt"
    );
    report.captured.insert(capture.key.clone(), value.clone());
    report.retained.keep(&capture.key, request.clone(), value.clone());
    report.succeeded.push(call.label.clone());
    true
}

fn record_success(
    call: &PlannedCall,
    request: RemoteRequest,
    response: Value,
    report: &mut SubmissionReport,
) {
    tracing::debug!(call = %call.label, "call succeeded");
    if let Some(capture) = &call.capture {
        match response.get(&capture.response_field) {
            Some(value) if !value.is_null() => {
                report.captured.insert(capture.key.clone(), value.clone());
                report.retained.keep(&capture.key, request, value.clone());
            }
            _ => tracing::debug!(
                call = %call.label,
                field = %capture.response_field,
                "nothing to capture"
            ),
        }
    }
    report.succeeded.push(call.label.clone());
}

fn record_best_effort(call: &PlannedCall, error: RemoteError, report: &mut SubmissionReport) {
    tracing::warn!(call = %call.label, %error, "best-effort call failed, continuing");
    report.best_effort_failures.push((call.label.clone(), error));
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedGateway {
        failing: Vec<&'static str>,
        responses: BTreeMap<&'static str, Value>,
        seen: Mutex<Vec<RemoteRequest>>,
    }

    #[async_trait]
    impl RemoteGateway for ScriptedGateway {
        async fn send(&self, request: &RemoteRequest) -> Result<Value, RemoteError> {
            self.seen.lock().unwrap().push(request.clone());
            if self.failing.iter().any(|path| *path == request.path) {
                return Err(RemoteError::from_status(
                    422,
                    &json!({ "message": format!("rejected {}", request.path) }),
                ));
            }
            Ok(self
                .responses
                .get(request.path.as_str())
                .cloned()
                .unwrap_or(Value::Null))
        }
    }

    fn patch(path: &str, body: Value) -> RemoteRequest {
        RemoteRequest::patch(path, body)
    }

    fn unit_call() -> PlannedCall {
        PlannedCall::primary("unit", RemoteRequest::post("/unidades", json!({ "nome": "Centro" })))
            .inject("endereco_id", "endereco_id")
    }

    fn none() -> RetainedCaptures {
        RetainedCaptures::default()
    }

    fn plan() -> SubmissionPlan {
        SubmissionPlan::new("Saved")
            .call(PlannedCall::completion("flag", patch("/flag", json!({ "done": true }))))
            .call(PlannedCall::secondary("extra-1", patch("/extra/1", json!({}))))
            .call(PlannedCall::primary("entity", patch("/entity", json!({ "a": 1 }))))
            .call(PlannedCall::secondary("extra-2", patch("/extra/2", json!({}))))
    }

    fn address_then_unit(street: &str) -> SubmissionPlan {
        SubmissionPlan::new("Saved")
            .call(
                PlannedCall::primary(
                    "address",
                    RemoteRequest::post("/enderecos", json!({ "logradouro": street })),
                )
                .capture("endereco_id", "id"),
            )
            .call(unit_call())
    }

    fn paths(gateway: &ScriptedGateway) -> Vec<String> {
        gateway
            .seen
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.path.clone())
            .collect()
    }

    #[tokio::test]
    async fn phases_run_in_order() {
        let gateway = ScriptedGateway::default();
        let report = execute_plan(&gateway, &plan(), &none()).await.unwrap();
        let seen = paths(&gateway);
        assert_eq!(seen.first().map(String::as_str), Some("/entity"));
        assert_eq!(seen.last().map(String::as_str), Some("/flag"));
        assert_eq!(seen.len(), 4);
        assert_eq!(report.succeeded.len(), 4);
    }

    #[tokio::test]
    async fn secondary_failures_do_not_block() {
        let gateway = ScriptedGateway {
            failing: vec!["/extra/1", "/extra/2"],
            ..ScriptedGateway::default()
        };
        let report = execute_plan(&gateway, &plan(), &none()).await.unwrap();
        assert_eq!(report.best_effort_failures.len(), 2);
        assert!(paths(&gateway).contains(&"/flag".to_string()));
    }

    #[tokio::test]
    async fn primary_failure_stops_everything() {
        let gateway = ScriptedGateway {
            failing: vec!["/entity"],
            ..ScriptedGateway::default()
        };
        let failure = execute_plan(&gateway, &plan(), &none()).await.unwrap_err();
        assert_eq!(failure.label, "entity");
        assert_eq!(failure.phase, CallPhase::Primary);
        assert_eq!(failure.message, "rejected /entity");
        assert_eq!(paths(&gateway), vec!["/entity".to_string()]);
    }

    #[tokio::test]
    async fn completion_failure_is_blocking() {
        let gateway = ScriptedGateway {
            failing: vec!["/flag"],
            ..ScriptedGateway::default()
        };
        let failure = execute_plan(&gateway, &plan(), &none()).await.unwrap_err();
        assert_eq!(failure.phase, CallPhase::Completion);
    }

    #[tokio::test]
    async fn required_secondary_blocks_after_phase_settles() {
        let gateway = ScriptedGateway {
            failing: vec!["/extra/1"],
            ..ScriptedGateway::default()
        };
        let plan = SubmissionPlan::new("Saved")
            .call(
                PlannedCall::secondary("extra-1", patch("/extra/1", json!({}))).with_required(true),
            )
            .call(PlannedCall::secondary("extra-2", patch("/extra/2", json!({}))))
            .call(PlannedCall::completion("flag", patch("/flag", json!({}))));
        let failure = execute_plan(&gateway, &plan, &none()).await.unwrap_err();
        assert_eq!(failure.label, "extra-1");
        let seen = paths(&gateway);
        assert!(seen.contains(&"/extra/2".to_string()));
        assert!(!seen.contains(&"/flag".to_string()));
    }

    #[tokio::test]
    async fn captured_values_are_injected() {
        let mut responses = BTreeMap::new();
        responses.insert("/enderecos", json!({ "id": "end-9" }));
        let gateway = ScriptedGateway {
            responses,
            ..ScriptedGateway::default()
        };
        let report = execute_plan(&gateway, &address_then_unit("Rua A"), &none())
            .await
            .unwrap();
        assert_eq!(report.captured.get("endereco_id"), Some(&json!("end-9")));
        assert_eq!(report.retained.get("endereco_id"), Some(&json!("end-9")));
        let seen = gateway.seen.lock().unwrap();
        assert_eq!(seen[1].body, Some(json!({ "nome": "Centro", "endereco_id": "end-9" })));
    }

    #[tokio::test]
    async fn missing_capture_leaves_field_out() {
        let gateway = ScriptedGateway::default();
        let plan = SubmissionPlan::new("Saved").call(unit_call());
        execute_plan(&gateway, &plan, &none()).await.unwrap();
        let seen = gateway.seen.lock().unwrap();
        assert_eq!(seen[0].body, Some(json!({ "nome": "Centro" })));
    }

    #[tokio::test]
    async fn fallback_message_without_backend_text() {
        struct Down;
        #[async_trait]
        impl RemoteGateway for Down {
            async fn send(&self, _: &RemoteRequest) -> Result<Value, RemoteError> {
                Err(RemoteError::Transport("connection refused".into()))
            }
        }
        let plan = SubmissionPlan::new("Saved").call(
            PlannedCall::primary("entity", patch("/entity", json!({})))
                .with_failure_message("Could not save student data"),
        );
        let failure = execute_plan(&Down, &plan, &none()).await.unwrap_err();
        assert_eq!(failure.message, "Could not save student data");
    }

    #[tokio::test]
    async fn failed_attempt_retains_earlier_captures() {
        let mut responses = BTreeMap::new();
        responses.insert("/enderecos", json!({ "id": "end-1" }));
        let gateway = ScriptedGateway {
            failing: vec!["/unidades"],
            responses,
            ..ScriptedGateway::default()
        };
        let failure = execute_plan(&gateway, &address_then_unit("Rua A"), &none())
            .await
            .unwrap_err();
        assert_eq!(failure.label, "unit");
        assert_eq!(failure.retained.get("endereco_id"), Some(&json!("end-1")));

        let retry = ScriptedGateway::default();
        let report = execute_plan(&retry, &address_then_unit("Rua A"), &failure.retained)
            .await
            .unwrap();
        assert_eq!(paths(&retry), vec!["/unidades".to_string()]);
        let seen = retry.seen.lock().unwrap();
        assert_eq!(seen[0].body, Some(json!({ "nome": "Centro", "endereco_id": "end-1" })));
        assert_eq!(report.succeeded, vec!["address".to_string(), "unit".to_string()]);
    }

    #[tokio::test]
    async fn changed_request_is_sent_again() {
        let mut responses = BTreeMap::new();
        responses.insert("/enderecos", json!({ "id": "end-1" }));
        let gateway = ScriptedGateway {
            failing: vec!["/unidades"],
            responses,
            ..ScriptedGateway::default()
        };
        let failure = execute_plan(&gateway, &address_then_unit("Rua A"), &none())
            .await
            .unwrap_err();

        let mut responses = BTreeMap::new();
        responses.insert("/enderecos", json!({ "id": "end-2" }));
        let retry = ScriptedGateway {
            responses,
            ..ScriptedGateway::default()
        };
        let report = execute_plan(&retry, &address_then_unit("Rua B"), &failure.retained)
            .await
            .unwrap();
        assert_eq!(paths(&retry), vec!["/enderecos".to_string(), "/unidades".to_string()]);
        assert_eq!(report.captured.get("endereco_id"), Some(&json!("end-2")));
    }
}
