use std::result::Result as StdResult;

use serde_json::Value;
use thiserror::Error;

/// Error type shared by the wizard engine, its flows and configuration.
#[derive(Debug, Error)]
pub enum WizardError {
    #[error("Duplicate step id: {0}")]
    DuplicateStep(String),
    #[error("Step id `{0}` is reserved")]
    ReservedStepId(String),
    #[error("Unknown step: {0}")]
    UnknownStep(String),
    #[error("No step applies to the current data")]
    EmptySequence,
    #[error("Wizard has no active step")]
    NoActiveStep,
    #[error("Wizard is already complete")]
    AlreadyDone,
    #[error("A submission is already running")]
    SubmissionInProgress,
    #[error("Cannot build submission: {0}")]
    Plan(String),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = StdResult<T, WizardError>;

/// Failure of a call against the REST backend.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("Request failed: {0}")]
    Transport(String),
    #[error("Backend responded with status {status}")]
    Status {
        status: u16,
        message: Option<String>,
    },
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Builds a status error, pulling the backend's own message out of the payload.
    pub fn from_status(status: u16, payload: &Value) -> Self {
        RemoteError::Status {
            status,
            message: extract_message(payload),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::Status { status: 404, .. })
    }

    /// Message to show the user: the backend's text when it sent one, otherwise `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            RemoteError::Status {
                message: Some(message),
                ..
            } => message.clone(),
            _ => fallback.to_string(),
        }
    }
}

/// Reads the `message` field of an error payload. Validation errors carry an
/// array of messages, which are joined.
pub fn extract_message(payload: &Value) -> Option<String> {
    match payload.get("message")? {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Array(items) => {
            let parts: Vec<&str> = items
                .iter()
                .filter_map(Value::as_str)
                .filter(|text| !text.trim().is_empty())
                .collect();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        _ => None,
    }
}

/// Failure of an enrichment lookup (postal code, geocoding, device location).
#[derive(Debug, Clone, Error)]
pub enum LookupError {
    #[error("Lookup request failed: {0}")]
    Transport(String),
    #[error("Unexpected lookup response: {0}")]
    Decode(String),
    #[error("{0} is not supported here")]
    Unsupported(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_is_taken_verbatim() {
        let err = RemoteError::from_status(400, &json!({ "message": "CPF já cadastrado" }));
        assert_eq!(err.user_message("fallback"), "CPF já cadastrado");
    }

    #[test]
    fn message_arrays_are_joined() {
        let payload = json!({ "message": ["cep must be a string", "uf too long"] });
        assert_eq!(
            extract_message(&payload).as_deref(),
            Some("cep must be a string; uf too long")
        );
    }

    #[test]
    fn fallback_used_without_backend_message() {
        let err = RemoteError::from_status(500, &Value::Null);
        assert_eq!(err.user_message("Could not save"), "Could not save");
        let err = RemoteError::Transport("connection refused".into());
        assert_eq!(err.user_message("Could not save"), "Could not save");
    }

    #[test]
    fn not_found_detection() {
        assert!(RemoteError::from_status(404, &Value::Null).is_not_found());
        assert!(!RemoteError::from_status(400, &Value::Null).is_not_found());
    }
}
