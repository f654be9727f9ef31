//! Declarative step and field descriptors.
//!
//! A wizard is a list of [`StepDefinition`]s. Each step lists its fields, an
//! optional inclusion predicate over the accumulated form data and optional
//! step-level checks. The engine only ever asks a step two questions: "are you
//! part of the sequence?" and "what is wrong with your data?".

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::errors::WizardError;
use crate::wizard::masks::Mask;
use crate::wizard::state::{FieldMap, FormData};

/// Pseudo-step shown while the seed is fetched. Never part of a sequence.
pub const LOADING_STEP: &str = "loading";
/// Terminal pseudo-step. Never part of a sequence.
pub const DONE_STEP: &str = "done";

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid e-mail pattern"));

/// Field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Supported data kinds for form fields.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text,
    Integer,
    Decimal,
    Date,
    Boolean,
    Choice(Vec<String>),
}

type ValidatorCallback = dyn Fn(&str) -> Result<(), String> + Send + Sync;
type SharedValidatorCallback = Arc<ValidatorCallback>;

/// Built-in checks applied to a non-empty field value.
#[derive(Clone)]
pub enum Validator {
    None,
    MinLength(usize),
    Email,
    /// ISO `YYYY-MM-DD`; `allow_future: false` rejects dates after today.
    Date { allow_future: bool },
    IntegerRange { min: i64, max: i64 },
    DecimalRange { min: f64, max: f64 },
    OneOf(Vec<String>),
    /// Exact digit count once non-digits are stripped.
    Digits(usize),
    Custom(SharedValidatorCallback),
}

impl Validator {
    pub fn custom<F>(check: F) -> Self
    where
        F: Fn(&str) -> Result<(), String> + Send + Sync + 'static,
    {
        Validator::Custom(Arc::new(check))
    }

    fn validate(&self, input: &str) -> Result<(), String> {
        let trimmed = input.trim();
        match self {
            Validator::None => Ok(()),
            Validator::MinLength(min) => {
                if trimmed.chars().count() < *min {
                    Err(format!("Use at least {} characters", min))
                } else {
                    Ok(())
                }
            }
            Validator::Email => {
                if EMAIL_PATTERN.is_match(trimmed) {
                    Ok(())
                } else {
                    Err("Invalid e-mail address".into())
                }
            }
            Validator::Date { allow_future } => {
                let date = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                    .map_err(|_| "Use YYYY-MM-DD format".to_string())?;
                let today = Local::now().date_naive();
                if !allow_future && date > today {
                    Err("Date cannot be in the future".into())
                } else {
                    Ok(())
                }
            }
            Validator::IntegerRange { min, max } => trimmed
                .parse::<i64>()
                .map_err(|_| "Enter a whole number".to_string())
                .and_then(|value| {
                    if value < *min || value > *max {
                        Err(format!("Value must be between {} and {}", min, max))
                    } else {
                        Ok(())
                    }
                }),
            Validator::DecimalRange { min, max } => trimmed
                .parse::<f64>()
                .map_err(|_| "Enter a numeric value".to_string())
                .and_then(|value| {
                    if !value.is_finite() || value < *min || value > *max {
                        Err(format!("Value must be between {} and {}", min, max))
                    } else {
                        Ok(())
                    }
                }),
            Validator::OneOf(options) => {
                if options.iter().any(|candidate| candidate == trimmed) {
                    Ok(())
                } else {
                    Err(format!("Value must be one of: {}", options.join(", ")))
                }
            }
            Validator::Digits(count) => {
                let digits = trimmed.chars().filter(char::is_ascii_digit).count();
                if digits == *count {
                    Ok(())
                } else {
                    Err(format!("Must have {} digits", count))
                }
            }
            Validator::Custom(func) => func(trimmed),
        }
    }
}

/// Renders a loosely typed field value as the text validators and masks work on.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        other => other.to_string(),
    }
}

pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

/// Declarative description of a single form field.
#[derive(Clone)]
pub struct FieldDescriptor {
    pub key: String,
    pub label: String,
    pub kind: FieldKind,
    pub required: bool,
    pub help: Option<String>,
    pub validator: Validator,
    pub mask: Option<Mask>,
    required_message: Option<String>,
}

impl FieldDescriptor {
    pub fn new(
        key: impl Into<String>,
        label: impl Into<String>,
        kind: FieldKind,
        validator: Validator,
    ) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            kind,
            required: true,
            help: None,
            validator,
            mask: None,
            required_message: None,
        }
    }

    pub fn with_optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_mask(mut self, mask: Mask) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn with_required_message(mut self, message: impl Into<String>) -> Self {
        self.required_message = Some(message.into());
        self
    }

    /// Applies the field mask to string input; other values pass through.
    pub fn normalize(&self, value: Value) -> Value {
        match (self.mask, value) {
            (Some(mask), Value::String(text)) => Value::String(mask.apply(&text)),
            (_, value) => value,
        }
    }

    pub fn check(&self, value: Option<&Value>) -> Option<FieldError> {
        if is_blank(value) {
            return self.required.then(|| {
                let message = self
                    .required_message
                    .clone()
                    .unwrap_or_else(|| format!("{} is required", self.label));
                FieldError::new(self.key.clone(), message)
            });
        }
        let text = value.map(value_text).unwrap_or_default();
        self.validator
            .validate(&text)
            .err()
            .map(|message| FieldError::new(self.key.clone(), message))
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("required", &self.required)
            .finish()
    }
}

type Predicate = dyn Fn(&FormData) -> bool + Send + Sync;
type StepCheck = dyn Fn(&FieldMap, &FormData) -> Vec<FieldError> + Send + Sync;
type FieldSource = dyn Fn(&FormData) -> Vec<FieldDescriptor> + Send + Sync;

/// Static descriptor of one wizard step.
#[derive(Clone)]
pub struct StepDefinition {
    pub id: &'static str,
    pub title: &'static str,
    fields: Vec<FieldDescriptor>,
    dynamic_fields: Option<Arc<FieldSource>>,
    predicate: Option<Arc<Predicate>>,
    checks: Vec<Arc<StepCheck>>,
}

impl StepDefinition {
    pub fn new(id: &'static str, title: &'static str, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            id,
            title,
            fields,
            dynamic_fields: None,
            predicate: None,
            checks: Vec::new(),
        }
    }

    /// Includes the step only while `predicate` holds over the form data.
    pub fn included_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&FormData) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Adds fields derived from the form data, e.g. one entry per linked item.
    pub fn with_dynamic_fields<F>(mut self, source: F) -> Self
    where
        F: Fn(&FormData) -> Vec<FieldDescriptor> + Send + Sync + 'static,
    {
        self.dynamic_fields = Some(Arc::new(source));
        self
    }

    /// Adds a check spanning several fields of this step.
    pub fn with_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&FieldMap, &FormData) -> Vec<FieldError> + Send + Sync + 'static,
    {
        self.checks.push(Arc::new(check));
        self
    }

    pub fn is_included(&self, data: &FormData) -> bool {
        self.predicate.as_ref().map_or(true, |predicate| predicate(data))
    }

    pub fn fields(&self, data: &FormData) -> Vec<FieldDescriptor> {
        let mut fields = self.fields.clone();
        if let Some(source) = &self.dynamic_fields {
            fields.extend(source(data));
        }
        fields
    }

    pub fn field(&self, data: &FormData, key: &str) -> Option<FieldDescriptor> {
        self.fields(data).into_iter().find(|field| field.key == key)
    }

    /// Validates this step's slice of `data`, returning errors in field order.
    pub fn validate(&self, data: &FormData) -> Vec<FieldError> {
        let empty = FieldMap::new();
        let values = data.get(self.id).unwrap_or(&empty);
        let mut errors: Vec<FieldError> = self
            .fields(data)
            .iter()
            .filter_map(|field| field.check(values.get(&field.key)))
            .collect();
        for check in &self.checks {
            for error in check(values, data) {
                if !errors.iter().any(|existing| existing.field == error.field) {
                    errors.push(error);
                }
            }
        }
        errors
    }
}

impl fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("fields", &self.fields)
            .field("conditional", &self.predicate.is_some())
            .finish()
    }
}

/// Rejects definition lists the engine could never navigate.
pub fn check_definitions(definitions: &[StepDefinition]) -> Result<(), WizardError> {
    if definitions.is_empty() {
        return Err(WizardError::EmptySequence);
    }
    let mut seen = HashSet::new();
    for definition in definitions {
        if definition.id == LOADING_STEP || definition.id == DONE_STEP {
            return Err(WizardError::ReservedStepId(definition.id.to_string()));
        }
        if !seen.insert(definition.id) {
            return Err(WizardError::DuplicateStep(definition.id.to_string()));
        }
    }
    Ok(())
}

/// Ordered ids of the steps whose predicates hold, in declared order.
pub fn compute_step_sequence(definitions: &[StepDefinition], data: &FormData) -> Vec<&'static str> {
    let mut seen = HashSet::new();
    definitions
        .iter()
        .filter(|definition| definition.id != LOADING_STEP && definition.id != DONE_STEP)
        .filter(|definition| definition.is_included(data))
        .filter(|definition| seen.insert(definition.id))
        .map(|definition| definition.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(key: &str) -> FieldDescriptor {
        FieldDescriptor::new(key, key, FieldKind::Text, Validator::None)
    }

    fn data_with(step: &str, values: Value) -> FormData {
        let mut data = FormData::new();
        if let Value::Object(map) = values {
            data.insert(step.to_string(), map);
        }
        data
    }

    #[test]
    fn sequence_follows_predicates_in_declared_order() {
        let definitions = vec![
            StepDefinition::new("a", "A", vec![]),
            StepDefinition::new("b", "B", vec![])
                .included_when(|data| data.contains_key("flag")),
            StepDefinition::new("c", "C", vec![]),
        ];
        assert_eq!(compute_step_sequence(&definitions, &FormData::new()), ["a", "c"]);
        let data = data_with("flag", json!({}));
        assert_eq!(compute_step_sequence(&definitions, &data), ["a", "b", "c"]);
    }

    #[test]
    fn sequence_drops_reserved_and_duplicate_ids() {
        let definitions = vec![
            StepDefinition::new(LOADING_STEP, "Loading", vec![]),
            StepDefinition::new("a", "A", vec![]),
            StepDefinition::new("a", "A again", vec![]),
            StepDefinition::new(DONE_STEP, "Done", vec![]),
        ];
        assert_eq!(compute_step_sequence(&definitions, &FormData::new()), ["a"]);
    }

    #[test]
    fn definitions_are_checked() {
        let duplicate = vec![
            StepDefinition::new("a", "A", vec![]),
            StepDefinition::new("a", "A", vec![]),
        ];
        assert!(matches!(
            check_definitions(&duplicate),
            Err(WizardError::DuplicateStep(id)) if id == "a"
        ));
        let reserved = vec![StepDefinition::new(DONE_STEP, "Done", vec![])];
        assert!(matches!(
            check_definitions(&reserved),
            Err(WizardError::ReservedStepId(_))
        ));
        assert!(matches!(check_definitions(&[]), Err(WizardError::EmptySequence)));
    }

    #[test]
    fn required_fields_report_in_declared_order() {
        let step = StepDefinition::new(
            "address",
            "Address",
            vec![
                text("cep").with_required_message("Postal code is required"),
                text("numero"),
                text("complemento").with_optional(),
            ],
        );
        let errors = step.validate(&data_with("address", json!({ "cep": "  " })));
        assert_eq!(
            errors,
            vec![
                FieldError::new("cep", "Postal code is required"),
                FieldError::new("numero", "numero is required"),
            ]
        );
    }

    #[test]
    fn validators_only_run_on_filled_values() {
        let step = StepDefinition::new(
            "gps",
            "GPS",
            vec![FieldDescriptor::new(
                "latitude",
                "Latitude",
                FieldKind::Decimal,
                Validator::DecimalRange { min: -90.0, max: 90.0 },
            )
            .with_optional()],
        );
        assert!(step.validate(&FormData::new()).is_empty());
        let errors = step.validate(&data_with("gps", json!({ "latitude": "91" })));
        assert_eq!(errors[0].field, "latitude");
    }

    #[test]
    fn builtin_validators() {
        assert!(Validator::Email.validate("ana@academia.com.br").is_ok());
        assert!(Validator::Email.validate("ana@academia").is_err());
        assert!(Validator::MinLength(3).validate("ab").is_err());
        assert!(Validator::Date { allow_future: true }.validate("2024-02-30").is_err());
        assert!(Validator::Date { allow_future: false }.validate("2999-01-01").is_err());
        assert!(Validator::Date { allow_future: false }.validate("2020-01-01").is_ok());
        assert!(Validator::IntegerRange { min: 0, max: 4 }.validate("5").is_err());
        assert!(Validator::OneOf(vec!["AZUL".into()]).validate("AZUL").is_ok());
        assert!(Validator::Digits(8).validate("01310-100").is_ok());
    }

    #[test]
    fn dynamic_fields_and_checks_extend_the_step() {
        let step = StepDefinition::new("outras", "Other", vec![])
            .with_dynamic_fields(|data| {
                data.get("context")
                    .map(|ctx| ctx.keys().map(|key| text(key).with_optional()).collect())
                    .unwrap_or_default()
            })
            .with_check(|values, _| {
                if values.contains_key("bad") {
                    vec![FieldError::new("bad", "Bad value")]
                } else {
                    Vec::new()
                }
            });
        let mut data = data_with("context", json!({ "m1.graduacao_atual": null }));
        assert_eq!(step.fields(&data).len(), 1);
        let mut outras = FieldMap::new();
        outras.insert("bad".into(), json!(1));
        data.insert("outras".into(), outras);
        assert_eq!(step.validate(&data), vec![FieldError::new("bad", "Bad value")]);
    }

    #[test]
    fn masks_normalize_string_values() {
        let field = text("cep").with_mask(Mask::Cep);
        assert_eq!(field.normalize(json!("01310100")), json!("01310-100"));
        assert_eq!(field.normalize(json!(true)), json!(true));
    }
}
