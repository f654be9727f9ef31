use std::sync::Arc;

use serde_json::Value;

use super::output;
use super::prompts::{NavAction, Prompter};
use super::CliError;
use crate::enrichment::{
    address_query, fill_from_address, AddressAutofill, CoordinateFields, Geocoder,
};
use crate::errors::WizardError;
use crate::wizard::step::value_text;
use crate::wizard::{FieldKind, NextOutcome, Position, SubmitOutcome, WizardEngine};

/// Address geocoding offered on the coordinates step.
pub struct GeocodeSupport {
    pub geocoder: Arc<dyn Geocoder>,
    pub fields: CoordinateFields,
    pub address_step: &'static str,
    pub parts: &'static [&'static str],
    pub required: &'static [&'static str],
    pub suffix: &'static str,
}

/// Enrichment hooks the runner attaches to specific steps.
#[derive(Default)]
pub struct Enrichment {
    pub autofill: Option<AddressAutofill>,
    pub geocoding: Option<GeocodeSupport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    AlreadyComplete,
    Cancelled,
}

async fn offer_geocoding(
    engine: &mut WizardEngine,
    prompter: &mut dyn Prompter,
    support: &GeocodeSupport,
) -> Result<(), CliError> {
    if !prompter.confirm("Look up coordinates from the address?", false)? {
        return Ok(());
    }
    let query = address_query(
        engine.state().form_data(),
        support.address_step,
        support.parts,
        support.required,
        support.suffix,
    );
    fill_from_address(engine, support.geocoder.as_ref(), support.fields, query).await?;
    Ok(())
}

async fn fill_step(
    engine: &mut WizardEngine,
    prompter: &mut dyn Prompter,
    enrichment: &Enrichment,
    step: &'static str,
) -> Result<(), CliError> {
    let definition = engine
        .definition(step)
        .cloned()
        .ok_or_else(|| WizardError::UnknownStep(step.to_string()))?;

    if let Some(support) = enrichment.geocoding.as_ref().filter(|s| s.fields.step == step) {
        offer_geocoding(engine, prompter, support).await?;
    }

    for field in definition.fields(engine.state().form_data()) {
        let current = engine.state().value(step, &field.key).map(value_text);
        if let Some(message) = engine.state().validation_errors().get(&field.key) {
            output::warning(format!("{}: {}", field.label, message));
        }
        let label = match (&field.help, field.required) {
            (Some(help), _) => format!("{} ({help})", field.label),
            (None, false) => format!("{} (optional)", field.label),
            (None, true) => field.label.clone(),
        };

        let answer = match &field.kind {
            FieldKind::Choice(options) => prompter
                .choose(&label, options, current.as_deref())?
                .map(Value::String),
            FieldKind::Boolean => {
                let default = current.as_deref() == Some("true");
                Some(Value::Bool(prompter.confirm(&label, default)?))
            }
            _ => prompter.text(&label, current.as_deref())?.map(Value::String),
        };
        let Some(answer) = answer else {
            continue;
        };

        let postal = enrichment.autofill.as_ref().filter(|autofill| {
            autofill.fields().step == step && autofill.fields().postal_code == field.key
        });
        match (postal, answer) {
            (Some(autofill), Value::String(raw)) => {
                autofill.postal_code_edited(engine, &raw).await?;
            }
            (_, answer) => engine.update_field(step, &field.key, answer)?,
        }
    }
    Ok(())
}

/// Walks the user through the wizard until it completes or they cancel.
pub async fn drive(
    engine: &mut WizardEngine,
    prompter: &mut dyn Prompter,
    enrichment: &Enrichment,
) -> Result<RunOutcome, CliError> {
    if engine.state().is_done() {
        return Ok(RunOutcome::AlreadyComplete);
    }

    loop {
        let step = match engine.state().position() {
            Position::Active(step) => step,
            Position::Done => return Ok(RunOutcome::Completed),
            _ => return Err(WizardError::NoActiveStep.into()),
        };
        let state = engine.state();
        let index = state.step_index().unwrap_or(0);
        let title = engine.definition(step).map(|d| d.title).unwrap_or(step);
        output::section(format!("{title} ({}/{})", index + 1, state.sequence().len()));
        let (first, last) = (state.is_first_step(), state.is_last_step());

        fill_step(engine, prompter, enrichment, step).await?;

        match prompter.navigation(!first, last)? {
            NavAction::Cancel => return Ok(RunOutcome::Cancelled),
            NavAction::Back => {
                engine.go_back();
            }
            NavAction::Next => match engine.go_next().await? {
                NextOutcome::Submitted(SubmitOutcome::Completed) => {
                    return Ok(RunOutcome::Completed)
                }
                NextOutcome::Submitted(SubmitOutcome::Failed { .. })
                | NextOutcome::Rejected(_)
                | NextOutcome::Advanced(_) => {}
            },
        }
    }
}
