//! Unit-onboarding wizard: a franchisee registers a new unit, which is
//! created in `HOMOLOGACAO` status pending review.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use super::{context_text, filled, CONTEXT_KEY};
use crate::enrichment::{AddressFields, CoordinateFields};
use crate::errors::{Result, WizardError};
use crate::remote::{RemoteGateway, RemoteRequest};
use crate::wizard::masks::digits_only;
use crate::wizard::{
    FieldDescriptor, FieldKind, FieldMap, FormData, Mask, PlannedCall, Seed,
    StepDefinition, SubmissionPlan, SubmissionPlanner, Validator, WizardEngine,
};

pub const UNIT_WIZARD: &str = "unit-onboarding";

pub const IDENTIFICACAO: &str = "identificacao";
pub const CONTATO: &str = "contato";
pub const ENDERECO: &str = "endereco";
pub const GPS: &str = "gps";
pub const CONFIRMACAO: &str = "confirmacao";

pub const DEFAULT_COUNTRY: &str = "Brasil";
const CREATED_STATUS: &str = "HOMOLOGACAO";

pub const ADDRESS_FIELDS: AddressFields = AddressFields {
    step: ENDERECO,
    postal_code: "cep",
    street: "logradouro",
    district: "bairro",
    city: "cidade",
    state: "estado",
    complement: Some("complemento"),
};

pub const COORDINATE_FIELDS: CoordinateFields = CoordinateFields {
    step: GPS,
    latitude: "latitude",
    longitude: "longitude",
};

/// Address parts joined into the geocoding query, in order.
pub const GEOCODE_PARTS: [&str; 5] = ["logradouro", "numero", "bairro", "cidade", "estado"];
/// Parts that must be filled before geocoding is attempted.
pub const GEOCODE_REQUIRED: [&str; 2] = ["cidade", "estado"];

fn text(key: &str, label: &str) -> FieldDescriptor {
    FieldDescriptor::new(key, label, FieldKind::Text, Validator::None)
}

pub fn unit_steps() -> Vec<StepDefinition> {
    let identificacao = StepDefinition::new(
        IDENTIFICACAO,
        "Identification",
        vec![
            FieldDescriptor::new("nome", "Unit name", FieldKind::Text, Validator::MinLength(3))
                .with_required_message("Unit name is required"),
            text("razao_social", "Legal name").with_required_message("Legal name is required"),
            text("nome_fantasia", "Trade name").with_optional(),
            FieldDescriptor::new("cnpj", "CNPJ", FieldKind::Text, Validator::Digits(14))
                .with_mask(Mask::Cnpj)
                .with_optional(),
            text("inscricao_estadual", "State registration").with_optional(),
            text("inscricao_municipal", "Municipal registration").with_optional(),
        ],
    );

    let contato = StepDefinition::new(
        CONTATO,
        "Contact",
        vec![
            FieldDescriptor::new("email", "E-mail", FieldKind::Text, Validator::Email)
                .with_required_message("E-mail is required"),
            text("telefone_celular", "Mobile phone")
                .with_mask(Mask::Phone)
                .with_required_message("Mobile phone is required"),
            text("telefone_fixo", "Landline").with_mask(Mask::Phone).with_optional(),
            text("website", "Website").with_optional(),
            text("instagram", "Instagram").with_optional(),
            text("facebook", "Facebook").with_optional(),
        ],
    );

    let endereco = StepDefinition::new(
        ENDERECO,
        "Address",
        vec![
            text("cep", "Postal code").with_mask(Mask::Cep),
            text("logradouro", "Street"),
            text("numero", "Number"),
            text("complemento", "Complement").with_optional(),
            text("bairro", "District"),
            text("cidade", "City"),
            text("estado", "State"),
            text("pais", "Country").with_optional(),
        ],
    );

    let gps = StepDefinition::new(
        GPS,
        "GPS & settings",
        vec![
            FieldDescriptor::new(
                "latitude",
                "Latitude",
                FieldKind::Decimal,
                Validator::DecimalRange { min: -90.0, max: 90.0 },
            )
            .with_optional(),
            FieldDescriptor::new(
                "longitude",
                "Longitude",
                FieldKind::Decimal,
                Validator::DecimalRange { min: -180.0, max: 180.0 },
            )
            .with_optional(),
            FieldDescriptor::new(
                "requer_aprovacao_checkin",
                "Require check-in approval",
                FieldKind::Boolean,
                Validator::None,
            )
            .with_optional(),
        ],
    );

    let confirmacao = StepDefinition::new(CONFIRMACAO, "Confirmation", vec![]);

    vec![identificacao, contato, endereco, gps, confirmacao]
}

/// Fresh seed for a franchisee, optionally with the unit name pre-filled.
pub fn unit_seed(franchisee_id: &str, name: Option<&str>) -> Seed {
    let mut context = FieldMap::new();
    context.insert("franqueado_id".into(), json!(franchisee_id));

    let mut identificacao = FieldMap::new();
    if let Some(name) = name.filter(|name| !name.trim().is_empty()) {
        identificacao.insert("nome".into(), json!(name));
    }
    let mut endereco = FieldMap::new();
    endereco.insert("pais".into(), json!(DEFAULT_COUNTRY));
    let mut gps = FieldMap::new();
    gps.insert("requer_aprovacao_checkin".into(), json!(false));

    Seed::blank()
        .with_values(CONTEXT_KEY, context)
        .with_values(IDENTIFICACAO, identificacao)
        .with_values(ENDERECO, endereco)
        .with_values(GPS, gps)
}

fn coordinate(data: &FormData, field: &str) -> Option<f64> {
    filled(data, GPS, field).and_then(|text| text.parse::<f64>().ok())
}

fn checkin_approval(data: &FormData) -> bool {
    match data.get(GPS).and_then(|values| values.get("requer_aprovacao_checkin")) {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => matches!(text.trim(), "true" | "yes" | "sim" | "1"),
        _ => false,
    }
}

/// Builds the unit submission: optional address creation, then the unit
/// itself referencing the created address.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnitPlanner;

impl UnitPlanner {
    fn address_body(data: &FormData) -> Option<Value> {
        let cep = filled(data, ENDERECO, "cep").map(|cep| digits_only(&cep))?;
        let street = filled(data, ENDERECO, "logradouro")?;
        if cep.len() != 8 {
            return None;
        }
        let mut body = Map::new();
        body.insert("cep".into(), json!(cep));
        body.insert("logradouro".into(), json!(street));
        body.insert(
            "numero".into(),
            json!(filled(data, ENDERECO, "numero").unwrap_or_else(|| "S/N".into())),
        );
        if let Some(complemento) = filled(data, ENDERECO, "complemento") {
            body.insert("complemento".into(), json!(complemento));
        }
        for field in ["bairro", "cidade", "estado"] {
            body.insert(field.into(), json!(filled(data, ENDERECO, field).unwrap_or_default()));
        }
        body.insert(
            "pais".into(),
            json!(filled(data, ENDERECO, "pais").unwrap_or_else(|| DEFAULT_COUNTRY.into())),
        );
        Some(Value::Object(body))
    }

    fn unit_body(data: &FormData, franchisee_id: String) -> Value {
        let mut body = Map::new();
        body.insert("franqueado_id".into(), json!(franchisee_id));
        body.insert("nome".into(), json!(filled(data, IDENTIFICACAO, "nome").unwrap_or_default()));
        body.insert(
            "razao_social".into(),
            json!(filled(data, IDENTIFICACAO, "razao_social").unwrap_or_default()),
        );
        body.insert("status".into(), json!(CREATED_STATUS));
        body.insert("ativo".into(), json!(true));

        for field in ["nome_fantasia", "inscricao_estadual", "inscricao_municipal"] {
            if let Some(value) = filled(data, IDENTIFICACAO, field) {
                body.insert(field.into(), json!(value));
            }
        }
        let digit_fields = [
            (IDENTIFICACAO, "cnpj"),
            (CONTATO, "telefone_celular"),
            (CONTATO, "telefone_fixo"),
        ];
        for (step, field) in digit_fields {
            if let Some(value) = filled(data, step, field).map(|value| digits_only(&value)) {
                body.insert(field.into(), json!(value));
            }
        }
        for field in ["email", "website"] {
            if let Some(value) = filled(data, CONTATO, field) {
                body.insert(field.into(), json!(value));
            }
        }

        let mut social = Map::new();
        for field in ["instagram", "facebook"] {
            if let Some(value) = filled(data, CONTATO, field) {
                social.insert(field.into(), json!(value));
            }
        }
        if !social.is_empty() {
            body.insert("redes_sociais".into(), Value::Object(social));
        }

        for field in ["latitude", "longitude"] {
            if let Some(value) = coordinate(data, field) {
                body.insert(field.into(), json!(value));
            }
        }
        body.insert("requer_aprovacao_checkin".into(), json!(checkin_approval(data)));
        Value::Object(body)
    }
}

impl SubmissionPlanner for UnitPlanner {
    fn plan(&self, data: &FormData) -> Result<SubmissionPlan> {
        let franchisee_id = context_text(data, "franqueado_id")
            .ok_or_else(|| WizardError::Plan("No franchisee selected for this unit.".into()))?;

        let mut plan = SubmissionPlan::new("Unit registered! It is now pending review.")
            .with_fallback_message("Could not register the unit");
        if let Some(address) = Self::address_body(data) {
            plan.push(
                PlannedCall::primary("address", RemoteRequest::post("/enderecos", address))
                    .capture("endereco_id", "id")
                    .with_failure_message("Could not save the address"),
            );
        }
        Ok(plan.call(
            PlannedCall::primary(
                "unit",
                RemoteRequest::post("/unidades", Self::unit_body(data, franchisee_id)),
            )
            .inject("endereco_id", "endereco_id"),
        ))
    }
}

pub fn unit_wizard(gateway: Arc<dyn RemoteGateway>) -> Result<WizardEngine> {
    WizardEngine::new(UNIT_WIZARD, unit_steps(), Arc::new(UnitPlanner), gateway)
}
