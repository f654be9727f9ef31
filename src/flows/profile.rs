//! Complete-profile wizard for students whose registration is missing
//! address, personal, health or graduation data.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{context_text, context_value, date_part, filled, today, CONTEXT_KEY};
use crate::enrichment::AddressFields;
use crate::errors::{Result, WizardError};
use crate::remote::{fetch_optional, RemoteGateway, RemoteRequest};
use crate::wizard::masks::digits_only;
use crate::wizard::step::value_text;
use crate::wizard::{
    FieldDescriptor, FieldKind, FieldMap, FormData, Mask, PlannedCall, Seed, StepDefinition,
    SubmissionPlan, SubmissionPlanner, Validator, WizardEngine,
};

pub const PROFILE_WIZARD: &str = "complete-profile";

pub const ADDRESS: &str = "address";
pub const DADOS: &str = "dados";
pub const SAUDE: &str = "saude";
pub const OUTRAS: &str = "outras";
pub const JIU: &str = "jiu";

pub const GENEROS: [&str; 4] = ["MASCULINO", "FEMININO", "OUTRO", "NAO_INFORMADO"];
pub const FAIXAS: [&str; 9] = [
    "BRANCA", "CINZA", "AMARELA", "LARANJA", "VERDE", "AZUL", "ROXA", "MARROM", "PRETA",
];

const ADDRESS_REQUIRED: &str = "Fill in postal code, street and number.";
const DADOS_REQUIRED: &str = "Full name, birth date and gender are required.";

const SAUDE_FIELDS: [(&str, &str); 7] = [
    ("nome_contato_emergencia", "Emergency contact"),
    ("telefone_emergencia", "Emergency phone"),
    ("plano_saude", "Health plan"),
    ("alergias", "Allergies"),
    ("medicamentos_uso_continuo", "Continuous medication"),
    ("restricoes_medicas", "Medical restrictions"),
    ("observacoes_medicas", "Medical notes"),
];

/// Address fields filled by the postal-code lookup.
pub const ADDRESS_FIELDS: AddressFields = AddressFields {
    step: ADDRESS,
    postal_code: "cep",
    street: "logradouro",
    district: "bairro",
    city: "cidade",
    state: "uf",
    complement: Some("complemento"),
};

/// The account the profile belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileOwner {
    pub user_id: String,
    pub email: Option<String>,
    pub cadastro_completo: bool,
}

/// A non-jiu-jitsu modality the student is enrolled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedModality {
    pub id: String,
    pub nome: String,
}

pub fn is_jiu_jitsu(name: &str) -> bool {
    let name = name.to_lowercase();
    ["jiu", "jitsu", "bjj"].iter().any(|token| name.contains(token))
}

fn has_jiu(data: &FormData) -> bool {
    matches!(context_value(data, "has_jiu"), Some(Value::Bool(true)))
}

/// Modalities stored by the seed loader under the context key.
pub fn linked_modalities(data: &FormData) -> Vec<LinkedModality> {
    match context_value(data, "outras") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| {
                let id = item.get("id").map(value_text)?;
                let nome = item.get("nome").map(value_text).unwrap_or_default();
                (!id.is_empty()).then_some(LinkedModality { id, nome })
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn graduation_key(modality_id: &str) -> String {
    format!("{modality_id}.graduacao_atual")
}

fn graduation_date_key(modality_id: &str) -> String {
    format!("{modality_id}.data_ultima_graduacao")
}

fn text(key: &str, label: &str) -> FieldDescriptor {
    FieldDescriptor::new(key, label, FieldKind::Text, Validator::None)
}

fn past_date(key: &str, label: &str) -> FieldDescriptor {
    FieldDescriptor::new(key, label, FieldKind::Date, Validator::Date { allow_future: false })
}

pub fn profile_steps() -> Vec<StepDefinition> {
    let address = StepDefinition::new(
        ADDRESS,
        "Address",
        vec![
            text("cep", "Postal code")
                .with_mask(Mask::Cep)
                .with_required_message(ADDRESS_REQUIRED),
            text("logradouro", "Street").with_required_message(ADDRESS_REQUIRED),
            text("numero", "Number").with_required_message(ADDRESS_REQUIRED),
            text("complemento", "Complement").with_optional(),
            text("bairro", "District").with_optional(),
            text("cidade", "City").with_optional(),
            text("uf", "State").with_optional(),
        ],
    );

    let generos: Vec<String> = GENEROS.iter().map(|g| g.to_string()).collect();
    let dados = StepDefinition::new(
        DADOS,
        "Personal data",
        vec![
            text("nome_completo", "Full name").with_required_message(DADOS_REQUIRED),
            FieldDescriptor::new("cpf", "CPF", FieldKind::Text, Validator::Digits(11))
                .with_mask(Mask::Cpf)
                .with_optional(),
            text("telefone", "Phone").with_mask(Mask::Phone).with_optional(),
            past_date("data_nascimento", "Birth date").with_required_message(DADOS_REQUIRED),
            FieldDescriptor::new(
                "genero",
                "Gender",
                FieldKind::Choice(generos.clone()),
                Validator::OneOf(generos),
            )
            .with_required_message(DADOS_REQUIRED),
            FieldDescriptor::new("email", "E-mail", FieldKind::Text, Validator::Email)
                .with_optional(),
        ],
    );

    let saude = StepDefinition::new(
        SAUDE,
        "Health & emergency",
        SAUDE_FIELDS
            .iter()
            .map(|(key, label)| {
                let field = text(key, label).with_optional();
                if *key == "telefone_emergencia" {
                    field.with_mask(Mask::Phone)
                } else {
                    field
                }
            })
            .collect(),
    );

    let outras = StepDefinition::new(OUTRAS, "Other modalities", vec![])
        .included_when(|data| !linked_modalities(data).is_empty())
        .with_dynamic_fields(|data| {
            linked_modalities(data)
                .into_iter()
                .flat_map(|modality| {
                    [
                        text(
                            &graduation_key(&modality.id),
                            &format!("{}: current graduation", modality.nome),
                        )
                        .with_optional(),
                        past_date(
                            &graduation_date_key(&modality.id),
                            &format!("{}: last graduation date", modality.nome),
                        )
                        .with_optional(),
                    ]
                })
                .collect()
        });

    let faixas: Vec<String> = FAIXAS.iter().map(|f| f.to_string()).collect();
    let jiu = StepDefinition::new(
        JIU,
        "Jiu-jitsu graduation",
        vec![
            FieldDescriptor::new(
                "faixa_atual",
                "Belt",
                FieldKind::Choice(faixas.clone()),
                Validator::OneOf(faixas),
            ),
            FieldDescriptor::new(
                "graus",
                "Degrees",
                FieldKind::Integer,
                Validator::IntegerRange { min: 0, max: 4 },
            ),
            past_date("data_ultima_graduacao", "Last graduation date"),
        ],
    )
    .included_when(has_jiu);

    vec![address, dados, saude, outras, jiu]
}

#[derive(Debug, Deserialize)]
struct ModalityRecord {
    id: Value,
    #[serde(default)]
    nome: String,
    #[serde(default)]
    graduacao_atual: Option<String>,
    #[serde(default)]
    data_ultima_graduacao: Option<String>,
}

fn copy_text(target: &mut FieldMap, source: &Value, field: &str) {
    let value = source
        .get(field)
        .filter(|value| !value.is_null())
        .map(value_text)
        .unwrap_or_default();
    target.insert(field.to_string(), Value::String(value));
}

/// Builds the seed for `owner`: a completed seed when the profile is already
/// complete, otherwise whatever the backend knows about the student.
pub async fn load_profile_seed(gateway: &dyn RemoteGateway, owner: &ProfileOwner) -> Result<Seed> {
    if owner.cadastro_completo {
        return Ok(Seed::completed());
    }

    let mut context = FieldMap::new();
    context.insert("user_id".into(), json!(owner.user_id));

    let path = format!("/alunos/usuario/{}", owner.user_id);
    let student = match fetch_optional(gateway, &path).await {
        Ok(student) => student,
        Err(err) => {
            tracing::warn!(
                user = %owner.user_id,
                error = %err,
                "student fetch failed, starting blank"
            );
            None
        }
    };
    let Some(student) = student else {
        return Ok(Seed::blank().with_values(CONTEXT_KEY, context));
    };
    let student_id = match student.get("id") {
        Some(id) if !id.is_null() => value_text(id),
        _ => String::new(),
    };
    if student_id.is_empty() {
        tracing::debug!(user = %owner.user_id, "student record has no id, starting blank");
        return Ok(Seed::blank().with_values(CONTEXT_KEY, context));
    }
    context.insert("aluno_id".into(), json!(student_id));

    let mut dados = FieldMap::new();
    for field in ["nome_completo", "cpf", "telefone", "genero"] {
        copy_text(&mut dados, &student, field);
    }
    let birth = student
        .get("data_nascimento")
        .and_then(Value::as_str)
        .map(date_part)
        .unwrap_or_default();
    dados.insert("data_nascimento".into(), json!(birth));
    let email = student
        .get("email")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| owner.email.clone())
        .unwrap_or_default();
    dados.insert("email".into(), json!(email));

    let mut saude = FieldMap::new();
    for (field, _) in SAUDE_FIELDS {
        copy_text(&mut saude, &student, field);
    }

    let mut seed = Seed::blank().with_values(DADOS, dados).with_values(SAUDE, saude);

    let modalities_path = format!("/alunos/{student_id}/modalidades");
    let modalities = gateway
        .send(&RemoteRequest::get(modalities_path))
        .await
        .map_err(|err| err.to_string())
        .and_then(|payload| {
            if payload.is_null() {
                return Ok(Vec::new());
            }
            serde_json::from_value::<Vec<ModalityRecord>>(payload).map_err(|err| err.to_string())
        });

    match modalities {
        Ok(records) => {
            let (jiu, outras): (Vec<_>, Vec<_>) =
                records.into_iter().partition(|record| is_jiu_jitsu(&record.nome));
            context.insert("has_jiu".into(), json!(!jiu.is_empty()));

            let mut graduations = FieldMap::new();
            let mut listed = Vec::new();
            for record in outras {
                let id = value_text(&record.id);
                if id.is_empty() {
                    continue;
                }
                graduations.insert(
                    graduation_key(&id),
                    json!(record.graduacao_atual.unwrap_or_default()),
                );
                let date = record
                    .data_ultima_graduacao
                    .as_deref()
                    .map(date_part)
                    .unwrap_or_else(today);
                graduations.insert(graduation_date_key(&id), json!(date));
                listed.push(json!({ "id": id, "nome": record.nome }));
            }
            context.insert("outras".into(), Value::Array(listed));
            if !graduations.is_empty() {
                seed = seed.with_values(OUTRAS, graduations);
            }
            if !jiu.is_empty() {
                let mut belt = FieldMap::new();
                belt.insert("faixa_atual".into(), json!("BRANCA"));
                belt.insert("graus".into(), json!(0));
                belt.insert("data_ultima_graduacao".into(), json!(today()));
                seed = seed.with_values(JIU, belt);
            }
        }
        Err(err) => {
            tracing::warn!(
                student = %student_id,
                error = %err,
                "modalities unavailable, skipping graduation steps"
            );
        }
    }

    Ok(seed.with_values(CONTEXT_KEY, context))
}

/// Builds the profile submission: student update, per-modality graduations
/// and the completion flag.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProfilePlanner;

impl ProfilePlanner {
    fn student_body(data: &FormData) -> Map<String, Value> {
        let mut body = Map::new();
        let cep = filled(data, ADDRESS, "cep").map(|cep| digits_only(&cep)).unwrap_or_default();
        body.insert("cep".into(), json!(cep));
        for field in ["logradouro", "numero"] {
            body.insert(field.into(), json!(filled(data, ADDRESS, field).unwrap_or_default()));
        }
        for field in ["complemento", "bairro", "cidade", "uf"] {
            if let Some(value) = filled(data, ADDRESS, field) {
                body.insert(field.into(), json!(value));
            }
        }

        body.insert(
            "nome_completo".into(),
            json!(filled(data, DADOS, "nome_completo").unwrap_or_default()),
        );
        if let Some(cpf) = filled(data, DADOS, "cpf").map(|cpf| digits_only(&cpf)) {
            if !cpf.is_empty() {
                body.insert("cpf".into(), json!(cpf));
            }
        }
        for field in ["telefone", "data_nascimento", "genero", "email"] {
            if let Some(value) = filled(data, DADOS, field) {
                body.insert(field.into(), json!(value));
            }
        }
        for (field, _) in SAUDE_FIELDS {
            if let Some(value) = filled(data, SAUDE, field) {
                body.insert(field.into(), json!(value));
            }
        }

        if has_jiu(data) {
            body.insert(
                "faixa_atual".into(),
                json!(filled(data, JIU, "faixa_atual").unwrap_or_else(|| "BRANCA".into())),
            );
            let graus = filled(data, JIU, "graus")
                .and_then(|graus| graus.parse::<i64>().ok())
                .unwrap_or(0);
            body.insert("graus".into(), json!(graus));
            if let Some(date) = filled(data, JIU, "data_ultima_graduacao") {
                body.insert("data_ultima_graduacao".into(), json!(date));
            }
        }
        body
    }
}

impl SubmissionPlanner for ProfilePlanner {
    fn plan(&self, data: &FormData) -> Result<SubmissionPlan> {
        let student_id = context_text(data, "aluno_id").ok_or_else(|| {
            WizardError::Plan("No student record is linked to this account.".into())
        })?;
        let user_id = context_text(data, "user_id")
            .ok_or_else(|| WizardError::Plan("No user is signed in.".into()))?;

        let mut plan = SubmissionPlan::new("Profile completed successfully!").call(
            PlannedCall::primary(
                "student",
                RemoteRequest::patch(
                    format!("/alunos/{student_id}"),
                    Value::Object(Self::student_body(data)),
                ),
            )
            .with_failure_message("Could not save the student data"),
        );

        for modality in linked_modalities(data) {
            let Some(graduation) = filled(data, OUTRAS, &graduation_key(&modality.id)) else {
                continue;
            };
            let mut body = Map::new();
            body.insert("graduacao_atual".into(), json!(graduation));
            if let Some(date) = filled(data, OUTRAS, &graduation_date_key(&modality.id)) {
                body.insert("data_ultima_graduacao".into(), json!(date));
            }
            plan.push(PlannedCall::secondary(
                format!("graduation:{}", modality.id),
                RemoteRequest::patch(
                    format!("/alunos/{student_id}/modalidades/{}/graduacao", modality.id),
                    Value::Object(body),
                ),
            ));
        }

        Ok(plan.call(PlannedCall::completion(
            "profile-complete",
            RemoteRequest::patch(
                format!("/usuarios/{user_id}"),
                json!({ "cadastro_completo": true }),
            ),
        )))
    }
}

/// Engine wired with the profile steps and planner.
pub fn profile_wizard(gateway: Arc<dyn RemoteGateway>) -> Result<WizardEngine> {
    WizardEngine::new(PROFILE_WIZARD, profile_steps(), Arc::new(ProfilePlanner), gateway)
}
