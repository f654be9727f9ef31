use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::LookupOutcome;
use crate::errors::{LookupError, WizardError};
use crate::wizard::masks::digits_only;
use crate::wizard::{Notice, WizardEngine};

const DEFAULT_TRIGGER_DIGITS: usize = 8;

/// Address returned by a postal-code lookup. Empty strings mean "unknown".
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PostalAddress {
    pub logradouro: String,
    pub complemento: String,
    pub bairro: String,
    pub localidade: String,
    pub uf: String,
}

#[async_trait]
pub trait PostalLookup: Send + Sync {
    /// Looks up an address by its digits-only postal code. `None` means not found.
    async fn lookup(&self, postal_code: &str) -> Result<Option<PostalAddress>, LookupError>;
}

/// ViaCEP client (`GET {base}/{cep}/json/`).
#[derive(Debug, Clone)]
pub struct ViaCepLookup {
    client: reqwest::Client,
    base_url: String,
}

impl ViaCepLookup {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, LookupError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder
                .build()
                .map_err(|err| LookupError::Transport(err.to_string()))?,
            base_url: base_url.into(),
        })
    }

    fn url_for(&self, postal_code: &str) -> String {
        format!("{}/{}/json/", self.base_url.trim_end_matches('/'), postal_code)
    }
}

/// ViaCEP answers unknown codes with `{"erro": true}` (older versions: `"true"`).
pub(crate) fn parse_viacep(payload: Value) -> Result<Option<PostalAddress>, LookupError> {
    let not_found = match payload.get("erro") {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => text == "true",
        Some(_) => true,
        None => false,
    };
    if not_found || !payload.is_object() {
        return Ok(None);
    }
    serde_json::from_value(payload)
        .map(Some)
        .map_err(|err| LookupError::Decode(err.to_string()))
}

#[async_trait]
impl PostalLookup for ViaCepLookup {
    async fn lookup(&self, postal_code: &str) -> Result<Option<PostalAddress>, LookupError> {
        let response = self
            .client
            .get(self.url_for(postal_code))
            .send()
            .await
            .map_err(|err| LookupError::Transport(err.to_string()))?;
        // ViaCEP answers malformed codes with 400; treat like "not found".
        if response.status().is_client_error() {
            return Ok(None);
        }
        let payload: Value = response
            .json()
            .await
            .map_err(|err| LookupError::Decode(err.to_string()))?;
        parse_viacep(payload)
    }
}

/// Field names an address step uses for the lookup result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressFields {
    pub step: &'static str,
    pub postal_code: &'static str,
    pub street: &'static str,
    pub district: &'static str,
    pub city: &'static str,
    pub state: &'static str,
    pub complement: Option<&'static str>,
}

/// Fills address fields once a postal code reaches its full length.
pub struct AddressAutofill {
    lookup: Arc<dyn PostalLookup>,
    fields: AddressFields,
    trigger_digits: usize,
}

impl AddressAutofill {
    pub fn new(lookup: Arc<dyn PostalLookup>, fields: AddressFields) -> Self {
        Self {
            lookup,
            fields,
            trigger_digits: DEFAULT_TRIGGER_DIGITS,
        }
    }

    pub fn with_trigger_digits(mut self, digits: usize) -> Self {
        self.trigger_digits = digits;
        self
    }

    pub fn fields(&self) -> &AddressFields {
        &self.fields
    }

    /// Records the edited postal code and, when it has exactly the trigger
    /// digit count, merges the lookup result. Only non-empty response values
    /// overwrite form fields.
    pub async fn postal_code_edited(
        &self,
        engine: &mut WizardEngine,
        raw: &str,
    ) -> Result<LookupOutcome, WizardError> {
        let fields = self.fields;
        engine.update_field(fields.step, fields.postal_code, raw)?;

        let digits = digits_only(raw);
        if digits.len() != self.trigger_digits {
            return Ok(LookupOutcome::Skipped);
        }

        match self.lookup.lookup(&digits).await {
            Ok(Some(address)) => {
                let mut pairs = vec![
                    (fields.street, address.logradouro),
                    (fields.district, address.bairro),
                    (fields.city, address.localidade),
                    (fields.state, address.uf),
                ];
                if let Some(complement) = fields.complement {
                    pairs.push((complement, address.complemento));
                }

                let mut filled = Vec::new();
                for (field, value) in pairs {
                    if value.trim().is_empty() {
                        continue;
                    }
                    engine.update_field(fields.step, field, value)?;
                    filled.push(field.to_string());
                }
                tracing::debug!(postal_code = %digits, filled = filled.len(), "address autofilled");
                engine.notify(Notice::Success("Address found".into()));
                Ok(LookupOutcome::Filled(filled))
            }
            Ok(None) => {
                engine.notify(Notice::Info("Postal code not found".into()));
                Ok(LookupOutcome::NotFound)
            }
            Err(err) => {
                tracing::warn!(postal_code = %digits, error = %err, "postal code lookup failed");
                engine.notify(Notice::Info("Could not look up the postal code".into()));
                Ok(LookupOutcome::Failed(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn viacep_error_flag_means_not_found() {
        assert_eq!(parse_viacep(json!({ "erro": true })).unwrap(), None);
        assert_eq!(parse_viacep(json!({ "erro": "true" })).unwrap(), None);
        assert_eq!(parse_viacep(Value::Null).unwrap(), None);
    }

    #[test]
    fn viacep_payload_is_decoded() {
        let payload = json!({
            "cep": "01310-100",
            "logradouro": "Avenida Paulista",
            "complemento": "de 612 a 1510 - lado par",
            "bairro": "Bela Vista",
            "localidade": "São Paulo",
            "uf": "SP",
            "ibge": "3550308"
        });
        let address = parse_viacep(payload).unwrap().unwrap();
        assert_eq!(address.logradouro, "Avenida Paulista");
        assert_eq!(address.localidade, "São Paulo");
        assert_eq!(address.uf, "SP");
    }

    #[test]
    fn lookup_url_shape() {
        let lookup = ViaCepLookup::new("https://viacep.com.br/ws/", None).unwrap();
        assert_eq!(lookup.url_for("01310100"), "https://viacep.com.br/ws/01310100/json/");
    }
}
