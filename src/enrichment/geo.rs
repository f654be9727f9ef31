use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;

use super::LookupOutcome;
use crate::errors::{LookupError, WizardError};
use crate::wizard::step::value_text;
use crate::wizard::{FormData, Notice, WizardEngine};

const AGENT: &str = concat!("onboarding_core/", env!("CARGO_PKG_VERSION"));
const RESULT_LIMIT: &str = "5";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Text written into the form, 8 decimal places.
    pub fn formatted(&self) -> (String, String) {
        (
            format!("{:.8}", self.latitude),
            format!("{:.8}", self.longitude),
        )
    }
}

/// Source of the device's current position.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_position(&self) -> Result<Coordinates, LookupError>;
}

/// Provider for hosts without positioning hardware.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLocation;

#[async_trait]
impl LocationProvider for NoLocation {
    async fn current_position(&self) -> Result<Coordinates, LookupError> {
        Err(LookupError::Unsupported("Device geolocation".into()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeMatch {
    pub coordinates: Coordinates,
    pub display_name: String,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Free-text search; best match first.
    async fn search(&self, query: &str) -> Result<Vec<GeocodeMatch>, LookupError>;
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
}

/// Nominatim-compatible search endpoint.
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: reqwest::Client,
    url: String,
    country: String,
    language: String,
}

impl NominatimGeocoder {
    pub fn new(
        url: impl Into<String>,
        country: impl Into<String>,
        language: impl Into<String>,
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
            url: url.into(),
            country: country.into(),
            language: language.into(),
        })
    }

    fn search_url(&self, query: &str) -> Result<Url, LookupError> {
        Url::parse_with_params(
            &self.url,
            &[
                ("q", query),
                ("format", "json"),
                ("limit", RESULT_LIMIT),
                ("countrycodes", self.country.as_str()),
            ],
        )
        .map_err(|err| LookupError::Transport(err.to_string()))
    }
}

pub(crate) fn parse_places(payload: Value) -> Result<Vec<GeocodeMatch>, LookupError> {
    let places: Vec<NominatimPlace> =
        serde_json::from_value(payload).map_err(|err| LookupError::Decode(err.to_string()))?;
    places
        .into_iter()
        .map(|place| {
            let latitude = place.lat.trim().parse::<f64>();
            let longitude = place.lon.trim().parse::<f64>();
            match (latitude, longitude) {
                (Ok(latitude), Ok(longitude)) => Ok(GeocodeMatch {
                    coordinates: Coordinates {
                        latitude,
                        longitude,
                    },
                    display_name: place.display_name,
                }),
                _ => Err(LookupError::Decode(format!(
                    "invalid coordinates {}, {}",
                    place.lat, place.lon
                ))),
            }
        })
        .collect()
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn search(&self, query: &str) -> Result<Vec<GeocodeMatch>, LookupError> {
        let response = self
            .client
            .get(self.search_url(query)?)
            .header(ACCEPT_LANGUAGE, self.language.as_str())
            .header(USER_AGENT, AGENT)
            .send()
            .await
            .map_err(|err| LookupError::Transport(err.to_string()))?;
        if !response.status().is_success() {
            return Err(LookupError::Transport(format!(
                "geocoder responded with status {}",
                response.status().as_u16()
            )));
        }
        let payload: Value = response
            .json()
            .await
            .map_err(|err| LookupError::Decode(err.to_string()))?;
        parse_places(payload)
    }
}

/// Where coordinates land in the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinateFields {
    pub step: &'static str,
    pub latitude: &'static str,
    pub longitude: &'static str,
}

/// Joins the non-empty `parts` of `step` plus `suffix` into a search query.
/// Returns `None` unless every `required` part is filled.
pub fn address_query(
    data: &FormData,
    step: &str,
    parts: &[&str],
    required: &[&str],
    suffix: &str,
) -> Option<String> {
    let values = data.get(step)?;
    let text = |field: &str| {
        values
            .get(field)
            .map(value_text)
            .map(|value| value.trim().to_string())
            .unwrap_or_default()
    };
    if required.iter().any(|field| text(field).is_empty()) {
        return None;
    }
    let mut pieces: Vec<String> = parts
        .iter()
        .map(|field| text(field))
        .filter(|value| !value.is_empty())
        .collect();
    if !suffix.is_empty() {
        pieces.push(suffix.to_string());
    }
    Some(pieces.join(", "))
}

fn write_coordinates(
    engine: &mut WizardEngine,
    fields: CoordinateFields,
    coordinates: Coordinates,
) -> Result<LookupOutcome, WizardError> {
    let (latitude, longitude) = coordinates.formatted();
    engine.update_field(fields.step, fields.latitude, latitude)?;
    engine.update_field(fields.step, fields.longitude, longitude)?;
    Ok(LookupOutcome::Filled(vec![
        fields.latitude.to_string(),
        fields.longitude.to_string(),
    ]))
}

/// Fills the coordinate fields from the device position.
pub async fn fill_from_device(
    engine: &mut WizardEngine,
    provider: &dyn LocationProvider,
    fields: CoordinateFields,
) -> Result<LookupOutcome, WizardError> {
    match provider.current_position().await {
        Ok(coordinates) => {
            let outcome = write_coordinates(engine, fields, coordinates)?;
            engine.notify(Notice::Success("Location captured".into()));
            Ok(outcome)
        }
        Err(err) => {
            tracing::warn!(error = %err, "device location unavailable");
            engine.notify(Notice::Error(format!("Could not get the location: {err}")));
            Ok(LookupOutcome::Failed(err.to_string()))
        }
    }
}

/// Geocodes `query` and writes the best match into the coordinate fields.
/// `None` means the address is too incomplete to search.
pub async fn fill_from_address(
    engine: &mut WizardEngine,
    geocoder: &dyn Geocoder,
    fields: CoordinateFields,
    query: Option<String>,
) -> Result<LookupOutcome, WizardError> {
    let Some(query) = query else {
        engine.notify(Notice::Error("Fill in the address first".into()));
        return Ok(LookupOutcome::Skipped);
    };

    match geocoder.search(&query).await {
        Ok(matches) => match matches.into_iter().next() {
            Some(best) => {
                tracing::debug!(%query, place = %best.display_name, "address geocoded");
                let outcome = write_coordinates(engine, fields, best.coordinates)?;
                engine.notify(Notice::Success("Coordinates found for the address".into()));
                Ok(outcome)
            }
            None => {
                engine.notify(Notice::Info("No coordinates found for this address".into()));
                Ok(LookupOutcome::NotFound)
            }
        },
        Err(err) => {
            tracing::warn!(%query, error = %err, "geocoding failed");
            engine.notify(Notice::Error("Could not look up the coordinates".into()));
            Ok(LookupOutcome::Failed(err.to_string()))
        }
    }
}
