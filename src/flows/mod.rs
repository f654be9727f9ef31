//! The two wizards shipped with the crate: completing a student profile and
//! onboarding a new unit for a franchisee.

pub mod profile;
pub mod unit;

use chrono::Local;
use serde_json::Value;

use crate::wizard::step::value_text;
use crate::wizard::FormData;

/// Auxiliary form-data key holding loader context (ids, linked items).
/// Never a step id, so it never shows up in a sequence.
pub const CONTEXT_KEY: &str = "context";

/// Trimmed text of a field, `None` when blank.
pub(crate) fn filled(data: &FormData, step: &str, field: &str) -> Option<String> {
    data.get(step)
        .and_then(|values| values.get(field))
        .map(value_text)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

pub(crate) fn context_value<'a>(data: &'a FormData, key: &str) -> Option<&'a Value> {
    data.get(CONTEXT_KEY).and_then(|context| context.get(key))
}

pub(crate) fn context_text(data: &FormData, key: &str) -> Option<String> {
    filled(data, CONTEXT_KEY, key)
}

pub(crate) fn today() -> String {
    Local::now().date_naive().format("%Y-%m-%d").to_string()
}

/// Date part of an ISO timestamp (`2020-05-01T00:00:00.000Z` → `2020-05-01`).
pub(crate) fn date_part(raw: &str) -> String {
    raw.split('T').next().unwrap_or_default().to_string()
}
