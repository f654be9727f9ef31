#![doc(test(attr(deny(warnings))))]

//! Onboarding Core drives multi-step onboarding wizards: conditional step
//! sequences, per-step validation gates, optional address enrichment and an
//! ordered multi-call submission against a REST backend.

pub mod cli;
pub mod config;
pub mod enrichment;
pub mod errors;
pub mod flows;
pub mod remote;
pub mod utils;
pub mod wizard;

use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Initializes global tracing and emits a startup info log.
pub fn init() {
    INIT_TRACING.call_once(|| {
        utils::init_tracing();
        tracing::debug!("Onboarding Core tracing initialized.");
    });
}
