//! Terminal host for the bundled wizards.

pub mod args;
pub mod output;
pub mod prompts;
pub mod runner;

use std::{env, io, sync::Arc};

use thiserror::Error;

pub use args::{parse_args, Command, USAGE};
pub use output::ConsoleNotifier;
pub use prompts::{InteractivePrompter, NavAction, Prompter, ScriptPrompter};
pub use runner::{drive, Enrichment, GeocodeSupport, RunOutcome};

use crate::config::{Config, ConfigManager};
use crate::enrichment::{AddressAutofill, NominatimGeocoder, PostalLookup, ViaCepLookup};
use crate::errors::{LookupError, RemoteError, WizardError};
use crate::flows::profile::{self, load_profile_seed, profile_wizard, ProfileOwner};
use crate::flows::unit::{self, unit_seed, unit_wizard};
use crate::remote::{HttpGateway, RemoteGateway};
use crate::utils::build_info;
use crate::wizard::WizardEngine;

const SCRIPT_ENV: &str = "ONBOARDING_CORE_CLI_SCRIPT";
const TOKEN_ENV: &str = "ONBOARDING_TOKEN";

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Wizard(#[from] WizardError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Dialoguer(#[from] dialoguer::Error),
    #[error("input ended before the wizard finished")]
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliMode {
    Interactive,
    Script,
}

impl CliMode {
    pub fn from_env() -> Self {
        if env::var_os(SCRIPT_ENV).is_some() {
            CliMode::Script
        } else {
            CliMode::Interactive
        }
    }
}

pub fn run_cli() -> Result<(), CliError> {
    match parse_args(env::args().skip(1))? {
        Command::Help => {
            println!("{USAGE}");
            Ok(())
        }
        Command::Version => {
            println!("{}", build_info::current().summary());
            Ok(())
        }
        command => {
            let config = ConfigManager::new()?.load()?;
            let mut prompter: Box<dyn Prompter> = match CliMode::from_env() {
                CliMode::Script => Box::new(ScriptPrompter::from_stdin()?),
                CliMode::Interactive => Box::new(InteractivePrompter::new()),
            };
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(run_command(command, &config, prompter.as_mut()))
        }
    }
}

fn configure(engine: WizardEngine, config: &Config, farewell: &'static str) -> WizardEngine {
    engine
        .with_notifier(Arc::new(ConsoleNotifier))
        .with_completion_delay(config.completion_delay())
        .on_complete(move || output::info(farewell))
}

async fn run_command(
    command: Command,
    config: &Config,
    prompter: &mut dyn Prompter,
) -> Result<(), CliError> {
    let token = env::var(TOKEN_ENV).ok().filter(|token| !token.trim().is_empty());
    let gateway: Arc<dyn RemoteGateway> = Arc::new(HttpGateway::new(
        config.api_base_url.as_str(),
        token,
        config.request_timeout(),
    )?);
    let postal: Arc<dyn PostalLookup> = Arc::new(ViaCepLookup::new(
        config.postal_lookup_url.as_str(),
        config.request_timeout(),
    )?);

    let (mut engine, enrichment) = match command {
        Command::Profile {
            user_id,
            email,
            completed,
        } => {
            let mut engine = configure(profile_wizard(gateway.clone())?, config, "Profile saved.");
            engine.begin_loading()?;
            let owner = ProfileOwner {
                user_id,
                email,
                cadastro_completo: completed,
            };
            engine.initialize(load_profile_seed(gateway.as_ref(), &owner).await?)?;
            let enrichment = Enrichment {
                autofill: Some(
                    AddressAutofill::new(postal, profile::ADDRESS_FIELDS)
                        .with_trigger_digits(config.postal_code_digits),
                ),
                geocoding: None,
            };
            (engine, enrichment)
        }
        Command::Unit {
            franchisee_id,
            name,
        } => {
            let mut engine = configure(unit_wizard(gateway)?, config, "Unit onboarding finished.");
            engine.initialize(unit_seed(&franchisee_id, name.as_deref()))?;
            let geocoder = NominatimGeocoder::new(
                config.geocoder_url.as_str(),
                config.geocoder_country.as_str(),
                config.accept_language.as_str(),
                config.request_timeout(),
            )?;
            let enrichment = Enrichment {
                autofill: Some(
                    AddressAutofill::new(postal, unit::ADDRESS_FIELDS)
                        .with_trigger_digits(config.postal_code_digits),
                ),
                geocoding: Some(GeocodeSupport {
                    geocoder: Arc::new(geocoder),
                    fields: unit::COORDINATE_FIELDS,
                    address_step: unit::ENDERECO,
                    parts: &unit::GEOCODE_PARTS,
                    required: &unit::GEOCODE_REQUIRED,
                    suffix: unit::DEFAULT_COUNTRY,
                }),
            };
            (engine, enrichment)
        }
        Command::Help | Command::Version => return Ok(()),
    };

    match drive(&mut engine, prompter, &enrichment).await? {
        RunOutcome::AlreadyComplete => {
            output::info(format!("{} is already complete.", engine.name()))
        }
        RunOutcome::Completed => tracing::info!(wizard = engine.name(), "wizard completed"),
        RunOutcome::Cancelled => output::warning("Wizard cancelled; nothing was saved."),
    }
    Ok(())
}
