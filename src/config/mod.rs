use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::errors::WizardError;
use crate::utils::{app_data_dir, config_file_in, ensure_dir};

const TMP_SUFFIX: &str = "tmp";

/// Runtime settings shared by the flows and the terminal host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    /// Pause between the success notice and the completion callback.
    pub completion_delay_ms: u64,
    /// Digit count at which a postal code triggers the address lookup.
    pub postal_code_digits: usize,
    pub postal_lookup_url: String,
    pub geocoder_url: String,
    pub geocoder_country: String,
    pub accept_language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000/api".into(),
            completion_delay_ms: 800,
            postal_code_digits: 8,
            postal_lookup_url: "https://viacep.com.br/ws".into(),
            geocoder_url: "https://nominatim.openstreetmap.org/search".into(),
            geocoder_country: "br".into(),
            accept_language: "pt-BR".into(),
            request_timeout_secs: None,
        }
    }
}

impl Config {
    pub fn completion_delay(&self) -> Duration {
        Duration::from_millis(self.completion_delay_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    fn validate(&self) -> Result<(), WizardError> {
        if self.api_base_url.trim().is_empty() {
            return Err(WizardError::Config("api_base_url cannot be empty".into()));
        }
        if self.postal_code_digits == 0 {
            return Err(WizardError::Config(
                "postal_code_digits must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self, WizardError> {
        Self::with_base_dir(app_data_dir())
    }

    pub fn with_base_dir(base: PathBuf) -> Result<Self, WizardError> {
        ensure_dir(&base)?;
        Ok(Self {
            path: config_file_in(&base),
        })
    }

    /// Reads the stored configuration; a missing file yields the defaults.
    pub fn load(&self) -> Result<Config, WizardError> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }
        let data = fs::read_to_string(&self.path)?;
        let config: Config = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, config: &Config) -> Result<(), WizardError> {
        config.validate()?;
        if let Some(parent) = self.path.parent() {
            ensure_dir(parent)?;
        }
        let json = serde_json::to_string_pretty(config)?;
        let tmp = tmp_path(&self.path);
        write_file(&tmp, &json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let ext = match path.extension().and_then(|ext| ext.to_str()) {
        Some(existing) => format!("{}.{}", existing, TMP_SUFFIX),
        None => TMP_SUFFIX.to_string(),
    };
    tmp.set_extension(ext);
    tmp
}

fn write_file(path: &Path, data: &str) -> Result<(), WizardError> {
    let mut file = File::create(path)?;
    file.write_all(data.as_bytes())?;
    file.flush()?;
    Ok(())
}
