//! Run settings taken from the environment.
//!
//! | Variable | Meaning |
//! |---|---|
//! | `ARTIFACTOR_TOKEN_SECRET` | secret store key of the access token |
//! | `ARTIFACTOR_TIMEOUT` | deadline for the whole run, e.g. `30m` |
//! | `ARTIFACTOR_REGION` | region override |
//!
//! Command-line flags take precedence over all of these.

use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::consts::TOKEN_SECRET_KEY;

pub const ENV_TOKEN_SECRET: &str = "ARTIFACTOR_TOKEN_SECRET";
pub const ENV_TIMEOUT: &str = "ARTIFACTOR_TIMEOUT";
pub const ENV_REGION: &str = "ARTIFACTOR_REGION";

#[derive(Debug, Error)]
pub enum SettingsError {
  #[error("invalid {} \"{value}\": {source}", ENV_TIMEOUT)]
  Timeout {
    value: String,
    #[source]
    source: humantime::DurationError,
  },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
  pub token_secret: String,
  pub timeout: Option<Duration>,
  pub region: Option<String>,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      token_secret: TOKEN_SECRET_KEY.to_string(),
      timeout: None,
      region: None,
    }
  }
}

fn non_empty_var(name: &str) -> Option<String> {
  std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

impl Settings {
  pub fn from_env() -> Result<Self, SettingsError> {
    let timeout = non_empty_var(ENV_TIMEOUT)
      .map(|value| {
        humantime::parse_duration(value.trim()).map_err(|source| SettingsError::Timeout { value, source })
      })
      .transpose()?;

    Ok(Self {
      token_secret: non_empty_var(ENV_TOKEN_SECRET).unwrap_or_else(|| TOKEN_SECRET_KEY.to_string()),
      timeout,
      region: non_empty_var(ENV_REGION),
    })
  }

  /// The configured region, else the one the cloud SDK resolved.
  pub fn resolve_region(&self, sdk_region: Option<String>) -> Result<String, ConfigError> {
    self.region.clone().or(sdk_region).ok_or(ConfigError::MissingRegion)
  }
}
