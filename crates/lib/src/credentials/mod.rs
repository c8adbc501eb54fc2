//! Short-lived credential acquisition.
//!
//! Every build task needs three things before it can run: the source-hosting
//! access token, cloud credentials, and the cloud account id. The
//! [`CredentialLoader`] fetches all three concurrently and hands back one
//! immutable [`CredentialSet`]. Nothing is cached between loads.

mod aws;

pub use aws::AwsSources;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::consts::{ENV_ACCESS_KEY_ID, ENV_EXTERNAL_TOKEN, ENV_SECRET_ACCESS_KEY, ENV_SESSION_TOKEN};

/// Boxed error returned by credential backends.
pub type SourceError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Cloud access keys as resolved by the default credential chain.
#[derive(Clone, PartialEq, Eq)]
pub struct CloudCredentials {
  pub access_key_id: String,
  pub secret_access_key: String,
  pub session_token: Option<String>,
}

impl fmt::Debug for CloudCredentials {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CloudCredentials")
      .field("access_key_id", &self.access_key_id)
      .field("secret_access_key", &"** redacted **")
      .field("session_token", &self.session_token.as_ref().map(|_| "** redacted **"))
      .finish()
  }
}

/// Everything a single build task needs to authenticate.
///
/// Produced by [`CredentialLoader::load`] and valid for one task only.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialSet {
  pub cloud: CloudCredentials,
  /// Token for the source-hosting service.
  pub external_token: String,
  pub account_id: String,
  /// Primary region builds publish to.
  pub region: String,
}

impl CredentialSet {
  /// Environment variables injected into build commands.
  pub fn env_vars(&self) -> Vec<(&'static str, String)> {
    vec![
      (ENV_ACCESS_KEY_ID, self.cloud.access_key_id.clone()),
      (ENV_SECRET_ACCESS_KEY, self.cloud.secret_access_key.clone()),
      (ENV_SESSION_TOKEN, self.cloud.session_token.clone().unwrap_or_default()),
      (ENV_EXTERNAL_TOKEN, self.external_token.clone()),
    ]
  }

  /// Container registry host for this account and region.
  pub fn registry(&self) -> String {
    format!("{}.dkr.ecr.{}.amazonaws.com", self.account_id, self.region)
  }

  /// Artifact bucket for this account and region.
  pub fn bucket(&self) -> String {
    format!("artifacts-{}-{}", self.account_id, self.region)
  }
}

impl fmt::Debug for CredentialSet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CredentialSet")
      .field("cloud", &self.cloud)
      .field("external_token", &"** redacted **")
      .field("account_id", &self.account_id)
      .field("region", &self.region)
      .finish()
  }
}

/// Backends for the three credential fetches.
#[async_trait]
pub trait CredentialSources: Send + Sync {
  /// Read the external access token stored under `key`.
  async fn external_token(&self, key: &str) -> Result<String, SourceError>;

  /// Resolve cloud credentials from the ambient credential chain.
  async fn cloud_credentials(&self) -> Result<CloudCredentials, SourceError>;

  /// Look up the account id the resolved credentials belong to.
  async fn account_id(&self) -> Result<String, SourceError>;
}

/// Which credential fetch failed.
#[derive(Debug, Error)]
pub enum CredentialError {
  #[error("failed to retrieve token \"{key}\" from the secret store: {source}")]
  Token {
    key: String,
    #[source]
    source: SourceError,
  },

  #[error("failed to acquire cloud credentials: {source}")]
  Credentials {
    #[source]
    source: SourceError,
  },

  #[error("failed to get cloud identity: {source}")]
  Identity {
    #[source]
    source: SourceError,
  },
}

/// Loads a fresh [`CredentialSet`] on every call.
pub struct CredentialLoader {
  sources: Box<dyn CredentialSources>,
  token_key: String,
  region: String,
}

impl CredentialLoader {
  pub fn new(sources: Box<dyn CredentialSources>, token_key: impl Into<String>, region: impl Into<String>) -> Self {
    Self {
      sources,
      token_key: token_key.into(),
      region: region.into(),
    }
  }

  pub fn region(&self) -> &str {
    &self.region
  }

  /// Fetch token, cloud credentials and account id concurrently.
  ///
  /// All three fetches run to completion even when one fails early. If any
  /// failed, the first failure in token, credentials, identity order is
  /// returned; partial results are discarded.
  pub async fn load(&self) -> Result<CredentialSet, CredentialError> {
    debug!(key = %self.token_key, "loading credentials");

    let (token, cloud, account_id) = tokio::join!(
      self.sources.external_token(&self.token_key),
      self.sources.cloud_credentials(),
      self.sources.account_id(),
    );

    let external_token = token.map_err(|source| CredentialError::Token {
      key: self.token_key.clone(),
      source,
    })?;
    let cloud = cloud.map_err(|source| CredentialError::Credentials { source })?;
    let account_id = account_id.map_err(|source| CredentialError::Identity { source })?;

    info!(account = %account_id, region = %self.region, "credentials loaded");

    Ok(CredentialSet {
      cloud,
      external_token,
      account_id,
      region: self.region.clone(),
    })
  }
}
