//! AWS-backed credential sources.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_secretsmanager::error::DisplayErrorContext;
use tracing::debug;

use super::{CloudCredentials, CredentialSources, SourceError};

/// Secrets Manager for the token, the default provider chain for keys, STS
/// for the account id.
#[derive(Debug, Clone)]
pub struct AwsSources {
  config: SdkConfig,
  secrets: aws_sdk_secretsmanager::Client,
  sts: aws_sdk_sts::Client,
}

impl AwsSources {
  /// Load the default SDK configuration from the environment.
  ///
  /// A `region` override replaces whatever region the environment resolves,
  /// so the secret and identity lookups go to the region builds publish to.
  pub async fn load(region: Option<&str>) -> Self {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = region {
      debug!(region, "using region override");
      loader = loader.region(Region::new(region.to_string()));
    }
    Self::from_config(loader.load().await)
  }

  pub fn from_config(config: SdkConfig) -> Self {
    let secrets = aws_sdk_secretsmanager::Client::new(&config);
    let sts = aws_sdk_sts::Client::new(&config);
    Self { config, secrets, sts }
  }

  /// Region from the SDK configuration, if one is set.
  pub fn region(&self) -> Option<String> {
    self.config.region().map(ToString::to_string)
  }
}

#[async_trait]
impl CredentialSources for AwsSources {
  async fn external_token(&self, key: &str) -> Result<String, SourceError> {
    debug!(key, "reading secret");
    let output = self
      .secrets
      .get_secret_value()
      .secret_id(key)
      .send()
      .await
      .map_err(|e| SourceError::from(DisplayErrorContext(e).to_string()))?;

    output
      .secret_string()
      .map(str::to_string)
      .ok_or_else(|| format!("secret \"{key}\" has no string value").into())
  }

  async fn cloud_credentials(&self) -> Result<CloudCredentials, SourceError> {
    let provider = self
      .config
      .credentials_provider()
      .ok_or_else(|| SourceError::from("no credentials provider configured"))?;
    let credentials = provider.provide_credentials().await?;

    Ok(CloudCredentials {
      access_key_id: credentials.access_key_id().to_string(),
      secret_access_key: credentials.secret_access_key().to_string(),
      session_token: credentials.session_token().map(str::to_string),
    })
  }

  async fn account_id(&self) -> Result<String, SourceError> {
    let output = self
      .sts
      .get_caller_identity()
      .send()
      .await
      .map_err(|e| SourceError::from(aws_sdk_sts::error::DisplayErrorContext(e).to_string()))?;

    output
      .account()
      .map(str::to_string)
      .ok_or_else(|| "caller identity has no account".into())
  }
}
