//! Artifact upload.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::build::types::BuildIdentification;
use crate::credentials::CredentialSet;
use crate::process::{Cancellation, CommandRunner, Process, ProcessError};

/// Object storage destination of a bundle archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation {
  pub bucket: String,
  pub key: String,
}

impl ArtifactLocation {
  /// `<bucket>/<repository>/<commit>.zip` in the account's artifact bucket.
  pub fn for_build(id: &BuildIdentification, credentials: &CredentialSet) -> Self {
    Self {
      bucket: credentials.bucket(),
      key: format!("{}/{}", id.repository, id.archive_name()),
    }
  }
}

impl fmt::Display for ArtifactLocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "s3://{}/{}", self.bucket, self.key)
  }
}

#[derive(Debug, Error)]
#[error("failed upload to {destination}")]
pub struct UploadError {
  pub destination: String,
  #[source]
  pub source: ProcessError,
}

/// Places a finished archive in artifact storage.
#[async_trait]
pub trait Uploader: Send + Sync {
  async fn upload(
    &self,
    archive: &Path,
    destination: &ArtifactLocation,
    credentials: &CredentialSet,
    cancel: &Cancellation,
  ) -> Result<(), UploadError>;
}

/// Uploads with `aws s3 cp`.
#[derive(Clone)]
pub struct S3CliUploader {
  runner: Arc<dyn CommandRunner>,
}

impl S3CliUploader {
  pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
    Self { runner }
  }

  /// The copy command for one upload.
  pub fn command(archive: &Path, destination: &ArtifactLocation, credentials: &CredentialSet) -> Process {
    Process::new("aws")
      .args(["s3", "cp"])
      .arg(archive.to_string_lossy())
      .arg(destination.to_string())
      .arg("--region")
      .arg(credentials.region.as_str())
      .envs(credentials.env_vars())
  }
}

#[async_trait]
impl Uploader for S3CliUploader {
  async fn upload(
    &self,
    archive: &Path,
    destination: &ArtifactLocation,
    credentials: &CredentialSet,
    cancel: &Cancellation,
  ) -> Result<(), UploadError> {
    info!(archive = %archive.display(), destination = %destination, "uploading artifact");
    let process = Self::command(archive, destination, credentials);
    self.runner.run(&process, cancel).await.map_err(|source| UploadError {
      destination: destination.to_string(),
      source,
    })
  }
}
