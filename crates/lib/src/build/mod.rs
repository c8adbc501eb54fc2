//! Build orchestration.
//!
//! [`Builder::build_all`] runs every task of a [`BuildTaskSet`] in order:
//! function bundles first, then container images. Each task gets freshly
//! loaded credentials and its own command sequence. The first failure stops
//! the run and is reported with the task's kind and index. Artifacts already
//! published by earlier tasks are left in place.

pub mod archive;
mod bundle;
mod image;
pub mod types;
pub mod upload;

pub use archive::{ArchiveError, ArchiveRequest, Archiver, ZipArchiver};
pub use bundle::BundlePlan;
pub use types::{
  BuildCommand, BuildIdentification, BuildTask, BuildTaskSet, ContainerImageSpec, FunctionBundleSpec, Runtime,
  TaskKind,
};
pub use upload::{ArtifactLocation, S3CliUploader, UploadError, Uploader};

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info};

use crate::config::ConfigError;
use crate::credentials::{CredentialError, CredentialLoader};
use crate::process::{Cancellation, CommandRunner, ProcessError};

/// Errors from a build run.
#[derive(Debug, Error)]
pub enum BuildError {
  /// Invalid task configuration. Raised before anything is run.
  #[error(transparent)]
  Configuration(#[from] ConfigError),

  #[error("failed to load external credentials")]
  Credentials(#[from] CredentialError),

  /// An external command in the task's sequence failed.
  #[error("{step}")]
  Step {
    step: String,
    #[source]
    source: ProcessError,
  },

  #[error("failed to create zip archive")]
  Archive(#[source] ArchiveError),

  #[error(transparent)]
  Upload(#[from] UploadError),

  /// A task failed; no later task was attempted.
  #[error("build failed for {kind} {index}")]
  Task {
    kind: TaskKind,
    index: usize,
    #[source]
    source: Box<BuildError>,
  },
}

impl BuildError {
  pub(crate) fn step(step: impl Into<String>) -> impl FnOnce(ProcessError) -> BuildError {
    let step = step.into();
    move |source| BuildError::Step { step, source }
  }

  /// Kind and index of the failed task, for errors returned by `build_all`.
  pub fn failed_task(&self) -> Option<(TaskKind, usize)> {
    match self {
      BuildError::Task { kind, index, .. } => Some((*kind, *index)),
      _ => None,
    }
  }

  /// True when the run stopped because it was cancelled.
  pub fn is_cancelled(&self) -> bool {
    match self {
      BuildError::Step { source, .. } => source.is_cancelled(),
      BuildError::Upload(upload) => upload.source.is_cancelled(),
      BuildError::Task { source, .. } => source.is_cancelled(),
      _ => false,
    }
  }
}

/// An artifact published by one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuiltArtifact {
  Image { tag: String },
  Bundle { location: ArtifactLocation },
}

impl fmt::Display for BuiltArtifact {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuiltArtifact::Image { tag } => write!(f, "image {}", tag),
      BuiltArtifact::Bundle { location } => write!(f, "bundle {}", location),
    }
  }
}

/// Runs build tasks against one checkout.
pub struct Builder {
  runner: Arc<dyn CommandRunner>,
  credentials: CredentialLoader,
  archiver: Arc<dyn Archiver>,
  uploader: Arc<dyn Uploader>,
}

impl Builder {
  pub fn new(
    runner: Arc<dyn CommandRunner>,
    credentials: CredentialLoader,
    archiver: Arc<dyn Archiver>,
    uploader: Arc<dyn Uploader>,
  ) -> Self {
    Self {
      runner,
      credentials,
      archiver,
      uploader,
    }
  }

  /// Run every task in order, stopping at the first failure.
  ///
  /// `cancel` governs every command of the run. On failure the returned
  /// error is [`BuildError::Task`] naming the failed task; tasks after it are
  /// never started.
  pub async fn build_all(
    &self,
    id: &BuildIdentification,
    tasks: &BuildTaskSet,
    cancel: &Cancellation,
  ) -> Result<Vec<BuiltArtifact>, BuildError> {
    info!(
      repository = %id.repository,
      commit = %id.commit,
      tasks = tasks.len(),
      "starting build"
    );

    let mut artifacts = Vec::with_capacity(tasks.len());
    for (index, task) in tasks.tasks() {
      let kind = task.kind();
      info!(%kind, index, "starting task");

      match self.build_task(id, &task, cancel).await {
        Ok(artifact) => {
          info!(%kind, index, artifact = %artifact, "task complete");
          artifacts.push(artifact);
        }
        Err(e) => {
          error!(%kind, index, error = %e, "task failed");
          return Err(BuildError::Task {
            kind,
            index,
            source: Box::new(e),
          });
        }
      }
    }

    info!(artifacts = artifacts.len(), "build complete");
    Ok(artifacts)
  }

  async fn build_task(
    &self,
    id: &BuildIdentification,
    task: &BuildTask<'_>,
    cancel: &Cancellation,
  ) -> Result<BuiltArtifact, BuildError> {
    match task {
      BuildTask::FunctionBundle(spec) => {
        let plan = BundlePlan::prepare(id, spec)?;
        let credentials = self.credentials.load().await?;
        self.build_bundle(id, &plan, &credentials, cancel).await
      }
      BuildTask::ContainerImage(spec) => {
        let credentials = self.credentials.load().await?;
        self.build_image(id, spec, &credentials, cancel).await
      }
    }
  }
}
