//! Function bundle task: build command, zip archive, upload.

use std::io;

use tracing::{debug, info};

use super::archive::{ArchiveError, ArchiveRequest};
use super::types::{BuildCommand, BuildIdentification, FunctionBundleSpec, Runtime};
use super::upload::ArtifactLocation;
use super::{BuildError, Builder, BuiltArtifact};
use crate::config::ConfigError;
use crate::consts::DIST_DIR;
use crate::credentials::CredentialSet;
use crate::process::{Cancellation, Process};

/// A validated function bundle task.
///
/// Preparing the plan resolves the runtime and the build command, so a bad
/// configuration is rejected before any credentials are fetched or commands
/// run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundlePlan {
  pub runtime: Runtime,
  pub command: BuildCommand,
  program: String,
  args: Vec<String>,
  pub archive: ArchiveRequest,
}

impl BundlePlan {
  pub fn prepare(id: &BuildIdentification, spec: &FunctionBundleSpec) -> Result<Self, ConfigError> {
    let runtime = Runtime::parse(&spec.runtime).ok_or_else(|| ConfigError::UnknownRuntime {
      runtime: spec.runtime.clone(),
    })?;

    let command = spec.command_for(runtime);
    let mut tokens = command.tokens().into_iter();
    let program = tokens.next().ok_or(ConfigError::EmptyCommand)?;
    let args = tokens.collect();

    Ok(Self {
      runtime,
      command,
      program,
      args,
      archive: archive_request(id, spec, runtime),
    })
  }

  /// The build command, run in the checkout with credentials injected.
  pub fn process(&self, id: &BuildIdentification, credentials: &CredentialSet) -> Process {
    Process::new(self.program.as_str())
      .args(self.args.iter().map(String::as_str))
      .current_dir(&id.directory)
      .envs(credentials.env_vars())
  }
}

fn archive_request(id: &BuildIdentification, spec: &FunctionBundleSpec, runtime: Runtime) -> ArchiveRequest {
  match runtime {
    Runtime::Go => ArchiveRequest {
      root: id.directory.join(DIST_DIR),
      output: id.archive_path(),
      includes: None,
      excludes: None,
    },
    Runtime::Node => ArchiveRequest {
      root: id.directory.clone(),
      output: id.archive_path(),
      includes: spec.archive_includes(),
      excludes: spec.excludes.clone(),
    },
  }
}

impl Builder {
  pub(crate) async fn build_bundle(
    &self,
    id: &BuildIdentification,
    plan: &BundlePlan,
    credentials: &CredentialSet,
    cancel: &Cancellation,
  ) -> Result<BuiltArtifact, BuildError> {
    info!(runtime = %plan.runtime, command = %plan.command, "running bundle build");
    self
      .runner
      .run(&plan.process(id, credentials), cancel)
      .await
      .map_err(BuildError::step(format!("failed to run \"{}\"", plan.command)))?;

    let archiver = self.archiver.clone();
    let request = plan.archive.clone();
    let files = tokio::task::spawn_blocking(move || archiver.archive(&request))
      .await
      .map_err(|e| {
        BuildError::Archive(ArchiveError::Io {
          path: plan.archive.output.clone(),
          source: io::Error::other(e),
        })
      })?
      .map_err(BuildError::Archive)?;
    debug!(files, output = %plan.archive.output.display(), "bundle archived");

    let location = ArtifactLocation::for_build(id, credentials);
    self
      .uploader
      .upload(&plan.archive.output, &location, credentials, cancel)
      .await?;

    Ok(BuiltArtifact::Bundle { location })
  }
}
