//! Container image task: registry login, build, push.

use tracing::info;

use super::types::{BuildIdentification, ContainerImageSpec};
use super::{BuildError, Builder, BuiltArtifact};
use crate::consts::REGISTRY_USERNAME;
use crate::credentials::CredentialSet;
use crate::process::{Cancellation, Process};

/// Image tag in the account's registry: `<registry>/<repository>`.
pub(crate) fn image_tag(id: &BuildIdentification, credentials: &CredentialSet) -> String {
  format!("{}/{}", credentials.registry(), id.repository)
}

/// Password source and `docker login` reading it from stdin.
pub(crate) fn login_commands(credentials: &CredentialSet) -> (Process, Process) {
  let password = Process::new("aws")
    .args(["ecr", "get-login-password", "--region"])
    .arg(credentials.region.as_str())
    .envs(credentials.env_vars());
  let login = Process::new("docker")
    .args(["login", "--username", REGISTRY_USERNAME, "--password-stdin"])
    .arg(credentials.registry());
  (password, login)
}

/// `docker build` with credentials passed as build arguments by name only.
pub(crate) fn build_command(
  id: &BuildIdentification,
  spec: &ContainerImageSpec,
  credentials: &CredentialSet,
  tag: &str,
) -> Process {
  let vars = credentials.env_vars();
  let build_args = vars.iter().flat_map(|(name, _)| ["--build-arg", *name]);

  Process::new("docker")
    .arg("build")
    .args(build_args)
    .args(["--tag", tag])
    .arg("--file")
    .arg(id.directory.join(&spec.dockerfile).to_string_lossy())
    .arg(id.directory.join(&spec.context).to_string_lossy())
    .envs(vars)
}

pub(crate) fn push_command(tag: &str) -> Process {
  Process::new("docker").args(["push", tag])
}

impl Builder {
  pub(crate) async fn build_image(
    &self,
    id: &BuildIdentification,
    spec: &ContainerImageSpec,
    credentials: &CredentialSet,
    cancel: &Cancellation,
  ) -> Result<BuiltArtifact, BuildError> {
    let tag = image_tag(id, credentials);

    let (password, login) = login_commands(credentials);
    self
      .runner
      .pipe(&password, &login, cancel)
      .await
      .map_err(BuildError::step("failed to log into registry"))?;

    info!(tag = %tag, dockerfile = %spec.dockerfile, "building image");
    self
      .runner
      .run(&build_command(id, spec, credentials, &tag), cancel)
      .await
      .map_err(BuildError::step("docker build failed"))?;

    self
      .runner
      .run(&push_command(&tag), cancel)
      .await
      .map_err(BuildError::step("docker push failed"))?;

    Ok(BuiltArtifact::Image { tag })
  }
}
