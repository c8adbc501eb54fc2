//! Repository checkout at a single commit.
//!
//! The checkout is a shallow fetch of exactly one commit into a fresh
//! temporary directory. The access token reaches git as an HTTP header through
//! `GIT_CONFIG_*` environment variables, so it never appears in a command
//! line, a remote URL, or `.git/config`.

use std::io;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tempfile::TempDir;
use thiserror::Error;
use tracing::info;

use crate::consts::APP_NAME;
use crate::process::{Cancellation, CommandRunner, Process, ProcessError};

const GITHUB_URL: &str = "https://github.com";

#[derive(Debug, Error)]
pub enum CheckoutError {
  #[error("invalid repository \"{0}\", expected owner/name")]
  InvalidRepository(String),

  #[error("commit must not be empty")]
  EmptyCommit,

  #[error("invalid commit \"{0}\", expected a commit id or plain ref name")]
  InvalidCommit(String),

  #[error("failed to create checkout directory: {0}")]
  TempDir(#[source] io::Error),

  #[error("{step} failed")]
  Git {
    step: &'static str,
    #[source]
    source: ProcessError,
  },
}

impl CheckoutError {
  pub fn is_cancelled(&self) -> bool {
    matches!(self, CheckoutError::Git { source, .. } if source.is_cancelled())
  }
}

/// Remote URL for `owner/name`. Carries no credentials.
pub fn remote_url(repository: &str) -> String {
  format!("{}/{}", GITHUB_URL, repository)
}

/// `GIT_CONFIG_*` variables adding a basic-auth header for the token.
pub fn auth_env(token: &str) -> Vec<(&'static str, String)> {
  let credentials = STANDARD.encode(format!("x-access-token:{}", token));
  vec![
    ("GIT_CONFIG_COUNT", "1".to_string()),
    ("GIT_CONFIG_KEY_0", "http.extraHeader".to_string()),
    ("GIT_CONFIG_VALUE_0", format!("Authorization: Basic {}", credentials)),
    ("GIT_TERMINAL_PROMPT", "0".to_string()),
  ]
}

/// The git steps of a checkout, in order, each labelled for error reporting.
pub fn git_steps(dir: &Path, repository: &str, commit: &str, token: &str) -> Vec<(&'static str, Process)> {
  let git = |args: &[&str]| {
    Process::new("git")
      .args(args.iter().copied())
      .current_dir(dir)
      .envs(auth_env(token))
  };
  let url = remote_url(repository);

  vec![
    ("git init", git(&["init", "--quiet"])),
    ("git remote add", git(&["remote", "add", "origin", url.as_str()])),
    ("git fetch", git(&["fetch", "origin", commit, "--depth=1"])),
    ("git reset", git(&["reset", "--hard", "FETCH_HEAD"])),
  ]
}

/// Reject targets that cannot name a single repository commit.
pub fn validate(repository: &str, commit: &str) -> Result<(), CheckoutError> {
  let valid = repository
    .split_once('/')
    .is_some_and(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'));
  if !valid {
    return Err(CheckoutError::InvalidRepository(repository.to_string()));
  }
  if commit.trim().is_empty() {
    return Err(CheckoutError::EmptyCommit);
  }
  if !is_plain_commit(commit) {
    return Err(CheckoutError::InvalidCommit(commit.to_string()));
  }
  Ok(())
}

/// The commit is passed to `git fetch` as an argument and names the archive
/// file, so it must not look like an option or contain a path.
fn is_plain_commit(commit: &str) -> bool {
  !commit.starts_with('-')
    && !commit.contains("..")
    && commit
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Fetch `repository` at `commit` into a new temporary directory.
///
/// The directory is removed when the returned guard is dropped.
pub async fn checkout(
  runner: &dyn CommandRunner,
  repository: &str,
  commit: &str,
  token: &str,
  cancel: &Cancellation,
) -> Result<TempDir, CheckoutError> {
  validate(repository, commit)?;

  let dir = tempfile::Builder::new()
    .prefix(&format!("{}-", APP_NAME))
    .tempdir()
    .map_err(CheckoutError::TempDir)?;

  info!(repository, commit, dir = %dir.path().display(), "checking out source");

  for (step, process) in git_steps(dir.path(), repository, commit, token) {
    runner
      .run(&process, cancel)
      .await
      .map_err(|source| CheckoutError::Git { step, source })?;
  }

  Ok(dir)
}
