//! Test utilities for artifactor-lib.
//!
//! Shell helpers for the process tests, plus recording fakes for every seam
//! the builder and checkout code talk through.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::build::{ArchiveError, ArchiveRequest, Archiver, ArtifactLocation, UploadError, Uploader};
use crate::credentials::{CloudCredentials, CredentialSet, CredentialSources, SourceError};
use crate::process::{Cancellation, CommandRunner, Process, ProcessError, pipeline_line};

/// `/bin/sh -c <script>`.
pub fn shell(script: &str) -> Process {
  Process::new("/bin/sh").args(["-c", script])
}

/// Create an empty marker file in the working directory.
pub fn touch_file(filename: &str) -> Process {
  Process::new("touch").arg(filename)
}

/// One recorded call to a [`RecordingRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
  Run(Process),
  Pipe(Process, Process),
}

impl Invocation {
  pub fn line(&self) -> String {
    match self {
      Invocation::Run(process) => process.command_line(),
      Invocation::Pipe(src, dst) => pipeline_line(src, dst),
    }
  }
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
  Fail,
  Cancel,
}

#[derive(Debug, Clone)]
struct Rule {
  prefix: String,
  /// 1-based match count the rule fires on; every match when `None`.
  nth: Option<usize>,
  outcome: Outcome,
}

/// Command runner that records invocations instead of spawning anything.
///
/// Succeeds by default. Rules make invocations whose command line starts with
/// a prefix fail with exit code 1 or report cancellation.
#[derive(Debug, Default)]
pub struct RecordingRunner {
  invocations: Mutex<Vec<Invocation>>,
  rules: Vec<Rule>,
}

impl RecordingRunner {
  pub fn failing_on(prefix: &str) -> Self {
    Self::with_rule(prefix, None, Outcome::Fail)
  }

  pub fn failing_on_nth(prefix: &str, nth: usize) -> Self {
    Self::with_rule(prefix, Some(nth), Outcome::Fail)
  }

  pub fn cancelled_on(prefix: &str) -> Self {
    Self::with_rule(prefix, None, Outcome::Cancel)
  }

  fn with_rule(prefix: &str, nth: Option<usize>, outcome: Outcome) -> Self {
    Self {
      invocations: Mutex::default(),
      rules: vec![Rule {
        prefix: prefix.to_string(),
        nth,
        outcome,
      }],
    }
  }

  pub fn invocations(&self) -> Vec<Invocation> {
    self.invocations.lock().unwrap().clone()
  }

  /// Command lines in call order; pipelines render as `a | b`.
  pub fn lines(&self) -> Vec<String> {
    self.invocations().iter().map(Invocation::line).collect()
  }

  /// Every process handed to the runner, pipeline stages included.
  pub fn processes(&self) -> Vec<Process> {
    self
      .invocations()
      .into_iter()
      .flat_map(|invocation| match invocation {
        Invocation::Run(process) => vec![process],
        Invocation::Pipe(src, dst) => vec![src, dst],
      })
      .collect()
  }

  fn record(&self, invocation: Invocation) -> Result<(), ProcessError> {
    let line = invocation.line();
    let mut invocations = self.invocations.lock().unwrap();
    invocations.push(invocation);

    for rule in &self.rules {
      if !line.starts_with(&rule.prefix) {
        continue;
      }
      let seen = invocations.iter().filter(|i| i.line().starts_with(&rule.prefix)).count();
      if rule.nth.is_some_and(|nth| nth != seen) {
        continue;
      }
      return Err(match rule.outcome {
        Outcome::Fail => ProcessError::Exit {
          command: line,
          code: Some(1),
        },
        Outcome::Cancel => ProcessError::Cancelled { command: line },
      });
    }
    Ok(())
  }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
  async fn run(&self, process: &Process, _cancel: &Cancellation) -> Result<(), ProcessError> {
    self.record(Invocation::Run(process.clone()))
  }

  async fn pipe(&self, src: &Process, dst: &Process, _cancel: &Cancellation) -> Result<(), ProcessError> {
    self.record(Invocation::Pipe(src.clone(), dst.clone()))
  }
}

/// Archiver that records requests and reports an empty archive.
#[derive(Debug, Default)]
pub struct RecordingArchiver {
  requests: Mutex<Vec<ArchiveRequest>>,
  fail: bool,
}

impl RecordingArchiver {
  pub fn failing() -> Self {
    Self {
      requests: Mutex::default(),
      fail: true,
    }
  }

  pub fn requests(&self) -> Vec<ArchiveRequest> {
    self.requests.lock().unwrap().clone()
  }
}

impl Archiver for RecordingArchiver {
  fn archive(&self, request: &ArchiveRequest) -> Result<usize, ArchiveError> {
    self.requests.lock().unwrap().push(request.clone());
    if self.fail {
      return Err(ArchiveError::MissingRoot(request.root.clone()));
    }
    Ok(0)
  }
}

/// Uploader that records `(archive, destination)` pairs.
#[derive(Debug, Default)]
pub struct RecordingUploader {
  uploads: Mutex<Vec<(PathBuf, ArtifactLocation)>>,
}

impl RecordingUploader {
  pub fn uploads(&self) -> Vec<(PathBuf, ArtifactLocation)> {
    self.uploads.lock().unwrap().clone()
  }
}

#[async_trait]
impl Uploader for RecordingUploader {
  async fn upload(
    &self,
    archive: &Path,
    destination: &ArtifactLocation,
    _credentials: &CredentialSet,
    _cancel: &Cancellation,
  ) -> Result<(), UploadError> {
    self
      .uploads
      .lock()
      .unwrap()
      .push((archive.to_path_buf(), destination.clone()));
    Ok(())
  }
}

/// Credential sources returning fixed values from [`test_credentials`].
#[derive(Debug, Default)]
pub struct FakeSources {
  pub fail_token: bool,
  pub fail_credentials: bool,
  pub fail_identity: bool,
  /// Total fetches across all three sources.
  pub calls: Arc<AtomicUsize>,
  /// Token fetches, one per credential load.
  pub loads: Arc<AtomicUsize>,
  /// When set, every fetch waits here before answering.
  pub barrier: Option<Arc<tokio::sync::Barrier>>,
}

impl FakeSources {
  async fn enter(&self) {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if let Some(barrier) = &self.barrier {
      barrier.wait().await;
    }
  }
}

#[async_trait]
impl CredentialSources for FakeSources {
  async fn external_token(&self, _key: &str) -> Result<String, SourceError> {
    self.loads.fetch_add(1, Ordering::SeqCst);
    self.enter().await;
    if self.fail_token {
      return Err("secret not found".into());
    }
    Ok(test_credentials().external_token)
  }

  async fn cloud_credentials(&self) -> Result<CloudCredentials, SourceError> {
    self.enter().await;
    if self.fail_credentials {
      return Err("no credentials in chain".into());
    }
    Ok(test_credentials().cloud)
  }

  async fn account_id(&self) -> Result<String, SourceError> {
    self.enter().await;
    if self.fail_identity {
      return Err("access denied".into());
    }
    Ok(test_credentials().account_id)
  }
}

pub fn test_credentials() -> CredentialSet {
  CredentialSet {
    cloud: CloudCredentials {
      access_key_id: "AKIDEXAMPLE".to_string(),
      secret_access_key: "secret-key".to_string(),
      session_token: Some("session-token".to_string()),
    },
    external_token: "gh-token".to_string(),
    account_id: "123456789012".to_string(),
    region: "us-east-1".to_string(),
  }
}
