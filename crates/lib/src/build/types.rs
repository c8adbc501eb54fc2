//! Build task model.
//!
//! A build run is identified by a [`BuildIdentification`] and configured by a
//! [`BuildTaskSet`]: function bundles first, then container images, each list
//! in configuration order.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::consts::NODE_MODULES_DIR;

/// Identifies one build run. Supplied by the caller, never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildIdentification {
  /// Repository name, `owner/repo`.
  pub repository: String,
  /// Commit being built.
  pub commit: String,
  /// Local checkout of `repository` at `commit`.
  pub directory: PathBuf,
}

impl BuildIdentification {
  /// File name of the bundle archive for this run, always `<commit>.zip`.
  pub fn archive_name(&self) -> String {
    format!("{}.zip", self.commit)
  }

  /// Where the bundle archive is written.
  pub fn archive_path(&self) -> PathBuf {
    self.directory.join(self.archive_name())
  }
}

/// Configuration of one container image build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerImageSpec {
  /// Dockerfile, relative to the checkout.
  #[serde(default = "default_dockerfile")]
  pub dockerfile: String,
  /// Build context, relative to the checkout.
  #[serde(default = "default_context")]
  pub context: String,
}

fn default_dockerfile() -> String {
  "Dockerfile".to_string()
}

fn default_context() -> String {
  ".".to_string()
}

impl Default for ContainerImageSpec {
  fn default() -> Self {
    Self {
      dockerfile: default_dockerfile(),
      context: default_context(),
    }
  }
}

/// Supported function runtimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Runtime {
  /// `go1.x`: the build leaves its output in `dist/`.
  Go,
  /// `nodejs14.x`: the whole checkout is the bundle.
  Node,
}

impl Runtime {
  pub const ALL: [Runtime; 2] = [Runtime::Go, Runtime::Node];

  pub fn as_str(self) -> &'static str {
    match self {
      Runtime::Go => "go1.x",
      Runtime::Node => "nodejs14.x",
    }
  }

  /// Parse a configured runtime name. `None` for anything unsupported.
  pub fn parse(name: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|runtime| runtime.as_str() == name)
  }

  /// Build command used when none is configured.
  pub fn default_command(self) -> &'static str {
    match self {
      Runtime::Go => "make build",
      Runtime::Node => "npm ci",
    }
  }
}

impl fmt::Display for Runtime {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A build command: one whitespace-separated line, or an explicit argument list.
///
/// The line form has no quoting; use the list form when an argument contains
/// spaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BuildCommand {
  Line(String),
  Args(Vec<String>),
}

impl BuildCommand {
  /// Program and arguments.
  pub fn tokens(&self) -> Vec<String> {
    match self {
      BuildCommand::Line(line) => line.split_whitespace().map(str::to_string).collect(),
      BuildCommand::Args(args) => args.clone(),
    }
  }
}

impl fmt::Display for BuildCommand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildCommand::Line(line) => f.write_str(line),
      BuildCommand::Args(args) => f.write_str(&args.join(" ")),
    }
  }
}

/// Configuration of one function bundle build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionBundleSpec {
  /// Runtime name as configured; validated when the task starts.
  pub runtime: String,
  /// Build command; the runtime's default when absent.
  #[serde(rename = "cmd", default, skip_serializing_if = "Option::is_none")]
  pub command: Option<BuildCommand>,
  /// Restrict the bundle to these paths (Node only).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub includes: Option<Vec<String>>,
  /// Remove these paths from the bundle (Node only).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub excludes: Option<Vec<String>>,
}

impl FunctionBundleSpec {
  pub fn new(runtime: impl Into<String>) -> Self {
    Self {
      runtime: runtime.into(),
      command: None,
      includes: None,
      excludes: None,
    }
  }

  /// The effective command: configured or the runtime default.
  pub fn command_for(&self, runtime: Runtime) -> BuildCommand {
    self
      .command
      .clone()
      .unwrap_or_else(|| BuildCommand::Line(runtime.default_command().to_string()))
  }

  /// Paths the archive is restricted to, if any.
  ///
  /// The dependency directory is always shipped alongside configured includes.
  pub fn archive_includes(&self) -> Option<Vec<String>> {
    self.includes.as_ref().map(|includes| {
      let mut paths = includes.clone();
      if !paths.iter().any(|p| p == NODE_MODULES_DIR) {
        paths.push(NODE_MODULES_DIR.to_string());
      }
      paths
    })
  }
}

/// Kind of a build task, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
  FunctionBundle,
  ContainerImage,
}

impl fmt::Display for TaskKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TaskKind::FunctionBundle => f.write_str("function bundle"),
      TaskKind::ContainerImage => f.write_str("container image"),
    }
  }
}

/// One unit of work producing one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildTask<'a> {
  FunctionBundle(&'a FunctionBundleSpec),
  ContainerImage(&'a ContainerImageSpec),
}

impl BuildTask<'_> {
  pub fn kind(&self) -> TaskKind {
    match self {
      BuildTask::FunctionBundle(_) => TaskKind::FunctionBundle,
      BuildTask::ContainerImage(_) => TaskKind::ContainerImage,
    }
  }
}

/// All tasks configured for a repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildTaskSet {
  #[serde(rename = "lambda-bundles", default, skip_serializing_if = "Vec::is_empty")]
  pub bundles: Vec<FunctionBundleSpec>,
  #[serde(rename = "docker-images", default, skip_serializing_if = "Vec::is_empty")]
  pub images: Vec<ContainerImageSpec>,
}

impl BuildTaskSet {
  pub fn len(&self) -> usize {
    self.bundles.len() + self.images.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Tasks in execution order, each with its index within its own kind.
  pub fn tasks(&self) -> impl Iterator<Item = (usize, BuildTask<'_>)> {
    let bundles = self
      .bundles
      .iter()
      .enumerate()
      .map(|(index, spec)| (index, BuildTask::FunctionBundle(spec)));
    let images = self
      .images
      .iter()
      .enumerate()
      .map(|(index, spec)| (index, BuildTask::ContainerImage(spec)));
    bundles.chain(images)
  }
}
