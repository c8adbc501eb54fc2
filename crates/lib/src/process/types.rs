//! Process description and error types.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// One external command invocation.
///
/// A plain value describing what to run; nothing is spawned until it is handed
/// to [`run`](super::run) or [`pipe`](super::pipe). Environment overrides are
/// layered on top of the ambient environment, never replacing it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Process {
  /// Working directory; the caller's current directory when `None`.
  pub working_dir: Option<PathBuf>,
  /// Environment overrides.
  pub env: BTreeMap<String, String>,
  /// Program name or path.
  pub program: String,
  /// Arguments, passed verbatim (no shell involved).
  pub args: Vec<String>,
}

impl Process {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      ..Self::default()
    }
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.insert(key.into(), value.into());
    self
  }

  pub fn envs<I, K, V>(mut self, vars: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    self.env.extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
    self
  }

  pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
    self.working_dir = Some(dir.as_ref().to_path_buf());
    self
  }

  /// The command line as it would be typed, for logs and errors.
  ///
  /// Environment values are deliberately absent: they carry credentials.
  pub fn command_line(&self) -> String {
    std::iter::once(self.program.as_str())
      .chain(self.args.iter().map(String::as_str))
      .collect::<Vec<_>>()
      .join(" ")
  }
}

impl fmt::Display for Process {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.command_line())
  }
}

/// Command line of a two-stage pipeline, `a | b`.
pub fn pipeline_line(src: &Process, dst: &Process) -> String {
  format!("{} | {}", src.command_line(), dst.command_line())
}

/// Errors from running external commands.
///
/// Start failures, non-zero exits and cancellation are separate variants so
/// callers can tell them apart; every variant carries the command line.
#[derive(Debug, Error)]
pub enum ProcessError {
  /// The program could not be spawned.
  #[error("command failed to start \"{command}\": {source}")]
  Start {
    command: String,
    #[source]
    source: std::io::Error,
  },

  /// The program ran and exited unsuccessfully.
  #[error("command \"{command}\" failed with exit code {}", display_code(.code))]
  Exit { command: String, code: Option<i32> },

  /// The cancellation signal fired before the program finished.
  #[error("command \"{command}\" did not complete, cancelled")]
  Cancelled { command: String },

  /// Waiting on the program or moving bytes between programs failed.
  #[error("command \"{command}\" failed: {source}")]
  Io {
    command: String,
    #[source]
    source: std::io::Error,
  },
}

impl ProcessError {
  /// True when the failure was caused by cancellation.
  pub fn is_cancelled(&self) -> bool {
    matches!(self, ProcessError::Cancelled { .. })
  }

  /// The command line the error refers to.
  pub fn command(&self) -> &str {
    match self {
      ProcessError::Start { command, .. }
      | ProcessError::Exit { command, .. }
      | ProcessError::Cancelled { command }
      | ProcessError::Io { command, .. } => command,
    }
  }
}

fn display_code(code: &Option<i32>) -> String {
  match code {
    Some(code) => code.to_string(),
    None => "none (terminated by signal)".to_string(),
  }
}
