//! Per-repository build configuration (`builds.yaml`).

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::build::BuildTaskSet;
use crate::consts::BUILDS_FILENAME;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("no {} found in {}", BUILDS_FILENAME, .path.display())]
  Missing { path: PathBuf },

  #[error("failed to read {}: {source}", .path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse {}: {source}", .path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },

  #[error("unknown runtime \"{runtime}\"")]
  UnknownRuntime { runtime: String },

  #[error("build command is empty")]
  EmptyCommand,

  #[error("no region configured; set --region, ARTIFACTOR_REGION or AWS_REGION")]
  MissingRegion,
}

/// Parse a task set from YAML. Keys other than the two task lists are ignored.
pub fn parse_builds(source: &str, path: &Path) -> Result<BuildTaskSet, ConfigError> {
  if source.trim().is_empty() {
    return Ok(BuildTaskSet::default());
  }
  let parsed: Option<BuildTaskSet> = serde_yaml::from_str(source).map_err(|source| ConfigError::Parse {
    path: path.to_path_buf(),
    source,
  })?;
  Ok(parsed.unwrap_or_default())
}

/// Read `<dir>/builds.yaml`.
pub fn read_builds(dir: &Path) -> Result<BuildTaskSet, ConfigError> {
  let path = dir.join(BUILDS_FILENAME);
  debug!(path = %path.display(), "reading build configuration");

  let source = match std::fs::read_to_string(&path) {
    Ok(source) => source,
    Err(e) if e.kind() == io::ErrorKind::NotFound => {
      return Err(ConfigError::Missing { path: dir.to_path_buf() });
    }
    Err(source) => return Err(ConfigError::Read { path, source }),
  };

  parse_builds(&source, &path)
}
