//! Zip archive creation for function bundles.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use glob::Pattern;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// What to archive and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRequest {
  /// Directory whose contents become the archive root.
  pub root: PathBuf,
  /// Archive file to create. Skipped if it lies inside `root`.
  pub output: PathBuf,
  /// When set, only these paths (relative to `root`) are archived.
  pub includes: Option<Vec<String>>,
  /// Paths (relative to `root`) left out of the archive.
  pub excludes: Option<Vec<String>>,
}

#[derive(Debug, Error)]
pub enum ArchiveError {
  #[error("archive root does not exist: {0}")]
  MissingRoot(PathBuf),

  #[error("invalid path pattern \"{pattern}\": {source}")]
  Pattern {
    pattern: String,
    #[source]
    source: glob::PatternError,
  },

  #[error("failed to walk {path}: {source}")]
  Walk {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },

  #[error("io error on {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("zip error: {0}")]
  Zip(#[from] zip::result::ZipError),
}

/// Produces bundle archives.
pub trait Archiver: Send + Sync {
  /// Write the archive, returning the number of files stored.
  fn archive(&self, request: &ArchiveRequest) -> Result<usize, ArchiveError>;
}

/// Writes deflate-compressed zip files with the `zip` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipArchiver;

/// Matches relative paths against configured include/exclude entries.
///
/// An entry matches the path itself, everything below it, and anything its
/// glob pattern matches.
struct PathFilter {
  entries: Vec<(String, Pattern)>,
}

impl PathFilter {
  fn new(paths: &[String]) -> Result<Self, ArchiveError> {
    let entries = paths
      .iter()
      .map(|raw| {
        let normalized = normalize(raw);
        Pattern::new(&normalized)
          .map(|pattern| (normalized, pattern))
          .map_err(|source| ArchiveError::Pattern {
            pattern: raw.clone(),
            source,
          })
      })
      .collect::<Result<Vec<_>, _>>()?;
    Ok(Self { entries })
  }

  fn matches(&self, relative: &str) -> bool {
    self.entries.iter().any(|(prefix, pattern)| {
      relative == prefix
        || relative
          .strip_prefix(prefix.as_str())
          .is_some_and(|rest| rest.starts_with('/'))
        || pattern.matches(relative)
    })
  }
}

fn normalize(path: &str) -> String {
  let trimmed = path.trim();
  let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
  trimmed.trim_end_matches('/').to_string()
}

/// Relative path with `/` separators, as stored in the archive.
fn relative_name(root: &Path, path: &Path) -> Option<String> {
  let relative = path.strip_prefix(root).ok()?;
  let parts: Vec<_> = relative
    .components()
    .map(|c| c.as_os_str().to_string_lossy().into_owned())
    .collect();
  if parts.is_empty() { None } else { Some(parts.join("/")) }
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
  use std::os::unix::fs::PermissionsExt;
  metadata.permissions().mode()
}

#[cfg(not(unix))]
fn file_mode(_metadata: &std::fs::Metadata) -> u32 {
  0o644
}

impl Archiver for ZipArchiver {
  fn archive(&self, request: &ArchiveRequest) -> Result<usize, ArchiveError> {
    let root = &request.root;
    if !root.is_dir() {
      return Err(ArchiveError::MissingRoot(root.clone()));
    }

    let includes = request.includes.as_deref().map(PathFilter::new).transpose()?;
    let excludes = request.excludes.as_deref().map(PathFilter::new).transpose()?;

    info!(root = %root.display(), output = %request.output.display(), "creating zip archive");

    let file = File::create(&request.output).map_err(|source| ArchiveError::Io {
      path: request.output.clone(),
      source,
    })?;
    let mut writer = ZipWriter::new(file);

    let walker = WalkDir::new(root)
      .min_depth(1)
      .follow_links(true)
      .sort_by_file_name()
      .into_iter()
      .filter_entry(|entry| match (&excludes, relative_name(root, entry.path())) {
        (Some(excludes), Some(name)) => !excludes.matches(&name),
        _ => true,
      });

    let mut count = 0;
    for entry in walker {
      let entry = entry.map_err(|source| ArchiveError::Walk {
        path: root.clone(),
        source,
      })?;

      if !entry.file_type().is_file() || entry.path() == request.output {
        continue;
      }

      let Some(name) = relative_name(root, entry.path()) else {
        continue;
      };

      if includes.as_ref().is_some_and(|includes| !includes.matches(&name)) {
        continue;
      }

      let metadata = entry.metadata().map_err(|source| ArchiveError::Walk {
        path: entry.path().to_path_buf(),
        source,
      })?;
      let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(file_mode(&metadata));

      debug!(file = %name, "adding to archive");
      writer.start_file(name, options)?;

      let mut input = File::open(entry.path()).map_err(|source| ArchiveError::Io {
        path: entry.path().to_path_buf(),
        source,
      })?;
      io::copy(&mut input, &mut writer).map_err(|source| ArchiveError::Io {
        path: entry.path().to_path_buf(),
        source,
      })?;
      count += 1;
    }

    writer.finish()?;
    info!(files = count, output = %request.output.display(), "zip archive written");

    Ok(count)
  }
}
