//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Get path to a fixture file.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

/// Read fixture content.
pub fn fixture_content(name: &str) -> String {
  std::fs::read_to_string(fixture_path(name)).unwrap_or_else(|e| panic!("Failed to load fixture {}: {}", name, e))
}

/// Isolated test environment: a temporary checkout-like directory.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  /// Create from a fixture file, copied to `builds.yaml`.
  pub fn from_fixture(name: &str) -> Self {
    let env = Self::empty();
    env.write_file("builds.yaml", &fixture_content(name));
    env
  }

  /// Create an empty test environment.
  pub fn empty() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn dir(&self) -> PathBuf {
    self.temp.path().to_path_buf()
  }

  /// Get a Command for the artifactor binary with settings isolated from the host.
  pub fn artifactor_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("artifactor");
    cmd.current_dir(self.temp.path());
    cmd.env_remove("ARTIFACTOR_TOKEN_SECRET");
    cmd.env_remove("ARTIFACTOR_TIMEOUT");
    cmd.env_remove("ARTIFACTOR_REGION");
    cmd.env_remove("RUST_LOG");
    cmd
  }
}
