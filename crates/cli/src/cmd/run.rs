//! Implementation of the `artifactor build run` command.
//!
//! Checks out a repository at a commit, reads its `builds.yaml`, and runs
//! every configured task, publishing each artifact.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{info, warn};

use artifactor_lib::build::{BuildIdentification, Builder, BuiltArtifact, S3CliUploader, ZipArchiver};
use artifactor_lib::config::read_builds;
use artifactor_lib::credentials::{AwsSources, CredentialLoader};
use artifactor_lib::process::{CancelHandle, Cancellation, CommandRunner, SystemRunner};
use artifactor_lib::settings::Settings;
use artifactor_lib::source;

use crate::output::{format_duration, print_info, print_item, print_stat, print_success, truncate_commit};

/// Flag overrides for [`Settings`].
#[derive(Debug, Default)]
pub struct RunOptions {
  pub timeout: Option<Duration>,
  pub region: Option<String>,
  pub token_secret: Option<String>,
}

impl RunOptions {
  fn apply(self, mut settings: Settings) -> Settings {
    if let Some(timeout) = self.timeout {
      settings.timeout = Some(timeout);
    }
    if let Some(region) = self.region {
      settings.region = Some(region);
    }
    if let Some(token_secret) = self.token_secret {
      settings.token_secret = token_secret;
    }
    settings
  }
}

/// Execute the build run command.
///
/// Ctrl-C and the timeout share one cancellation signal covering the
/// checkout and every task.
pub fn cmd_run(repository: &str, commit: &str, options: RunOptions) -> Result<()> {
  source::validate(repository, commit)?;

  let settings = options.apply(Settings::from_env().context("Failed to read settings")?);

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  rt.block_on(run(repository, commit, settings))
}

fn watch_interrupt(handle: CancelHandle) {
  tokio::spawn(async move {
    match tokio::signal::ctrl_c().await {
      Ok(()) => {
        warn!("interrupted, cancelling build");
        handle.cancel();
      }
      Err(e) => warn!(error = %e, "failed to listen for ctrl-c"),
    }
  });
}

async fn run(repository: &str, commit: &str, settings: Settings) -> Result<()> {
  let started = Instant::now();

  let (handle, mut cancel) = Cancellation::new();
  if let Some(timeout) = settings.timeout {
    info!(timeout = %humantime::format_duration(timeout), "build deadline set");
    cancel = cancel.with_timeout(timeout);
  }
  watch_interrupt(handle);

  let sources = AwsSources::load(settings.region.as_deref()).await;
  let region = settings.resolve_region(sources.region())?;
  let loader = CredentialLoader::new(Box::new(sources), settings.token_secret.as_str(), region.as_str());

  let credentials = loader
    .load()
    .await
    .context("Failed to load credentials for checkout")?;

  let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
  print_info(&format!("Checking out {}@{}", repository, truncate_commit(commit)));
  let checkout = source::checkout(
    runner.as_ref(),
    repository,
    commit,
    &credentials.external_token,
    &cancel,
  )
  .await
  .with_context(|| format!("Failed to check out {}@{}", repository, commit))?;
  drop(credentials);

  let tasks = read_builds(checkout.path())?;
  if tasks.is_empty() {
    print_info("No build tasks configured");
    return Ok(());
  }

  let id = BuildIdentification {
    repository: repository.to_string(),
    commit: commit.to_string(),
    directory: checkout.path().to_path_buf(),
  };

  let builder = Builder::new(
    runner.clone(),
    loader,
    Arc::new(ZipArchiver),
    Arc::new(S3CliUploader::new(runner)),
  );

  print_info(&format!("Running {} build task(s) in {}", tasks.len(), region));
  let artifacts = match builder.build_all(&id, &tasks, &cancel).await {
    Ok(artifacts) => artifacts,
    Err(e) if e.is_cancelled() => return Err(anyhow::Error::new(e).context("Build cancelled")),
    Err(e) => return Err(e).context(format!("Build of {}@{} failed", repository, commit)),
  };

  println!();
  print_success("Build complete!");
  for artifact in &artifacts {
    match artifact {
      BuiltArtifact::Image { tag } => print_item("image", tag),
      BuiltArtifact::Bundle { location } => print_item("bundle", &location.to_string()),
    }
  }
  print_stat("Tasks", &artifacts.len().to_string());
  print_stat("Duration", &format_duration(started.elapsed()));

  Ok(())
}
