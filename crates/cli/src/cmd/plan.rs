//! Implementation of the `artifactor build plan` command.
//!
//! Reads and validates a local `builds.yaml` and lists the tasks a run would
//! execute, in order. Nothing is built and no credentials are needed.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use artifactor_lib::build::{BuildIdentification, BuildTask, BuildTaskSet, BundlePlan, TaskKind};
use artifactor_lib::config::read_builds;

use crate::output::{OutputFormat, print_info, print_item, print_json};

/// Commit placeholder used to show archive names without a real checkout.
const PLACEHOLDER_COMMIT: &str = "<commit>";

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
enum PlannedTask {
  FunctionBundle {
    index: usize,
    runtime: String,
    command: String,
    archive_root: String,
    includes: Option<Vec<String>>,
    excludes: Option<Vec<String>>,
  },
  ContainerImage {
    index: usize,
    dockerfile: String,
    context: String,
  },
}

impl PlannedTask {
  fn kind(&self) -> TaskKind {
    match self {
      PlannedTask::FunctionBundle { .. } => TaskKind::FunctionBundle,
      PlannedTask::ContainerImage { .. } => TaskKind::ContainerImage,
    }
  }
}

fn plan_tasks(dir: &Path, tasks: &BuildTaskSet) -> Result<Vec<PlannedTask>> {
  let id = BuildIdentification {
    repository: String::new(),
    commit: PLACEHOLDER_COMMIT.to_string(),
    directory: dir.to_path_buf(),
  };

  tasks
    .tasks()
    .map(|(index, task)| -> Result<PlannedTask> {
      match task {
        BuildTask::FunctionBundle(spec) => {
          let plan = BundlePlan::prepare(&id, spec)
            .with_context(|| format!("Invalid {} {}", TaskKind::FunctionBundle, index))?;
          let archive_root = plan
            .archive
            .root
            .strip_prefix(dir)
            .map(|relative| relative.display().to_string())
            .unwrap_or_else(|_| plan.archive.root.display().to_string());
          Ok(PlannedTask::FunctionBundle {
            index,
            runtime: plan.runtime.to_string(),
            command: plan.command.to_string(),
            archive_root: if archive_root.is_empty() { ".".to_string() } else { archive_root },
            includes: plan.archive.includes,
            excludes: plan.archive.excludes,
          })
        }
        BuildTask::ContainerImage(spec) => Ok(PlannedTask::ContainerImage {
          index,
          dockerfile: spec.dockerfile.clone(),
          context: spec.context.clone(),
        }),
      }
    })
    .collect()
}

pub fn cmd_plan(dir: &Path, output: OutputFormat) -> Result<()> {
  let tasks = read_builds(dir).with_context(|| format!("Failed to read build configuration in {}", dir.display()))?;
  let planned = plan_tasks(dir, &tasks)?;

  if output.is_json() {
    return print_json(&planned);
  }

  if planned.is_empty() {
    print_info("No build tasks configured");
    return Ok(());
  }

  print_info(&format!("{} build task(s)", planned.len()));
  for task in &planned {
    let label = match task {
      PlannedTask::FunctionBundle { index, .. } | PlannedTask::ContainerImage { index, .. } => {
        format!("{} {}", task.kind(), index)
      }
    };
    let detail = match task {
      PlannedTask::FunctionBundle {
        runtime,
        command,
        archive_root,
        ..
      } => format!("({}: {}, archive {})", runtime, command, archive_root),
      PlannedTask::ContainerImage { dockerfile, context, .. } => format!("({} in {})", dockerfile, context),
    };
    print_item(&label, &detail);
  }

  Ok(())
}
