//! External command execution.
//!
//! Two primitives, both cancellable:
//! - [`run`] spawns one command and waits for it
//! - [`pipe`] connects one command's stdout to another's stdin
//!
//! Output is never captured. Child stdout/stderr go straight to the caller's
//! terminal so operators see build output as it happens.
//!
//! Every invocation ends in one of three failure shapes (start failure,
//! non-zero exit, cancellation), see [`ProcessError`]. A cancelled child is
//! killed and reaped before the call returns.

mod cancel;
mod types;

pub use cancel::{CancelHandle, Cancellation};
pub use types::{Process, ProcessError, pipeline_line};

use std::io::ErrorKind;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Seam over [`run`] and [`pipe`] so callers can substitute a recording fake.
#[async_trait]
pub trait CommandRunner: Send + Sync {
  async fn run(&self, process: &Process, cancel: &Cancellation) -> Result<(), ProcessError>;

  async fn pipe(&self, src: &Process, dst: &Process, cancel: &Cancellation) -> Result<(), ProcessError>;
}

/// Runs commands on the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
  async fn run(&self, process: &Process, cancel: &Cancellation) -> Result<(), ProcessError> {
    run(process, cancel).await
  }

  async fn pipe(&self, src: &Process, dst: &Process, cancel: &Cancellation) -> Result<(), ProcessError> {
    pipe(src, dst, cancel).await
  }
}

/// Build a tokio command from a [`Process`], inheriting stdio by default.
fn command(process: &Process) -> Command {
  let mut command = Command::new(&process.program);
  command
    .args(&process.args)
    .envs(&process.env)
    .stdin(Stdio::inherit())
    .stdout(Stdio::inherit())
    .stderr(Stdio::inherit())
    .kill_on_drop(true);

  if let Some(dir) = &process.working_dir {
    command.current_dir(dir);
  }

  command
}

fn check_status(command: &str, status: ExitStatus) -> Result<(), ProcessError> {
  if status.success() {
    Ok(())
  } else {
    Err(ProcessError::Exit {
      command: command.to_string(),
      code: status.code(),
    })
  }
}

/// Kill a child and wait for it so no zombie is left behind.
async fn terminate(child: &mut Child, command: &str) {
  if let Err(e) = child.kill().await {
    // Already exited between the signal and the kill.
    debug!(command = %command, error = %e, "kill after cancellation failed");
  }
}

/// Run a single command to completion.
///
/// Blocks until the process exits or `cancel` fires. On cancellation the
/// child is killed and [`ProcessError::Cancelled`] is returned.
pub async fn run(process: &Process, cancel: &Cancellation) -> Result<(), ProcessError> {
  let line = process.command_line();
  info!(command = %line, dir = ?process.working_dir, "running command");

  if cancel.is_cancelled() {
    return Err(ProcessError::Cancelled { command: line });
  }

  let mut child = command(process).spawn().map_err(|source| ProcessError::Start {
    command: line.clone(),
    source,
  })?;

  let waited = {
    let wait = child.wait();
    tokio::select! {
      status = wait => Some(status),
      _ = cancel.cancelled() => None,
    }
  };

  match waited {
    Some(Ok(status)) => {
      debug!(command = %line, code = ?status.code(), "command exited");
      check_status(&line, status)
    }
    Some(Err(source)) => Err(ProcessError::Io { command: line, source }),
    None => {
      warn!(command = %line, "cancelled, terminating command");
      terminate(&mut child, &line).await;
      Err(ProcessError::Cancelled { command: line })
    }
  }
}

/// Run `src | dst`.
///
/// Every byte `src` writes to stdout reaches `dst`'s stdin, in order. Once
/// `src` closes its stdout, `dst`'s stdin is closed and both are awaited.
/// Cancellation kills both and reports the whole pipeline as cancelled.
pub async fn pipe(src: &Process, dst: &Process, cancel: &Cancellation) -> Result<(), ProcessError> {
  let line = pipeline_line(src, dst);
  info!(command = %line, "running pipeline");

  if cancel.is_cancelled() {
    return Err(ProcessError::Cancelled { command: line });
  }

  let src_line = src.command_line();
  let dst_line = dst.command_line();

  let mut src_command = command(src);
  src_command.stdin(Stdio::null()).stdout(Stdio::piped());
  let mut dst_command = command(dst);
  dst_command.stdin(Stdio::piped());

  let mut src_child = src_command.spawn().map_err(|source| ProcessError::Start {
    command: src_line.clone(),
    source,
  })?;

  let mut dst_child = match dst_command.spawn() {
    Ok(child) => child,
    Err(source) => {
      terminate(&mut src_child, &src_line).await;
      return Err(ProcessError::Start {
        command: dst_line,
        source,
      });
    }
  };

  let (Some(mut reader), Some(mut writer)) = (src_child.stdout.take(), dst_child.stdin.take()) else {
    terminate(&mut src_child, &src_line).await;
    terminate(&mut dst_child, &dst_line).await;
    return Err(ProcessError::Io {
      command: line,
      source: std::io::Error::other("pipeline stdio handles were not captured"),
    });
  };

  let finished = {
    let src_child = &mut src_child;
    let dst_child = &mut dst_child;
    let work = async move {
      let copied = tokio::io::copy(&mut reader, &mut writer).await;
      // Closing stdin is what lets `dst` see EOF. Closing our end of the
      // source pipe makes a still-writing `src` fail with EPIPE instead of
      // blocking forever.
      drop(writer);
      drop(reader);

      let src_status = src_child.wait().await;
      let dst_status = dst_child.wait().await;

      let dst_stopped_reading = match copied {
        Ok(bytes) => {
          debug!(bytes, "pipeline copy complete");
          false
        }
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {
          debug!(error = %e, "pipeline reader closed early");
          true
        }
        Err(source) => {
          return Err(ProcessError::Io {
            command: line.clone(),
            source,
          });
        }
      };

      let src_status = src_status.map_err(|source| ProcessError::Io {
        command: src_line.clone(),
        source,
      })?;
      let dst_status = dst_status.map_err(|source| ProcessError::Io {
        command: dst_line.clone(),
        source,
      })?;

      // A `dst` that quit early is the cause; `src` only died of the broken pipe.
      if dst_stopped_reading {
        check_status(&dst_line, dst_status)?;
        check_status(&src_line, src_status)
      } else {
        check_status(&src_line, src_status)?;
        check_status(&dst_line, dst_status)
      }
    };

    tokio::select! {
      result = work => Some(result),
      _ = cancel.cancelled() => None,
    }
  };

  match finished {
    Some(result) => result,
    None => {
      let line = pipeline_line(src, dst);
      warn!(command = %line, "cancelled, terminating pipeline");
      terminate(&mut src_child, &src.command_line()).await;
      terminate(&mut dst_child, &dst.command_line()).await;
      Err(ProcessError::Cancelled { command: line })
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::{shell, touch_file};
  use std::time::{Duration, Instant};
  use tempfile::TempDir;

  #[tokio::test]
  async fn run_succeeds_for_zero_exit() {
    let process = shell("exit 0");
    run(&process, &Cancellation::never()).await.unwrap();
  }

  #[tokio::test]
  async fn run_reports_exit_code() {
    let process = shell("exit 3");
    let err = run(&process, &Cancellation::never()).await.unwrap_err();
    assert!(matches!(err, ProcessError::Exit { code: Some(3), .. }));
    assert!(err.to_string().contains("exit 3"));
  }

  #[tokio::test]
  async fn run_reports_start_failure() {
    let process = Process::new("definitely-not-a-real-binary-artifactor");
    let err = run(&process, &Cancellation::never()).await.unwrap_err();
    assert!(matches!(err, ProcessError::Start { .. }));
    assert_eq!(err.command(), "definitely-not-a-real-binary-artifactor");
  }

  #[tokio::test]
  async fn run_uses_working_dir() {
    let temp = TempDir::new().unwrap();
    let process = touch_file("cwd_marker").current_dir(temp.path());

    run(&process, &Cancellation::never()).await.unwrap();

    assert!(temp.path().join("cwd_marker").exists());
  }

  #[tokio::test]
  async fn run_merges_env_overrides() {
    let process = shell("test \"$ARTIFACTOR_TEST_VAR\" = expected && test -n \"$PATH\"").env("ARTIFACTOR_TEST_VAR", "expected");
    run(&process, &Cancellation::never()).await.unwrap();
  }

  #[tokio::test]
  async fn run_cancellation_terminates_child() {
    let temp = TempDir::new().unwrap();
    let marker = temp.path().join("finished");
    let process = shell(&format!("sleep 30 && touch '{}'", marker.display()));

    let (handle, cancel) = Cancellation::new();
    let started = Instant::now();
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(100)).await;
      handle.cancel();
    });

    let err = run(&process, &cancel).await.unwrap_err();

    assert!(err.is_cancelled());
    assert!(!matches!(err, ProcessError::Exit { .. }));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!marker.exists());
  }

  #[tokio::test]
  async fn run_respects_deadline() {
    let process = shell("sleep 30");
    let cancel = Cancellation::never().with_timeout(Duration::from_millis(100));

    let err = run(&process, &cancel).await.unwrap_err();

    assert!(err.is_cancelled());
  }

  #[tokio::test]
  async fn run_already_cancelled_does_not_spawn() {
    let temp = TempDir::new().unwrap();
    let (handle, cancel) = Cancellation::new();
    handle.cancel();

    let err = run(&touch_file("never").current_dir(temp.path()), &cancel).await.unwrap_err();

    assert!(err.is_cancelled());
    assert!(!temp.path().join("never").exists());
  }

  #[tokio::test]
  async fn pipe_delivers_binary_bytes_exactly() {
    let temp = TempDir::new().unwrap();
    let input: Vec<u8> = (0..=255u8).cycle().take(256 * 1024 + 7).collect();
    std::fs::write(temp.path().join("input.bin"), &input).unwrap();

    let src = Process::new("cat").arg("input.bin").current_dir(temp.path());
    let dst = shell("cat > output.bin").current_dir(temp.path());

    pipe(&src, &dst, &Cancellation::never()).await.unwrap();

    let output = std::fs::read(temp.path().join("output.bin")).unwrap();
    assert_eq!(output.len(), input.len());
    assert_eq!(output, input);
  }

  #[tokio::test]
  async fn pipe_reports_source_exit() {
    let src = shell("exit 4");
    let dst = Process::new("cat");

    let err = pipe(&src, &dst, &Cancellation::never()).await.unwrap_err();

    assert!(matches!(err, ProcessError::Exit { code: Some(4), .. }));
    assert!(err.command().contains("exit 4"));
  }

  #[tokio::test]
  async fn pipe_reports_destination_exit() {
    let src = Process::new("echo").arg("secret");
    let dst = shell("cat > /dev/null; exit 5");

    let err = pipe(&src, &dst, &Cancellation::never()).await.unwrap_err();

    assert!(matches!(err, ProcessError::Exit { code: Some(5), .. }));
  }

  #[tokio::test]
  async fn pipe_returns_when_destination_exits_early() {
    let src = shell("head -c 10000000 /dev/zero");
    let dst = shell("exit 1");

    let result = tokio::time::timeout(Duration::from_secs(10), pipe(&src, &dst, &Cancellation::never())).await;

    let err = result.expect("pipe did not return after the destination exited").unwrap_err();
    assert!(matches!(err, ProcessError::Exit { code: Some(1), .. }));
    assert_eq!(err.command(), "/bin/sh -c exit 1");
  }

  #[tokio::test]
  async fn pipe_destination_start_failure_aborts() {
    let src = shell("sleep 30");
    let dst = Process::new("definitely-not-a-real-binary-artifactor");
    let started = Instant::now();

    let err = pipe(&src, &dst, &Cancellation::never()).await.unwrap_err();

    assert!(matches!(err, ProcessError::Start { .. }));
    assert!(err.command().contains("definitely-not-a-real-binary"));
    assert!(started.elapsed() < Duration::from_secs(10));
  }

  #[tokio::test]
  async fn pipe_cancellation_reports_pipeline() {
    let src = shell("sleep 30");
    let dst = Process::new("cat");
    let cancel = Cancellation::never().with_timeout(Duration::from_millis(100));
    let started = Instant::now();

    let err = pipe(&src, &dst, &cancel).await.unwrap_err();

    assert!(err.is_cancelled());
    assert!(err.command().contains(" | "));
    assert!(started.elapsed() < Duration::from_secs(10));
  }
}
