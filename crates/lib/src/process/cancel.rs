//! Cancellation signal shared by every command of a run.
//!
//! A [`Cancellation`] fires when its [`CancelHandle`] is triggered or when its
//! optional deadline passes, whichever comes first. Clones observe the same
//! signal, so one value can govern a whole build.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Triggers the [`Cancellation`] it was created with.
#[derive(Debug, Clone)]
pub struct CancelHandle {
  tx: watch::Sender<bool>,
}

impl CancelHandle {
  /// Fire the signal. Idempotent.
  pub fn cancel(&self) {
    self.tx.send_replace(true);
  }
}

/// A cloneable, awaitable cancellation signal with an optional deadline.
#[derive(Debug, Clone)]
pub struct Cancellation {
  rx: watch::Receiver<bool>,
  deadline: Option<Instant>,
}

impl Cancellation {
  /// Create a signal together with the handle that fires it.
  pub fn new() -> (CancelHandle, Self) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, Self { rx, deadline: None })
  }

  /// A signal that never fires.
  pub fn never() -> Self {
    let (_, cancel) = Self::new();
    cancel
  }

  /// Add a deadline `timeout` from now. An earlier existing deadline is kept.
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    let deadline = Instant::now() + timeout;
    self.deadline = Some(match self.deadline {
      Some(existing) => existing.min(deadline),
      None => deadline,
    });
    self
  }

  /// Whether the signal has already fired.
  pub fn is_cancelled(&self) -> bool {
    *self.rx.borrow() || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
  }

  /// Resolves once the signal fires. Pending forever for [`Cancellation::never`].
  pub async fn cancelled(&self) {
    let mut rx = self.rx.clone();
    let triggered = async move {
      loop {
        if *rx.borrow_and_update() {
          return;
        }
        // All handles dropped: nothing can fire the signal anymore.
        if rx.changed().await.is_err() {
          std::future::pending::<()>().await;
        }
      }
    };

    match self.deadline {
      Some(deadline) => {
        tokio::select! {
          _ = triggered => {}
          _ = tokio::time::sleep_until(deadline) => {}
        }
      }
      None => triggered.await,
    }
  }
}

impl Default for Cancellation {
  fn default() -> Self {
    Self::never()
  }
}
