//! Supervision for a session's worker tasks.
//!
//! A [`TaskGroup`] owns the tasks spawned into it and provides the three
//! guarantees the session engine needs: a broadcast "dying" signal, a
//! join over all children, and first-error propagation (any worker
//! returning an error kills its peers). Panics are caught at the join
//! boundary and surface as [`SessionError::WorkerPanic`].

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::error::SessionError;

/// Receiver side of the group's "dying" broadcast.
///
/// The signal is sticky: once the group starts dying, [`Dying::wait`]
/// completes immediately for every caller, present and future.
#[derive(Debug, Clone)]
pub struct Dying {
    rx: watch::Receiver<bool>,
}

impl Dying {
    pub(crate) const fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// Completes once the group is dying.
    pub async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                // Sender gone: the group is being dropped.
                return;
            }
        }
    }
}

/// A handle that lets a worker start the group's death itself, e.g. when
/// it hits a protocol fault and its peers must stop feeding it.
#[derive(Debug, Clone)]
pub struct KillHandle {
    dying_tx: Arc<watch::Sender<bool>>,
}

impl KillHandle {
    /// Broadcasts the dying signal.
    pub fn kill(&self) {
        self.dying_tx.send_replace(true);
    }
}

/// Owns the worker tasks of one session.
pub struct TaskGroup {
    dying_tx: Arc<watch::Sender<bool>>,
    tasks: JoinSet<Result<(), SessionError>>,
}

impl TaskGroup {
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        let (dying_tx, _) = watch::channel(false);
        Self {
            dying_tx: Arc::new(dying_tx),
            tasks: JoinSet::new(),
        }
    }

    /// A fresh receiver for the dying broadcast.
    #[must_use]
    pub fn dying(&self) -> Dying {
        Dying::new(self.dying_tx.subscribe())
    }

    /// A handle workers can use to kill the group from inside.
    #[must_use]
    pub fn kill_handle(&self) -> KillHandle {
        KillHandle {
            dying_tx: Arc::clone(&self.dying_tx),
        }
    }

    /// Spawns a worker into the group.
    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = Result<(), SessionError>> + Send + 'static,
    {
        self.tasks.spawn(task);
    }

    /// Broadcasts the dying signal to every worker.
    pub fn kill(&self) {
        self.dying_tx.send_replace(true);
    }

    /// Waits for every worker to exit, killing the rest as soon as one
    /// returns an error or panics. Returns the first failure observed.
    ///
    /// # Errors
    /// The first worker error, or `WorkerPanic` if a worker panicked.
    pub async fn join(&mut self) -> Result<(), SessionError> {
        let mut first_err = None;
        while let Some(joined) = self.tasks.join_next().await {
            let failure = match joined {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(join_err) => Some(SessionError::WorkerPanic(join_err.to_string())),
            };
            if let Some(e) = failure {
                self.kill();
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new()
    }
}
