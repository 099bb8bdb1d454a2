use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{timeout, Duration};

use crate::obs::BridgeMetrics;

/// Registry of detached handler tasks so shutdown can await them.
pub struct TaskRegistry {
    tasks: Mutex<JoinSet<()>>,
    metrics: Arc<BridgeMetrics>,
}

impl TaskRegistry {
    pub fn new(metrics: Arc<BridgeMetrics>) -> Self {
        Self {
            tasks: Mutex::new(JoinSet::new()),
            metrics,
        }
    }

    /// Spawn `fut`, reaping tasks that already finished.
    pub async fn spawn<F>(&self, label: &'static str, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut set = self.tasks.lock().await;
        while let Some(res) = set.try_join_next() {
            log_finished(res);
        }
        set.spawn(fut);
        self.metrics.detached_tasks.set(&[], set.len() as i64);
        tracing::debug!(task = label, outstanding = set.len(), "detached task spawned");
    }

    /// Tasks not yet reaped (finished ones count until the next spawn/shutdown).
    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }

    /// Wait up to `grace` for outstanding tasks, then abort the rest.
    /// Returns how many were aborted.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        let mut set = std::mem::take(&mut *self.tasks.lock().await);
        if set.is_empty() {
            return 0;
        }

        let drained = timeout(grace, async {
            while let Some(res) = set.join_next().await {
                log_finished(res);
            }
        })
        .await;

        let aborted = if drained.is_err() {
            let n = set.len();
            tracing::warn!(aborted = n, "detached tasks still running after grace; aborting");
            set.abort_all();
            while set.join_next().await.is_some() {}
            n
        } else {
            0
        };

        self.metrics.detached_tasks.set(&[], 0);
        aborted
    }
}

fn log_finished(res: Result<(), JoinError>) {
    if let Err(e) = res {
        if e.is_panic() {
            tracing::error!(error = %e, "detached task panicked");
        }
    }
}
