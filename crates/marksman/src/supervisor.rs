//! Named worker tasks sharing one shutdown token

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

/// What `shutdown` found when joining the workers
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub joined: Vec<String>,
    pub failed: Vec<String>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Supervisor {
    token: CancellationToken,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// Supervise under an existing token, e.g. one a signal handler cancels.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            tasks: Vec::new(),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawn a worker inside a span named after it. The closure receives the
    /// shared shutdown token.
    pub fn spawn<F, Fut>(&mut self, name: &str, worker: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let span = info_span!("worker", name = name);
        let handle = tokio::spawn(worker(self.token.clone()).instrument(span));
        self.tasks.push((name.to_string(), handle));
        info!("Worker {} started", name);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Cancel every worker and wait for all of them, in spawn order.
    pub async fn shutdown(self) -> ShutdownReport {
        self.token.cancel();

        let mut report = ShutdownReport::default();
        for (name, handle) in self.tasks {
            match handle.await {
                Ok(()) => {
                    info!("Worker {} stopped", name);
                    report.joined.push(name);
                }
                Err(e) => {
                    error!("Worker {} failed: {}", name, e);
                    report.failed.push(name);
                }
            }
        }
        report
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}
