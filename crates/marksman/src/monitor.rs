//! Session timeout monitor
//!
//! Polls the session snapshot and ends the session once its clock runs out.
//! Never touches ammunition or hits.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::session::{EndReason, SessionController, SessionSummary};

pub struct SessionTimeoutMonitor {
    session: Arc<SessionController>,
    poll: Duration,
}

impl SessionTimeoutMonitor {
    pub fn new(session: Arc<SessionController>, poll: Duration) -> Self {
        Self { session, poll }
    }

    /// One poll. Ends the session if it is active and past its end time.
    pub fn check_once(&self) -> Option<SessionSummary> {
        let now = self.session.clock().now();
        self.session
            .end_if(EndReason::TimeExpired, |snapshot| snapshot.is_expired_at(now))
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Timeout monitor shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Some(summary) = self.check_once() {
                        info!("Session timed out after {} shots", summary.total_shots);
                    }
                }
            }
        }
    }
}
