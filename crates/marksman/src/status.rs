//! Periodic device health reports
//!
//! Observers get a `status_update` for the trigger and the video feed every
//! tick, whether or not anything changed.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::devices::{ConnectionFlag, FrameSource};
use crate::events::{EventSink, SessionEvent};

pub const TRIGGER_COMPONENT: &str = "trigger";
pub const VIDEO_COMPONENT: &str = "video";

fn health(ok: bool) -> &'static str {
    if ok {
        "ready"
    } else {
        "disconnected"
    }
}

pub struct StatusReporter {
    trigger: ConnectionFlag,
    camera: Arc<dyn FrameSource>,
    sink: Arc<dyn EventSink>,
    interval: Duration,
}

impl StatusReporter {
    pub fn new(
        trigger: ConnectionFlag,
        camera: Arc<dyn FrameSource>,
        sink: Arc<dyn EventSink>,
        interval: Duration,
    ) -> Self {
        Self {
            trigger,
            camera,
            sink,
            interval,
        }
    }

    pub fn report(&self) {
        self.sink.notify(SessionEvent::StatusUpdate {
            component: TRIGGER_COMPONENT.to_string(),
            status: health(self.trigger.get()).to_string(),
        });
        self.sink.notify(SessionEvent::StatusUpdate {
            component: VIDEO_COMPONENT.to_string(),
            status: health(self.camera.is_running()).to_string(),
        });
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Status reporter shutting down");
                    break;
                }
                _ = ticker.tick() => self.report(),
            }
        }
    }
}
