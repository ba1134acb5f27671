//! Outbound notifications
//!
//! Everything the core reports to a remote observer goes through
//! [`EventSink::notify`]. Sinks are fire-and-forget: a disconnected transport
//! turns `notify` into a no-op and the session keeps running offline.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::achievement::Achievement;

/// Event emitted by the range core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum SessionEvent {
    UpdateAmmo {
        ammo: u32,
    },
    SessionEnded {
        reason: String,
        total_shots: u32,
        hit_count: usize,
        achievement: Achievement,
    },
    TargetHitUpdate {
        target_name: String,
    },
    NewShotImage {
        shot_id: String,
        /// Base64-encoded JPEG
        image_data: String,
    },
    StatusUpdate {
        component: String,
        status: String,
    },
}

impl SessionEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::UpdateAmmo { .. } => "update_ammo",
            SessionEvent::SessionEnded { .. } => "session_ended",
            SessionEvent::TargetHitUpdate { .. } => "target_hit_update",
            SessionEvent::NewShotImage { .. } => "new_shot_image",
            SessionEvent::StatusUpdate { .. } => "status_update",
        }
    }
}

/// Trait for publishing session events to an observer
pub trait EventSink: Send + Sync {
    fn notify(&self, event: SessionEvent);
}

/// Sink that only logs (default when no transport is configured)
pub struct TracingSink;

impl EventSink for TracingSink {
    fn notify(&self, event: SessionEvent) {
        match &event {
            SessionEvent::NewShotImage { shot_id, image_data } => {
                debug!("Event new_shot_image: {} ({} bytes b64)", shot_id, image_data.len());
            }
            SessionEvent::StatusUpdate { .. } => debug!("Event {:?}", event),
            _ => info!("Event {:?}", event),
        }
    }
}

/// Sink that hands events to an async consumer over an unbounded channel.
///
/// Once the receiver is dropped the transport counts as unavailable and
/// every notify is silently discarded.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

impl EventSink for ChannelSink {
    fn notify(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            debug!("Event transport closed, dropping notification");
        }
    }
}

/// Broadcasts every event to all inner sinks
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn notify(&self, event: SessionEvent) {
        for sink in &self.sinks {
            sink.notify(event.clone());
        }
    }
}
