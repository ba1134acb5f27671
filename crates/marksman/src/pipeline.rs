//! Bounded shot pipeline between the trigger and the shot processor
//!
//! FIFO with a fixed number of slots. What happens when it is full is a
//! configured [`Backpressure`] policy: `Block` makes the producer wait for a
//! free slot, `DropNewest` discards the record being put and logs a warning.
//! A dropped record that spent the last round still reaches the consumer as
//! a frameless [`MissedShot`], so the session always sees its final round.
//! A blocked `put` or `take` returns as soon as the shutdown token fires.

use chrono::{DateTime, Utc};
use image::RgbImage;
use marksconf::Backpressure;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::aim::AimPoint;

/// One captured shot. Immutable once built.
#[derive(Debug, Clone)]
pub struct ShotRecord {
    pub frame: RgbImage,
    pub captured_at: DateTime<Utc>,
    /// Incremented once per trigger press
    pub burst_id: u64,
    /// 0-based position within the burst
    pub shot_index: u32,
    pub zoom: f64,
    pub aim: AimPoint,
    /// Rounds left right after this shot was fired
    pub ammo_after: u32,
}

/// A round that was fired but whose frame could not be read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissedShot {
    pub burst_id: u64,
    pub shot_index: u32,
    pub ammo_after: u32,
}

/// What travels through the pipeline
#[derive(Debug, Clone)]
pub enum Capture {
    Shot(ShotRecord),
    Missed(MissedShot),
}

impl Capture {
    pub fn burst_id(&self) -> u64 {
        match self {
            Capture::Shot(shot) => shot.burst_id,
            Capture::Missed(miss) => miss.burst_id,
        }
    }

    pub fn shot_index(&self) -> u32 {
        match self {
            Capture::Shot(shot) => shot.shot_index,
            Capture::Missed(miss) => miss.shot_index,
        }
    }

    pub fn ammo_after(&self) -> u32 {
        match self {
            Capture::Shot(shot) => shot.ammo_after,
            Capture::Missed(miss) => miss.ammo_after,
        }
    }

    /// The same round with its frame discarded
    pub fn without_frame(&self) -> MissedShot {
        MissedShot {
            burst_id: self.burst_id(),
            shot_index: self.shot_index(),
            ammo_after: self.ammo_after(),
        }
    }

    /// `"<burst>-<index>"`, also used for file names
    pub fn shot_id(&self) -> String {
        format!("{}-{}", self.burst_id(), self.shot_index())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Pipeline full, dropped shot {0}")]
    Dropped(String),

    #[error("Pipeline closed")]
    Closed,

    #[error("Shutdown while waiting for a free slot")]
    Cancelled,
}

/// Create a pipeline with `capacity` slots.
pub fn shot_pipeline(capacity: usize, policy: Backpressure) -> (ShotSender, ShotReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ShotSender { tx, policy }, ShotReceiver { rx })
}

#[derive(Clone)]
pub struct ShotSender {
    tx: mpsc::Sender<Capture>,
    policy: Backpressure,
}

impl ShotSender {
    pub fn policy(&self) -> Backpressure {
        self.policy
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Enqueue according to the backpressure policy.
    pub async fn put(&self, item: Capture, cancel: &CancellationToken) -> Result<(), PipelineError> {
        match self.policy {
            Backpressure::Block => self.send_waiting(item, cancel).await,
            Backpressure::DropNewest => match self.tx.try_send(item) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(item)) => {
                    let shot_id = item.shot_id();
                    warn!(
                        "Pipeline full ({} slots), dropping shot {}",
                        self.capacity(),
                        shot_id
                    );
                    if item.ammo_after() == 0 {
                        let last_round = Capture::Missed(item.without_frame());
                        self.send_waiting(last_round, cancel).await?;
                    }
                    Err(PipelineError::Dropped(shot_id))
                }
                Err(TrySendError::Closed(_)) => Err(PipelineError::Closed),
            },
        }
    }

    async fn send_waiting(&self, item: Capture, cancel: &CancellationToken) -> Result<(), PipelineError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
            sent = self.tx.send(item) => sent.map_err(|_| PipelineError::Closed),
        }
    }
}

pub struct ShotReceiver {
    rx: mpsc::Receiver<Capture>,
}

impl ShotReceiver {
    /// Wait for the next capture. `None` on shutdown or once every sender
    /// is gone and the queue is drained.
    pub async fn take(&mut self, cancel: &CancellationToken) -> Option<Capture> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            item = self.rx.recv() => item,
        }
    }
}
