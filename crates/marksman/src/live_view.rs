//! Live view: the aimed camera picture, published at a fixed frame rate
//!
//! Every tick reads the latest frame, renders it the way shot images are
//! rendered (portrait, zoomed, crosshair on the aim point) and hands the JPEG
//! to a [`FrameSink`]. Ticks are skipped while the camera is not running.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aim::AimController;
use crate::devices::FrameSource;
use crate::frame;

/// One rendered live-view frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveFrame {
    /// Counts published frames, starting at 1
    pub sequence: u64,
    pub jpeg: Vec<u8>,
}

/// Where live-view frames go. Called from a blocking thread, so it may do
/// I/O directly.
pub trait FrameSink: Send + Sync {
    fn publish(&self, frame: LiveFrame);
}

/// Keeps only the most recent frame
#[derive(Default)]
pub struct LatestFrameSink {
    latest: Mutex<Option<LiveFrame>>,
}

impl LatestFrameSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<LiveFrame> {
        self.latest.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl FrameSink for LatestFrameSink {
    fn publish(&self, frame: LiveFrame) {
        *self.latest.lock().unwrap_or_else(|e| e.into_inner()) = Some(frame);
    }
}

/// Overwrites one JPEG file with every frame. Readers never see a partial
/// image: each frame is written beside the target and renamed over it.
pub struct FileFrameSink {
    path: PathBuf,
}

impl FileFrameSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, jpeg: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let staging = self.path.with_extension("jpg.part");
        std::fs::write(&staging, jpeg)?;
        std::fs::rename(&staging, &self.path)
    }
}

impl FrameSink for FileFrameSink {
    fn publish(&self, frame: LiveFrame) {
        if let Err(e) = self.write(&frame.jpeg) {
            warn!(
                "Live frame {} not written to {}: {}",
                frame.sequence,
                self.path.display(),
                e
            );
        }
    }
}

pub struct LiveViewStreamer {
    camera: Arc<dyn FrameSource>,
    aim: Arc<AimController>,
    sink: Arc<dyn FrameSink>,
    interval: Duration,
    published: u64,
}

impl LiveViewStreamer {
    pub fn new(
        camera: Arc<dyn FrameSource>,
        aim: Arc<AimController>,
        sink: Arc<dyn FrameSink>,
        interval: Duration,
    ) -> Self {
        Self {
            camera,
            aim,
            sink,
            interval,
            published: 0,
        }
    }

    /// Render and publish one frame. Returns whether a frame went out.
    pub async fn tick_once(&mut self) -> bool {
        if !self.camera.is_running() {
            debug!("Camera not running, no live frame");
            return false;
        }
        let Some(raw) = self.camera.read() else {
            debug!("Camera returned no frame, no live frame");
            return false;
        };

        let aim = self.aim.snapshot();
        let sequence = self.published + 1;
        let sink = Arc::clone(&self.sink);
        let rendered = tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let view = frame::annotate_shot(&frame::normalize_orientation(&raw), aim);
            let jpeg = frame::encode_jpeg(&view).context("JPEG encoding failed")?;
            sink.publish(LiveFrame { sequence, jpeg });
            Ok(())
        })
        .await
        .context("Live view task panicked");

        match rendered {
            Ok(Ok(())) => {
                self.published = sequence;
                true
            }
            Ok(Err(e)) | Err(e) => {
                warn!("Live frame {} dropped: {:#}", sequence, e);
                false
            }
        }
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Live view started, one frame every {:?}", self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Live view shutting down after {} frames", self.published);
                    break;
                }
                _ = ticker.tick() => {
                    self.tick_once().await;
                }
            }
        }
    }
}
