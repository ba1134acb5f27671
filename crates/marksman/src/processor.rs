//! Shot processor: the single consumer of the shot pipeline
//!
//! For every captured shot, in pipeline order:
//! 1. normalize orientation and run the detector (off the async workers)
//! 2. register the hit, if any
//! 3. render, archive and publish the shot image
//! 4. close the session if this capture spent the last round
//!
//! Detector and archive failures are logged and never stop the loop.

use std::sync::Arc;

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine};
use image::RgbImage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aim::{AimPoint, AimState};
use crate::archive::ShotArchive;
use crate::detector::TargetDetector;
use crate::events::{EventSink, SessionEvent};
use crate::frame;
use crate::pipeline::{Capture, ShotReceiver, ShotRecord};
use crate::session::{EndReason, SessionController, SessionSummary};

/// What processing one capture produced
#[derive(Debug, Clone, PartialEq)]
pub struct ShotOutcome {
    pub shot_id: String,
    pub hit: Option<String>,
    pub newly_hit: bool,
    pub ended: Option<SessionSummary>,
}

pub struct ShotProcessor {
    session: Arc<SessionController>,
    detector: Arc<dyn TargetDetector>,
    archive: Option<Arc<dyn ShotArchive>>,
    sink: Arc<dyn EventSink>,
}

impl ShotProcessor {
    pub fn new(
        session: Arc<SessionController>,
        detector: Arc<dyn TargetDetector>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            session,
            detector,
            archive: None,
            sink,
        }
    }

    pub fn with_archive(mut self, archive: Arc<dyn ShotArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Drain the pipeline until shutdown or until every producer is gone.
    /// Shutdown abandons the capture in progress; a detection still running
    /// on the blocking pool finishes there unobserved. Returns how many
    /// captures were fully processed.
    pub async fn run(self, mut receiver: ShotReceiver, shutdown: CancellationToken) -> u64 {
        info!("Shot processor started");
        let mut processed = 0u64;
        while let Some(capture) = receiver.take(&shutdown).await {
            let shot_id = capture.shot_id();
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown while processing shot {}, abandoning it", shot_id);
                    break;
                }
                _ = self.process(capture) => processed += 1,
            }
        }
        info!("Shot processor stopped after {} captures", processed);
        processed
    }

    pub async fn process(&self, capture: Capture) -> ShotOutcome {
        let shot_id = capture.shot_id();
        let ammo_after = capture.ammo_after();

        let (hit, newly_hit) = match capture {
            Capture::Shot(shot) => self.process_shot(&shot_id, shot).await,
            Capture::Missed(_) => {
                debug!("Shot {} has no frame, nothing to analyze", shot_id);
                (None, false)
            }
        };

        let ended = self.close_if_last_round(&shot_id, ammo_after);
        ShotOutcome {
            shot_id,
            hit,
            newly_hit,
            ended,
        }
    }

    async fn process_shot(&self, shot_id: &str, shot: ShotRecord) -> (Option<String>, bool) {
        let normalized = Arc::new(frame::normalize_orientation(&shot.frame));

        let hit = self.detect(shot_id, Arc::clone(&normalized), shot.aim).await;
        let newly_hit = match &hit {
            Some(label) => self.session.register_hit(label),
            None => false,
        };
        if let Some(label) = &hit {
            debug!("Shot {} struck {} (new: {})", shot_id, label, newly_hit);
        }

        let aim = AimState {
            zoom: shot.zoom,
            center: shot.aim,
        };
        match self.render_and_store(shot_id, shot.burst_id, normalized, aim).await {
            Ok(jpeg) => self.sink.notify(SessionEvent::NewShotImage {
                shot_id: shot_id.to_string(),
                image_data: STANDARD.encode(jpeg),
            }),
            Err(e) => warn!("Shot {} image not published: {:#}", shot_id, e),
        }

        (hit, newly_hit)
    }

    async fn detect(&self, shot_id: &str, image: Arc<RgbImage>, aim: AimPoint) -> Option<String> {
        let detector = Arc::clone(&self.detector);
        let result = tokio::task::spawn_blocking(move || detector.analyze(&image, aim))
            .await
            .context("Detector task panicked");

        match result {
            Ok(Ok(hit)) => hit,
            Ok(Err(e)) => {
                warn!("Detection failed for shot {}, counting as no hit: {}", shot_id, e);
                None
            }
            Err(e) => {
                warn!("Detection failed for shot {}, counting as no hit: {:#}", shot_id, e);
                None
            }
        }
    }

    async fn render_and_store(
        &self,
        shot_id: &str,
        burst_id: u64,
        image: Arc<RgbImage>,
        aim: AimState,
    ) -> anyhow::Result<Vec<u8>> {
        let archive = self.archive.clone();
        let id = shot_id.to_string();
        tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<u8>> {
            let view = frame::annotate_shot(&image, aim);
            let jpeg = frame::encode_jpeg(&view).context("JPEG encoding failed")?;
            if let Some(archive) = archive {
                if let Err(e) = archive.store(burst_id, &id, &jpeg) {
                    warn!("Shot {} not archived: {}", id, e);
                }
            }
            Ok(jpeg)
        })
        .await
        .context("Render task panicked")?
    }

    fn close_if_last_round(&self, shot_id: &str, ammo_after: u32) -> Option<SessionSummary> {
        if ammo_after != 0 {
            return None;
        }
        let summary = self
            .session
            .end_if(EndReason::OutOfAmmunition, |snapshot| snapshot.is_out_of_ammo());
        if summary.is_some() {
            info!("Shot {} spent the last round, session closed", shot_id);
        }
        summary
    }
}
