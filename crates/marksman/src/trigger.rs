//! Trigger-driven burst fire
//!
//! States: `Idle` and `BurstActive(burst_id)`. A press in `Idle` starts a
//! new burst task; the burst keeps firing at a fixed interval until the
//! trigger is released, the session refuses a shot, or the daemon shuts
//! down. Each burst owns a child cancellation token acting as its "held"
//! flag, so a release interrupts the inter-shot sleep and no shot starts
//! after it.
//!
//! A new burst waits for the previous one to wind down before firing, so at
//! most one burst loop ever produces shots and their records enter the
//! pipeline in order. Each burst task hands back the reports of the chain it
//! joined plus its own.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::aim::AimController;
use crate::devices::{AudioCue, Cue, FrameSource, TriggerEvent, TriggerSource};
use crate::pipeline::{Capture, MissedShot, PipelineError, ShotRecord, ShotSender};
use crate::session::{FireRefusal, SessionController};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    Idle,
    BurstActive(u64),
}

/// How a burst stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurstEnd {
    Released,
    Refused(FireRefusal),
    Shutdown,
    PipelineClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstReport {
    pub burst_id: u64,
    pub shots_fired: u32,
    pub end: BurstEnd,
}

/// Everything a burst needs to fire shots
#[derive(Clone)]
pub struct BurstContext {
    pub session: Arc<SessionController>,
    pub camera: Arc<dyn FrameSource>,
    pub aim: Arc<AimController>,
    pub audio: Arc<dyn AudioCue>,
    pub pipeline: ShotSender,
    pub shot_interval: Duration,
}

impl BurstContext {
    async fn fire_burst(
        self,
        burst_id: u64,
        held: CancellationToken,
        shutdown: CancellationToken,
    ) -> BurstReport {
        let mut shot_index = 0u32;
        let mut shots_fired = 0u32;

        let end = loop {
            if held.is_cancelled() {
                break if shutdown.is_cancelled() {
                    BurstEnd::Shutdown
                } else {
                    BurstEnd::Released
                };
            }

            if let Err(refusal) = self.session.check_fire() {
                warn!("Burst {} stopped: {}", burst_id, refusal);
                break BurstEnd::Refused(refusal);
            }

            // The round is spent before the frame is read, even if the
            // capture then fails.
            let Some(ammo_after) = self.session.decrement_bullet() else {
                break BurstEnd::Refused(FireRefusal::OutOfAmmo);
            };
            shots_fired += 1;

            let aim = self.aim.snapshot();
            let capture = match self.camera.read() {
                Some(frame) => Some(Capture::Shot(ShotRecord {
                    frame,
                    captured_at: Utc::now(),
                    burst_id,
                    shot_index,
                    zoom: aim.zoom,
                    aim: aim.center,
                    ammo_after,
                })),
                None if ammo_after == 0 => {
                    warn!("No frame for final shot {}-{}", burst_id, shot_index);
                    Some(Capture::Missed(MissedShot {
                        burst_id,
                        shot_index,
                        ammo_after,
                    }))
                }
                None => {
                    warn!("No frame for shot {}-{}, round spent", burst_id, shot_index);
                    None
                }
            };

            if let Some(capture) = capture {
                let captured_frame = matches!(capture, Capture::Shot(_));
                match self.pipeline.put(capture, &shutdown).await {
                    Ok(()) | Err(PipelineError::Dropped(_)) => {}
                    Err(PipelineError::Cancelled) => break BurstEnd::Shutdown,
                    Err(PipelineError::Closed) => break BurstEnd::PipelineClosed,
                }
                if captured_frame {
                    self.audio.play(Cue::Shot);
                }
            }
            shot_index += 1;

            tokio::select! {
                biased;
                _ = held.cancelled() => {}
                _ = tokio::time::sleep(self.shot_interval) => {}
            }
        };

        info!("Burst {} finished after {} shots ({:?})", burst_id, shots_fired, end);
        BurstReport {
            burst_id,
            shots_fired,
            end,
        }
    }
}

struct ActiveBurst {
    id: u64,
    held: CancellationToken,
    handle: JoinHandle<Vec<BurstReport>>,
}

/// Turns trigger presses into bursts of shots
pub struct TriggerBurstProducer<T> {
    source: T,
    ctx: BurstContext,
    last_burst_id: u64,
    current: Option<ActiveBurst>,
}

impl<T: TriggerSource> TriggerBurstProducer<T> {
    pub fn new(source: T, ctx: BurstContext) -> Self {
        Self {
            source,
            ctx,
            last_burst_id: 0,
            current: None,
        }
    }

    /// `BurstActive` from press until release, even if the burst itself
    /// already stopped for lack of ammo or time.
    pub fn state(&self) -> ProducerState {
        match &self.current {
            Some(burst) if !burst.held.is_cancelled() => ProducerState::BurstActive(burst.id),
            _ => ProducerState::Idle,
        }
    }

    pub fn handle_event(&mut self, event: TriggerEvent, shutdown: &CancellationToken) {
        match (event, self.state()) {
            (TriggerEvent::Press, ProducerState::BurstActive(id)) => {
                debug!("Press ignored, burst {} still held", id);
            }
            (TriggerEvent::Press, ProducerState::Idle) => self.start_burst(shutdown),
            (TriggerEvent::Release, ProducerState::BurstActive(id)) => {
                debug!("Trigger released, ending burst {}", id);
                if let Some(burst) = &self.current {
                    burst.held.cancel();
                }
            }
            (TriggerEvent::Release, ProducerState::Idle) => {}
        }
    }

    fn start_burst(&mut self, shutdown: &CancellationToken) {
        self.last_burst_id += 1;
        let burst_id = self.last_burst_id;
        let held = shutdown.child_token();
        let previous = self.current.take();

        let ctx = self.ctx.clone();
        let burst_held = held.clone();
        let burst_shutdown = shutdown.clone();
        let handle = tokio::spawn(
            async move {
                let mut reports = Vec::new();
                if let Some(previous) = previous {
                    match previous.handle.await {
                        Ok(earlier) => {
                            debug!("Previous burst {} wound down", previous.id);
                            reports.extend(earlier);
                        }
                        Err(e) => warn!("Burst {} task failed: {}", previous.id, e),
                    }
                }
                reports.push(ctx.fire_burst(burst_id, burst_held, burst_shutdown).await);
                reports
            }
            .instrument(info_span!("burst", id = burst_id)),
        );

        info!("Trigger pressed, burst {} started", burst_id);
        self.current = Some(ActiveBurst {
            id: burst_id,
            held,
            handle,
        });
    }

    /// Run until shutdown or until the trigger source closes, then release
    /// and join the last burst. Returns the report of every burst, in
    /// burst order.
    pub async fn run(mut self, shutdown: CancellationToken) -> Vec<BurstReport> {
        info!("Trigger producer started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                event = self.source.next_event() => match event {
                    Some(event) => self.handle_event(event, &shutdown),
                    None => {
                        info!("Trigger source closed");
                        break;
                    }
                },
            }
        }

        let mut reports = Vec::new();
        if let Some(burst) = self.current.take() {
            burst.held.cancel();
            match burst.handle.await {
                Ok(chain) => reports = chain,
                Err(e) => warn!("Burst {} task failed: {}", burst.id, e),
            }
        }
        info!("Trigger producer stopped after {} bursts", reports.len());
        reports
    }
}
