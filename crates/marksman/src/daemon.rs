//! RangeDaemon - wires the session core to its devices and workers
//!
//! Workers, all under one [`Supervisor`]:
//! - `trigger`: turns presses into bursts and feeds the shot pipeline
//! - `processor`: drains the pipeline, scores hits, closes the session on
//!   the last round
//! - `timeout`: ends the session when its clock runs out
//! - `status`: periodic device health
//! - `live_view`: aimed camera frames at `camera.fps`, only when a frame sink
//!   is configured

use std::sync::Arc;

use marksconf::RangeConfig;
use tracing::{debug, info};

use crate::aim::AimController;
use crate::archive::ShotArchive;
use crate::command::CommandRouter;
use crate::detector::TargetDetector;
use crate::devices::{AudioCue, ConnectionFlag, FrameSource, TriggerSource};
use crate::events::EventSink;
use crate::live_view::{FrameSink, LiveViewStreamer};
use crate::monitor::SessionTimeoutMonitor;
use crate::pipeline::shot_pipeline;
use crate::processor::ShotProcessor;
use crate::session::{SessionController, SessionSettings};
use crate::status::StatusReporter;
use crate::supervisor::{ShutdownReport, Supervisor};
use crate::trigger::{BurstContext, TriggerBurstProducer};

/// Capabilities the daemon drives but does not own the implementation of
#[derive(Clone)]
pub struct Devices {
    pub camera: Arc<dyn FrameSource>,
    pub audio: Arc<dyn AudioCue>,
    pub detector: Arc<dyn TargetDetector>,
    pub archive: Option<Arc<dyn ShotArchive>>,
    pub sink: Arc<dyn EventSink>,
    pub live_view: Option<Arc<dyn FrameSink>>,
}

pub struct RangeDaemon {
    config: RangeConfig,
    devices: Devices,
    session: Arc<SessionController>,
    aim: Arc<AimController>,
}

impl RangeDaemon {
    pub fn new(config: RangeConfig, devices: Devices) -> Self {
        let session = Arc::new(SessionController::new(
            SessionSettings::from(&config),
            Arc::clone(&devices.sink),
        ));
        Self::with_session(config, devices, session)
    }

    /// Build around an existing session controller (e.g. one on a manual
    /// clock).
    pub fn with_session(
        config: RangeConfig,
        devices: Devices,
        session: Arc<SessionController>,
    ) -> Self {
        let aim = Arc::new(AimController::new(
            config.camera.frame_width(),
            config.camera.frame_height(),
        ));
        Self {
            config,
            devices,
            session,
            aim,
        }
    }

    pub fn session(&self) -> &Arc<SessionController> {
        &self.session
    }

    pub fn aim(&self) -> &Arc<AimController> {
        &self.aim
    }

    /// Start every worker. `trigger_connected` is reported by the status
    /// worker.
    pub fn spawn<T>(self, trigger: T, trigger_connected: ConnectionFlag) -> RunningDaemon
    where
        T: TriggerSource + 'static,
    {
        self.spawn_with(Supervisor::new(), trigger, trigger_connected)
    }

    pub fn spawn_with<T>(
        self,
        mut supervisor: Supervisor,
        trigger: T,
        trigger_connected: ConnectionFlag,
    ) -> RunningDaemon
    where
        T: TriggerSource + 'static,
    {
        let session_cfg = &self.config.session;
        let (sender, receiver) =
            shot_pipeline(session_cfg.pipeline_capacity, session_cfg.backpressure);
        info!(
            "Shot pipeline: {} slots, {:?} when full",
            sender.capacity(),
            sender.policy()
        );

        let producer = TriggerBurstProducer::new(
            trigger,
            BurstContext {
                session: Arc::clone(&self.session),
                camera: Arc::clone(&self.devices.camera),
                aim: Arc::clone(&self.aim),
                audio: Arc::clone(&self.devices.audio),
                pipeline: sender,
                shot_interval: session_cfg.shot_interval(),
            },
        );
        supervisor.spawn("trigger", move |token| async move {
            let reports = producer.run(token).await;
            debug!("Trigger worker joined {} bursts", reports.len());
        });

        let mut processor = ShotProcessor::new(
            Arc::clone(&self.session),
            Arc::clone(&self.devices.detector),
            Arc::clone(&self.devices.sink),
        );
        if let Some(archive) = &self.devices.archive {
            processor = processor.with_archive(Arc::clone(archive));
        }
        supervisor.spawn("processor", move |token| async move {
            processor.run(receiver, token).await;
        });

        let monitor =
            SessionTimeoutMonitor::new(Arc::clone(&self.session), session_cfg.timeout_poll());
        supervisor.spawn("timeout", move |token| monitor.run(token));

        let reporter = StatusReporter::new(
            trigger_connected,
            Arc::clone(&self.devices.camera),
            Arc::clone(&self.devices.sink),
            session_cfg.status_interval(),
        );
        supervisor.spawn("status", move |token| reporter.run(token));

        if let Some(frames) = &self.devices.live_view {
            let streamer = LiveViewStreamer::new(
                Arc::clone(&self.devices.camera),
                Arc::clone(&self.aim),
                Arc::clone(frames),
                self.config.camera.frame_interval(),
            );
            supervisor.spawn("live_view", move |token| streamer.run(token));
        }

        info!("Range daemon running with {} workers", supervisor.len());
        RunningDaemon {
            router: CommandRouter::new(Arc::clone(&self.session), Arc::clone(&self.aim)),
            session: self.session,
            aim: self.aim,
            supervisor,
        }
    }
}

/// Handle to a spawned daemon
pub struct RunningDaemon {
    session: Arc<SessionController>,
    aim: Arc<AimController>,
    router: CommandRouter,
    supervisor: Supervisor,
}

impl RunningDaemon {
    pub fn session(&self) -> &Arc<SessionController> {
        &self.session
    }

    pub fn aim(&self) -> &Arc<AimController> {
        &self.aim
    }

    pub fn commands(&self) -> &CommandRouter {
        &self.router
    }

    pub async fn shutdown(self) -> ShutdownReport {
        info!("Range daemon shutting down");
        let report = self.supervisor.shutdown().await;
        info!(
            "Range daemon stopped ({} workers joined, {} failed)",
            report.joined.len(),
            report.failed.len()
        );
        report
    }
}
