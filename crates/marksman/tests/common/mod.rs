//! Common test utilities for marksman tests
//!
//! Fakes for every capability the core consumes, plus [`Rig`], which runs a
//! trigger producer and a shot processor against them.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::RgbImage;
use marksconf::Backpressure;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use marksman::{
    shot_pipeline, AimController, AimPoint, AudioCue, BurstContext, BurstReport, ChannelSink, Cue,
    DetectorError, FrameSource, SessionController, SessionEvent, SessionSettings, ShotArchive,
    ShotProcessor, TargetDetector, TriggerBurstProducer, TriggerEvent, TriggerSource,
};

pub const FRAME_WIDTH: u32 = 32;
pub const FRAME_HEIGHT: u32 = 24;

/// Trigger driven from the test through a channel
pub struct ScriptedTrigger {
    events: mpsc::UnboundedReceiver<TriggerEvent>,
}

pub fn scripted_trigger() -> (mpsc::UnboundedSender<TriggerEvent>, ScriptedTrigger) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, ScriptedTrigger { events: rx })
}

#[async_trait]
impl TriggerSource for ScriptedTrigger {
    async fn next_event(&mut self) -> Option<TriggerEvent> {
        self.events.recv().await
    }
}

/// Camera returning blank frames, or nothing at all
pub struct StaticCamera {
    pub available: bool,
    pub reads: AtomicUsize,
}

impl StaticCamera {
    pub fn working() -> Self {
        Self {
            available: true,
            reads: AtomicUsize::new(0),
        }
    }

    pub fn broken() -> Self {
        Self {
            available: false,
            reads: AtomicUsize::new(0),
        }
    }
}

impl FrameSource for StaticCamera {
    fn read(&self) -> Option<RgbImage> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.available
            .then(|| RgbImage::new(FRAME_WIDTH, FRAME_HEIGHT))
    }

    fn is_running(&self) -> bool {
        self.available
    }
}

#[derive(Default)]
pub struct CountingCue {
    pub played: AtomicUsize,
}

impl AudioCue for CountingCue {
    fn play(&self, _cue: Cue) {
        self.played.fetch_add(1, Ordering::SeqCst);
    }
}

/// Answers from a script, one entry per call; `None` once exhausted
pub struct ScriptedDetector {
    answers: Mutex<VecDeque<Result<Option<String>, String>>>,
    delay: Duration,
}

impl ScriptedDetector {
    pub fn new(answers: Vec<Result<Option<&str>, &str>>) -> Self {
        Self {
            answers: Mutex::new(
                answers
                    .into_iter()
                    .map(|a| a.map(|hit| hit.map(str::to_string)).map_err(str::to_string))
                    .collect(),
            ),
            delay: Duration::ZERO,
        }
    }

    pub fn misses() -> Self {
        Self::new(Vec::new())
    }

    /// Block every call for `delay` to simulate slow inference
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl TargetDetector for ScriptedDetector {
    fn analyze(&self, _frame: &RgbImage, _aim: AimPoint) -> Result<Option<String>, DetectorError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        match self.answers.lock().unwrap().pop_front() {
            Some(Ok(hit)) => Ok(hit),
            Some(Err(message)) => Err(DetectorError::Inference(message)),
            None => Ok(None),
        }
    }
}

/// Archive that remembers what it was asked to store
#[derive(Default)]
pub struct MemoryArchive {
    pub stored: Mutex<Vec<(u64, String, usize)>>,
}

impl ShotArchive for MemoryArchive {
    fn store(
        &self,
        burst_id: u64,
        shot_id: &str,
        jpeg: &[u8],
    ) -> Result<std::path::PathBuf, marksman::ArchiveError> {
        self.stored
            .lock()
            .unwrap()
            .push((burst_id, shot_id.to_string(), jpeg.len()));
        Ok(format!("memory://{}", shot_id).into())
    }
}

pub struct RigOptions {
    pub total_ammo: u32,
    pub capacity: usize,
    pub backpressure: Backpressure,
    pub shot_interval: Duration,
    pub camera: Arc<StaticCamera>,
    pub detector: Arc<dyn TargetDetector>,
    pub archive: Option<Arc<dyn ShotArchive>>,
}

impl Default for RigOptions {
    fn default() -> Self {
        Self {
            total_ammo: 16,
            capacity: 30,
            backpressure: Backpressure::Block,
            shot_interval: Duration::from_millis(5),
            camera: Arc::new(StaticCamera::working()),
            detector: Arc::new(ScriptedDetector::misses()),
            archive: None,
        }
    }
}

/// Producer and processor wired to fakes, with events on a channel
pub struct Rig {
    pub session: Arc<SessionController>,
    pub trigger: mpsc::UnboundedSender<TriggerEvent>,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    pub cue: Arc<CountingCue>,
    pub shutdown: CancellationToken,
    producer: JoinHandle<Vec<BurstReport>>,
    processor: JoinHandle<u64>,
}

impl Rig {
    pub fn spawn(options: RigOptions) -> Self {
        let (sink, events) = ChannelSink::new();
        let sink = Arc::new(sink);
        let settings = SessionSettings {
            total_ammo: options.total_ammo,
            ..SessionSettings::default()
        };
        let session = Arc::new(SessionController::new(settings, sink.clone()));
        let (sender, receiver) = shot_pipeline(options.capacity, options.backpressure);
        let cue = Arc::new(CountingCue::default());
        let (trigger, source) = scripted_trigger();
        let shutdown = CancellationToken::new();

        let producer = TriggerBurstProducer::new(
            source,
            BurstContext {
                session: session.clone(),
                camera: options.camera,
                aim: Arc::new(AimController::new(FRAME_HEIGHT, FRAME_WIDTH)),
                audio: cue.clone(),
                pipeline: sender,
                shot_interval: options.shot_interval,
            },
        );
        let mut processor = ShotProcessor::new(session.clone(), options.detector, sink);
        if let Some(archive) = options.archive {
            processor = processor.with_archive(archive);
        }

        let producer = tokio::spawn(producer.run(shutdown.clone()));
        let processor = tokio::spawn(processor.run(receiver, shutdown.clone()));

        Self {
            session,
            trigger,
            events,
            cue,
            shutdown,
            producer,
            processor,
        }
    }

    pub fn press(&self) {
        self.trigger.send(TriggerEvent::Press).unwrap();
    }

    pub fn release(&self) {
        self.trigger.send(TriggerEvent::Release).unwrap();
    }

    pub async fn next_event(&mut self) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(10), self.events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event channel closed")
    }

    /// Collect events up to and including `session_ended`.
    pub async fn until_session_ended(&mut self) -> Vec<SessionEvent> {
        let mut seen = Vec::new();
        loop {
            let event = self.next_event().await;
            let done = matches!(event, SessionEvent::SessionEnded { .. });
            seen.push(event);
            if done {
                return seen;
            }
        }
    }

    /// Everything already delivered, without waiting
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        let mut seen = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            seen.push(event);
        }
        seen
    }

    pub async fn stop(self) -> (Vec<BurstReport>, u64) {
        self.shutdown.cancel();
        let reports = self.producer.await.unwrap();
        let processed = self.processor.await.unwrap();
        (reports, processed)
    }
}

pub fn shot_ids(events: &[SessionEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::NewShotImage { shot_id, .. } => Some(shot_id.clone()),
            _ => None,
        })
        .collect()
}

pub fn count(events: &[SessionEvent], name: &str) -> usize {
    events.iter().filter(|event| event.name() == name).count()
}
