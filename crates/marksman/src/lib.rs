//! Marksman: Live Target-Shooting Session Daemon
//!
//! Runs timed, ammo-limited shooting drills on an embedded range device.
//! Trigger presses become bursts of captured frames; a single consumer scores
//! each shot against a hit detector and the session ends on time, on the last
//! round, or on request.
//!
//! Data flow:
//!
//! - **Trigger** ([`trigger`]): press/release into bursts, one shot per interval
//! - **Pipeline** ([`pipeline`]): bounded FIFO of captured shots
//! - **Processor** ([`processor`]): detection, hit registration, shot images
//! - **Timeout** ([`monitor`]): ends the session when its clock runs out
//! - **Live view** ([`live_view`]): the aimed camera picture for observers
//!
//! All session state lives in one [`SessionController`]; observers hear about
//! it through an [`EventSink`].

pub mod achievement;
pub mod aim;
pub mod archive;
pub mod clock;
pub mod command;
pub mod console;
pub mod daemon;
pub mod detector;
pub mod devices;
pub mod events;
pub mod frame;
pub mod live_view;
pub mod monitor;
pub mod pipeline;
pub mod processor;
pub mod session;
pub mod status;
pub mod supervisor;
pub mod trigger;

pub use achievement::{Achievement, AchievementRules};
pub use aim::{AimController, AimError, AimPoint, AimState, CropRegion};
pub use archive::{ArchiveError, FsShotArchive, ShotArchive};
pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{Command, CommandError, CommandOutcome, CommandRouter, RelativePoint};
pub use console::{ConsoleConnector, ConsoleHarness, TestPatternCamera};
pub use daemon::{Devices, RangeDaemon, RunningDaemon};
pub use detector::{BoundingBox, BoxHitDetector, Detection, DetectorError, NoTargets, ObjectDetector, TargetDetector};
pub use devices::{
    AudioCue, ConnectionFlag, Cue, FrameSource, RawKeyEvent, ReconnectPolicy, ReconnectingTrigger,
    SilentCue, TriggerBinding, TriggerConnector, TriggerDevice, TriggerError, TriggerEvent,
    TriggerSource,
};
pub use events::{ChannelSink, EventSink, FanoutSink, SessionEvent, TracingSink};
pub use live_view::{FileFrameSink, FrameSink, LatestFrameSink, LiveFrame, LiveViewStreamer};
pub use monitor::SessionTimeoutMonitor;
pub use pipeline::{shot_pipeline, Capture, MissedShot, PipelineError, ShotReceiver, ShotRecord, ShotSender};
pub use processor::{ShotOutcome, ShotProcessor};
pub use session::{
    EndReason, FireRefusal, SessionController, SessionSettings, SessionSnapshot, SessionSummary,
};
pub use status::StatusReporter;
pub use supervisor::{ShutdownReport, Supervisor};
pub use trigger::{BurstContext, BurstEnd, BurstReport, ProducerState, TriggerBurstProducer};
