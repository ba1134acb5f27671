//! Console harness for running the daemon without range hardware.
//!
//! - stdin lines `press` / `release` drive a virtual trigger device that
//!   speaks the same raw key events as the real one
//! - any other non-blank line is treated as a JSON command
//! - [`TestPatternCamera`] stands in for the camera

use std::io::BufRead;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::CommandRouter;
use crate::devices::{
    device_name_matches, FrameSource, RawKeyEvent, TriggerBinding, TriggerConnector,
    TriggerDevice, TriggerError, TriggerEvent,
};

/// Virtual trigger device fed from the console
pub struct ConsoleDevice {
    name: String,
    keys: mpsc::UnboundedReceiver<RawKeyEvent>,
}

#[async_trait]
impl TriggerDevice for ConsoleDevice {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read_event(&mut self) -> Result<RawKeyEvent, TriggerError> {
        self.keys.recv().await.ok_or(TriggerError::Closed)
    }
}

/// Hands out the console device once; after that the input is gone for good.
pub struct ConsoleConnector {
    device: Option<ConsoleDevice>,
}

impl ConsoleConnector {
    pub fn new(name: impl Into<String>) -> (Self, mpsc::UnboundedSender<RawKeyEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let device = ConsoleDevice {
            name: name.into(),
            keys: rx,
        };
        (
            Self {
                device: Some(device),
            },
            tx,
        )
    }
}

#[async_trait]
impl TriggerConnector for ConsoleConnector {
    type Device = ConsoleDevice;

    async fn discover(&mut self, pattern: &str) -> Result<Option<ConsoleDevice>, TriggerError> {
        let matches = match &self.device {
            Some(device) => device_name_matches(&device.name, pattern),
            None => return Err(TriggerError::Closed),
        };
        Ok(if matches { self.device.take() } else { None })
    }
}

/// One parsed console line
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleLine {
    Trigger(TriggerEvent),
    Command(String),
    Blank,
}

pub fn parse_line(line: &str) -> ConsoleLine {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleLine::Blank;
    }
    match line.to_ascii_lowercase().as_str() {
        "press" | "p" => ConsoleLine::Trigger(TriggerEvent::Press),
        "release" | "r" => ConsoleLine::Trigger(TriggerEvent::Release),
        _ => ConsoleLine::Command(line.to_string()),
    }
}

/// Routes console lines to the virtual trigger or the command router
pub struct ConsoleHarness {
    router: CommandRouter,
    keys: mpsc::UnboundedSender<RawKeyEvent>,
    binding: TriggerBinding,
}

impl ConsoleHarness {
    pub fn new(
        router: CommandRouter,
        keys: mpsc::UnboundedSender<RawKeyEvent>,
        binding: TriggerBinding,
    ) -> Self {
        Self {
            router,
            keys,
            binding,
        }
    }

    pub fn handle_line(&self, line: &str) {
        match parse_line(line) {
            ConsoleLine::Trigger(event) => {
                let value = match event {
                    TriggerEvent::Press => 1,
                    TriggerEvent::Release => 0,
                };
                let raw = RawKeyEvent {
                    code: self.binding.code,
                    value,
                };
                if self.keys.send(raw).is_err() {
                    warn!("Console trigger is gone, ignoring {:?}", event);
                }
            }
            ConsoleLine::Command(raw) => {
                if let Some(outcome) = self.router.handle_raw(&raw) {
                    debug!("Command result: {:?}", outcome);
                }
            }
            ConsoleLine::Blank => {}
        }
    }

    /// Feed lines until the input closes or shutdown. Dropping the harness
    /// afterwards closes the virtual trigger.
    pub async fn run(self, mut lines: mpsc::UnboundedReceiver<String>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                line = lines.recv() => match line {
                    Some(line) => self.handle_line(&line),
                    None => {
                        info!("Console input closed");
                        break;
                    }
                },
            }
        }
    }
}

/// Read stdin lines on a plain thread. A blocking stdin read cannot be
/// cancelled, so the thread is left detached and dies with the process.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Console read failed: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

/// Synthetic camera: a gradient with a bar that moves on every read
pub struct TestPatternCamera {
    width: u32,
    height: u32,
    reads: AtomicU64,
}

impl TestPatternCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            reads: AtomicU64::new(0),
        }
    }
}

impl FrameSource for TestPatternCamera {
    fn read(&self) -> Option<RgbImage> {
        let tick = self.reads.fetch_add(1, Ordering::Relaxed);
        let (width, height) = (self.width.max(1), self.height.max(1));
        let bar = (tick * 16 % u64::from(width)) as u32;

        Some(RgbImage::from_fn(width, height, |x, y| {
            if x.abs_diff(bar) < 4 {
                Rgb([255, 255, 255])
            } else {
                Rgb([
                    (x * 255 / width) as u8,
                    (y * 255 / height) as u8,
                    (tick % 256) as u8,
                ])
            }
        }))
    }
}
