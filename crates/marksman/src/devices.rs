//! Hardware capabilities the range core consumes
//!
//! Camera, trigger and audio drivers live outside this crate. The core only
//! sees these traits, so every worker can run against fakes.
//!
//! The trigger side is split in two: a [`TriggerConnector`] finds and opens
//! raw input devices, and [`ReconnectingTrigger`] turns their key events into
//! press/release for the bound key while handling discovery and loss with
//! fixed backoff.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbImage;
use tracing::{debug, info, warn};

/// Latest-frame camera. `read` must hand out an owned copy so later captures
/// never mutate a frame already in the pipeline.
pub trait FrameSource: Send + Sync {
    fn read(&self) -> Option<RgbImage>;

    fn is_running(&self) -> bool {
        true
    }
}

/// Sound effects played on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    Shot,
}

pub trait AudioCue: Send + Sync {
    fn play(&self, cue: Cue);
}

/// Audio player for devices without a speaker
pub struct SilentCue;

impl AudioCue for SilentCue {
    fn play(&self, cue: Cue) {
        debug!("Cue {:?} (silent)", cue);
    }
}

/// Logical trigger transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    Press,
    Release,
}

#[async_trait]
pub trait TriggerSource: Send {
    /// Next press or release. `None` means the source is gone for good.
    async fn next_event(&mut self) -> Option<TriggerEvent>;
}

/// Key event as reported by an input device (`value`: 1 down, 0 up, 2 repeat)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawKeyEvent {
    pub code: u16,
    pub value: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("Unknown trigger key name: {0}")]
    UnknownKey(String),

    #[error("Trigger device lost: {0}")]
    DeviceLost(String),

    #[error("Trigger input closed")]
    Closed,
}

const KEY_CODES: &[(&str, u16)] = &[
    ("KEY_ENTER", 28),
    ("KEY_SPACE", 57),
    ("KEY_UP", 103),
    ("KEY_PAGEUP", 104),
    ("KEY_LEFT", 105),
    ("KEY_RIGHT", 106),
    ("KEY_DOWN", 108),
    ("KEY_PAGEDOWN", 109),
    ("KEY_VOLUMEDOWN", 114),
    ("KEY_VOLUMEUP", 115),
    ("KEY_NEXTSONG", 163),
    ("KEY_PLAYPAUSE", 164),
    ("KEY_PREVIOUSSONG", 165),
    ("KEY_CAMERA", 212),
    ("BTN_0", 256),
    ("BTN_LEFT", 272),
    ("BTN_RIGHT", 273),
    ("KEY_CAMERA_FOCUS", 528),
];

/// Linux input code for a key name such as `KEY_VOLUMEDOWN`
pub fn key_code(name: &str) -> Option<u16> {
    KEY_CODES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(name.trim()))
        .map(|(_, code)| *code)
}

/// The one key that acts as the trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerBinding {
    pub code: u16,
}

impl TriggerBinding {
    /// Fails for key names we cannot map; callers treat that as fatal.
    pub fn resolve(key_name: &str) -> Result<Self, TriggerError> {
        key_code(key_name)
            .map(|code| Self { code })
            .ok_or_else(|| TriggerError::UnknownKey(key_name.to_string()))
    }

    pub fn translate(&self, raw: RawKeyEvent) -> Option<TriggerEvent> {
        if raw.code != self.code {
            return None;
        }
        match raw.value {
            1 => Some(TriggerEvent::Press),
            0 => Some(TriggerEvent::Release),
            _ => None,
        }
    }
}

/// Case-insensitive substring match used for device discovery
pub fn device_name_matches(name: &str, pattern: &str) -> bool {
    name.to_lowercase().contains(&pattern.to_lowercase())
}

/// An opened input device
#[async_trait]
pub trait TriggerDevice: Send {
    fn name(&self) -> &str;

    async fn read_event(&mut self) -> Result<RawKeyEvent, TriggerError>;
}

/// Finds input devices by name
#[async_trait]
pub trait TriggerConnector: Send {
    type Device: TriggerDevice;

    /// `Ok(None)` when no matching device is present right now,
    /// `Err(TriggerError::Closed)` once no device will ever appear again.
    async fn discover(&mut self, pattern: &str) -> Result<Option<Self::Device>, TriggerError>;
}

/// Shared "device is connected" flag for health reporting
#[derive(Debug, Clone, Default)]
pub struct ConnectionFlag(Arc<AtomicBool>);

impl ConnectionFlag {
    pub fn set(&self, connected: bool) {
        self.0.store(connected, Ordering::Release);
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Backoff settings for [`ReconnectingTrigger`]
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    /// Wait between discovery attempts while nothing is found
    pub rediscover: Duration,
    /// Wait after an opened device fails
    pub reconnect: Duration,
}

impl From<&marksconf::TriggerConfig> for ReconnectPolicy {
    fn from(config: &marksconf::TriggerConfig) -> Self {
        Self {
            rediscover: config.rediscover_backoff(),
            reconnect: config.reconnect_backoff(),
        }
    }
}

/// Trigger source that rediscovers its device whenever it goes away.
///
/// Losing the device while the key is down yields a synthetic `Release` so
/// a burst never outlives its trigger.
pub struct ReconnectingTrigger<C: TriggerConnector> {
    connector: C,
    pattern: String,
    binding: TriggerBinding,
    policy: ReconnectPolicy,
    device: Option<C::Device>,
    pressed: bool,
    reconnect_pending: bool,
    connected: ConnectionFlag,
}

impl<C: TriggerConnector> ReconnectingTrigger<C> {
    pub fn new(
        connector: C,
        pattern: impl Into<String>,
        binding: TriggerBinding,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            connector,
            pattern: pattern.into(),
            binding,
            policy,
            device: None,
            pressed: false,
            reconnect_pending: false,
            connected: ConnectionFlag::default(),
        }
    }

    pub fn connection_flag(&self) -> ConnectionFlag {
        self.connected.clone()
    }

    fn drop_device(&mut self) -> Option<TriggerEvent> {
        self.device = None;
        self.reconnect_pending = true;
        self.connected.set(false);
        if std::mem::take(&mut self.pressed) {
            Some(TriggerEvent::Release)
        } else {
            None
        }
    }
}

#[async_trait]
impl<C> TriggerSource for ReconnectingTrigger<C>
where
    C: TriggerConnector,
    C::Device: Send,
{
    async fn next_event(&mut self) -> Option<TriggerEvent> {
        loop {
            if self.device.is_none() {
                if std::mem::take(&mut self.reconnect_pending) {
                    tokio::time::sleep(self.policy.reconnect).await;
                }
                match self.connector.discover(&self.pattern).await {
                    Ok(Some(device)) => {
                        info!("Trigger connected: {}", device.name());
                        self.device = Some(device);
                        self.connected.set(true);
                    }
                    Ok(None) => {
                        debug!("No trigger matching '{}', retrying", self.pattern);
                        tokio::time::sleep(self.policy.rediscover).await;
                    }
                    Err(TriggerError::Closed) => return None,
                    Err(e) => {
                        warn!("Trigger discovery failed: {}", e);
                        tokio::time::sleep(self.policy.rediscover).await;
                    }
                }
                continue;
            }

            let Some(device) = self.device.as_mut() else {
                continue;
            };

            match device.read_event().await {
                Ok(raw) => {
                    if let Some(event) = self.binding.translate(raw) {
                        self.pressed = event == TriggerEvent::Press;
                        return Some(event);
                    }
                }
                Err(e @ TriggerError::Closed) => {
                    info!("Trigger device closed: {}, searching again", e);
                    if let Some(release) = self.drop_device() {
                        return Some(release);
                    }
                }
                Err(e) => {
                    warn!("Trigger lost: {}, searching again", e);
                    if let Some(release) = self.drop_device() {
                        return Some(release);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    const VOLUME_DOWN: u16 = 114;

    struct FakeDevice {
        events: VecDeque<Result<RawKeyEvent, TriggerError>>,
    }

    #[async_trait]
    impl TriggerDevice for FakeDevice {
        fn name(&self) -> &str {
            "AB Shutter3"
        }

        async fn read_event(&mut self) -> Result<RawKeyEvent, TriggerError> {
            self.events.pop_front().unwrap_or(Err(TriggerError::Closed))
        }
    }

    struct FakeConnector {
        attempts: VecDeque<Option<FakeDevice>>,
        discoveries: usize,
    }

    #[async_trait]
    impl TriggerConnector for FakeConnector {
        type Device = FakeDevice;

        async fn discover(&mut self, _pattern: &str) -> Result<Option<FakeDevice>, TriggerError> {
            self.discoveries += 1;
            match self.attempts.pop_front() {
                Some(attempt) => Ok(attempt),
                None => Err(TriggerError::Closed),
            }
        }
    }

    fn key(value: i32) -> Result<RawKeyEvent, TriggerError> {
        Ok(RawKeyEvent {
            code: VOLUME_DOWN,
            value,
        })
    }

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            rediscover: Duration::from_secs(5),
            reconnect: Duration::from_secs(2),
        }
    }

    fn binding() -> TriggerBinding {
        TriggerBinding::resolve("KEY_VOLUMEDOWN").unwrap()
    }

    #[test]
    fn test_key_code_lookup() {
        assert_eq!(key_code("KEY_VOLUMEDOWN"), Some(114));
        assert_eq!(key_code("key_enter"), Some(28));
        assert_eq!(key_code("KEY_NOPE"), None);
        assert!(matches!(
            TriggerBinding::resolve("KEY_NOPE"),
            Err(TriggerError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_translate_filters_other_keys_and_repeat() {
        let binding = binding();
        assert_eq!(
            binding.translate(RawKeyEvent { code: 114, value: 1 }),
            Some(TriggerEvent::Press)
        );
        assert_eq!(
            binding.translate(RawKeyEvent { code: 114, value: 0 }),
            Some(TriggerEvent::Release)
        );
        assert_eq!(binding.translate(RawKeyEvent { code: 114, value: 2 }), None);
        assert_eq!(binding.translate(RawKeyEvent { code: 115, value: 1 }), None);
    }

    #[test]
    fn test_device_name_matching() {
        assert!(device_name_matches("AB Shutter3 Keyboard", "ab shutter"));
        assert!(!device_name_matches("USB Mouse", "AB Shutter"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rediscovers_until_found() {
        let connector = FakeConnector {
            attempts: VecDeque::from([
                None,
                None,
                Some(FakeDevice {
                    events: VecDeque::from([key(1), key(2), key(0)]),
                }),
            ]),
            discoveries: 0,
        };
        let mut trigger = ReconnectingTrigger::new(connector, "AB Shutter", binding(), policy());
        let flag = trigger.connection_flag();
        assert!(!flag.get());

        let started = tokio::time::Instant::now();
        assert_eq!(trigger.next_event().await, Some(TriggerEvent::Press));
        assert!(flag.get());
        assert_eq!(started.elapsed(), Duration::from_secs(10));

        assert_eq!(trigger.next_event().await, Some(TriggerEvent::Release));
        assert_eq!(trigger.connector.discoveries, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loss_while_pressed_releases_then_reconnects() {
        let connector = FakeConnector {
            attempts: VecDeque::from([
                Some(FakeDevice {
                    events: VecDeque::from([
                        key(1),
                        Err(TriggerError::DeviceLost("read error".to_string())),
                    ]),
                }),
                Some(FakeDevice {
                    events: VecDeque::from([key(1)]),
                }),
            ]),
            discoveries: 0,
        };
        let mut trigger = ReconnectingTrigger::new(connector, "AB Shutter", binding(), policy());
        let flag = trigger.connection_flag();

        assert_eq!(trigger.next_event().await, Some(TriggerEvent::Press));
        assert_eq!(trigger.next_event().await, Some(TriggerEvent::Release));
        assert!(!flag.get());

        let lost_at = tokio::time::Instant::now();
        assert_eq!(trigger.next_event().await, Some(TriggerEvent::Press));
        assert!(flag.get());
        assert_eq!(lost_at.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_device_close_rediscovers() {
        let connector = FakeConnector {
            attempts: VecDeque::from([
                Some(FakeDevice {
                    events: VecDeque::new(),
                }),
                Some(FakeDevice {
                    events: VecDeque::from([key(1)]),
                }),
            ]),
            discoveries: 0,
        };
        let mut trigger = ReconnectingTrigger::new(connector, "AB Shutter", binding(), policy());

        let started = tokio::time::Instant::now();
        assert_eq!(trigger.next_event().await, Some(TriggerEvent::Press));
        assert_eq!(started.elapsed(), Duration::from_secs(2));
        assert_eq!(trigger.connector.discoveries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_while_pressed_releases_first() {
        let connector = FakeConnector {
            attempts: VecDeque::from([Some(FakeDevice {
                events: VecDeque::from([key(1)]),
            })]),
            discoveries: 0,
        };
        let mut trigger = ReconnectingTrigger::new(connector, "AB Shutter", binding(), policy());

        assert_eq!(trigger.next_event().await, Some(TriggerEvent::Press));
        assert_eq!(trigger.next_event().await, Some(TriggerEvent::Release));
        // device gone and connector exhausted
        assert_eq!(trigger.next_event().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_connector_ends_source() {
        let connector = FakeConnector {
            attempts: VecDeque::new(),
            discoveries: 0,
        };
        let mut trigger = ReconnectingTrigger::new(connector, "AB Shutter", binding(), policy());
        assert_eq!(trigger.next_event().await, None);
    }
}
