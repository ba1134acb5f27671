//! Session lifecycle and firing eligibility
//!
//! [`SessionController`] owns the single [`SessionState`] behind one mutex.
//! Every operation takes the lock for its whole duration and releases it
//! before any notification goes out, so a slow or disconnected sink never
//! stalls the trigger or the shot processor.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use marksconf::RangeConfig;
use tracing::{debug, info, warn};

use crate::achievement::{Achievement, AchievementRules};
use crate::clock::{Clock, SystemClock};
use crate::events::{EventSink, SessionEvent};

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    TimeExpired,
    OutOfAmmunition,
    /// Ended from outside, e.g. an operator command
    Requested(String),
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::TimeExpired => f.write_str("time expired"),
            EndReason::OutOfAmmunition => f.write_str("out of ammunition"),
            EndReason::Requested(reason) => f.write_str(reason),
        }
    }
}

/// Why [`SessionController::check_fire`] refused a shot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireRefusal {
    NoSession,
    Expired,
    OutOfAmmo,
}

impl fmt::Display for FireRefusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FireRefusal::NoSession => f.write_str("no active session"),
            FireRefusal::Expired => f.write_str("session time is up"),
            FireRefusal::OutOfAmmo => f.write_str("out of ammunition"),
        }
    }
}

/// Fixed parameters every session starts from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub total_ammo: u32,
    pub duration: Duration,
    pub rules: AchievementRules,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&RangeConfig::default())
    }
}

impl From<&RangeConfig> for SessionSettings {
    fn from(config: &RangeConfig) -> Self {
        Self {
            total_ammo: config.session.total_ammo,
            duration: config.session.duration(),
            rules: AchievementRules::from(&config.achievement),
        }
    }
}

/// The one session entity.
///
/// `ends_at` is `None` whenever `active` is false.
#[derive(Debug, Default)]
pub struct SessionState {
    pub active: bool,
    pub bullets_remaining: u32,
    pub ends_at: Option<Instant>,
    pub hit_targets: HashSet<String>,
}

/// Atomic read of the fields monitors care about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub active: bool,
    pub ends_at: Option<Instant>,
    pub bullets_remaining: u32,
}

impl SessionSnapshot {
    fn of(state: &SessionState) -> Self {
        Self {
            active: state.active,
            ends_at: state.ends_at,
            bullets_remaining: state.bullets_remaining,
        }
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.active && self.ends_at.is_some_and(|end| now > end)
    }

    pub fn is_out_of_ammo(&self) -> bool {
        self.active && self.bullets_remaining == 0
    }
}

/// Outcome reported when a session ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub reason: EndReason,
    pub total_shots: u32,
    pub hit_count: usize,
    pub achievement: Achievement,
}

impl From<&SessionSummary> for SessionEvent {
    fn from(summary: &SessionSummary) -> Self {
        SessionEvent::SessionEnded {
            reason: summary.reason.to_string(),
            total_shots: summary.total_shots,
            hit_count: summary.hit_count,
            achievement: summary.achievement,
        }
    }
}

pub struct SessionController {
    settings: SessionSettings,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
    state: Mutex<SessionState>,
}

impl SessionController {
    pub fn new(settings: SessionSettings, sink: Arc<dyn EventSink>) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock), sink)
    }

    pub fn with_clock(
        settings: SessionSettings,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            settings,
            clock,
            sink,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // Every mutation is a single in-memory step, so a poisoned lock still
    // holds consistent data.
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Begin a fresh session, overwriting any session already running.
    pub fn start(&self) {
        let ammo = self.settings.total_ammo;
        {
            let mut state = self.state();
            if state.active {
                warn!("Start requested while a session is active, overwriting it");
            }
            state.active = true;
            state.bullets_remaining = ammo;
            state.ends_at = Some(self.clock.now() + self.settings.duration);
            state.hit_targets.clear();
        }

        info!(
            "Session started: {} rounds, {}s on the clock",
            ammo,
            self.settings.duration.as_secs()
        );
        self.sink.notify(SessionEvent::UpdateAmmo { ammo });
    }

    /// Force the session back to the empty state. Returns whether anything
    /// was reset.
    pub fn reset(&self) -> bool {
        {
            let mut state = self.state();
            if !state.active {
                return false;
            }
            state.active = false;
            state.bullets_remaining = 0;
            state.ends_at = None;
            state.hit_targets.clear();
        }

        info!("Session reset");
        self.sink.notify(SessionEvent::UpdateAmmo { ammo: 0 });
        true
    }

    /// Check every firing condition without mutating anything.
    pub fn check_fire(&self) -> Result<(), FireRefusal> {
        let now = self.clock.now();
        let state = self.state();
        if !state.active {
            return Err(FireRefusal::NoSession);
        }
        if state.ends_at.is_some_and(|end| now > end) {
            return Err(FireRefusal::Expired);
        }
        if state.bullets_remaining == 0 {
            return Err(FireRefusal::OutOfAmmo);
        }
        Ok(())
    }

    pub fn can_fire(&self) -> bool {
        self.check_fire().is_ok()
    }

    /// Spend one round. Returns the rounds left, or `None` when there was
    /// nothing to spend.
    ///
    /// Reaching zero does not end the session; the shot processor does that
    /// once the last round's frame has been analyzed.
    pub fn decrement_bullet(&self) -> Option<u32> {
        let remaining = {
            let mut state = self.state();
            if state.bullets_remaining == 0 {
                return None;
            }
            state.bullets_remaining -= 1;
            state.bullets_remaining
        };

        debug!("Round fired, {} left", remaining);
        if remaining == 0 {
            info!("Last round fired");
        }
        self.sink.notify(SessionEvent::UpdateAmmo { ammo: remaining });
        Some(remaining)
    }

    /// Record a struck target. Repeat hits on the same target are ignored.
    pub fn register_hit(&self, target: &str) -> bool {
        {
            let mut state = self.state();
            if !state.active || state.hit_targets.contains(target) {
                return false;
            }
            state.hit_targets.insert(target.to_string());
        }

        info!("Target hit: {}", target);
        self.sink.notify(SessionEvent::TargetHitUpdate {
            target_name: target.to_string(),
        });
        true
    }

    /// End the active session and report its outcome.
    ///
    /// Returns `None` (and notifies nobody) when no session is running.
    pub fn end_session(&self, reason: EndReason) -> Option<SessionSummary> {
        self.end_if(reason, |_| true)
    }

    /// End the session only if `condition` holds for it. The condition is
    /// checked under the same lock that ends the session, so a session
    /// restarted in between is left alone.
    pub fn end_if(
        &self,
        reason: EndReason,
        condition: impl FnOnce(&SessionSnapshot) -> bool,
    ) -> Option<SessionSummary> {
        let summary = {
            let mut state = self.state();
            if !state.active || !condition(&SessionSnapshot::of(&state)) {
                return None;
            }
            let achievement = self.settings.rules.classify(&state.hit_targets);
            state.active = false;
            state.ends_at = None;
            SessionSummary {
                reason,
                total_shots: self
                    .settings
                    .total_ammo
                    .saturating_sub(state.bullets_remaining),
                hit_count: state.hit_targets.len(),
                achievement,
            }
        };

        info!(
            "Session ended ({}): {} shots, {} targets, {}",
            summary.reason, summary.total_shots, summary.hit_count, summary.achievement
        );
        self.sink.notify(SessionEvent::from(&summary));
        Some(summary)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::of(&self.state())
    }

    /// Targets hit so far, sorted
    pub fn hit_targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = self.state().hit_targets.iter().cloned().collect();
        targets.sort();
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[derive(Default)]
    struct MockSink {
        events: Mutex<Vec<SessionEvent>>,
    }

    impl MockSink {
        fn events(&self) -> Vec<SessionEvent> {
            self.events.lock().unwrap().clone()
        }

        fn count(&self, name: &str) -> usize {
            self.events().iter().filter(|e| e.name() == name).count()
        }
    }

    impl EventSink for MockSink {
        fn notify(&self, event: SessionEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn settings(total_ammo: u32, secs: u64) -> SessionSettings {
        SessionSettings {
            total_ammo,
            duration: Duration::from_secs(secs),
            rules: AchievementRules {
                high_value_marker: "HIGH".to_string(),
                ..AchievementRules::default()
            },
        }
    }

    fn controller(total_ammo: u32) -> (SessionController, Arc<ManualClock>, Arc<MockSink>) {
        let clock = Arc::new(ManualClock::new());
        let sink = Arc::new(MockSink::default());
        let controller =
            SessionController::with_clock(settings(total_ammo, 87), clock.clone(), sink.clone());
        (controller, clock, sink)
    }

    #[test]
    fn test_new_controller_is_idle() {
        let (controller, _, sink) = controller(16);
        let snap = controller.snapshot();
        assert!(!snap.active);
        assert_eq!(snap.ends_at, None);
        assert_eq!(snap.bullets_remaining, 0);
        assert_eq!(controller.check_fire(), Err(FireRefusal::NoSession));
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_start_loads_ammo_and_deadline() {
        let (controller, clock, sink) = controller(16);
        controller.start();

        let snap = controller.snapshot();
        assert!(snap.active);
        assert_eq!(snap.bullets_remaining, 16);
        assert_eq!(snap.ends_at, Some(clock.now() + Duration::from_secs(87)));
        assert!(controller.can_fire());
        assert_eq!(sink.events(), vec![SessionEvent::UpdateAmmo { ammo: 16 }]);
    }

    #[test]
    fn test_start_overwrites_active_session() {
        let (controller, _, _) = controller(5);
        controller.start();
        controller.decrement_bullet();
        controller.register_hit("t1");

        controller.start();
        assert_eq!(controller.snapshot().bullets_remaining, 5);
        assert!(controller.hit_targets().is_empty());
    }

    #[test]
    fn test_reset_active_session() {
        let (controller, _, sink) = controller(5);
        controller.start();
        controller.register_hit("t1");

        assert!(controller.reset());
        let snap = controller.snapshot();
        assert!(!snap.active);
        assert_eq!(snap.ends_at, None);
        assert_eq!(snap.bullets_remaining, 0);
        assert!(controller.hit_targets().is_empty());
        assert_eq!(sink.events().last(), Some(&SessionEvent::UpdateAmmo { ammo: 0 }));
    }

    #[test]
    fn test_reset_idle_is_silent() {
        let (controller, _, sink) = controller(5);
        assert!(!controller.reset());
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_decrement_stops_at_zero() {
        let (controller, _, sink) = controller(2);
        controller.start();

        assert_eq!(controller.decrement_bullet(), Some(1));
        assert_eq!(controller.decrement_bullet(), Some(0));
        assert!(!controller.can_fire());
        assert_eq!(controller.check_fire(), Err(FireRefusal::OutOfAmmo));

        assert_eq!(controller.decrement_bullet(), None);
        assert_eq!(controller.snapshot().bullets_remaining, 0);
        // start + two decrements
        assert_eq!(sink.count("update_ammo"), 3);
    }

    #[test]
    fn test_decrement_does_not_end_session() {
        let (controller, _, sink) = controller(1);
        controller.start();
        controller.decrement_bullet();
        assert!(controller.snapshot().active);
        assert_eq!(sink.count("session_ended"), 0);
    }

    #[test]
    fn test_register_hit_is_idempotent() {
        let (controller, _, sink) = controller(5);
        controller.start();

        assert!(controller.register_hit("t1"));
        assert!(!controller.register_hit("t1"));
        assert_eq!(controller.hit_targets(), vec!["t1".to_string()]);
        assert_eq!(sink.count("target_hit_update"), 1);
    }

    #[test]
    fn test_register_hit_ignored_when_idle() {
        let (controller, _, sink) = controller(5);
        assert!(!controller.register_hit("t1"));
        assert!(controller.hit_targets().is_empty());
        assert_eq!(sink.count("target_hit_update"), 0);
    }

    #[test]
    fn test_end_session_once() {
        let (controller, _, sink) = controller(16);
        controller.start();
        for _ in 0..3 {
            controller.decrement_bullet();
        }
        for target in ["a", "b", "c", "HIGH"] {
            controller.register_hit(target);
        }

        let summary = controller
            .end_session(EndReason::Requested("stopped by operator".to_string()))
            .unwrap();
        assert_eq!(summary.total_shots, 3);
        assert_eq!(summary.hit_count, 4);
        assert_eq!(summary.achievement, Achievement::Good);

        assert_eq!(controller.end_session(EndReason::TimeExpired), None);
        assert_eq!(sink.count("session_ended"), 1);

        let snap = controller.snapshot();
        assert!(!snap.active);
        assert_eq!(snap.ends_at, None);
    }

    #[test]
    fn test_end_session_event_payload() {
        let (controller, _, sink) = controller(16);
        controller.start();
        controller.end_session(EndReason::TimeExpired);

        let ended = sink
            .events()
            .into_iter()
            .find(|e| e.name() == "session_ended")
            .unwrap();
        assert_eq!(
            ended,
            SessionEvent::SessionEnded {
                reason: "time expired".to_string(),
                total_shots: 0,
                hit_count: 0,
                achievement: Achievement::NotAchieved,
            }
        );
    }

    #[test]
    fn test_end_if_leaves_restarted_session_running() {
        let (controller, clock, sink) = controller(2);
        controller.start();
        controller.decrement_bullet();
        controller.decrement_bullet();
        clock.advance(Duration::from_secs(90));
        let stale_now = clock.now();

        controller.start();
        assert_eq!(
            controller.end_if(EndReason::OutOfAmmunition, |s| s.is_out_of_ammo()),
            None
        );
        assert_eq!(
            controller.end_if(EndReason::TimeExpired, |s| s.is_expired_at(stale_now)),
            None
        );
        assert!(controller.snapshot().active);
        assert_eq!(sink.count("session_ended"), 0);

        controller.decrement_bullet();
        controller.decrement_bullet();
        let summary = controller
            .end_if(EndReason::OutOfAmmunition, |s| s.is_out_of_ammo())
            .unwrap();
        assert_eq!(summary.total_shots, 2);
        assert_eq!(sink.count("session_ended"), 1);
    }

    #[test]
    fn test_expiry_blocks_fire() {
        let (controller, clock, _) = controller(16);
        controller.start();

        clock.advance(Duration::from_secs(87));
        assert!(controller.can_fire(), "deadline itself is still inside the session");

        clock.advance(Duration::from_millis(1));
        assert_eq!(controller.check_fire(), Err(FireRefusal::Expired));
        assert!(controller.snapshot().is_expired_at(clock.now()));
    }

    #[test]
    fn test_inactive_never_has_deadline() {
        let (controller, _, _) = controller(3);
        controller.start();
        controller.end_session(EndReason::OutOfAmmunition);
        assert_eq!(controller.snapshot().ends_at, None);

        controller.start();
        controller.reset();
        assert_eq!(controller.snapshot().ends_at, None);
    }

    #[test]
    fn test_concurrent_decrements_never_go_negative() {
        let (controller, _, _) = controller(50);
        let controller = Arc::new(controller);
        controller.start();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let controller = Arc::clone(&controller);
                std::thread::spawn(move || {
                    let mut spent = 0;
                    for _ in 0..20 {
                        if controller.decrement_bullet().is_some() {
                            spent += 1;
                        }
                    }
                    spent
                })
            })
            .collect();

        let spent: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(spent, 50);
        assert_eq!(controller.snapshot().bullets_remaining, 0);
    }

    #[test]
    fn test_end_reason_strings() {
        assert_eq!(EndReason::TimeExpired.to_string(), "time expired");
        assert_eq!(EndReason::OutOfAmmunition.to_string(), "out of ammunition");
        assert_eq!(EndReason::Requested("abort".into()).to_string(), "abort");
    }
}
