//! Transient status messages.
//!
//! A notice is fully opaque for the visible window, fades linearly over the
//! fade window, then disappears. A new notice replaces the current one and
//! restarts the timing; there is no queue.
//!
//! Hosts that drive the fade with their own timers get a generation number
//! from [`StatusNotifier::notify`] and pass it back to
//! [`StatusNotifier::expire`]; a timer armed for a superseded notice is
//! ignored.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::debug;

use crate::NotifierConfig;

/// Source of monotonic time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for deterministic timing.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Display phase of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum NoticePhase {
    Visible,
    FadingOut,
}

/// What the status banner should show right now.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Notice {
    pub message: String,
    pub phase: NoticePhase,
    /// 1.0 while visible, falling linearly to 0.0 during the fade
    pub opacity: f64,
    pub generation: u64,
}

#[derive(Debug, Clone)]
struct ActiveNotice {
    message: String,
    shown_at: Instant,
    generation: u64,
}

/// Single-slot status banner.
pub struct StatusNotifier {
    visible: Duration,
    fade: Duration,
    active: Option<ActiveNotice>,
    generation: u64,
}

impl StatusNotifier {
    pub fn new(config: &NotifierConfig) -> Self {
        Self {
            visible: Duration::from_millis(config.visible_ms),
            fade: Duration::from_millis(config.fade_ms),
            active: None,
            generation: 0,
        }
    }

    /// Show a message now, replacing whatever is displayed.
    pub fn notify(&mut self, message: &str, now: Instant) -> u64 {
        self.generation += 1;
        debug!("[Notifier] #{} {}", self.generation, message);
        self.active = Some(ActiveNotice {
            message: message.to_string(),
            shown_at: now,
            generation: self.generation,
        });
        self.generation
    }

    /// Dismiss the notice with this generation, if it is still current.
    /// Returns false for a superseded generation.
    pub fn expire(&mut self, generation: u64) -> bool {
        match &self.active {
            Some(active) if active.generation == generation => {
                self.active = None;
                true
            }
            _ => false,
        }
    }

    /// The notice to render at `now`, or `None` once it has faded out.
    pub fn current(&self, now: Instant) -> Option<Notice> {
        let active = self.active.as_ref()?;
        let elapsed = now.saturating_duration_since(active.shown_at);

        if elapsed < self.visible {
            return Some(Notice {
                message: active.message.clone(),
                phase: NoticePhase::Visible,
                opacity: 1.0,
                generation: active.generation,
            });
        }

        let fading = elapsed - self.visible;
        if fading < self.fade {
            let opacity = 1.0 - fading.as_secs_f64() / self.fade.as_secs_f64();
            return Some(Notice {
                message: active.message.clone(),
                phase: NoticePhase::FadingOut,
                opacity,
                generation: active.generation,
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notifier() -> StatusNotifier {
        StatusNotifier::new(&NotifierConfig::default())
    }

    #[test]
    fn test_visible_then_fades_then_gone() {
        let mut n = notifier();
        let t0 = Instant::now();
        n.notify("Pin added", t0);

        let shown = n.current(t0 + Duration::from_millis(1999)).unwrap();
        assert_eq!(shown.phase, NoticePhase::Visible);
        assert_eq!(shown.opacity, 1.0);

        let fading = n.current(t0 + Duration::from_millis(2150)).unwrap();
        assert_eq!(fading.phase, NoticePhase::FadingOut);
        assert!((fading.opacity - 0.5).abs() < 1e-9);

        assert!(n.current(t0 + Duration::from_millis(2300)).is_none());
    }

    #[test]
    fn test_new_notice_replaces_and_restarts() {
        let mut n = notifier();
        let t0 = Instant::now();
        let first = n.notify("Pin added", t0);
        let second = n.notify("Pin confirmed", t0 + Duration::from_millis(1500));

        // Past the first notice's window, still inside the second's
        let shown = n.current(t0 + Duration::from_millis(2500)).unwrap();
        assert_eq!(shown.message, "Pin confirmed");
        assert_eq!(shown.phase, NoticePhase::Visible);

        // The first notice's timer no longer applies
        assert!(!n.expire(first));
        assert!(n.current(t0 + Duration::from_millis(2500)).is_some());
        assert!(n.expire(second));
        assert!(n.current(t0 + Duration::from_millis(2500)).is_none());
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new();
        let start = clock.now();
        clock.advance(Duration::from_millis(300));
        assert_eq!(clock.now() - start, Duration::from_millis(300));
    }
}
