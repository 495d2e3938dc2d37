/// Leading + trailing edge rate limiter with injected time
use std::time::{Duration, Instant};

/// Fires at most once per `window`.
///
/// The first call after a quiet period fires immediately (leading edge). Calls
/// that land inside the window are coalesced into one trailing firing, which
/// [`Throttle::poll`] reports once the window has elapsed.
#[derive(Debug, Clone)]
pub struct Throttle {
    window: Duration,
    last_fired: Option<Instant>,
    trailing_pending: bool,
}

impl Throttle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_fired: None,
            trailing_pending: false,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Register a call; true when it should run now
    pub fn call(&mut self, now: Instant) -> bool {
        match self.last_fired {
            Some(t) if now.duration_since(t) < self.window => {
                self.trailing_pending = true;
                false
            }
            _ => {
                self.last_fired = Some(now);
                self.trailing_pending = false;
                true
            }
        }
    }

    /// True when a coalesced trailing call is due
    pub fn poll(&mut self, now: Instant) -> bool {
        if !self.trailing_pending {
            return false;
        }
        match self.last_fired {
            Some(t) if now.duration_since(t) < self.window => false,
            _ => {
                self.trailing_pending = false;
                self.last_fired = Some(now);
                true
            }
        }
    }

    /// When the pending trailing call becomes due, if any
    pub fn deadline(&self) -> Option<Instant> {
        if !self.trailing_pending {
            return None;
        }
        self.last_fired.map(|t| t + self.window)
    }

    pub fn reset(&mut self) {
        self.last_fired = None;
        self.trailing_pending = false;
    }
}
