//! Debounced presence signal with asymmetric hysteresis.
//!
//! Presence is trusted only after `threshold` consecutive positive
//! observations; absence is trusted on the first negative one. A transient
//! false positive therefore cannot start a countdown, while a subject who
//! steps away cancels it immediately.

use tokio::time::Instant;

/// Current debounced value and when it last flipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceSignal {
    pub present: bool,
    pub changed_at: Option<Instant>,
}

/// Emitted whenever the debounced value flips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceChange {
    pub present: bool,
    pub at: Instant,
}

pub struct PresenceTracker {
    threshold: u32,
    streak: u32,
    signal: PresenceSignal,
}

impl PresenceTracker {
    /// A threshold of 0 is treated as 1.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            streak: 0,
            signal: PresenceSignal {
                present: false,
                changed_at: None,
            },
        }
    }

    /// Feed one per-frame observation.
    pub fn observe(&mut self, face_found: bool) -> Option<PresenceChange> {
        if face_found {
            self.streak = self.streak.saturating_add(1);
            if !self.signal.present && self.streak >= self.threshold {
                return Some(self.flip(true));
            }
            None
        } else {
            self.streak = 0;
            if self.signal.present {
                return Some(self.flip(false));
            }
            None
        }
    }

    /// Clear the streak and force absence. Emits only if presence was true.
    pub fn reset(&mut self) -> Option<PresenceChange> {
        self.streak = 0;
        if self.signal.present {
            Some(self.flip(false))
        } else {
            None
        }
    }

    pub fn is_present(&self) -> bool {
        self.signal.present
    }

    /// Consecutive positive observations seen so far.
    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn signal(&self) -> PresenceSignal {
        self.signal
    }

    fn flip(&mut self, present: bool) -> PresenceChange {
        let at = Instant::now();
        self.signal = PresenceSignal {
            present,
            changed_at: Some(at),
        };
        tracing::debug!(present, streak = self.streak, "presence changed");
        PresenceChange { present, at }
    }
}
