//! Restart debouncing
//!
//! Restart requests inside the quiet period collapse into one: each request
//! pushes the deadline out again, and only the last deadline fires.

use std::future;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct RestartDebounce {
    delay: Duration,
    deadline: Option<Instant>,
    pending: u32,
}

impl RestartDebounce {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
            pending: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Cancel any scheduled restart and schedule a new one from `now`.
    pub fn request(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
        self.pending += 1;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
        self.pending = 0;
    }

    /// Claim the restart if its deadline has passed. Returns how many
    /// requests were collapsed into it.
    pub fn take_due(&mut self, now: Instant) -> Option<u32> {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                let collapsed = self.pending;
                self.cancel();
                Some(collapsed)
            }
            _ => None,
        }
    }
}

/// Sleep until `deadline`, or forever when there is none.
pub async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => future::pending::<()>().await,
    }
}
