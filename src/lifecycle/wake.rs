//! CPU-wake lease
//!
//! One lease per run. `acquire` never stacks: an unexpired lease is left
//! as is and an expired one is renewed. `touch` renews an expired lease
//! when work shows up. `release` is a no-op when nothing is held.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
pub struct WakeLease {
    duration: Duration,
    state: Mutex<LeaseState>,
}

#[derive(Debug, Default)]
struct LeaseState {
    acquired: bool,
    expires_at: Option<Instant>,
}

impl WakeLease {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            state: Mutex::new(LeaseState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LeaseState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns true if the lease was taken or renewed by this call.
    pub fn acquire(&self) -> bool {
        let now = Instant::now();
        let mut state = self.lock();
        if state.acquired && state.expires_at.is_some_and(|at| now < at) {
            return false;
        }
        state.acquired = true;
        state.expires_at = Some(now + self.duration);
        debug!("Wake lease acquired for {:?}", self.duration);
        true
    }

    /// Renew an acquired-but-expired lease. Does nothing after `release`.
    pub fn touch(&self) -> bool {
        let now = Instant::now();
        let mut state = self.lock();
        if !state.acquired || state.expires_at.is_some_and(|at| now < at) {
            return false;
        }
        state.expires_at = Some(now + self.duration);
        debug!("Wake lease renewed for {:?}", self.duration);
        true
    }

    /// Returns true if a lease was held.
    pub fn release(&self) -> bool {
        let mut state = self.lock();
        let was_acquired = state.acquired;
        state.acquired = false;
        state.expires_at = None;
        was_acquired
    }

    #[cfg(test)]
    pub fn is_held(&self) -> bool {
        let state = self.lock();
        state.acquired && state.expires_at.is_some_and(|at| Instant::now() < at)
    }
}
