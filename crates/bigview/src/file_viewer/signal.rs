//! Level-triggered "update pending" flag for the read worker.
//!
//! Raising an already raised signal is a no-op, so any number of navigation intents between
//! two wake-ups collapse into one recomputation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

use crate::ignore_poison::IgnorePoison;

#[derive(Default)]
pub(super) struct UpdateSignal {
    pending: Mutex<bool>,
    condvar: Condvar,
}

impl UpdateSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks an update as pending. O(1), never blocks on the worker.
    pub fn raise(&self) {
        *self.pending.lock_ignore_poison() = true;
        self.condvar.notify_one();
    }

    /// Wakes every waiter without raising, so they can notice `cancelled`.
    pub fn wake(&self) {
        let _guard = self.pending.lock_ignore_poison();
        self.condvar.notify_all();
    }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        *self.pending.lock_ignore_poison()
    }

    /// Blocks until the signal is raised or `cancelled` is set, then clears it.
    /// Returns `false` when woken by cancellation.
    pub fn wait(&self, cancelled: &AtomicBool) -> bool {
        let guard = self.pending.lock_ignore_poison();
        let mut pending = self
            .condvar
            .wait_while(guard, |pending| !*pending && !cancelled.load(Ordering::Relaxed))
            .unwrap_or_else(|e| e.into_inner());
        if cancelled.load(Ordering::Relaxed) {
            return false;
        }
        *pending = false;
        true
    }
}
