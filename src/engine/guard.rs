//! # engine::guard
//!
//! Non-blocking re-entrancy guard, one per scheduler.
//!
//! ```text
//!              ┌──────┐  try_acquire (CAS false→true)  ┌─────────┐
//!              │ IDLE │ ─────────────────────────────▶ │ RUNNING │
//!              └──────┘ ◀───────────────────────────── └─────────┘
//!                         TickPermit dropped
//! ```
//!
//! A second `try_acquire` while RUNNING fails immediately — the tick is
//! skipped, never queued.  Release happens in `Drop`, so an early `?`
//! return or a panic inside the tick still frees the guard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct TickGuard {
    running: AtomicBool,
}

impl TickGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Take the guard if it is free.  `None` means another tick holds it.
    pub fn try_acquire(self: &Arc<Self>) -> Option<TickPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TickPermit { guard: Arc::clone(self) })
    }
}

/// Proof of holding a [`TickGuard`].  Dropping it releases the guard.
#[derive(Debug)]
pub struct TickPermit {
    guard: Arc<TickGuard>,
}

impl Drop for TickPermit {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::Release);
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
