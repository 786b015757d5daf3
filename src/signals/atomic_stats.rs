/*!
 * Lock-Free Signal Statistics
 * Counters updated from the dispatch thread without touching the registry lock
 */

use super::types::SignalStats;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic dispatch statistics
///
/// # Performance
/// - Cache-line aligned to prevent false sharing with registry state
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub struct AtomicSignalStats {
    signals_received: AtomicU64,
    signals_dispatched: AtomicU64,
    signals_ignored: AtomicU64,
    hooks_invoked: AtomicU64,
    hook_panics: AtomicU64,
}

impl AtomicSignalStats {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal pulled off the delivery channel
    #[inline(always)]
    pub fn inc_received(&self) {
        self.signals_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Signal that had at least one hook
    #[inline(always)]
    pub fn inc_dispatched(&self) {
        self.signals_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Signal dropped because it is marked ignored
    #[inline(always)]
    pub fn inc_ignored(&self) {
        self.signals_ignored.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_hooks_invoked(&self) {
        self.hooks_invoked.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_hook_panics(&self) {
        self.hook_panics.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of current counters
    ///
    /// # Note
    /// Registry sizes are filled in by the caller, which holds the lock.
    #[inline]
    pub fn snapshot(&self) -> SignalStats {
        SignalStats {
            signals_received: self.signals_received.load(Ordering::Acquire),
            signals_dispatched: self.signals_dispatched.load(Ordering::Acquire),
            signals_ignored: self.signals_ignored.load(Ordering::Acquire),
            hooks_invoked: self.hooks_invoked.load(Ordering::Acquire),
            hook_panics: self.hook_panics.load(Ordering::Acquire),
            hooks_registered: 0,
            signals_registered: 0,
        }
    }
}
