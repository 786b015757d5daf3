/*!
 * Hook Registry
 * Ordered hook lists per signal plus the ignored set, behind one lock
 */

use super::types::{HookFn, HookId, Signal};
use ahash::{AHashMap, AHashSet};
use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

#[derive(Clone)]
struct Hook {
    id: HookId,
    func: HookFn,
}

/// Registry state, only reachable through `HookRegistry::lock`
#[derive(Default)]
pub(crate) struct RegistryState {
    hooks: AHashMap<Signal, Vec<Hook>>,
    ignored: AHashSet<Signal>,
}

impl RegistryState {
    /// Append a hook to the end of the signal's list
    ///
    /// Returns true if the signal was ignored and has been un-ignored.
    pub fn push(&mut self, signal: Signal, id: HookId, func: HookFn) -> bool {
        let unignored = self.ignored.remove(&signal);
        self.hooks.entry(signal).or_default().push(Hook { id, func });
        unignored
    }

    /// Drop every hook for the signal, returning how many were removed
    pub fn remove_signal(&mut self, signal: Signal) -> usize {
        self.hooks.remove(&signal).map_or(0, |hooks| hooks.len())
    }

    /// Drop one registration from every signal it was added to
    pub fn remove_hook(&mut self, id: HookId) -> bool {
        let mut removed = false;
        self.hooks.retain(|_, hooks| {
            let before = hooks.len();
            hooks.retain(|hook| hook.id != id);
            removed |= hooks.len() != before;
            !hooks.is_empty()
        });
        removed
    }

    pub fn clear(&mut self) -> usize {
        let count = self.total_hooks();
        self.hooks.clear();
        count
    }

    /// Remove hooks for the signal and mark it ignored
    pub fn ignore(&mut self, signal: Signal) {
        self.remove_signal(signal);
        self.ignored.insert(signal);
    }

    pub fn clear_ignored(&mut self) {
        self.ignored.clear();
    }

    pub fn is_ignored(&self, signal: Signal) -> bool {
        self.ignored.contains(&signal)
    }

    pub fn ignored(&self) -> Vec<Signal> {
        let mut signals: Vec<Signal> = self.ignored.iter().copied().collect();
        signals.sort();
        signals
    }

    /// Signals with at least one hook
    pub fn signals(&self) -> Vec<Signal> {
        self.hooks
            .iter()
            .filter(|(_, hooks)| !hooks.is_empty())
            .map(|(signal, _)| *signal)
            .collect()
    }

    pub fn hook_count(&self, signal: Signal) -> usize {
        self.hooks.get(&signal).map_or(0, Vec::len)
    }

    pub fn total_hooks(&self) -> usize {
        self.hooks.values().map(Vec::len).sum()
    }
}

/// Thread-safe hook registry shared by a handler and its dispatch loop
#[derive(Default)]
pub(crate) struct HookRegistry {
    state: Mutex<RegistryState>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclusive access for mutation
    pub fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock()
    }

    /// Copy of the hooks for a signal, in registration order
    ///
    /// Returns `None` when the signal is ignored. The lock is released before
    /// returning so hooks can run without holding it.
    pub fn snapshot(&self, signal: Signal) -> Option<Vec<HookFn>> {
        let state = self.state.lock();
        if state.is_ignored(signal) {
            debug!(signal = %signal, "Signal is ignored, skipping dispatch");
            return None;
        }
        Some(
            state
                .hooks
                .get(&signal)
                .map(|hooks| hooks.iter().map(|hook| hook.func.clone()).collect())
                .unwrap_or_default(),
        )
    }
}
