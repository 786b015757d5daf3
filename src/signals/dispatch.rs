/*!
 * Dispatch Loop
 * Receives delivered signals and runs their hooks on one dedicated thread
 */

use crate::monitoring::DispatchSpan;
use super::atomic_stats::AtomicSignalStats;
use super::registry::HookRegistry;
use super::types::{Signal, SignalError, SignalResult};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, trace};

/// Everything the dispatch thread needs, without a handle back to the handler
pub(crate) struct Dispatcher {
    registry: Arc<HookRegistry>,
    stats: Arc<AtomicSignalStats>,
    catch_panics: bool,
}

impl Dispatcher {
    pub fn new(registry: Arc<HookRegistry>, stats: Arc<AtomicSignalStats>, catch_panics: bool) -> Self {
        Self {
            registry,
            stats,
            catch_panics,
        }
    }

    /// Start the loop on a named thread
    ///
    /// The loop exits when `stop` yields a value or every sender of either
    /// channel has been dropped.
    pub fn spawn(
        self,
        thread_name: &str,
        deliveries: flume::Receiver<Signal>,
        stop: flume::Receiver<()>,
    ) -> SignalResult<JoinHandle<()>> {
        thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || self.run(deliveries, stop))
            .map_err(SignalError::Spawn)
    }

    fn run(&self, deliveries: flume::Receiver<Signal>, stop: flume::Receiver<()>) {
        debug!("Signal dispatch loop started");

        loop {
            let next = flume::Selector::new()
                .recv(&stop, |_| None)
                .recv(&deliveries, |received| received.ok())
                .wait();

            match next {
                Some(signal) => {
                    self.dispatch(signal);
                }
                None => break,
            }
        }

        debug!("Signal dispatch loop stopped");
    }

    /// Run every hook registered for `signal`, in registration order
    ///
    /// Returns the number of hooks that completed.
    pub fn dispatch(&self, signal: Signal) -> usize {
        self.stats.inc_received();

        let Some(hooks) = self.registry.snapshot(signal) else {
            self.stats.inc_ignored();
            return 0;
        };

        if hooks.is_empty() {
            trace!(signal = %signal, "No hooks registered for signal");
            return 0;
        }

        self.stats.inc_dispatched();
        info!(signal = %signal, hooks = hooks.len(), "Dispatching signal");

        let span = DispatchSpan::new(signal, hooks.len());
        let _entered = span.enter();

        let mut completed = 0;
        for (index, hook) in hooks.iter().enumerate() {
            if !self.catch_panics {
                hook(signal);
                self.stats.inc_hooks_invoked();
                completed += 1;
                continue;
            }

            match panic::catch_unwind(AssertUnwindSafe(|| hook(signal))) {
                Ok(()) => {
                    self.stats.inc_hooks_invoked();
                    completed += 1;
                }
                Err(payload) => {
                    self.stats.inc_hook_panics();
                    error!(
                        signal = %signal,
                        position = index,
                        panic = %panic_message(payload.as_ref()),
                        "Signal hook panicked"
                    );
                }
            }
        }

        span.record_outcome(completed, hooks.len() - completed);
        completed
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
