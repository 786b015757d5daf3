/*!
 * Signal Handler
 * Hook registry, OS subscription and dispatch loop behind one handle
 */

use super::atomic_stats::AtomicSignalStats;
use super::config::HandlerConfig;
use super::dispatch::Dispatcher;
use super::os::OsSignalSource;
use super::registry::HookRegistry;
use super::traits::SignalSource;
use super::types::{
    HookFn, HookId, Signal, SignalError, SignalResult, SignalStats, SubscriberId, HANGUP,
    INTERRUPT, KILL, QUIT, SHUTDOWN_SIGNALS, TERMINATE,
};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

struct Inner {
    id: SubscriberId,
    registry: Arc<HookRegistry>,
    stats: Arc<AtomicSignalStats>,
    source: Arc<dyn SignalSource>,
    tx: flume::Sender<Signal>,
    stop_tx: Mutex<Option<flume::Sender<()>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    listening: AtomicBool,
    /// Set once the dispatch loop has been told to stop
    shut_down: AtomicBool,
}

impl Inner {
    /// Stop the dispatch loop and wait for it
    ///
    /// Returns false if the loop was already stopped.
    fn stop_dispatcher(&self) -> bool {
        self.shut_down.store(true, Ordering::Release);
        if let Some(stop) = self.stop_tx.lock().take() {
            let _ = stop.send(());
        }

        let Some(handle) = self.dispatcher.lock().take() else {
            return false;
        };

        // Called from a hook: the loop exits once the current dispatch returns.
        if handle.thread().id() == thread::current().id() {
            return true;
        }

        if handle.join().is_err() {
            error!(subscriber = %self.id, "Signal dispatch thread panicked");
        }
        true
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Err(e) = self.source.stop(self.id) {
            warn!(subscriber = %self.id, error = %e, "Failed to detach signal delivery");
        }
        self.stop_dispatcher();
    }
}

/// Removes a temporary hook when the waiter finishes or is cancelled
struct HookGuard<'a> {
    handler: &'a SignalHandler,
    id: HookId,
}

impl Drop for HookGuard<'_> {
    fn drop(&mut self) {
        self.handler.remove_hook(self.id);
    }
}

/// Process signal hook handler
///
/// Maps signals to ordered hook lists and runs them on a dedicated dispatch
/// thread whenever the signal source delivers one. Cloning yields another
/// handle to the same handler. Registry operations never fail; problems
/// reported by the signal source are logged.
///
/// ```no_run
/// use sighook::signals::SignalHandler;
///
/// let handler = SignalHandler::new();
/// handler
///     .on_shutdown(|signal| println!("shutting down on {signal}"))
///     .on_hangup(|_| println!("reloading"));
/// ```
#[derive(Clone)]
pub struct SignalHandler {
    inner: Arc<Inner>,
}

impl SignalHandler {
    /// Create a handler listening to real OS signals
    ///
    /// # Panics
    /// If the dispatch thread cannot be spawned, like `std::thread::spawn`.
    /// Use [`SignalHandler::try_with`] to handle that case.
    pub fn new() -> Self {
        Self::with_config(HandlerConfig::default())
    }

    /// Create a handler with custom configuration
    ///
    /// # Panics
    /// If the dispatch thread cannot be spawned.
    pub fn with_config(config: HandlerConfig) -> Self {
        Self::build(config, Arc::new(OsSignalSource::new()))
    }

    /// Create a handler fed by a custom signal source
    ///
    /// # Panics
    /// If the dispatch thread cannot be spawned.
    pub fn with_source(source: Arc<dyn SignalSource>) -> Self {
        Self::build(HandlerConfig::default(), source)
    }

    /// Create a handler with a hook on every shutdown signal
    pub fn shutdown_handler<F>(hook: F) -> Self
    where
        F: Fn(Signal) + Send + Sync + 'static,
    {
        let handler = Self::new();
        handler.on_shutdown(hook);
        handler
    }

    fn build(config: HandlerConfig, source: Arc<dyn SignalSource>) -> Self {
        match Self::try_with(config, source) {
            Ok(handler) => handler,
            Err(e) => panic!("{e}"),
        }
    }

    /// Fallible constructor
    pub fn try_with(config: HandlerConfig, source: Arc<dyn SignalSource>) -> SignalResult<Self> {
        let capacity = config.channel_capacity.max(1);
        let (tx, rx) = flume::bounded(capacity);
        let (stop_tx, stop_rx) = flume::bounded(1);

        let registry = Arc::new(HookRegistry::new());
        let stats = Arc::new(AtomicSignalStats::new());
        let dispatcher = Dispatcher::new(registry.clone(), stats.clone(), config.catch_panics)
            .spawn(&config.thread_name, rx, stop_rx)?;

        let id = SubscriberId::next();
        info!(
            subscriber = %id,
            channel_capacity = capacity,
            thread = %config.thread_name,
            "Signal handler created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                id,
                registry,
                stats,
                source,
                tx,
                stop_tx: Mutex::new(Some(stop_tx)),
                dispatcher: Mutex::new(Some(dispatcher)),
                listening: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
            }),
        })
    }

    // ---------------------------------------------------------------------
    // Registration
    // ---------------------------------------------------------------------

    /// Append `hook` to every listed signal and arm their delivery
    pub fn add<F>(&self, hook: F, signals: &[Signal]) -> &Self
    where
        F: Fn(Signal) + Send + Sync + 'static,
    {
        self.register(Arc::new(hook), signals);
        self
    }

    /// Like [`SignalHandler::add`] but returns an ID for [`SignalHandler::remove_hook`]
    pub fn add_hook<F>(&self, hook: F, signals: &[Signal]) -> HookId
    where
        F: Fn(Signal) + Send + Sync + 'static,
    {
        self.register(Arc::new(hook), signals)
    }

    fn register(&self, func: HookFn, signals: &[Signal]) -> HookId {
        let id = HookId::next();
        if signals.is_empty() {
            return id;
        }

        let mut state = self.inner.registry.lock();
        let shut_down = self.inner.shut_down.load(Ordering::Acquire);
        if shut_down {
            warn!(signals = ?signals, "Handler is shut down, hook registered without delivery");
        }
        for &signal in signals {
            if state.push(signal, id, func.clone()) {
                debug!(signal = %signal, "Signal no longer ignored");
            }
            if !shut_down {
                self.arm(signal);
            }
        }
        drop(state);

        debug!(hook_id = %id, signals = ?signals, "Registered signal hook");
        id
    }

    fn arm(&self, signal: Signal) {
        match self.inner.source.notify(self.inner.id, signal, &self.inner.tx) {
            Ok(()) => self.inner.listening.store(true, Ordering::Release),
            Err(SignalError::Uncatchable(signal)) => {
                warn!(signal = %signal, "Signal cannot be intercepted, its hooks only run for simulated deliveries")
            }
            Err(e) => warn!(signal = %signal, error = %e, "Failed to arm signal delivery"),
        }
    }

    /// Hook the shutdown group: SIGINT, SIGTERM, SIGQUIT, SIGHUP, SIGKILL
    pub fn on_shutdown<F>(&self, hook: F) -> &Self
    where
        F: Fn(Signal) + Send + Sync + 'static,
    {
        self.add(hook, &SHUTDOWN_SIGNALS)
    }

    pub fn on_interrupt<F>(&self, hook: F) -> &Self
    where
        F: Fn(Signal) + Send + Sync + 'static,
    {
        self.add(hook, &[INTERRUPT])
    }

    pub fn on_terminate<F>(&self, hook: F) -> &Self
    where
        F: Fn(Signal) + Send + Sync + 'static,
    {
        self.add(hook, &[TERMINATE])
    }

    pub fn on_quit<F>(&self, hook: F) -> &Self
    where
        F: Fn(Signal) + Send + Sync + 'static,
    {
        self.add(hook, &[QUIT])
    }

    pub fn on_hangup<F>(&self, hook: F) -> &Self
    where
        F: Fn(Signal) + Send + Sync + 'static,
    {
        self.add(hook, &[HANGUP])
    }

    /// Hook SIGKILL
    ///
    /// The OS never routes SIGKILL to a process; the hook only runs for
    /// simulated deliveries.
    pub fn on_kill<F>(&self, hook: F) -> &Self
    where
        F: Fn(Signal) + Send + Sync + 'static,
    {
        self.add(hook, &[KILL])
    }

    // ---------------------------------------------------------------------
    // Ignore / stop
    // ---------------------------------------------------------------------

    /// Drop hooks for the listed signals and discard them process-wide
    pub fn ignore(&self, signals: &[Signal]) -> &Self {
        if signals.is_empty() {
            return self;
        }

        let mut state = self.inner.registry.lock();
        for &signal in signals {
            state.ignore(signal);
        }
        let ignored = state.ignored();
        if let Err(e) = self.inner.source.ignore(&ignored) {
            warn!(signals = ?ignored, error = %e, "Failed to ignore signals");
        }
        drop(state);

        info!(signals = ?signals, "Ignoring signals");
        self
    }

    /// Restore default disposition for every customised signal
    ///
    /// Undoes both delivery and ignore settings at the OS level, process-wide.
    /// Registered hooks are kept; a later `add` re-arms delivery.
    pub fn stop_ignoring(&self) -> &Self {
        let mut state = self.inner.registry.lock();
        if let Err(e) = self.inner.source.reset(&[]) {
            warn!(error = %e, "Failed to restore default signal dispositions");
        }
        state.clear_ignored();
        self.inner.listening.store(false, Ordering::Release);
        drop(state);

        info!("Restored default signal dispositions");
        self
    }

    /// Detach from the signal source; the dispatch loop stays alive
    pub fn stop_listening(&self) -> &Self {
        let _state = self.inner.registry.lock();
        if let Err(e) = self.inner.source.stop(self.inner.id) {
            warn!(subscriber = %self.inner.id, error = %e, "Failed to detach signal delivery");
        }
        self.inner.listening.store(false, Ordering::Release);
        debug!(subscriber = %self.inner.id, "Stopped listening");
        self
    }

    // ---------------------------------------------------------------------
    // Removal / reset
    // ---------------------------------------------------------------------

    /// Remove every hook for `signal`
    ///
    /// Delivery stays armed, so re-adding is cheap and deliveries in between
    /// run no hooks.
    pub fn remove(&self, signal: Signal) -> &Self {
        let removed = self.inner.registry.lock().remove_signal(signal);
        debug!(signal = %signal, removed, "Removed signal hooks");
        self
    }

    /// Remove one registration from every signal it was added to
    pub fn remove_hook(&self, id: HookId) -> bool {
        let removed = self.inner.registry.lock().remove_hook(id);
        if removed {
            debug!(hook_id = %id, "Removed signal hook");
        }
        removed
    }

    /// Remove every hook; OS subscriptions are left untouched
    pub fn clear(&self) -> &Self {
        let removed = self.inner.registry.lock().clear();
        debug!(removed, "Cleared signal hooks");
        self
    }

    /// Clear hooks and detach from the signal source
    pub fn reset(&self) -> &Self {
        self.clear().stop_listening()
    }

    /// Stop listening, stop the dispatch loop and wait for it to exit
    ///
    /// Idempotent. Hooks registered afterwards are kept but never armed, so
    /// the process keeps its default dispositions and they never run.
    pub fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::Release);
        self.reset();
        if self.inner.stop_dispatcher() {
            info!(subscriber = %self.inner.id, "Signal handler shut down");
        }
    }

    // ---------------------------------------------------------------------
    // Waiting
    // ---------------------------------------------------------------------

    /// Wait for the first of `signals`
    ///
    /// Returns `None` if the temporary hook is removed before a signal
    /// arrives (for example by `clear`) or `signals` is empty.
    pub async fn wait(&self, signals: &[Signal]) -> Option<Signal> {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let id = self.add_hook(
            move |signal| {
                let _ = tx.send(signal);
            },
            signals,
        );
        let _guard = HookGuard { handler: self, id };
        rx.recv().await
    }

    /// Wait for any shutdown signal
    pub async fn wait_for_shutdown(&self) -> Option<Signal> {
        self.wait(&SHUTDOWN_SIGNALS).await
    }

    /// Blocking flavour of [`SignalHandler::wait`]
    ///
    /// Must not be called from a hook: the dispatch thread would wait on
    /// itself.
    pub fn wait_blocking(&self, signals: &[Signal], timeout: Option<Duration>) -> Option<Signal> {
        let (tx, rx) = flume::unbounded();
        let id = self.add_hook(
            move |signal| {
                let _ = tx.send(signal);
            },
            signals,
        );
        let _guard = HookGuard { handler: self, id };
        match timeout {
            Some(timeout) => rx.recv_timeout(timeout).ok(),
            None => rx.recv().ok(),
        }
    }

    // ---------------------------------------------------------------------
    // Inspection
    // ---------------------------------------------------------------------

    /// Signals with at least one hook, in unspecified order
    pub fn signals(&self) -> Vec<Signal> {
        self.inner.registry.lock().signals()
    }

    /// Signals currently marked ignored, sorted
    pub fn ignored(&self) -> Vec<Signal> {
        self.inner.registry.lock().ignored()
    }

    pub fn hook_count(&self, signal: Signal) -> usize {
        self.inner.registry.lock().hook_count(signal)
    }

    /// Check if delivery is armed for at least one signal
    pub fn is_listening(&self) -> bool {
        self.inner.listening.load(Ordering::Acquire)
    }

    /// Check if the dispatch loop is alive
    pub fn is_running(&self) -> bool {
        self.inner
            .dispatcher
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// ID under which this handler subscribes to its signal source
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.id
    }

    pub fn stats(&self) -> SignalStats {
        let mut stats = self.inner.stats.snapshot();
        let state = self.inner.registry.lock();
        stats.hooks_registered = state.total_hooks();
        stats.signals_registered = state.signals().len();
        stats
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SignalHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut signals = self.signals();
        signals.sort();
        f.debug_struct("SignalHandler")
            .field("subscriber", &self.inner.id)
            .field("signals", &signals)
            .field("ignored", &self.ignored())
            .field("listening", &self.is_listening())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::traits::MockSignalSource;
    use pretty_assertions::assert_eq;

    fn permissive_stop(mock: &mut MockSignalSource) {
        mock.expect_stop().returning(|_| Ok(()));
    }

    #[test]
    fn test_every_add_is_forwarded_to_source() {
        let mut mock = MockSignalSource::new();
        mock.expect_notify()
            .withf(|_, signal, _| *signal == Signal::SIGUSR1)
            .times(2)
            .returning(|_, _, _| Ok(()));
        permissive_stop(&mut mock);

        let handler = SignalHandler::with_source(Arc::new(mock));
        handler.add(|_| {}, &[Signal::SIGUSR1]).add(|_| {}, &[Signal::SIGUSR1]);

        assert_eq!(handler.hook_count(Signal::SIGUSR1), 2);
        assert!(handler.is_listening());
    }

    #[test]
    fn test_uncatchable_signal_keeps_hook() {
        let mut mock = MockSignalSource::new();
        mock.expect_notify()
            .returning(|_, signal, _| Err(SignalError::Uncatchable(signal)));
        permissive_stop(&mut mock);

        let handler = SignalHandler::with_source(Arc::new(mock));
        handler.on_kill(|_| {});

        assert_eq!(handler.signals(), vec![KILL]);
        assert!(!handler.is_listening());
    }

    #[test]
    fn test_ignore_passes_whole_ignored_set() {
        let mut mock = MockSignalSource::new();
        mock.expect_notify().returning(|_, _, _| Ok(()));
        mock.expect_ignore()
            .withf(|signals| signals.to_vec() == vec![Signal::SIGHUP])
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_ignore()
            .withf(|signals| signals.to_vec() == vec![Signal::SIGHUP, Signal::SIGPIPE])
            .times(1)
            .returning(|_| Ok(()));
        permissive_stop(&mut mock);

        let handler = SignalHandler::with_source(Arc::new(mock));
        handler.on_hangup(|_| {});
        handler.ignore(&[Signal::SIGHUP]).ignore(&[Signal::SIGPIPE]);

        assert!(handler.signals().is_empty());
        assert_eq!(handler.ignored(), vec![Signal::SIGHUP, Signal::SIGPIPE]);
    }

    #[test]
    fn test_stop_ignoring_resets_everything() {
        let mut mock = MockSignalSource::new();
        mock.expect_ignore().returning(|_| Ok(()));
        mock.expect_reset()
            .withf(|signals| signals.is_empty())
            .times(1)
            .returning(|_| Ok(()));
        permissive_stop(&mut mock);

        let handler = SignalHandler::with_source(Arc::new(mock));
        handler.ignore(&[Signal::SIGQUIT]).stop_ignoring();

        assert!(handler.ignored().is_empty());
    }

    #[test]
    fn test_shutdown_joins_dispatch_thread() {
        let mut mock = MockSignalSource::new();
        mock.expect_stop().times(2..).returning(|_| Ok(()));

        let handler = SignalHandler::with_source(Arc::new(mock));
        assert!(handler.is_running());

        handler.shutdown();
        assert!(!handler.is_running());
        handler.shutdown();
    }

    #[test]
    fn test_no_notify_after_shutdown() {
        let mut mock = MockSignalSource::new();
        mock.expect_notify().times(0);
        permissive_stop(&mut mock);

        let handler = SignalHandler::with_source(Arc::new(mock));
        handler.shutdown();
        handler.on_terminate(|_| {});

        assert_eq!(handler.signals(), vec![TERMINATE]);
        assert!(!handler.is_listening());
    }

    #[test]
    fn test_source_errors_do_not_break_chaining() {
        let mut mock = MockSignalSource::new();
        mock.expect_notify().returning(|_, signal, _| {
            Err(SignalError::Os {
                signal,
                source: nix::errno::Errno::EINVAL,
            })
        });
        mock.expect_stop()
            .returning(|_| Err(SignalError::Io(std::io::Error::other("gone"))));

        let handler = SignalHandler::with_source(Arc::new(mock));
        handler
            .on_interrupt(|_| {})
            .on_terminate(|_| {})
            .reset();

        assert!(handler.signals().is_empty());
    }
}
