/*!
 * OS Signal Source
 * Routes real process signals to handler delivery channels
 *
 * One process-wide router owns the signal dispositions. The installed
 * handler writes the signal number as a single byte into a non-blocking
 * socket pair; the `signal-router` thread reads it back and fans it out to
 * every subscriber of that signal.
 */

use super::traits::SignalSource;
use super::types::{Signal, SignalError, SignalResult, SubscriberId};
use ahash::{AHashMap, AHashSet};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet};
use parking_lot::Mutex;
use std::io::{ErrorKind, Read};
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::OnceLock;
use std::thread;
use tracing::{debug, error, info, trace, warn};

/// Write end of the wake socket, -1 until the router starts
static WAKE_FD: AtomicI32 = AtomicI32::new(-1);

static ROUTER: OnceLock<Router> = OnceLock::new();

extern "C" fn on_signal(signum: libc::c_int) {
    let fd = WAKE_FD.load(Ordering::Acquire);
    if fd < 0 {
        return;
    }
    let saved = nix::errno::Errno::last_raw();
    let byte = signum as u8;
    // SAFETY: write(2) is async-signal-safe and `byte` outlives the call.
    // A full socket drops the wakeup, same as a full delivery channel.
    unsafe {
        libc::write(fd, (&byte as *const u8).cast::<libc::c_void>(), 1);
    }
    nix::errno::Errno::set_raw(saved);
}

fn set_handler(signal: Signal, handler: SigHandler) -> SignalResult<()> {
    let action = SigAction::new(handler, SaFlags::SA_RESTART, SigSet::empty());
    // SAFETY: `on_signal` only performs async-signal-safe operations;
    // SIG_IGN and SIG_DFL install no code at all.
    unsafe { sigaction(signal.as_nix(), &action) }
        .map(drop)
        .map_err(|source| SignalError::Os { signal, source })
}

struct Subscription {
    subscriber: SubscriberId,
    tx: flume::Sender<Signal>,
}

#[derive(Default)]
struct RouterState {
    subscriptions: AHashMap<Signal, Vec<Subscription>>,
    /// Signals whose disposition is currently `on_signal`
    handled: AHashSet<Signal>,
    /// Signals set to SIG_IGN by this router
    ignored: AHashSet<Signal>,
    wake: Option<UnixStream>,
}

impl RouterState {
    fn ensure_started(&mut self) -> SignalResult<()> {
        if self.wake.is_some() {
            return Ok(());
        }

        let (read_end, write_end) = UnixStream::pair()?;
        write_end.set_nonblocking(true)?;

        thread::Builder::new()
            .name("signal-router".to_string())
            .spawn(move || route_loop(read_end))
            .map_err(SignalError::Spawn)?;

        WAKE_FD.store(write_end.as_raw_fd(), Ordering::Release);
        self.wake = Some(write_end);
        info!("Signal router started");
        Ok(())
    }

    /// Restore SIG_DFL once nobody listens to `signal` any more
    fn release_if_unused(&mut self, signal: Signal) -> SignalResult<()> {
        let unused = self
            .subscriptions
            .get(&signal)
            .map_or(true, |subs| subs.is_empty());
        if !unused {
            return Ok(());
        }

        self.subscriptions.remove(&signal);
        if self.handled.remove(&signal) {
            set_handler(signal, SigHandler::SigDfl)?;
            debug!(signal = %signal, "Restored default disposition");
        }
        Ok(())
    }
}

#[derive(Default)]
struct Router {
    state: Mutex<RouterState>,
}

fn router() -> &'static Router {
    ROUTER.get_or_init(Router::default)
}

fn route_loop(mut read_end: UnixStream) {
    let mut buf = [0u8; 64];
    loop {
        match read_end.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                for &byte in &buf[..n] {
                    router().deliver(i32::from(byte));
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                error!(error = %e, "Signal router read failed, routing stopped");
                break;
            }
        }
    }
}

impl Router {
    fn deliver(&self, signum: i32) {
        let signal = match Signal::from_number(signum) {
            Ok(signal) => signal,
            Err(e) => {
                warn!(signum, error = %e, "Received unroutable signal");
                return;
            }
        };

        let mut state = self.state.lock();
        let Some(subs) = state.subscriptions.get_mut(&signal) else {
            trace!(signal = %signal, "Signal arrived with no subscribers");
            return;
        };

        subs.retain(|sub| match sub.tx.try_send(signal) {
            Ok(()) => true,
            Err(flume::TrySendError::Full(_)) => {
                warn!(
                    signal = %signal,
                    subscriber = %sub.subscriber,
                    "Delivery channel full, signal dropped"
                );
                true
            }
            Err(flume::TrySendError::Disconnected(_)) => {
                debug!(subscriber = %sub.subscriber, "Pruning closed subscriber");
                false
            }
        });

        if let Err(e) = state.release_if_unused(signal) {
            warn!(signal = %signal, error = %e, "Failed to restore default disposition");
        }
    }
}

/// `SignalSource` backed by the real process signal dispositions
///
/// All instances share one process-wide router, so `ignore` and `reset`
/// affect every handler in the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsSignalSource;

impl OsSignalSource {
    pub fn new() -> Self {
        Self
    }

    /// Number of subscribers currently armed for `signal`
    pub fn subscriber_count(&self, signal: Signal) -> usize {
        router()
            .state
            .lock()
            .subscriptions
            .get(&signal)
            .map_or(0, Vec::len)
    }
}

impl SignalSource for OsSignalSource {
    fn notify(
        &self,
        subscriber: SubscriberId,
        signal: Signal,
        tx: &flume::Sender<Signal>,
    ) -> SignalResult<()> {
        if !signal.can_catch() {
            return Err(SignalError::Uncatchable(signal));
        }

        let mut state = router().state.lock();
        state.ensure_started()?;

        if !state.handled.contains(&signal) {
            set_handler(signal, SigHandler::Handler(on_signal))?;
            state.handled.insert(signal);
            state.ignored.remove(&signal);
            debug!(signal = %signal, "Installed signal handler");
        }

        let subs = state.subscriptions.entry(signal).or_default();
        if subs.iter().any(|sub| sub.subscriber == subscriber) {
            trace!(signal = %signal, subscriber = %subscriber, "Already subscribed");
        } else {
            subs.push(Subscription {
                subscriber,
                tx: tx.clone(),
            });
        }
        Ok(())
    }

    fn stop(&self, subscriber: SubscriberId) -> SignalResult<()> {
        let mut state = router().state.lock();
        let signals: Vec<Signal> = state.subscriptions.keys().copied().collect();

        let mut first_error = None;
        for signal in signals {
            if let Some(subs) = state.subscriptions.get_mut(&signal) {
                subs.retain(|sub| sub.subscriber != subscriber);
            }
            if let Err(e) = state.release_if_unused(signal) {
                first_error.get_or_insert(e);
            }
        }

        debug!(subscriber = %subscriber, "Subscriber detached");
        first_error.map_or(Ok(()), Err)
    }

    fn ignore(&self, signals: &[Signal]) -> SignalResult<()> {
        let mut state = router().state.lock();

        let mut first_error = None;
        for &signal in signals {
            if !signal.can_catch() {
                first_error.get_or_insert(SignalError::Uncatchable(signal));
                continue;
            }
            if let Err(e) = set_handler(signal, SigHandler::SigIgn) {
                first_error.get_or_insert(e);
                continue;
            }
            state.subscriptions.remove(&signal);
            state.handled.remove(&signal);
            state.ignored.insert(signal);
            debug!(signal = %signal, "Signal ignored process-wide");
        }

        first_error.map_or(Ok(()), Err)
    }

    fn reset(&self, signals: &[Signal]) -> SignalResult<()> {
        let mut state = router().state.lock();

        let targets: Vec<Signal> = if signals.is_empty() {
            let mut all: AHashSet<Signal> = state.handled.iter().copied().collect();
            all.extend(state.ignored.iter().copied());
            all.extend(state.subscriptions.keys().copied());
            all.into_iter().collect()
        } else {
            signals.to_vec()
        };

        let mut first_error = None;
        for signal in targets {
            if !signal.can_catch() {
                continue;
            }
            if let Err(e) = set_handler(signal, SigHandler::SigDfl) {
                first_error.get_or_insert(e);
                continue;
            }
            state.subscriptions.remove(&signal);
            state.handled.remove(&signal);
            state.ignored.remove(&signal);
            debug!(signal = %signal, "Signal reset to default disposition");
        }

        first_error.map_or(Ok(()), Err)
    }
}
