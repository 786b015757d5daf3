/*!
 * Manual Signal Source
 * In-memory signal source for tests and simulations
 */

use super::traits::SignalSource;
use super::types::{Signal, SignalResult, SubscriberId};
use ahash::{AHashMap, AHashSet};
use parking_lot::Mutex;
use tracing::debug;

/// One call received by a `ManualSignalSource`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceCall {
    Notify(SubscriberId, Signal),
    Stop(SubscriberId),
    Ignore(Vec<Signal>),
    Reset(Vec<Signal>),
}

#[derive(Default)]
struct ManualState {
    subscriptions: AHashMap<Signal, Vec<(SubscriberId, flume::Sender<Signal>)>>,
    ignored: AHashSet<Signal>,
    calls: Vec<SourceCall>,
}

/// `SignalSource` driven by `raise` instead of the OS
///
/// Follows the same subscription rules as `OsSignalSource` but accepts every
/// signal, so deliveries of SIGKILL can be simulated.
#[derive(Default)]
pub struct ManualSignalSource {
    state: Mutex<ManualState>,
}

impl ManualSignalSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `signal` to every armed subscriber
    ///
    /// Returns how many delivery channels accepted it.
    pub fn raise(&self, signal: Signal) -> usize {
        let state = self.state.lock();
        if state.ignored.contains(&signal) {
            debug!(signal = %signal, "Raised signal is ignored");
            return 0;
        }

        state.subscriptions.get(&signal).map_or(0, |subs| {
            subs.iter()
                .filter(|(_, tx)| tx.try_send(signal).is_ok())
                .count()
        })
    }

    /// Check if `subscriber` currently receives `signal`
    pub fn is_armed(&self, subscriber: SubscriberId, signal: Signal) -> bool {
        self.state
            .lock()
            .subscriptions
            .get(&signal)
            .is_some_and(|subs| subs.iter().any(|(id, _)| *id == subscriber))
    }

    pub fn is_ignored(&self, signal: Signal) -> bool {
        self.state.lock().ignored.contains(&signal)
    }

    /// Every call received so far, oldest first
    pub fn calls(&self) -> Vec<SourceCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }
}

impl SignalSource for ManualSignalSource {
    fn notify(
        &self,
        subscriber: SubscriberId,
        signal: Signal,
        tx: &flume::Sender<Signal>,
    ) -> SignalResult<()> {
        let mut state = self.state.lock();
        state.calls.push(SourceCall::Notify(subscriber, signal));
        state.ignored.remove(&signal);

        let subs = state.subscriptions.entry(signal).or_default();
        if !subs.iter().any(|(id, _)| *id == subscriber) {
            subs.push((subscriber, tx.clone()));
        }
        Ok(())
    }

    fn stop(&self, subscriber: SubscriberId) -> SignalResult<()> {
        let mut state = self.state.lock();
        state.calls.push(SourceCall::Stop(subscriber));
        state.subscriptions.retain(|_, subs| {
            subs.retain(|(id, _)| *id != subscriber);
            !subs.is_empty()
        });
        Ok(())
    }

    fn ignore(&self, signals: &[Signal]) -> SignalResult<()> {
        let mut state = self.state.lock();
        state.calls.push(SourceCall::Ignore(signals.to_vec()));
        for signal in signals {
            state.subscriptions.remove(signal);
            state.ignored.insert(*signal);
        }
        Ok(())
    }

    fn reset(&self, signals: &[Signal]) -> SignalResult<()> {
        let mut state = self.state.lock();
        state.calls.push(SourceCall::Reset(signals.to_vec()));
        if signals.is_empty() {
            state.subscriptions.clear();
            state.ignored.clear();
        } else {
            for signal in signals {
                state.subscriptions.remove(signal);
                state.ignored.remove(signal);
            }
        }
        Ok(())
    }
}
