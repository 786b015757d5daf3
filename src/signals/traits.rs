/*!
 * Signal Traits
 * Contract between a handler and whatever delivers OS signals to it
 */

use super::types::{Signal, SignalResult, SubscriberId};

/// Source of asynchronous signal deliveries
///
/// A handler registers a delivery channel per signal through `notify` and
/// receives every subsequent occurrence on it. Implementations must never call
/// back into a handler.
#[cfg_attr(test, mockall::automock)]
pub trait SignalSource: Send + Sync {
    /// Deliver future occurrences of `signal` on `tx`
    ///
    /// Idempotent per (subscriber, signal): repeated calls never duplicate
    /// delivery. Fails with `SignalError::Uncatchable` for SIGKILL and SIGSTOP.
    fn notify(
        &self,
        subscriber: SubscriberId,
        signal: Signal,
        tx: &flume::Sender<Signal>,
    ) -> SignalResult<()>;

    /// Undo every `notify` made by `subscriber`
    fn stop(&self, subscriber: SubscriberId) -> SignalResult<()>;

    /// Discard the listed signals process-wide
    ///
    /// Cancels pending `notify` subscriptions for those signals.
    fn ignore(&self, signals: &[Signal]) -> SignalResult<()>;

    /// Restore default disposition for the listed signals
    ///
    /// An empty list resets every signal this source has customised.
    fn reset(&self, signals: &[Signal]) -> SignalResult<()>;
}
