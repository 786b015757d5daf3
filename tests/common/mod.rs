/*!
 * Shared test helpers
 */

#![allow(dead_code)]

use parking_lot::Mutex;
use sighook::{ManualSignalSource, Signal, SignalHandler};
use std::sync::Arc;
use std::time::Duration;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Signal used to flush the dispatch loop; never hooked by the tests themselves
pub const BARRIER: Signal = Signal::SIGWINCH;

/// Handler wired to an in-memory source
pub fn manual_handler() -> (SignalHandler, Arc<ManualSignalSource>) {
    let source = Arc::new(ManualSignalSource::new());
    let handler = SignalHandler::with_source(source.clone());
    (handler, source)
}

/// Collects `(tag, signal)` pairs from hooks in invocation order
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<(u32, Signal)>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hook(&self, tag: u32) -> impl Fn(Signal) + Send + Sync + 'static {
        let events = self.events.clone();
        move |signal| events.lock().push((tag, signal))
    }

    pub fn events(&self) -> Vec<(u32, Signal)> {
        self.events.lock().clone()
    }

    pub fn tags_for(&self, signal: Signal) -> Vec<u32> {
        self.events
            .lock()
            .iter()
            .filter(|(_, s)| *s == signal)
            .map(|(tag, _)| *tag)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }
}

/// Block until every signal raised so far has been dispatched
///
/// Deliveries are handled in order by one thread, so once the barrier hook
/// has run, everything raised before it has been processed.
pub fn settle(handler: &SignalHandler, source: &ManualSignalSource) {
    let (tx, rx) = flume::bounded(1);
    let id = handler.add_hook(
        move |_| {
            let _ = tx.try_send(());
        },
        &[BARRIER],
    );
    assert_eq!(source.raise(BARRIER), 1, "barrier not armed");
    rx.recv_timeout(TIMEOUT).expect("dispatch loop stalled");
    handler.remove_hook(id);
}
