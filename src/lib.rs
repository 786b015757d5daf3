/*!
 * sighook
 * Process signal hooks for Unix applications
 *
 * Register callbacks for SIGINT, SIGTERM and friends, group them under the
 * shutdown signals, ignore or reset signals, and tear the handler down when
 * done.
 */

pub mod monitoring;
pub mod signals;

// Re-exports
pub use monitoring::init_tracing;
pub use signals::{
    HandlerConfig, ManualSignalSource, OsSignalSource, Signal, SignalError, SignalHandler,
    SignalResult, SignalSource, SignalStats, SHUTDOWN_SIGNALS,
};
