/*!
 * Signals Module
 * Process signal hooks: registry, OS delivery and dispatch
 *
 * Hooks are registered per signal on a `SignalHandler`. The handler arms
 * delivery through a `SignalSource` (the real OS by default), receives
 * signals on a bounded channel and runs the hooks on its dispatch thread in
 * registration order.
 */

mod atomic_stats;
pub mod config;
mod dispatch;
pub mod handler;
pub mod manual;
pub mod os;
mod registry;
pub mod traits;
pub mod types;

// Re-export public API
pub use config::HandlerConfig;
pub use handler::SignalHandler;
pub use manual::{ManualSignalSource, SourceCall};
pub use os::OsSignalSource;
pub use traits::SignalSource;
pub use types::{
    HookFn, HookId, Signal, SignalError, SignalResult, SignalStats, SubscriberId, HANGUP,
    INTERRUPT, KILL, QUIT, SHUTDOWN_SIGNALS, TERMINATE,
};
