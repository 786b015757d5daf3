/*!
 * Signal Types
 * Signal identifiers, hook types and result types
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Signal operation result
pub type SignalResult<T> = Result<T, SignalError>;

/// Signal errors
#[derive(Error, Debug, Diagnostic)]
pub enum SignalError {
    #[error("Invalid signal number: {0}")]
    #[diagnostic(
        code(signal::invalid_number),
        help("Only the signals enumerated by `Signal` can be hooked.")
    )]
    InvalidSignal(i32),

    #[error("Unknown signal name: {0}")]
    #[diagnostic(
        code(signal::unknown_name),
        help("Use a name such as SIGINT, INT or int.")
    )]
    UnknownName(String),

    #[error("Signal {0} cannot be caught or ignored")]
    #[diagnostic(
        code(signal::uncatchable),
        help("SIGKILL and SIGSTOP are never routed to the process.")
    )]
    Uncatchable(Signal),

    #[error("Failed to change disposition of {signal}: {source}")]
    #[diagnostic(code(signal::os))]
    Os {
        signal: Signal,
        #[source]
        source: nix::errno::Errno,
    },

    #[error("Signal I/O error: {0}")]
    #[diagnostic(code(signal::io))]
    Io(#[from] std::io::Error),

    #[error("Failed to spawn signal dispatch thread: {0}")]
    #[diagnostic(
        code(signal::spawn),
        help("The process may have reached its thread limit.")
    )]
    Spawn(#[source] std::io::Error),
}

/// UNIX signals a handler can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Signal {
    /// Hangup detected on controlling terminal or death of controlling process
    SIGHUP,
    /// Interrupt from keyboard (Ctrl+C)
    SIGINT,
    /// Quit from keyboard (Ctrl+\)
    SIGQUIT,
    /// Abort signal
    SIGABRT,
    /// Kill signal (cannot be caught or ignored)
    SIGKILL,
    /// User-defined signal 1
    SIGUSR1,
    /// User-defined signal 2
    SIGUSR2,
    /// Broken pipe
    SIGPIPE,
    /// Timer signal
    SIGALRM,
    /// Termination signal
    SIGTERM,
    /// Child process stopped or terminated
    SIGCHLD,
    /// Stop process (cannot be caught or ignored)
    SIGSTOP,
    /// Window resize signal
    SIGWINCH,
}

/// Interrupt from keyboard
pub const INTERRUPT: Signal = Signal::SIGINT;
/// Termination request
pub const TERMINATE: Signal = Signal::SIGTERM;
/// Quit from keyboard
pub const QUIT: Signal = Signal::SIGQUIT;
/// Terminal hangup
pub const HANGUP: Signal = Signal::SIGHUP;
/// Unconditional kill
pub const KILL: Signal = Signal::SIGKILL;

/// Signals that ask the process to exit
pub const SHUTDOWN_SIGNALS: [Signal; 5] = [INTERRUPT, TERMINATE, QUIT, HANGUP, KILL];

const ALL_SIGNALS: [Signal; 13] = [
    Signal::SIGHUP,
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGABRT,
    Signal::SIGKILL,
    Signal::SIGUSR1,
    Signal::SIGUSR2,
    Signal::SIGPIPE,
    Signal::SIGALRM,
    Signal::SIGTERM,
    Signal::SIGCHLD,
    Signal::SIGSTOP,
    Signal::SIGWINCH,
];

impl Signal {
    /// Every signal known to this crate
    pub fn all() -> &'static [Signal] {
        &ALL_SIGNALS
    }

    /// Convert from the platform signal number
    pub fn from_number(n: i32) -> SignalResult<Self> {
        let raw = nix::sys::signal::Signal::try_from(n).map_err(|_| SignalError::InvalidSignal(n))?;
        ALL_SIGNALS
            .iter()
            .copied()
            .find(|signal| signal.as_nix() == raw)
            .ok_or(SignalError::InvalidSignal(n))
    }

    /// Platform signal number
    pub fn number(&self) -> i32 {
        self.as_nix() as i32
    }

    pub(crate) fn as_nix(&self) -> nix::sys::signal::Signal {
        use nix::sys::signal::Signal as Raw;
        match self {
            Signal::SIGHUP => Raw::SIGHUP,
            Signal::SIGINT => Raw::SIGINT,
            Signal::SIGQUIT => Raw::SIGQUIT,
            Signal::SIGABRT => Raw::SIGABRT,
            Signal::SIGKILL => Raw::SIGKILL,
            Signal::SIGUSR1 => Raw::SIGUSR1,
            Signal::SIGUSR2 => Raw::SIGUSR2,
            Signal::SIGPIPE => Raw::SIGPIPE,
            Signal::SIGALRM => Raw::SIGALRM,
            Signal::SIGTERM => Raw::SIGTERM,
            Signal::SIGCHLD => Raw::SIGCHLD,
            Signal::SIGSTOP => Raw::SIGSTOP,
            Signal::SIGWINCH => Raw::SIGWINCH,
        }
    }

    /// Check if the OS will ever route this signal to the process
    pub fn can_catch(&self) -> bool {
        !matches!(self, Signal::SIGKILL | Signal::SIGSTOP)
    }

    /// Check if signal belongs to the shutdown group
    pub fn is_shutdown(&self) -> bool {
        SHUTDOWN_SIGNALS.contains(self)
    }

    /// Name without the `SIG` prefix
    pub fn short_name(&self) -> &'static str {
        match self {
            Signal::SIGHUP => "HUP",
            Signal::SIGINT => "INT",
            Signal::SIGQUIT => "QUIT",
            Signal::SIGABRT => "ABRT",
            Signal::SIGKILL => "KILL",
            Signal::SIGUSR1 => "USR1",
            Signal::SIGUSR2 => "USR2",
            Signal::SIGPIPE => "PIPE",
            Signal::SIGALRM => "ALRM",
            Signal::SIGTERM => "TERM",
            Signal::SIGCHLD => "CHLD",
            Signal::SIGSTOP => "STOP",
            Signal::SIGWINCH => "WINCH",
        }
    }

    /// Get human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Signal::SIGHUP => "Hangup",
            Signal::SIGINT => "Interrupt",
            Signal::SIGQUIT => "Quit",
            Signal::SIGABRT => "Aborted",
            Signal::SIGKILL => "Killed",
            Signal::SIGUSR1 => "User defined signal 1",
            Signal::SIGUSR2 => "User defined signal 2",
            Signal::SIGPIPE => "Broken pipe",
            Signal::SIGALRM => "Alarm clock",
            Signal::SIGTERM => "Terminated",
            Signal::SIGCHLD => "Child status changed",
            Signal::SIGSTOP => "Stopped (signal)",
            Signal::SIGWINCH => "Window size changed",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIG{}", self.short_name())
    }
}

impl FromStr for Signal {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let name = upper.strip_prefix("SIG").unwrap_or(&upper);
        ALL_SIGNALS
            .iter()
            .copied()
            .find(|signal| signal.short_name() == name)
            .ok_or_else(|| SignalError::UnknownName(s.to_string()))
    }
}

impl TryFrom<i32> for Signal {
    type Error = SignalError;

    fn try_from(n: i32) -> Result<Self, Self::Error> {
        Signal::from_number(n)
    }
}

/// Hook callback function type
pub type HookFn = Arc<dyn Fn(Signal) + Send + Sync>;

/// Identifies one registration made through `add_hook`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HookId(pub(crate) u64);

impl HookId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        HookId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hook#{}", self.0)
    }
}

/// Identifies one handler towards a `SignalSource`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Allocate a process-unique subscriber ID
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SubscriberId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscriber#{}", self.0)
    }
}

/// Signal statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalStats {
    pub signals_received: u64,
    pub signals_dispatched: u64,
    pub signals_ignored: u64,
    pub hooks_invoked: u64,
    pub hook_panics: u64,
    pub hooks_registered: usize,
    pub signals_registered: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_number_round_trip() {
        for signal in Signal::all() {
            assert_eq!(Signal::from_number(signal.number()).unwrap(), *signal);
        }
        assert_eq!(Signal::SIGINT.number(), libc::SIGINT);
        assert_eq!(Signal::SIGKILL.number(), libc::SIGKILL);
        assert!(Signal::from_number(0).is_err());
        assert!(Signal::from_number(-4).is_err());
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("SIGINT".parse::<Signal>().unwrap(), Signal::SIGINT);
        assert_eq!("term".parse::<Signal>().unwrap(), Signal::SIGTERM);
        assert_eq!(" Hup ".parse::<Signal>().unwrap(), Signal::SIGHUP);
        assert!(matches!(
            "SIGFOO".parse::<Signal>(),
            Err(SignalError::UnknownName(name)) if name == "SIGFOO"
        ));
    }

    #[test]
    fn test_shutdown_group() {
        assert_eq!(SHUTDOWN_SIGNALS.len(), 5);
        assert!(INTERRUPT.is_shutdown());
        assert!(KILL.is_shutdown());
        assert!(!Signal::SIGUSR1.is_shutdown());
        assert!(!KILL.can_catch());
        assert!(!Signal::SIGSTOP.can_catch());
        assert!(HANGUP.can_catch());
    }

    #[test]
    fn test_display() {
        assert_eq!(Signal::SIGQUIT.to_string(), "SIGQUIT");
        assert_eq!(HookId(7).to_string(), "hook#7");
    }
}
