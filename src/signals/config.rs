/*!
 * Handler Configuration
 *
 * Environment overrides:
 * - SIGHOOK_CHANNEL_CAPACITY: delivery channel capacity (min 1)
 * - SIGHOOK_CATCH_PANICS: isolate panicking hooks (1/true/0/false)
 * - SIGHOOK_THREAD_NAME: name of the dispatch thread
 */

use tracing::warn;

/// Default delivery channel capacity
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Smallest capacity that never drops the first signal
pub const MIN_CHANNEL_CAPACITY: usize = 1;

/// Default dispatch thread name
pub const DEFAULT_THREAD_NAME: &str = "signal-dispatch";

/// Configuration for a `SignalHandler`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerConfig {
    /// Bounded delivery channel capacity (default: 16)
    pub channel_capacity: usize,

    /// Name of the dispatch thread (default: signal-dispatch)
    pub thread_name: String,

    /// Catch panics raised by hooks so later hooks still run (default: true)
    pub catch_panics: bool,
}

impl HandlerConfig {
    /// Create default configuration
    pub fn new() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            catch_panics: true,
        }
    }

    /// Single-slot channel, the smallest valid configuration
    pub fn minimal() -> Self {
        Self {
            channel_capacity: MIN_CHANNEL_CAPACITY,
            ..Self::new()
        }
    }

    /// Defaults overridden by SIGHOOK_* environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();

        if let Some(raw) = lookup("SIGHOOK_CHANNEL_CAPACITY") {
            match raw.trim().parse::<usize>() {
                Ok(capacity) => config = config.with_channel_capacity(capacity),
                Err(e) => warn!(value = %raw, error = %e, "Ignoring invalid SIGHOOK_CHANNEL_CAPACITY"),
            }
        }

        if let Some(raw) = lookup("SIGHOOK_CATCH_PANICS") {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => config.catch_panics = true,
                "0" | "false" | "no" => config.catch_panics = false,
                _ => warn!(value = %raw, "Ignoring invalid SIGHOOK_CATCH_PANICS"),
            }
        }

        if let Some(name) = lookup("SIGHOOK_THREAD_NAME") {
            if !name.trim().is_empty() {
                config.thread_name = name.trim().to_string();
            }
        }

        config
    }

    /// Set channel capacity, clamped to at least one slot
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(MIN_CHANNEL_CAPACITY);
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn with_catch_panics(mut self, catch_panics: bool) -> Self {
        self.catch_panics = catch_panics;
        self
    }
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_capacity_is_clamped() {
        assert_eq!(HandlerConfig::new().with_channel_capacity(0).channel_capacity, 1);
        assert_eq!(HandlerConfig::minimal().channel_capacity, 1);
    }

    #[test]
    fn test_env_overrides() {
        let config = HandlerConfig::from_lookup(lookup(&[
            ("SIGHOOK_CHANNEL_CAPACITY", "64"),
            ("SIGHOOK_CATCH_PANICS", "false"),
            ("SIGHOOK_THREAD_NAME", "sig"),
        ]));
        assert_eq!(config.channel_capacity, 64);
        assert!(!config.catch_panics);
        assert_eq!(config.thread_name, "sig");
    }

    #[test]
    fn test_invalid_env_keeps_defaults() {
        let config = HandlerConfig::from_lookup(lookup(&[
            ("SIGHOOK_CHANNEL_CAPACITY", "lots"),
            ("SIGHOOK_CATCH_PANICS", "maybe"),
            ("SIGHOOK_THREAD_NAME", "  "),
        ]));
        assert_eq!(config, HandlerConfig::new());
    }
}
