/*!
 * Structured Tracing
 * Subscriber setup and per-dispatch spans using the tracing crate
 */

use crate::signals::Signal;
use std::time::Instant;
use tracing::{debug, info, span, Level, Span};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - SIGHOOK_TRACE_JSON: Enable JSON output (default: false)
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("SIGHOOK_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .init();
        info!("Structured tracing initialized with JSON output");
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .init();
        info!("Structured tracing initialized");
    }
}

/// Span covering one signal dispatch
///
/// Records how many hooks completed or panicked and the elapsed time when
/// dropped.
pub struct DispatchSpan {
    span: Span,
    start: Instant,
    signal: Signal,
}

impl DispatchSpan {
    pub fn new(signal: Signal, hooks: usize) -> Self {
        let span = span!(
            Level::DEBUG,
            "dispatch",
            signal = %signal,
            hooks = hooks,
            completed = tracing::field::Empty,
            panicked = tracing::field::Empty,
            duration_us = tracing::field::Empty,
        );

        Self {
            span,
            start: Instant::now(),
            signal,
        }
    }

    /// Enter the span for the duration of the returned guard
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }

    pub fn record_outcome(&self, completed: usize, panicked: usize) {
        self.span.record("completed", completed);
        self.span.record("panicked", panicked);
    }
}

impl Drop for DispatchSpan {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        self.span.record("duration_us", elapsed.as_micros() as u64);
        debug!(
            parent: &self.span,
            signal = %self.signal,
            duration_us = elapsed.as_micros() as u64,
            "Dispatch finished"
        );
    }
}
