/*!
 * OS Signal Delivery Tests
 * Real signals raised in-process and routed through `OsSignalSource`
 *
 * Signal dispositions are process-wide, so every test is serialised.
 */

use nix::sys::signal::{raise, Signal as NixSignal};
use pretty_assertions::assert_eq;
use serial_test::serial;
use sighook::{OsSignalSource, Signal, SignalHandler};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

#[test]
#[serial]
fn test_raised_signal_reaches_hook() {
    let handler = SignalHandler::new();
    let (tx, rx) = flume::unbounded();
    handler.add(
        move |signal| {
            let _ = tx.send(signal);
        },
        &[Signal::SIGUSR1],
    );

    raise(NixSignal::SIGUSR1).unwrap();

    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), Signal::SIGUSR1);
    handler.shutdown();
}

#[test]
#[serial]
fn test_two_handlers_both_receive() {
    let first = SignalHandler::new();
    let second = SignalHandler::new();
    let (tx, rx) = flume::unbounded();

    for (tag, handler) in [(1, &first), (2, &second)] {
        let tx = tx.clone();
        handler.add(
            move |_| {
                let _ = tx.send(tag);
            },
            &[Signal::SIGUSR2],
        );
    }
    assert_eq!(OsSignalSource::new().subscriber_count(Signal::SIGUSR2), 2);

    raise(NixSignal::SIGUSR2).unwrap();

    let mut tags = vec![
        rx.recv_timeout(TIMEOUT).unwrap(),
        rx.recv_timeout(TIMEOUT).unwrap(),
    ];
    tags.sort();
    assert_eq!(tags, vec![1, 2]);

    first.shutdown();
    second.shutdown();
    assert_eq!(OsSignalSource::new().subscriber_count(Signal::SIGUSR2), 0);
}

#[test]
#[serial]
fn test_repeated_add_subscribes_once() {
    let handler = SignalHandler::new();
    let (tx, rx) = flume::unbounded();

    for tag in 0..2 {
        let tx = tx.clone();
        handler.add(
            move |_| {
                let _ = tx.send(tag);
            },
            &[Signal::SIGUSR1],
        );
    }
    assert_eq!(OsSignalSource::new().subscriber_count(Signal::SIGUSR1), 1);

    raise(NixSignal::SIGUSR1).unwrap();
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), 0);
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), 1);
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    handler.shutdown();
}

#[test]
#[serial]
fn test_ignored_signal_is_discarded() {
    let handler = SignalHandler::new();
    let (tx, rx) = flume::unbounded();
    handler.add(
        move |signal| {
            let _ = tx.send(signal);
        },
        &[Signal::SIGUSR2],
    );
    handler.ignore(&[Signal::SIGUSR2]);

    // SIG_IGN keeps the default action (terminate) from running
    raise(NixSignal::SIGUSR2).unwrap();
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    handler.stop_ignoring();
    assert!(handler.ignored().is_empty());
    handler.shutdown();
}

#[test]
#[serial]
fn test_kill_is_rejected_but_hook_kept() {
    let handler = SignalHandler::new();
    handler.on_kill(|_| {});

    assert_eq!(handler.signals(), vec![Signal::SIGKILL]);
    assert!(!handler.is_listening());
    handler.shutdown();
}

#[test]
#[serial]
fn test_add_after_shutdown_leaves_disposition_alone() {
    let handler = SignalHandler::new();
    handler.shutdown();

    handler.add(|_| {}, &[Signal::SIGUSR1]);

    assert_eq!(OsSignalSource::new().subscriber_count(Signal::SIGUSR1), 0);
    assert!(!handler.is_listening());
}
