// Keymapper Log Record Scenarios
//
// The log lines are part of the daemon's observable behavior; these tests
// capture them and check level, target and wording.
//
// Run with: cargo test --test log_records

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use keymapper_core::{Action, Config, Daemon, DaemonOptions, DeviceIdentity, EVENT_LOG_TARGET};
use log::Level;

fn daemon(backend: &FakeBackend, config: &str) -> Daemon<FakeBackend> {
    let config = Config::from_toml(config).unwrap();
    let options = DaemonOptions {
        poll_interval: Duration::from_millis(10),
        read_timeout: Duration::from_millis(5),
    };
    Daemon::new(Arc::new(backend.clone()), config, options)
}

const CAPS2ESC: &str = r#"
[[device]]
id = "046d"
keymap = { KEY_CAPSLOCK = "KEY_ESC", KEY_Q = [] }
"#;

fn logitech() -> DeviceIdentity {
    DeviceIdentity::new(0x0003, 0x046d, 0xc52b, 0x0111)
}

#[test]
fn test_translated_key_is_logged_on_event_target() {
    capture_logs();
    let backend = FakeBackend::new();
    let keyboard = backend.plug("/dev/input/event3", "Logitech USB Receiver", logitech());
    let daemon = daemon(&backend, CAPS2ESC);

    daemon.discover();
    assert!(wait_until(|| keyboard.is_grabbed()));
    keyboard.press(KEY_CAPSLOCK, Action::Press);

    let expected = "Event device: /dev/input/event3 (0003:046d:c52b:0111) [KEY_CAPSLOCK] > [KEY_ESC] pressed";
    assert!(wait_until(|| !logged(expected).is_empty()));
    let record = &logged(expected)[0];
    assert_eq!(record.message, expected);
    assert_eq!(record.target, EVENT_LOG_TARGET);
    assert_eq!(record.level, Level::Info);
}

#[test]
fn test_suppressed_key_is_logged_with_empty_list() {
    capture_logs();
    let backend = FakeBackend::new();
    let keyboard = backend.plug("/dev/input/event5", "Logitech USB Receiver", logitech());
    let daemon = daemon(&backend, CAPS2ESC);

    daemon.discover();
    assert!(wait_until(|| keyboard.is_grabbed()));
    keyboard.press(KEY_Q, Action::Release);

    let expected = "Event device: /dev/input/event5 (0003:046d:c52b:0111) [KEY_Q] > [] released";
    assert!(wait_until(|| !logged(expected).is_empty()));
    assert_eq!(logged(expected)[0].target, EVENT_LOG_TARGET);
}

#[test]
fn test_device_lifecycle_is_logged() {
    capture_logs();
    let backend = FakeBackend::new();
    let keyboard = backend.plug("/dev/input/event6", "Logitech USB Receiver", logitech());
    let daemon = daemon(&backend, CAPS2ESC);

    daemon.discover();
    assert!(wait_until(|| keyboard.is_grabbed()));
    let found = logged("Found device: /dev/input/event6 (0003:046d:c52b:0111)");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].level, Level::Info);
    assert!(found[0].message.contains("\"Logitech USB Receiver\""));

    backend.unplug("/dev/input/event6");
    let missing = "Missing device: /dev/input/event6 (0003:046d:c52b:0111)";
    assert!(wait_until(|| !logged(missing).is_empty()));
    assert_eq!(logged(missing)[0].level, Level::Info);
}

#[test]
fn test_reaped_device_is_logged() {
    capture_logs();
    let backend = FakeBackend::new();
    let keyboard = backend.plug("/dev/input/event7", "Logitech USB Receiver", logitech());
    let daemon = daemon(&backend, CAPS2ESC);

    daemon.discover();
    assert!(wait_until(|| keyboard.is_grabbed()));
    backend.delist("/dev/input/event7");
    assert_eq!(daemon.reap(), 1);

    let removed = logged("Removed device: /dev/input/event7 (0003:046d:c52b:0111)");
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].level, Level::Info);
}

#[test]
fn test_busy_device_warns_once() {
    capture_logs();
    let backend = FakeBackend::new();
    backend.plug_busy("/dev/input/event8", "Logitech USB Receiver", logitech());
    let daemon = daemon(&backend, CAPS2ESC);

    daemon.discover();
    assert!(wait_until(|| daemon.registry().is_empty()));
    daemon.discover();
    daemon.discover();

    let dropped = logged("Dropping device /dev/input/event8");
    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0].level, Level::Warn);
}

#[test]
fn test_config_fallback_is_logged() {
    capture_logs();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    let config = Config::load(&path);
    assert_eq!(config.rules().len(), 1);

    let records = logged(&path.display().to_string());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].level, Level::Info);
    assert!(records[0].message.starts_with("Could not load configuration from"));
    assert!(records[0].message.ends_with("using default rule"));
}
