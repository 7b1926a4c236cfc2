// Keymapper Core Library
// Per-device key remapping for Linux evdev keyboards

pub mod action;
pub mod backend;
pub mod config;
pub mod daemon;
pub mod event;
pub mod input;
pub mod key;
pub mod mapping;
pub mod registry;

pub use action::Action;
pub use backend::{DeviceBackend, Grab, InputSource, OutputSink, VirtualDeviceSpec};
pub use config::{Config, ConfigError, ConfigSource, MatchRule, CATCH_ALL_PATTERN};
pub use daemon::{Daemon, DaemonError, DaemonOptions};
pub use event::{RemapWorker, WorkerError, WorkerExit, WorkerState, EVENT_LOG_TARGET};
pub use input::{
    is_key_event, is_virtual_device, match_rule, virtual_device_name, DeviceCapabilities,
    DeviceIdentity, RawEvent, MAX_VIRTUAL_NAME_LEN, VIRTUAL_DEVICE_PREFIX,
};
pub use key::Key;
pub use mapping::{Destinations, Keymap, KeyList};
pub use registry::{ManagedDevice, Registry, RegistryError, StopToken};

#[cfg(feature = "evdev-backend")]
pub use backend::{BackendError, EvdevBackend};
