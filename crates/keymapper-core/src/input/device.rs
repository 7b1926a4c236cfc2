// Keymapper Input Layer - Device Capabilities
// Capability sets used to build mirrored virtual devices

use std::collections::BTreeSet;

use crate::Key;

/// Name prefix of every virtual device this program creates.
pub const VIRTUAL_DEVICE_PREFIX: &str = "Keymapper (virtual)";

/// Longest uinput device name in bytes. The kernel buffer is 80 bytes and
/// evdev requires the name plus its NUL to stay below that.
pub const MAX_VIRTUAL_NAME_LEN: usize = 78;

/// Device capabilities extracted from an input device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// Supported event types (EV_* codes)
    pub event_types: BTreeSet<u16>,
    /// Supported key codes (EV_KEY capability codes)
    pub keys: BTreeSet<Key>,
}

impl DeviceCapabilities {
    pub fn new(
        event_types: impl IntoIterator<Item = u16>,
        keys: impl IntoIterator<Item = Key>,
    ) -> Self {
        Self {
            event_types: event_types.into_iter().collect(),
            keys: keys.into_iter().collect(),
        }
    }

    /// Check if a specific key is supported
    pub fn supports_key(&self, key: Key) -> bool {
        self.keys.contains(&key)
    }

    /// Whether the device reports any key at all
    pub fn has_keys(&self) -> bool {
        !self.keys.is_empty()
    }

    /// Extend the key set, e.g. with every key a keymap can emit.
    pub fn with_keys(mut self, keys: impl IntoIterator<Item = Key>) -> Self {
        self.keys.extend(keys);
        if !self.keys.is_empty() {
            self.event_types.insert(super::event::EV_KEY);
        }
        self
    }
}

/// Build the name of the virtual device that mirrors `physical_name`.
///
/// Long physical names are cut on a character boundary so the result fits
/// in `MAX_VIRTUAL_NAME_LEN` bytes.
pub fn virtual_device_name(physical_name: &str) -> String {
    let mut name = format!("{} {}", VIRTUAL_DEVICE_PREFIX, physical_name);
    if name.len() > MAX_VIRTUAL_NAME_LEN {
        let mut end = MAX_VIRTUAL_NAME_LEN;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        name.truncate(end);
    }
    name
}

/// Check if a device is a virtual device based on its name.
///
/// Virtual devices are created by keymapper itself and must be filtered out
/// to prevent feedback loops through a catch-all rule.
pub fn is_virtual_device(name: &str, prefix: &str) -> bool {
    name.starts_with(prefix)
}
