// Keymapper Input Layer
// Device identity, capabilities, raw events and rule matching

mod device;
pub mod event;
mod identity;
mod matcher;

pub use device::{
    is_virtual_device, virtual_device_name, DeviceCapabilities, MAX_VIRTUAL_NAME_LEN,
    VIRTUAL_DEVICE_PREFIX,
};
pub use event::{is_key_event, RawEvent};
pub use identity::DeviceIdentity;
pub use matcher::match_rule;
