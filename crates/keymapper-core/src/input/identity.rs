// Keymapper Input Layer - Device Identity
// Hardware signature used to match devices against config rules

use std::fmt;

/// Hardware identity of an input device.
///
/// Rendered as four lowercase 4-hex-digit groups, e.g. `0003:046d:c52b:0111`
/// (bus type, vendor, product, version). The rendered form is what rule
/// patterns are matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    pub bus_type: u16,
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
}

impl DeviceIdentity {
    pub fn new(bus_type: u16, vendor: u16, product: u16, version: u16) -> Self {
        Self {
            bus_type,
            vendor,
            product,
            version,
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:04x}:{:04x}:{:04x}",
            self.bus_type, self.vendor, self.product, self.version
        )
    }
}

#[cfg(feature = "evdev-backend")]
impl From<evdev::InputId> for DeviceIdentity {
    fn from(id: evdev::InputId) -> Self {
        Self::new(id.bus_type().0, id.vendor(), id.product(), id.version())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_format() {
        let identity = DeviceIdentity::new(0x0003, 0x046d, 0xc52b, 0x0111);
        assert_eq!(identity.to_string(), "0003:046d:c52b:0111");
    }

    #[test]
    fn test_identity_format_pads_and_lowercases() {
        let identity = DeviceIdentity::new(0x11, 0x1, 0xABCD, 0);
        assert_eq!(identity.to_string(), "0011:0001:abcd:0000");
    }

    #[test]
    fn test_identity_format_max_values() {
        let identity = DeviceIdentity::new(u16::MAX, u16::MAX, u16::MAX, u16::MAX);
        assert_eq!(identity.to_string(), "ffff:ffff:ffff:ffff");
    }
}
