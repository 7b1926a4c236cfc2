// Keymapper Key Action
// Value field of an EV_KEY event

use strum_macros::{Display, EnumString};

/// What happened to a key; the discriminant is the kernel event value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[repr(i32)]
pub enum Action {
    #[strum(serialize = "released")]
    Release = 0,
    #[strum(serialize = "pressed")]
    Press = 1,
    #[strum(serialize = "repeated")]
    Repeat = 2,
}

impl Action {
    /// Create Action from the evdev event value
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(Action::Release),
            1 => Some(Action::Press),
            2 => Some(Action::Repeat),
            _ => None,
        }
    }

    /// The evdev event value for this action
    pub fn value(self) -> i32 {
        self as i32
    }
}
