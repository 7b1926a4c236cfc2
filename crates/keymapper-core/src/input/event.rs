// Keymapper Input Layer - Raw Events
// Backend-neutral input event and key event classification

use crate::{Action, Key};

/// EV_SYN event type code from input-event-codes.h
pub const EV_SYN: u16 = 0x00;

/// EV_KEY event type code from input-event-codes.h
pub const EV_KEY: u16 = 0x01;

/// EV_REL event type code from input-event-codes.h
pub const EV_REL: u16 = 0x02;

/// EV_MSC event type code from input-event-codes.h
pub const EV_MSC: u16 = 0x04;

/// Check if an event type is a key event.
pub fn is_key_event(event_type: u16) -> bool {
    event_type == EV_KEY
}

/// Raw input event as read from a physical device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    /// Event type (EV_KEY = 0x01)
    pub event_type: u16,
    /// Event code (the key code for EV_KEY)
    pub code: u16,
    /// Event value (0=Release, 1=Press, 2=Repeat for EV_KEY)
    pub value: i32,
}

impl RawEvent {
    pub fn new(event_type: u16, code: u16, value: i32) -> Self {
        Self {
            event_type,
            code,
            value,
        }
    }

    /// Build a key event
    pub fn key(key: Key, action: Action) -> Self {
        Self::new(EV_KEY, key.code(), action.value())
    }

    /// The key and its state, for key events with a known state.
    ///
    /// Returns `None` for every other event type, and for key events whose
    /// value is not a release, press or repeat.
    pub fn key_action(&self) -> Option<(Key, Action)> {
        if !is_key_event(self.event_type) {
            return None;
        }
        Action::from_value(self.value).map(|action| (Key::from(self.code), action))
    }
}

#[cfg(feature = "evdev-backend")]
impl From<evdev::InputEvent> for RawEvent {
    fn from(event: evdev::InputEvent) -> Self {
        Self::new(event.event_type().0, event.code(), event.value())
    }
}
