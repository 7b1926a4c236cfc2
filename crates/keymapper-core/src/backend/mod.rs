// Keymapper Device Backend
// The seam between the remapping core and the host input subsystem

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::input::{DeviceCapabilities, DeviceIdentity, RawEvent};
use crate::{Action, Key};

#[cfg(feature = "evdev-backend")]
pub mod linux;

#[cfg(feature = "evdev-backend")]
pub use linux::{BackendError, EvdevBackend, EvdevInput, EvdevOutput};

/// Everything needed to create the virtual twin of a physical device
#[derive(Debug, Clone)]
pub struct VirtualDeviceSpec {
    /// Path of the physical device being mirrored
    pub source: PathBuf,
    /// Name of the virtual device
    pub name: String,
    /// Identity of the physical device
    pub identity: DeviceIdentity,
    /// Keys (and event types) the virtual device must support
    pub capabilities: DeviceCapabilities,
}

/// Source of physical devices and sink for virtual ones.
pub trait DeviceBackend: Send + Sync + 'static {
    type Input: InputSource + 'static;
    type Output: OutputSink + 'static;

    /// Paths of every input device currently present
    fn available_devices(&self) -> io::Result<Vec<PathBuf>>;

    /// Open a physical device (without grabbing it)
    fn open(&self, path: &Path) -> io::Result<Self::Input>;

    /// Create a virtual device able to emit every key in `spec.capabilities`.
    ///
    /// The device is destroyed when the returned handle is dropped.
    fn create_virtual(&self, spec: &VirtualDeviceSpec) -> io::Result<Self::Output>;
}

/// An opened physical input device.
pub trait InputSource: Send {
    /// Device name as reported by the kernel
    fn name(&self) -> &str;

    fn identity(&self) -> DeviceIdentity;

    fn capabilities(&self) -> DeviceCapabilities;

    /// Take exclusive access to the device
    fn grab(&mut self) -> io::Result<()>;

    fn ungrab(&mut self) -> io::Result<()>;

    /// Wait up to `timeout` for events and return them in arrival order.
    ///
    /// An empty batch means the timeout elapsed. An error means the device
    /// can no longer be read (typically it was unplugged).
    fn read_events(&mut self, timeout: Duration) -> io::Result<Vec<RawEvent>>;
}

/// A virtual output device.
pub trait OutputSink: Send {
    /// Emit `keys` in order, all with `action`, followed by one
    /// synchronization so consumers receive them as one batch.
    fn emit_keys(&mut self, keys: &[Key], action: Action) -> io::Result<()>;
}

/// Exclusive grab on an input source, released when dropped.
pub struct Grab<'a, I: InputSource> {
    source: &'a mut I,
}

impl<'a, I: InputSource> Grab<'a, I> {
    /// Grab `source`; nothing needs releasing if this fails
    pub fn acquire(source: &'a mut I) -> io::Result<Self> {
        source.grab()?;
        Ok(Self { source })
    }

    pub fn source(&mut self) -> &mut I {
        self.source
    }
}

impl<I: InputSource> Drop for Grab<'_, I> {
    fn drop(&mut self) {
        // The device may already be gone; nothing left to release then.
        if let Err(e) = self.source.ungrab() {
            log::debug!("Ungrab of {} failed: {}", self.source.name(), e);
        }
    }
}
