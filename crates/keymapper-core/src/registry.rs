// Keymapper Device Registry
// Bookkeeping of the devices currently under remapping control

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::config::MatchRule;
use crate::input::DeviceIdentity;

/// Errors returned by registry mutations
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Device already registered: {0}")]
    AlreadyRegistered(PathBuf),
}

/// Shared flag asking a device worker to stop.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A physical device currently under control.
///
/// The grabbed input handle and the virtual output device are owned by the
/// device's worker; this record is what the other loops see.
#[derive(Debug, Clone)]
pub struct ManagedDevice {
    path: PathBuf,
    identity: DeviceIdentity,
    rule: Arc<MatchRule>,
    session: u64,
    stop: StopToken,
}

impl ManagedDevice {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    pub fn rule(&self) -> &Arc<MatchRule> {
        &self.rule
    }

    /// Registration number, unique for the lifetime of the registry
    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn stop_token(&self) -> &StopToken {
        &self.stop
    }

    /// Ask the owning worker to release the device
    pub fn stop(&self) {
        self.stop.stop();
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    devices: Mutex<IndexMap<PathBuf, ManagedDevice>>,
    next_session: AtomicU64,
}

/// Map from device path to managed device, shared by the discovery loop,
/// the reap loop and every device worker. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device at `path`.
    ///
    /// Fails if `path` is already registered; the existing entry is left
    /// untouched and the caller keeps (and drops) its device handle.
    pub fn register(
        &self,
        path: impl Into<PathBuf>,
        identity: DeviceIdentity,
        rule: Arc<MatchRule>,
    ) -> Result<ManagedDevice, RegistryError> {
        let path = path.into();
        let mut devices = self.inner.devices.lock();
        if devices.contains_key(&path) {
            return Err(RegistryError::AlreadyRegistered(path));
        }

        let device = ManagedDevice {
            path: path.clone(),
            identity,
            rule,
            session: self.inner.next_session.fetch_add(1, Ordering::Relaxed),
            stop: StopToken::new(),
        };
        devices.insert(path, device.clone());
        Ok(device)
    }

    /// Remove the entry for `path`, returning it if it was present.
    ///
    /// Calling this twice is safe: the second call returns `None`.
    pub fn unregister(&self, path: &Path) -> Option<ManagedDevice> {
        self.inner.devices.lock().shift_remove(path)
    }

    /// Remove `device`'s entry only if it is still the same registration.
    ///
    /// A worker releasing its device must not remove a newer registration of
    /// the same path made after the device was reaped and plugged back in.
    pub fn release(&self, device: &ManagedDevice) -> bool {
        let mut devices = self.inner.devices.lock();
        match devices.get(device.path()) {
            Some(current) if current.session == device.session => {
                devices.shift_remove(device.path());
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.inner.devices.lock().contains_key(path)
    }

    pub fn get(&self, path: &Path) -> Option<ManagedDevice> {
        self.inner.devices.lock().get(path).cloned()
    }

    /// Point-in-time copy of the registry in registration order
    pub fn snapshot(&self) -> Vec<(PathBuf, ManagedDevice)> {
        self.inner
            .devices
            .lock()
            .iter()
            .map(|(path, device)| (path.clone(), device.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.devices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.devices.lock().is_empty()
    }
}
