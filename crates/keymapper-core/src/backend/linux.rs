// Keymapper Linux Backend
// evdev input devices under /dev/input and uinput virtual devices

use std::fs;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, BusType, Device, EventType, InputEvent, InputId};

use super::{DeviceBackend, InputSource, OutputSink, VirtualDeviceSpec};
use crate::input::{DeviceCapabilities, DeviceIdentity, RawEvent};
use crate::key::KEY_MAX;
use crate::{Action, Key};

/// Directory holding the kernel's event device nodes
pub const INPUT_DIR: &str = "/dev/input";

/// Errors raised while setting up the backend
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("uinput is not available (is the uinput module loaded and /dev/uinput writable?): {0}")]
    Uinput(#[source] io::Error),
}

/// Backend over the real Linux input subsystem
#[derive(Debug, Clone)]
pub struct EvdevBackend {
    input_dir: PathBuf,
}

impl EvdevBackend {
    /// Create the backend, checking that virtual devices can be created.
    pub fn new() -> Result<Self, BackendError> {
        let _uinput = VirtualDeviceBuilder::new().map_err(BackendError::Uinput)?;
        Ok(Self::without_uinput_check())
    }

    /// Create the backend without probing uinput (for read-only listing)
    pub fn without_uinput_check() -> Self {
        Self {
            input_dir: PathBuf::from(INPUT_DIR),
        }
    }
}

impl DeviceBackend for EvdevBackend {
    type Input = EvdevInput;
    type Output = EvdevOutput;

    fn available_devices(&self) -> io::Result<Vec<PathBuf>> {
        let mut paths: Vec<(u32, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&self.input_dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(index) = file_name
                .to_str()
                .and_then(|name| name.strip_prefix("event"))
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };
            paths.push((index, entry.path()));
        }
        // event2 before event10
        paths.sort_unstable_by_key(|(index, _)| *index);
        Ok(paths.into_iter().map(|(_, path)| path).collect())
    }

    fn open(&self, path: &Path) -> io::Result<EvdevInput> {
        let device = Device::open(path)?;
        let name = device.name().unwrap_or("Unknown").to_string();
        Ok(EvdevInput { device, name })
    }

    fn create_virtual(&self, spec: &VirtualDeviceSpec) -> io::Result<EvdevOutput> {
        let mut keys = AttributeSet::<evdev::Key>::new();
        for key in spec.capabilities.keys.iter().filter(|k| k.code() <= KEY_MAX) {
            keys.insert(evdev::Key::new(key.code()));
        }

        let identity = spec.identity;
        let device = VirtualDeviceBuilder::new()?
            .name(&spec.name)
            .input_id(InputId::new(
                BusType::BUS_VIRTUAL,
                identity.vendor,
                identity.product,
                identity.version,
            ))
            .with_keys(&keys)?
            .build()?;

        log::debug!(
            "Created virtual device {:?} for {} with {} key(s)",
            spec.name,
            spec.source.display(),
            spec.capabilities.keys.len()
        );
        Ok(EvdevOutput { device })
    }
}

/// A physical evdev device
pub struct EvdevInput {
    device: Device,
    name: String,
}

impl InputSource for EvdevInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn identity(&self) -> DeviceIdentity {
        DeviceIdentity::from(self.device.input_id())
    }

    fn capabilities(&self) -> DeviceCapabilities {
        let event_types = self.device.supported_events().iter().map(|t| t.0);
        let keys = self
            .device
            .supported_keys()
            .map(|keys| keys.iter().map(|k| Key::from(k.code())).collect::<Vec<_>>())
            .unwrap_or_default();
        DeviceCapabilities::new(event_types, keys)
    }

    fn grab(&mut self) -> io::Result<()> {
        self.device.grab()
    }

    fn ungrab(&mut self) -> io::Result<()> {
        self.device.ungrab()
    }

    /// Waits with poll(2) so the caller can check its stop token between
    /// batches instead of blocking in read(2) indefinitely.
    fn read_events(&mut self, timeout: Duration) -> io::Result<Vec<RawEvent>> {
        let mut poll_fd = libc::pollfd {
            fd: self.device.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;

        let poll_result = unsafe { libc::poll(&mut poll_fd, 1, timeout_ms) };
        if poll_result < 0 {
            let err = io::Error::last_os_error();
            // A signal (e.g. Ctrl+C) interrupted the wait; the caller will
            // check its stop token and come back.
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(err);
        }
        if poll_result == 0 {
            return Ok(Vec::new());
        }

        if poll_fd.revents & libc::POLLIN == 0
            && poll_fd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0
        {
            return Err(io::Error::from_raw_os_error(libc::ENODEV));
        }

        Ok(self.device.fetch_events()?.map(RawEvent::from).collect())
    }
}

/// A uinput virtual device
pub struct EvdevOutput {
    device: VirtualDevice,
}

impl OutputSink for EvdevOutput {
    fn emit_keys(&mut self, keys: &[Key], action: Action) -> io::Result<()> {
        let events: Vec<InputEvent> = keys
            .iter()
            .map(|key| InputEvent::new(EventType::KEY, key.code(), action.value()))
            .collect();
        // emit() terminates the batch with a single SYN_REPORT
        self.device.emit(&events)
    }
}
