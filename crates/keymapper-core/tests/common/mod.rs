// Keymapper Test Support
// In-memory device backend for driving the daemon without hardware

#![allow(dead_code)]

mod logs;

pub use logs::{capture_logs, logged, Captured};

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;

use keymapper_core::backend::{DeviceBackend, InputSource, OutputSink, VirtualDeviceSpec};
use keymapper_core::input::event::{EV_KEY, EV_SYN};
use keymapper_core::{Action, DeviceCapabilities, DeviceIdentity, Key, RawEvent};

pub const KEY_ESC: Key = Key(1);
pub const KEY_Q: Key = Key(16);
pub const KEY_A: Key = Key(30);
pub const KEY_C: Key = Key(46);
pub const KEY_B: Key = Key(48);
pub const KEY_CAPSLOCK: Key = Key(58);

/// ENODEV, what a read on an unplugged evdev node fails with
const ENODEV: i32 = 19;
const EBUSY: i32 = 16;

/// uinput name buffer size; evdev refuses names that do not fit with a NUL
const UINPUT_MAX_NAME_SIZE: usize = 80;

/// Shared view of one fake physical device
#[derive(Debug, Default)]
pub struct DeviceState {
    pending: Mutex<VecDeque<RawEvent>>,
    unplugged: AtomicBool,
    grabbed: AtomicBool,
    grabs: AtomicUsize,
    ungrabs: AtomicUsize,
}

impl DeviceState {
    /// Queue a key event followed by a sync report
    pub fn press(&self, key: Key, action: Action) {
        let mut pending = self.pending.lock();
        pending.push_back(RawEvent::key(key, action));
        pending.push_back(RawEvent::new(EV_SYN, 0, 0));
    }

    /// Queue key down then key up
    pub fn tap(&self, key: Key) {
        self.press(key, Action::Press);
        self.press(key, Action::Release);
    }

    pub fn push(&self, event: RawEvent) {
        self.pending.lock().push_back(event);
    }

    pub fn is_grabbed(&self) -> bool {
        self.grabbed.load(Ordering::SeqCst)
    }

    pub fn grab_count(&self) -> usize {
        self.grabs.load(Ordering::SeqCst)
    }

    pub fn ungrab_count(&self) -> usize {
        self.ungrabs.load(Ordering::SeqCst)
    }
}

/// Shared view of one fake virtual device
#[derive(Debug)]
pub struct OutputState {
    pub spec: VirtualDeviceSpec,
    batches: Mutex<Vec<(Vec<Key>, Action)>>,
    open: AtomicBool,
}

impl OutputState {
    /// Every emitted batch; each one ended with a single sync
    pub fn batches(&self) -> Vec<(Vec<Key>, Action)> {
        self.batches.lock().clone()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
struct FakeDevice {
    name: String,
    identity: DeviceIdentity,
    keys: Vec<Key>,
    open_error: Option<io::ErrorKind>,
    grab_error: bool,
    state: Arc<DeviceState>,
}

#[derive(Debug, Default)]
struct BackendState {
    devices: IndexMap<PathBuf, FakeDevice>,
    outputs: Vec<Arc<OutputState>>,
    list_error: bool,
}

/// Scriptable stand-in for the evdev backend
#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<BackendState>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plug in a keyboard reporting KEY_ESC..KEY_Z
    pub fn plug(&self, path: &str, name: &str, identity: DeviceIdentity) -> Arc<DeviceState> {
        self.insert(path, name, identity, None, false)
    }

    /// Plug in a keyboard whose grab always fails
    pub fn plug_busy(&self, path: &str, name: &str, identity: DeviceIdentity) -> Arc<DeviceState> {
        self.insert(path, name, identity, None, true)
    }

    /// List a device node that cannot be opened
    pub fn plug_unreadable(&self, path: &str, kind: io::ErrorKind) {
        self.insert(path, "unreadable", DeviceIdentity::new(0, 0, 0, 0), Some(kind), false);
    }

    fn insert(
        &self,
        path: &str,
        name: &str,
        identity: DeviceIdentity,
        open_error: Option<io::ErrorKind>,
        grab_error: bool,
    ) -> Arc<DeviceState> {
        let state = Arc::new(DeviceState::default());
        let device = FakeDevice {
            name: name.to_string(),
            identity,
            keys: (1..=44).map(Key).collect(),
            open_error,
            grab_error,
            state: Arc::clone(&state),
        };
        self.state.lock().devices.insert(PathBuf::from(path), device);
        state
    }

    /// Remove the node and make pending reads fail
    pub fn unplug(&self, path: &str) {
        if let Some(device) = self.state.lock().devices.shift_remove(Path::new(path)) {
            device.state.unplugged.store(true, Ordering::SeqCst);
        }
    }

    /// Remove the node from listings only; reads keep timing out
    pub fn delist(&self, path: &str) {
        self.state.lock().devices.shift_remove(Path::new(path));
    }

    pub fn fail_listing(&self, fail: bool) {
        self.state.lock().list_error = fail;
    }

    pub fn outputs(&self) -> Vec<Arc<OutputState>> {
        self.state.lock().outputs.clone()
    }

    /// Virtual devices created for the physical device at `path`
    pub fn outputs_for(&self, path: &str) -> Vec<Arc<OutputState>> {
        self.outputs()
            .into_iter()
            .filter(|output| output.spec.source == Path::new(path))
            .collect()
    }

    /// Wait for the worker of `path` to create its virtual device
    pub fn wait_for_output(&self, path: &str) -> Arc<OutputState> {
        assert!(
            wait_until(|| !self.outputs_for(path).is_empty()),
            "no virtual device for {}",
            path
        );
        let mut outputs = self.outputs_for(path);
        outputs.remove(outputs.len() - 1)
    }
}

impl DeviceBackend for FakeBackend {
    type Input = FakeInput;
    type Output = FakeOutput;

    fn available_devices(&self) -> io::Result<Vec<PathBuf>> {
        let state = self.state.lock();
        if state.list_error {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        Ok(state.devices.keys().cloned().collect())
    }

    fn open(&self, path: &Path) -> io::Result<FakeInput> {
        let state = self.state.lock();
        let device = state
            .devices
            .get(path)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        if let Some(kind) = device.open_error {
            return Err(io::Error::from(kind));
        }
        Ok(FakeInput {
            device: device.clone(),
        })
    }

    fn create_virtual(&self, spec: &VirtualDeviceSpec) -> io::Result<FakeOutput> {
        if spec.name.len() + 1 >= UINPUT_MAX_NAME_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("device name too long: {} bytes", spec.name.len()),
            ));
        }
        let output = Arc::new(OutputState {
            spec: spec.clone(),
            batches: Mutex::new(Vec::new()),
            open: AtomicBool::new(true),
        });
        self.state.lock().outputs.push(Arc::clone(&output));
        Ok(FakeOutput { state: output })
    }
}

pub struct FakeInput {
    device: FakeDevice,
}

impl InputSource for FakeInput {
    fn name(&self) -> &str {
        &self.device.name
    }

    fn identity(&self) -> DeviceIdentity {
        self.device.identity
    }

    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities::new([EV_SYN, EV_KEY], self.device.keys.iter().copied())
    }

    fn grab(&mut self) -> io::Result<()> {
        if self.device.grab_error {
            return Err(io::Error::from_raw_os_error(EBUSY));
        }
        self.device.state.grabs.fetch_add(1, Ordering::SeqCst);
        self.device.state.grabbed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn ungrab(&mut self) -> io::Result<()> {
        self.device.state.ungrabs.fetch_add(1, Ordering::SeqCst);
        self.device.state.grabbed.store(false, Ordering::SeqCst);
        if self.device.state.unplugged.load(Ordering::SeqCst) {
            return Err(io::Error::from_raw_os_error(ENODEV));
        }
        Ok(())
    }

    fn read_events(&mut self, timeout: Duration) -> io::Result<Vec<RawEvent>> {
        if self.device.state.unplugged.load(Ordering::SeqCst) {
            return Err(io::Error::from_raw_os_error(ENODEV));
        }
        let events: Vec<RawEvent> = self.device.state.pending.lock().drain(..).collect();
        if events.is_empty() {
            thread::sleep(timeout);
        }
        Ok(events)
    }
}

pub struct FakeOutput {
    state: Arc<OutputState>,
}

impl OutputSink for FakeOutput {
    fn emit_keys(&mut self, keys: &[Key], action: Action) -> io::Result<()> {
        self.state.batches.lock().push((keys.to_vec(), action));
        Ok(())
    }
}

impl Drop for FakeOutput {
    fn drop(&mut self) {
        self.state.open.store(false, Ordering::SeqCst);
    }
}

/// Poll `condition` until it holds or two seconds pass
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
