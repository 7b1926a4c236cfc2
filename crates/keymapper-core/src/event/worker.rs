// Keymapper Remap Worker
// Per-device loop: mirror, grab, stream, translate, tear down

use std::io;
use std::sync::Arc;
use std::time::Duration;

use strum_macros::Display;

use crate::backend::{DeviceBackend, Grab, InputSource, OutputSink, VirtualDeviceSpec};
use crate::input::virtual_device_name;
use crate::mapping::KeyList;
use crate::registry::{ManagedDevice, Registry};

/// Log target of the per-key translation records
pub const EVENT_LOG_TARGET: &str = "keymapper::event";

/// Lifecycle of one device worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum WorkerState {
    Starting,
    Grabbing,
    Streaming,
    Stopping,
    Failed,
}

/// Why a worker gave up its device
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("could not create virtual device: {0}")]
    VirtualDevice(#[source] io::Error),

    #[error("could not grab device: {0}")]
    Grab(#[source] io::Error),

    #[error("could not read device: {0}")]
    Read(#[source] io::Error),

    #[error("could not write to virtual device: {0}")]
    Write(#[source] io::Error),
}

/// How a worker ended
#[derive(Debug)]
pub enum WorkerExit {
    /// Stop token raised (device reaped or daemon shutting down)
    Stopped,
    Failed(WorkerError),
}

impl WorkerExit {
    pub fn state(&self) -> WorkerState {
        match self {
            WorkerExit::Stopped => WorkerState::Stopping,
            WorkerExit::Failed(_) => WorkerState::Failed,
        }
    }

    /// True when the device vanished while being read
    pub fn is_missing_device(&self) -> bool {
        matches!(self, WorkerExit::Failed(WorkerError::Read(_)))
    }

    /// True when another process holds the device exclusively
    pub fn is_grab_failure(&self) -> bool {
        matches!(self, WorkerExit::Failed(WorkerError::Grab(_)))
    }
}

/// Remaps the events of one managed device onto its own virtual device.
///
/// The worker owns the physical handle and the virtual device; whatever
/// way `run` exits, both are released and the registry entry is removed.
pub struct RemapWorker<B: DeviceBackend> {
    backend: Arc<B>,
    registry: Registry,
    device: ManagedDevice,
    input: B::Input,
    read_timeout: Duration,
}

impl<B: DeviceBackend> RemapWorker<B> {
    pub fn new(
        backend: Arc<B>,
        registry: Registry,
        device: ManagedDevice,
        input: B::Input,
        read_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            registry,
            device,
            input,
            read_timeout,
        }
    }

    /// Run until the device fails or the stop token is raised.
    pub fn run(self) -> WorkerExit {
        self.run_then(|_, _| {})
    }

    /// Like `run`, but calls `on_exit` before the registry entry is released.
    pub fn run_then(mut self, on_exit: impl FnOnce(&ManagedDevice, &WorkerExit)) -> WorkerExit {
        let exit = self.remap();

        // Grab and virtual device are already released here.
        self.report(&exit);
        on_exit(&self.device, &exit);
        if self.registry.release(&self.device) {
            log::debug!("Unregistered {}", self.device.path().display());
        }
        exit
    }

    fn remap(&mut self) -> WorkerExit {
        self.transition(WorkerState::Starting);
        let spec = VirtualDeviceSpec {
            source: self.device.path().to_path_buf(),
            name: virtual_device_name(self.input.name()),
            identity: self.device.identity(),
            capabilities: self
                .input
                .capabilities()
                .with_keys(self.device.rule().keymap().targets()),
        };
        let mut output = match self.backend.create_virtual(&spec) {
            Ok(output) => output,
            Err(e) => return WorkerExit::Failed(WorkerError::VirtualDevice(e)),
        };

        self.transition(WorkerState::Grabbing);
        let mut grab = match Grab::acquire(&mut self.input) {
            Ok(grab) => grab,
            Err(e) => return WorkerExit::Failed(WorkerError::Grab(e)),
        };

        log::debug!("{}: {}", self.device.path().display(), WorkerState::Streaming);
        stream(&self.device, grab.source(), &mut output, self.read_timeout)
    }

    fn transition(&self, state: WorkerState) {
        log::debug!("{}: {}", self.device.path().display(), state);
    }

    fn report(&self, exit: &WorkerExit) {
        let path = self.device.path().display();
        let identity = self.device.identity();
        self.transition(exit.state());

        match exit {
            WorkerExit::Stopped => log::info!("Released device: {} ({})", path, identity),
            WorkerExit::Failed(WorkerError::Read(e)) => {
                log::info!("Missing device: {} ({}): {}", path, identity, e)
            }
            WorkerExit::Failed(e) => log::warn!("Dropping device {} ({}): {}", path, identity, e),
        }
    }
}

/// Translate events until the source fails or the device is asked to stop.
fn stream<I: InputSource, O: OutputSink>(
    device: &ManagedDevice,
    input: &mut I,
    output: &mut O,
    read_timeout: Duration,
) -> WorkerExit {
    let keymap = device.rule().keymap();

    while !device.stop_token().is_stopped() {
        let events = match input.read_events(read_timeout) {
            Ok(events) => events,
            Err(e) => return WorkerExit::Failed(WorkerError::Read(e)),
        };

        for event in events {
            // Non-key events are not mirrored.
            let Some((key, action)) = event.key_action() else {
                continue;
            };

            let destinations = keymap.resolve(&key);
            if !destinations.is_empty() {
                if let Err(e) = output.emit_keys(destinations, action) {
                    return WorkerExit::Failed(WorkerError::Write(e));
                }
            }

            log::info!(
                target: EVENT_LOG_TARGET,
                "Event device: {} ({}) [{}] > {} {}",
                device.path().display(),
                device.identity(),
                key,
                KeyList(destinations),
                action
            );
        }
    }

    WorkerExit::Stopped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::RawEvent;
    use crate::{Action, Key};
    use std::collections::VecDeque;

    struct ScriptedInput {
        script: VecDeque<io::Result<Vec<RawEvent>>>,
    }

    impl InputSource for ScriptedInput {
        fn name(&self) -> &str {
            "scripted"
        }

        fn identity(&self) -> crate::input::DeviceIdentity {
            crate::input::DeviceIdentity::new(3, 1, 2, 3)
        }

        fn capabilities(&self) -> crate::input::DeviceCapabilities {
            crate::input::DeviceCapabilities::default()
        }

        fn grab(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn ungrab(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn read_events(&mut self, _timeout: Duration) -> io::Result<Vec<RawEvent>> {
            self.script
                .pop_front()
                .unwrap_or_else(|| Err(io::Error::from(io::ErrorKind::NotFound)))
        }
    }

    #[derive(Default)]
    struct RecordingOutput {
        batches: Vec<(Vec<Key>, Action)>,
        fail: bool,
    }

    impl OutputSink for RecordingOutput {
        fn emit_keys(&mut self, keys: &[Key], action: Action) -> io::Result<()> {
            if self.fail {
                return Err(io::Error::from(io::ErrorKind::BrokenPipe));
            }
            self.batches.push((keys.to_vec(), action));
            Ok(())
        }
    }

    fn managed(keymap: crate::mapping::Keymap) -> (Registry, ManagedDevice) {
        let registry = Registry::new();
        let rule = Arc::new(crate::config::MatchRule::new("^.*$", keymap).unwrap());
        let device = registry
            .register(
                "/dev/input/event0",
                crate::input::DeviceIdentity::new(3, 1, 2, 3),
                rule,
            )
            .unwrap();
        (registry, device)
    }

    #[test]
    fn test_stream_translates_then_fails_on_read_error() {
        let mut keymap = crate::mapping::Keymap::new();
        keymap.insert(Key(58), [Key(1)]);
        let (_registry, device) = managed(keymap);

        let mut input = ScriptedInput {
            script: VecDeque::from(vec![
                Ok(vec![
                    RawEvent::key(Key(58), Action::Press),
                    RawEvent::new(0, 0, 0),
                    RawEvent::key(Key(30), Action::Release),
                ]),
                Ok(vec![]),
            ]),
        };
        let mut output = RecordingOutput::default();

        let exit = stream(&device, &mut input, &mut output, Duration::from_millis(1));
        assert!(exit.is_missing_device());
        assert_eq!(
            output.batches,
            vec![
                (vec![Key(1)], Action::Press),
                (vec![Key(30)], Action::Release)
            ]
        );
    }

    #[test]
    fn test_stream_stops_on_token() {
        let (_registry, device) = managed(crate::mapping::Keymap::new());
        device.stop();

        let mut input = ScriptedInput {
            script: VecDeque::new(),
        };
        let mut output = RecordingOutput::default();
        let exit = stream(&device, &mut input, &mut output, Duration::from_millis(1));
        assert!(matches!(exit, WorkerExit::Stopped));
        assert_eq!(exit.state(), WorkerState::Stopping);
    }

    #[test]
    fn test_stream_write_error_fails() {
        let (_registry, device) = managed(crate::mapping::Keymap::new());
        let mut input = ScriptedInput {
            script: VecDeque::from(vec![Ok(vec![RawEvent::key(Key(30), Action::Press)])]),
        };
        let mut output = RecordingOutput {
            fail: true,
            ..Default::default()
        };

        let exit = stream(&device, &mut input, &mut output, Duration::from_millis(1));
        assert!(matches!(exit, WorkerExit::Failed(WorkerError::Write(_))));
        assert!(!exit.is_missing_device());
    }

    #[test]
    fn test_suppressed_key_emits_nothing() {
        let mut keymap = crate::mapping::Keymap::new();
        keymap.insert(Key(58), []);
        let (_registry, device) = managed(keymap);

        let mut input = ScriptedInput {
            script: VecDeque::from(vec![Ok(vec![RawEvent::key(Key(58), Action::Press)])]),
        };
        let mut output = RecordingOutput::default();
        stream(&device, &mut input, &mut output, Duration::from_millis(1));
        assert!(output.batches.is_empty());
    }

    #[test]
    fn test_worker_state_display() {
        assert_eq!(WorkerState::Streaming.to_string(), "Streaming");
        assert_eq!(WorkerState::Failed.to_string(), "Failed");
    }
}
