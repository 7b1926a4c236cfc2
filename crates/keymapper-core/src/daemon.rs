// Keymapper Daemon
// Discovery and reap loops around the shared device registry

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::backend::{DeviceBackend, InputSource};
use crate::config::Config;
use crate::event::{RemapWorker, WorkerExit};
use crate::input::{is_virtual_device, match_rule, VIRTUAL_DEVICE_PREFIX};
use crate::registry::{ManagedDevice, Registry};

/// Longest time a sleeping loop goes without checking for `stop()`
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Timing knobs of the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonOptions {
    /// Delay between two discovery (and two reap) passes
    pub poll_interval: Duration,
    /// Longest a worker waits for input before checking its stop token
    pub read_timeout: Duration,
}

impl Default for DaemonOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            read_timeout: Duration::from_millis(100),
        }
    }
}

/// Errors that stop the daemon from running
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("could not start {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Coordinates discovery, reaping and the per-device workers.
pub struct Daemon<B: DeviceBackend> {
    backend: Arc<B>,
    config: Config,
    registry: Registry,
    options: DaemonOptions,
    running: AtomicBool,
    workers: Mutex<Vec<(ManagedDevice, JoinHandle<WorkerExit>)>>,
    /// Paths whose last open failed, so the warning is logged once
    open_failures: Mutex<HashSet<PathBuf>>,
    /// Paths held by another grab; skipped until they leave the listing
    busy: Arc<Mutex<HashSet<PathBuf>>>,
}

impl<B: DeviceBackend> Daemon<B> {
    pub fn new(backend: Arc<B>, config: Config, options: DaemonOptions) -> Self {
        Self {
            backend,
            config,
            registry: Registry::new(),
            options,
            running: AtomicBool::new(true),
            workers: Mutex::new(Vec::new()),
            open_failures: Mutex::new(HashSet::new()),
            busy: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn options(&self) -> DaemonOptions {
        self.options
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask `run()` and both loops to return. Workers are released by
    /// `shutdown()`, which `run()` calls on its way out.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Number of worker threads still running
    pub fn active_workers(&self) -> usize {
        self.workers
            .lock()
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .count()
    }

    /// Run the discovery and reap loops until `stop()` is called, then
    /// release every device. Blocks on the loop threads, which return
    /// within `STOP_CHECK_INTERVAL` of a stop.
    pub fn run(self: &Arc<Self>) -> Result<(), DaemonError> {
        log::info!(
            "Watching for devices every {}ms",
            self.options.poll_interval.as_millis()
        );

        let discovery = self.spawn_periodic("discovery", Self::discover)?;
        let reap = match self.spawn_periodic("reap", Self::reap) {
            Ok(handle) => handle,
            Err(e) => {
                self.stop();
                let _ = discovery.join();
                self.shutdown();
                return Err(e);
            }
        };

        for handle in [discovery, reap] {
            if handle.join().is_err() {
                log::error!("A device polling thread panicked");
            }
        }
        self.shutdown();
        Ok(())
    }

    /// One discovery pass: register and start a worker for every available,
    /// unmanaged device that matches a rule. Returns how many were started.
    pub fn discover(&self) -> usize {
        if !self.is_running() {
            return 0;
        }
        self.prune_workers();

        let paths = match self.backend.available_devices() {
            Ok(paths) => paths,
            Err(e) => {
                log::warn!("Could not list input devices: {}", e);
                return 0;
            }
        };
        self.open_failures.lock().retain(|path| paths.contains(path));
        self.busy.lock().retain(|path| paths.contains(path));

        let managed: HashSet<PathBuf> = self
            .registry
            .snapshot()
            .into_iter()
            .map(|(path, _)| path)
            .collect();

        paths
            .iter()
            .filter(|path| !managed.contains(*path))
            .filter(|path| self.adopt(path))
            .count()
    }

    /// Open, match, register and start a worker for one candidate path.
    fn adopt(&self, path: &Path) -> bool {
        if self.busy.lock().contains(path) {
            log::trace!("Skipping busy device {}", path.display());
            return false;
        }

        let input = match self.backend.open(path) {
            Ok(input) => {
                self.open_failures.lock().remove(path);
                input
            }
            Err(e) => {
                if self.open_failures.lock().insert(path.to_path_buf()) {
                    log::warn!("Skipping device {}: {}", path.display(), e);
                } else {
                    log::debug!("Skipping device {}: {}", path.display(), e);
                }
                return false;
            }
        };

        if is_virtual_device(input.name(), VIRTUAL_DEVICE_PREFIX) {
            log::trace!("Ignoring own virtual device {}", path.display());
            return false;
        }

        let identity = input.identity();
        let id = identity.to_string();
        let Some(rule) = match_rule(&id, self.config.rules()) else {
            log::trace!("No rule matches {} ({})", path.display(), id);
            return false;
        };

        let device = match self.registry.register(path, identity, Arc::clone(rule)) {
            Ok(device) => device,
            Err(e) => {
                log::debug!("{}", e);
                return false;
            }
        };

        log::info!(
            "Found device: {} ({}) {:?} matching {:?}",
            path.display(),
            id,
            input.name(),
            rule.pattern()
        );
        self.spawn_worker(device, input)
    }

    fn spawn_worker(&self, device: ManagedDevice, input: B::Input) -> bool {
        let worker = RemapWorker::new(
            Arc::clone(&self.backend),
            self.registry.clone(),
            device.clone(),
            input,
            self.options.read_timeout,
        );

        let busy = Arc::clone(&self.busy);
        let spawned = thread::Builder::new()
            .name(format!("remap {}", device.path().display()))
            .spawn(move || {
                worker.run_then(|device, exit| {
                    if exit.is_grab_failure() {
                        log::info!("Leaving {} alone until it is replugged", device.path().display());
                        busy.lock().insert(device.path().to_path_buf());
                    }
                })
            });

        match spawned {
            Ok(handle) => {
                self.workers.lock().push((device, handle));
                true
            }
            Err(e) => {
                log::error!(
                    "Could not start worker for {}: {}",
                    device.path().display(),
                    e
                );
                self.registry.release(&device);
                false
            }
        }
    }

    /// One reap pass: unregister every managed device whose path is gone and
    /// stop its worker. Returns how many were removed.
    pub fn reap(&self) -> usize {
        let available: HashSet<PathBuf> = match self.backend.available_devices() {
            Ok(paths) => paths.into_iter().collect(),
            Err(e) => {
                log::warn!("Could not list input devices: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        for (path, _) in self.registry.snapshot() {
            if available.contains(&path) {
                continue;
            }
            // The worker may have noticed first and unregistered itself.
            if let Some(device) = self.registry.unregister(&path) {
                device.stop();
                log::info!("Removed device: {} ({})", path.display(), device.identity());
                removed += 1;
            }
        }
        removed
    }

    /// Stop every worker and wait for it to release its device.
    pub fn shutdown(&self) {
        self.stop();
        loop {
            let workers = std::mem::take(&mut *self.workers.lock());
            if workers.is_empty() {
                break;
            }
            for (device, _) in &workers {
                device.stop();
            }
            for (device, handle) in workers {
                self.join_worker(device, handle);
            }
        }
    }

    fn prune_workers(&self) {
        let finished: Vec<_> = {
            let mut workers = self.workers.lock();
            let (finished, running) = workers
                .drain(..)
                .partition(|(_, handle)| handle.is_finished());
            *workers = running;
            finished
        };
        for (device, handle) in finished {
            self.join_worker(device, handle);
        }
    }

    fn join_worker(&self, device: ManagedDevice, handle: JoinHandle<WorkerExit>) {
        if handle.join().is_err() {
            log::error!("Worker for {} panicked", device.path().display());
            self.registry.release(&device);
        }
    }

    fn spawn_periodic(
        self: &Arc<Self>,
        name: &'static str,
        tick: fn(&Self) -> usize,
    ) -> Result<JoinHandle<()>, DaemonError> {
        let daemon = Arc::clone(self);
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while daemon.is_running() {
                    tick(&daemon);
                    daemon.sleep_while_running(daemon.options.poll_interval);
                }
            })
            .map_err(|source| DaemonError::Spawn { name, source })
    }

    fn sleep_while_running(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while self.is_running() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(STOP_CHECK_INTERVAL));
        }
    }
}

impl<B: DeviceBackend> Drop for Daemon<B> {
    /// Devices must never stay grabbed after the daemon is gone.
    fn drop(&mut self) {
        self.shutdown();
    }
}
