// Keymapper CLI
// Remaps every matching keyboard onto its own virtual device until stopped

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use keymapper_core::backend::{DeviceBackend, InputSource};
use keymapper_core::{
    is_virtual_device, match_rule, Config, Daemon, DaemonOptions, EvdevBackend,
    VIRTUAL_DEVICE_PREFIX,
};

/// Per-device keyboard remapper for Linux
#[derive(Parser, Debug)]
#[command(name = "keymapper")]
#[command(version)]
#[command(about = "Per-device keyboard remapper for Linux", long_about = None)]
struct Args {
    /// TOML or YAML configuration file
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Interval between device discovery passes
    #[arg(short, long, value_name = "MS", default_value_t = 500)]
    interval_ms: u64,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Validate config and exit
    #[arg(long)]
    check_config: bool,

    /// List input devices and the rule each one matches
    #[arg(long)]
    list_devices: bool,
}

impl Args {
    fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    fn options(&self) -> DaemonOptions {
        DaemonOptions {
            poll_interval: Duration::from_millis(self.interval_ms.max(1)),
            ..DaemonOptions::default()
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

fn check_config(path: &Path) -> anyhow::Result<()> {
    let config = Config::from_path(path)
        .with_context(|| format!("invalid configuration {}", path.display()))?;
    println!("Configuration is valid: {} rule(s)", config.rules().len());
    for rule in config.rules() {
        println!("  {}", rule);
    }
    Ok(())
}

fn list_devices(config: &Config) -> anyhow::Result<()> {
    let backend = EvdevBackend::without_uinput_check();
    let paths = backend
        .available_devices()
        .context("could not list input devices")?;

    println!("Found {} input device(s):", paths.len());
    for path in &paths {
        let input = match backend.open(path) {
            Ok(input) => input,
            Err(e) => {
                println!("  {}: <{}>", path.display(), e);
                continue;
            }
        };

        let identity = input.identity().to_string();
        let matched = if is_virtual_device(input.name(), VIRTUAL_DEVICE_PREFIX) {
            "ignored (keymapper virtual device)".to_string()
        } else {
            match match_rule(&identity, config.rules()) {
                Some(rule) => format!("rule {:?}", rule.pattern()),
                None => "no rule".to_string(),
            }
        };
        println!("  {}: {} ({}) {}", path.display(), input.name(), identity, matched);
    }
    Ok(())
}

fn spawn_signal_handler(daemon: Arc<Daemon<EvdevBackend>>) -> anyhow::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("could not install signal handler")?;
    std::thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                log::info!("Received signal {}, shutting down", signal);
                daemon.stop();
            }
        })
        .context("could not start signal thread")?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config_path = args.config_path();
    if args.check_config {
        return check_config(&config_path);
    }

    let config = Config::load(&config_path);
    if args.list_devices {
        return list_devices(&config);
    }

    let backend = EvdevBackend::new()?;
    let daemon = Arc::new(Daemon::new(Arc::new(backend), config, args.options()));
    spawn_signal_handler(Arc::clone(&daemon))?;

    daemon.run()?;
    log::info!("Stopped");
    Ok(())
}
