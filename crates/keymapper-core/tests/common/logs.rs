// Keymapper Test Support - Log Capture
// Process-wide logger that keeps every record for later assertions

use std::sync::Once;

use log::{Level, LevelFilter, Log, Metadata, Record};
use parking_lot::{const_mutex, Mutex};

/// One record as it reached the logger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captured {
    pub target: String,
    pub level: Level,
    pub message: String,
}

static RECORDS: Mutex<Vec<Captured>> = const_mutex(Vec::new());
static LOGGER: CaptureLogger = CaptureLogger;
static INIT: Once = Once::new();

struct CaptureLogger;

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        RECORDS.lock().push(Captured {
            target: record.target().to_string(),
            level: record.level(),
            message: record.args().to_string(),
        });
    }

    fn flush(&self) {}
}

/// Install the capturing logger; later calls are no-ops.
///
/// Tests in one binary share the logger, so assertions should filter on
/// something unique to the test (usually the device path).
pub fn capture_logs() {
    INIT.call_once(|| {
        log::set_logger(&LOGGER).expect("another logger is already installed");
        log::set_max_level(LevelFilter::Trace);
    });
}

/// Every captured record whose message contains `needle`
pub fn logged(needle: &str) -> Vec<Captured> {
    RECORDS
        .lock()
        .iter()
        .filter(|record| record.message.contains(needle))
        .cloned()
        .collect()
}
