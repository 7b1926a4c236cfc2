// Keymapper Event Handling
// Per-device remapping workers

pub mod worker;

pub use worker::{RemapWorker, WorkerError, WorkerExit, WorkerState, EVENT_LOG_TARGET};
