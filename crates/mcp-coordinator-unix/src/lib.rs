//! Unix process management for coordinator sessions

#[cfg(unix)]
mod unix_process_manager;

#[cfg(unix)]
pub use unix_process_manager::{UnixProcessHandle, UnixProcessManager};
