//! Daemon mode: signal handling, watchdog heartbeat, and the orchestration
//! that drives the sweep scheduler as a long-running process.

pub mod loop_main;
pub mod signals;
