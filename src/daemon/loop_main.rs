//! Daemon orchestration: wiring the runtime client, logger thread, signal
//! handler, and sweep scheduler together for `imgr daemon`.
//!
//! Architecture: single process, two threads. The main thread runs the sweep
//! scheduler (every runtime call is blocking and strictly sequential); the
//! logger thread drains a bounded channel and writes JSONL. Signals flip
//! atomic flags that the scheduler polls at every phase boundary and wait
//! slice, so no phase blocks shutdown for longer than one wait slice plus
//! one runtime call.

#![allow(missing_docs)]

use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use crate::core::config::Config;
use crate::core::errors::Result;
use crate::daemon::signals::{SignalHandler, Watchdog};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle, spawn_logger};
use crate::logger::jsonl::JsonlConfig;
use crate::runtime::docker::DockerRuntime;
use crate::sweep::scheduler::{PassClock, SweepScheduler};

// ──────────────────── daemon configuration ────────────────────

/// Arguments for `imgr daemon` subcommand.
#[derive(Debug, Clone)]
pub struct DaemonArgs {
    /// Run in foreground (default, systemd manages backgrounding).
    pub foreground: bool,
    /// Optional PID file path for non-systemd setups.
    pub pidfile: Option<PathBuf>,
    /// Systemd watchdog timeout in seconds (0 = read WATCHDOG_USEC, or disable).
    pub watchdog_sec: u64,
}

impl Default for DaemonArgs {
    fn default() -> Self {
        Self {
            foreground: true,
            pidfile: None,
            watchdog_sec: 0,
        }
    }
}

// ──────────────────── daemon clock ────────────────────

/// Real-time clock that piggybacks watchdog heartbeats on every wait slice.
struct DaemonClock {
    watchdog: Watchdog,
}

impl PassClock for DaemonClock {
    fn sleep(&mut self, slice: Duration) {
        thread::sleep(slice);
        self.watchdog.beat("sweeping");
    }
}

// ──────────────────── main daemon struct ────────────────────

/// The image-reaper daemon: owns the runtime connection, logger thread, and
/// signal handler, and drives the sweep scheduler until shutdown.
pub struct ReaperDaemon {
    config: Config,
    runtime: DockerRuntime,
    logger_handle: ActivityLoggerHandle,
    logger_join: Option<thread::JoinHandle<()>>,
    signal_handler: SignalHandler,
    watchdog_sec: u64,
    pidfile: Option<PathBuf>,
    start_time: Instant,
}

impl ReaperDaemon {
    /// Build and initialize the daemon from configuration.
    ///
    /// A runtime connection failure is fatal here: the daemon refuses to
    /// start against an unreachable runtime rather than spin uselessly.
    pub fn init(config: Config, args: &DaemonArgs) -> Result<Self> {
        let start_time = Instant::now();

        // 1. Logger thread.
        let logger_config = JsonlConfig {
            path: config.paths.jsonl_log.clone(),
            ..JsonlConfig::default()
        };
        let (logger_handle, logger_join) = spawn_logger(logger_config)?;

        // 2. Signal handler.
        let signal_handler = SignalHandler::new();

        // 3. Runtime connection, verified with a ping.
        let runtime =
            DockerRuntime::connect(&config.runtime.host, config.runtime.connect_timeout_secs)?;
        eprintln!("[IMR-DAEMON] connected to runtime at {}", config.runtime.host);

        // 4. PID file for non-systemd setups.
        if let Some(pidfile) = &args.pidfile {
            fs::write(pidfile, format!("{}\n", std::process::id()))
                .map_err(|e| crate::core::errors::ReaperError::io(pidfile, e))?;
        }

        Ok(Self {
            config,
            runtime,
            logger_handle,
            logger_join: Some(logger_join),
            signal_handler,
            watchdog_sec: args.watchdog_sec,
            pidfile: args.pidfile.clone(),
            start_time,
        })
    }

    /// Run sweep passes until shutdown is requested.
    ///
    /// This is the main entry point for `imgr daemon`.
    pub fn run(&mut self) -> Result<()> {
        let config_hash = self.config.stable_hash().unwrap_or_default();
        self.logger_handle.send(ActivityEvent::DaemonStarted {
            version: env!("CARGO_PKG_VERSION").to_string(),
            config_hash,
        });
        eprintln!(
            "[IMR-DAEMON] started (interval={}s grace={}s locked=[{}])",
            self.config.sweep.interval_secs,
            self.config.sweep.grace_secs,
            self.config.sweep.locked_images,
        );

        // Zero falls through to WATCHDOG_USEC, or disables the watchdog.
        let watchdog = Watchdog::new(self.watchdog_sec);

        // ──────── sweep loop ────────
        let mut scheduler = SweepScheduler::new(
            &self.runtime,
            self.config.sweep.clone(),
            Box::new(DaemonClock { watchdog }),
            self.signal_handler.shutdown_flag(),
            self.signal_handler.sweep_flag(),
            Some(self.logger_handle.clone()),
        );
        scheduler.run();
        let passes = scheduler.passes_started();
        drop(scheduler);

        self.shutdown(passes);
        Ok(())
    }

    fn shutdown(&mut self, passes: u64) {
        let uptime_secs = self.start_time.elapsed().as_secs();

        self.logger_handle.send(ActivityEvent::DaemonStopped {
            reason: "clean shutdown".to_string(),
            uptime_secs,
        });

        // Stop the logger thread first so the DaemonStopped event reaches
        // the file before the process exits.
        self.logger_handle.shutdown();
        if let Some(join) = self.logger_join.take()
            && join.join().is_err()
        {
            eprintln!("[IMR-SHUTDOWN] logger thread panicked during flush");
        }

        if let Some(path) = &self.pidfile
            && let Err(e) = fs::remove_file(path)
        {
            eprintln!("[IMR-SHUTDOWN] could not remove pidfile {}: {e}", path.display());
        }

        eprintln!("[IMR-DAEMON] shutdown complete (uptime={uptime_secs}s passes={passes})");
    }
}
