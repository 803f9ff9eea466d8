//! Signal handling: SIGTERM/SIGINT graceful shutdown, SIGUSR1 immediate
//! sweep trigger, and systemd watchdog heartbeat.
//!
//! Uses the `signal-hook` crate for safe signal registration. The scheduler
//! polls the shared flags at every phase boundary and wait slice rather than
//! blocking on signals. There is deliberately no SIGHUP reload: configuration
//! is immutable for the lifetime of the process, change it by restarting.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use signal_hook::consts::{SIGINT, SIGTERM};

// ──────────────────── signal handler ────────────────────

/// Thread-safe signal state shared between the signal handler and the sweep
/// loop.
///
/// All flags use `Ordering::Relaxed` because the loop polls them every wait
/// slice and exact ordering with other atomics is not required.
#[derive(Clone)]
pub struct SignalHandler {
    shutdown_flag: Arc<AtomicBool>,
    sweep_flag: Arc<AtomicBool>,
}

impl SignalHandler {
    /// Create a new handler and register OS signal hooks.
    ///
    /// SIGTERM/SIGINT -> shutdown, SIGUSR1 -> immediate sweep.
    /// Registration is best-effort; failures are logged to stderr but not
    /// fatal.
    pub fn new() -> Self {
        let handler = Self {
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            sweep_flag: Arc::new(AtomicBool::new(false)),
        };

        handler.register_signals();
        handler
    }

    /// Handler with no OS hooks registered, for tests and one-shot runs.
    pub fn detached() -> Self {
        Self {
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            sweep_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check whether a shutdown has been requested.
    pub fn should_shutdown(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }

    /// Programmatically request shutdown (e.g., from error escalation).
    pub fn request_shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
    }

    /// Programmatically request an immediate sweep.
    pub fn request_sweep(&self) {
        self.sweep_flag.store(true, Ordering::Relaxed);
    }

    /// Shared shutdown flag, for handing to the scheduler.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown_flag)
    }

    /// Shared sweep-now flag, for handing to the scheduler.
    pub fn sweep_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.sweep_flag)
    }

    fn register_signals(&self) {
        // SIGTERM / SIGINT -> shutdown
        if let Err(e) = signal_hook::flag::register(SIGTERM, Arc::clone(&self.shutdown_flag)) {
            eprintln!("[IMR-SIGNAL] failed to register SIGTERM: {e}");
        }
        if let Err(e) = signal_hook::flag::register(SIGINT, Arc::clone(&self.shutdown_flag)) {
            eprintln!("[IMR-SIGNAL] failed to register SIGINT: {e}");
        }

        // SIGUSR1 -> immediate sweep (Unix only)
        #[cfg(unix)]
        {
            use signal_hook::consts::SIGUSR1;
            if let Err(e) = signal_hook::flag::register(SIGUSR1, Arc::clone(&self.sweep_flag)) {
                eprintln!("[IMR-SIGNAL] failed to register SIGUSR1: {e}");
            }
        }
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

// ──────────────────── systemd watchdog ────────────────────

/// Systemd watchdog paced at half the configured timeout.
///
/// The sweep loop's clock calls [`Watchdog::beat`] on every wait slice; the
/// struct rate-limits the actual `sd_notify(WATCHDOG=1)` datagrams so systemd
/// sees one per half-timeout, not one per 250ms slice.
pub struct Watchdog {
    /// Time between notifications; `None` disables the watchdog entirely.
    period: Option<Duration>,
    last_beat: Instant,
}

impl Watchdog {
    /// Build from an explicit timeout in seconds. Zero falls back to the
    /// `WATCHDOG_USEC` environment variable systemd sets when the unit file
    /// carries `WatchdogSec=`; absent that too, the watchdog is disabled.
    pub fn new(watchdog_sec: u64) -> Self {
        let timeout = if watchdog_sec > 0 {
            Some(Duration::from_secs(watchdog_sec))
        } else {
            timeout_from_env()
        };
        Self {
            period: timeout.map(|t| t / 2),
            last_beat: Instant::now(),
        }
    }

    /// Watchdog that never notifies, for one-shot runs and tests.
    pub fn disabled() -> Self {
        Self {
            period: None,
            last_beat: Instant::now(),
        }
    }

    /// Record liveness; sends a notification if a full period has elapsed
    /// since the last one. Returns `true` when a notification went out.
    pub fn beat(&mut self, status: &str) -> bool {
        let Some(period) = self.period else {
            return false;
        };
        if self.last_beat.elapsed() < period {
            return false;
        }
        self.last_beat = Instant::now();
        notify_systemd(status);
        true
    }

    pub fn is_enabled(&self) -> bool {
        self.period.is_some()
    }
}

fn timeout_from_env() -> Option<Duration> {
    let usec = std::env::var("WATCHDOG_USEC").ok()?.parse::<u64>().ok()?;
    (usec > 0).then(|| Duration::from_micros(usec))
}

/// Fire a `WATCHDOG=1` datagram at `NOTIFY_SOCKET`. No-op when the socket is
/// not exported or the send fails; the watchdog must never take the daemon
/// down.
#[cfg(target_os = "linux")]
fn notify_systemd(status: &str) {
    use std::os::unix::net::UnixDatagram;

    let Ok(addr) = std::env::var("NOTIFY_SOCKET") else {
        return;
    };
    if addr.is_empty() {
        return;
    }
    if let Ok(sock) = UnixDatagram::unbound() {
        let payload = format!("WATCHDOG=1\nSTATUS={status}\n");
        let _ = sock.send_to(payload.as_bytes(), &addr);
    }
}

#[cfg(not(target_os = "linux"))]
fn notify_systemd(_status: &str) {}

// ──────────────────── tests ────────────────────
