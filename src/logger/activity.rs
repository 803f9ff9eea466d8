//! Activity logger: a dedicated thread owning the JSONL writer.
//!
//! Every other thread sends `ActivityEvent` via a bounded crossbeam channel.
//! Non-blocking `try_send()` ensures the sweep loop is never blocked by
//! logging back-pressure; overflow increments a dropped-events counter that
//! the logger thread reports when it catches up.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{ReaperError, Result};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

/// Default bounded channel capacity for log events.
const CHANNEL_CAPACITY: usize = 1024;

// ──────────────────── public event type ────────────────────

/// Events that can be logged through the activity logger.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    DaemonStarted {
        version: String,
        config_hash: String,
    },
    DaemonStopped {
        reason: String,
        uptime_secs: u64,
    },
    PassStarted {
        pass: u64,
        examined: usize,
    },
    PassCompleted {
        pass: u64,
        removed: usize,
        failed: usize,
        duration_ms: u64,
    },
    ImageRemoved {
        image: String,
    },
    ImageRemovalFailed {
        image: String,
        error_code: String,
        error_message: String,
    },
    SweepRetried {
        phase: &'static str,
        backoff_secs: u64,
        error_code: String,
        error_message: String,
    },
    Error {
        code: String,
        message: String,
    },
    /// Sentinel to request graceful shutdown of the logger thread.
    Shutdown,
}

// ──────────────────── public handle ────────────────────

/// Thread-safe, cheaply-cloneable handle for sending log events.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Send an event to the logger thread. Non-blocking.
    ///
    /// If the channel is full the event is dropped and the dropped-events
    /// counter is incremented.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
        // Disconnected is fine during shutdown.
    }

    /// Number of events dropped due to channel back-pressure.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Request graceful shutdown of the logger thread.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

// ──────────────────── spawn ────────────────────

/// Spawn the logger thread and return a handle plus its join handle.
///
/// The logger thread runs until `handle.shutdown()` is called or all
/// senders are dropped.
pub fn spawn_logger(
    jsonl_config: JsonlConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(CHANNEL_CAPACITY);
    let dropped = Arc::new(AtomicU64::new(0));
    let dropped_clone = Arc::clone(&dropped);

    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: dropped,
    };

    let join = thread::Builder::new()
        .name("imgr-logger".to_string())
        .spawn(move || {
            logger_thread_main(rx, jsonl_config, dropped_clone);
        })
        .map_err(|e| ReaperError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

// ──────────────────── logger thread ────────────────────

fn logger_thread_main(
    rx: Receiver<ActivityEvent>,
    jsonl_config: JsonlConfig,
    dropped: Arc<AtomicU64>,
) {
    let mut jsonl = JsonlWriter::open(jsonl_config);

    while let Ok(event) = rx.recv() {
        // Report dropped events once we catch up.
        let d = dropped.swap(0, Ordering::Relaxed);
        if d > 0 {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!("{d} log events dropped due to back-pressure"));
            jsonl.write_entry(&warn);
        }

        if matches!(event, ActivityEvent::Shutdown) {
            break;
        }

        jsonl.write_entry(&event_to_log_entry(&event));
    }

    jsonl.flush();
}

// ──────────────────── event conversion ────────────────────

fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::DaemonStarted {
            version,
            config_hash,
        } => {
            let mut e = LogEntry::new(EventType::DaemonStart, Severity::Info);
            e.details = Some(format!("version={version} config_hash={config_hash}"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::DaemonStopped {
            reason,
            uptime_secs,
        } => {
            let mut e = LogEntry::new(EventType::DaemonStop, Severity::Info);
            e.details = Some(format!("reason={reason} uptime={uptime_secs}s"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::PassStarted { pass, examined } => {
            let mut e = LogEntry::new(EventType::PassStart, Severity::Info);
            e.examined = Some(*examined);
            e.details = Some(format!("pass={pass}"));
            e
        }
        ActivityEvent::PassCompleted {
            pass,
            removed,
            failed,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::PassComplete, Severity::Info);
            e.removed = Some(*removed);
            e.failed = Some(*failed);
            e.duration_ms = Some(*duration_ms);
            e.ok = Some(*failed == 0);
            e.details = Some(format!("pass={pass}"));
            e
        }
        ActivityEvent::ImageRemoved { image } => {
            let mut e = LogEntry::new(EventType::ImageRemove, Severity::Info);
            e.image = Some(image.clone());
            e.ok = Some(true);
            e
        }
        ActivityEvent::ImageRemovalFailed {
            image,
            error_code,
            error_message,
        } => {
            let mut e = LogEntry::new(EventType::ImageRemove, Severity::Warning);
            e.image = Some(image.clone());
            e.ok = Some(false);
            e.error_code = Some(error_code.clone());
            e.error_message = Some(error_message.clone());
            e
        }
        ActivityEvent::SweepRetried {
            phase,
            backoff_secs,
            error_code,
            error_message,
        } => {
            let mut e = LogEntry::new(EventType::SweepRetry, Severity::Warning);
            e.error_code = Some(error_code.clone());
            e.error_message = Some(error_message.clone());
            e.details = Some(format!("phase={phase} backoff={backoff_secs}s"));
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Critical);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e
        }
        ActivityEvent::Shutdown => LogEntry::new(EventType::DaemonStop, Severity::Info),
    }
}
