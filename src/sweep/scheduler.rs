//! Sweep scheduler: the per-pass state machine and the forever loop.
//!
//! One pass runs `EnumeratingInitial → Locking → AwaitingGrace →
//! EnumeratingFinal → Deleting → CoolingDown`, strictly sequentially. The
//! grace window between the initial candidate computation and the final
//! usage re-check is the race-avoidance mechanism: an image that looked
//! unreferenced at snapshot time may belong to a container creation already
//! in flight, and the re-check rescues it before deletion.
//!
//! The loop polls a stop flag at every phase boundary and inside every wait
//! slice, so shutdown is honored even mid-grace. All sleeps go through the
//! injectable [`PassClock`] so tests drive passes without real delays.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::core::config::SweepConfig;
use crate::core::errors::ReaperError;
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::runtime::RuntimeClient;
use crate::sweep::candidates::CandidateSet;
use crate::sweep::deletion::{DeletionExecutor, DeletionReport};
use crate::sweep::locks::{LockPattern, apply_locks};
use crate::sweep::usage::{resolve_usage, snapshot_images};

/// Wait-slice granularity: how often waits re-check the stop flag.
const WAIT_SLICE: Duration = Duration::from_millis(250);

// ──────────────────── clock injection ────────────────────

/// Sleep provider for the scheduler's waits.
///
/// Called once per bounded slice during a wait, never for the full duration
/// at once. Implementations may piggyback periodic work on the callback
/// (the daemon's clock sends watchdog heartbeats here).
pub trait PassClock {
    fn sleep(&mut self, slice: Duration);
}

/// Real wall-clock sleeping.
#[derive(Debug, Default)]
pub struct SystemClock;

impl PassClock for SystemClock {
    fn sleep(&mut self, slice: Duration) {
        thread::sleep(slice);
    }
}

// ──────────────────── pass outcome ────────────────────

/// Summary of one completed pass.
#[derive(Debug, Clone)]
pub struct PassReport {
    /// Images seeded into the candidate set.
    pub examined: usize,
    /// Images successfully removed.
    pub removed: usize,
    /// Removal failures (tolerated; retried implicitly next pass).
    pub failed: usize,
    /// Wall time of the pass, waits included.
    pub duration: Duration,
}

/// Result of driving one pass to its end.
#[derive(Debug)]
pub enum PassOutcome {
    /// The pass ran to completion (possibly with per-image removal failures).
    Completed(PassReport),
    /// A phase failed; the pass must restart after `backoff`.
    Retry {
        phase: &'static str,
        backoff: Duration,
    },
    /// Shutdown was requested mid-pass.
    Interrupted,
}

// ──────────────────── scheduler ────────────────────

/// Drives cleanup passes against a runtime client until stopped.
pub struct SweepScheduler<'a> {
    client: &'a dyn RuntimeClient,
    config: SweepConfig,
    clock: Box<dyn PassClock + 'a>,
    stop: Arc<AtomicBool>,
    sweep_now: Arc<AtomicBool>,
    executor: DeletionExecutor,
    logger: Option<ActivityLoggerHandle>,
    pass_counter: u64,
}

impl<'a> SweepScheduler<'a> {
    /// Build a scheduler. `stop` and `sweep_now` are shared with the signal
    /// handler; `clock` is real time in production, instant in tests.
    pub fn new(
        client: &'a dyn RuntimeClient,
        config: SweepConfig,
        clock: Box<dyn PassClock + 'a>,
        stop: Arc<AtomicBool>,
        sweep_now: Arc<AtomicBool>,
        logger: Option<ActivityLoggerHandle>,
    ) -> Self {
        let executor = DeletionExecutor::new(logger.clone());
        Self {
            client,
            config,
            clock,
            stop,
            sweep_now,
            executor,
            logger,
            pass_counter: 0,
        }
    }

    /// Convenience constructor for one-shot use without signals or wakeups.
    pub fn one_shot(
        client: &'a dyn RuntimeClient,
        config: SweepConfig,
        logger: Option<ActivityLoggerHandle>,
    ) -> Self {
        Self::new(
            client,
            config,
            Box::new(SystemClock),
            Arc::new(AtomicBool::new(false)),
            Arc::new(AtomicBool::new(false)),
            logger,
        )
    }

    /// Number of passes started so far.
    pub fn passes_started(&self) -> u64 {
        self.pass_counter
    }

    /// Run passes forever, honoring retry backoffs and the cooldown between
    /// passes, until the stop flag is raised.
    pub fn run(&mut self) {
        while !self.stopped() {
            match self.run_once() {
                PassOutcome::Interrupted => break,
                PassOutcome::Retry { backoff, .. } => {
                    if !self.wait(backoff, false) {
                        break;
                    }
                }
                PassOutcome::Completed(report) => {
                    eprintln!(
                        "[IMR-SWEEP] pass {} done: {} of {} images removed ({} failed), next pass in {}s",
                        self.pass_counter,
                        report.removed,
                        report.examined,
                        report.failed,
                        self.config.interval_secs,
                    );
                    // CoolingDown. SIGUSR1 cuts this short.
                    if !self.wait(self.config.interval(), true) {
                        break;
                    }
                }
            }
        }
    }

    /// Drive a single pass through every phase.
    ///
    /// Public so tests and the `imgr sweep` subcommand can run exactly one
    /// pass; `run()` layers the retry/cooldown sleeps on top.
    pub fn run_once(&mut self) -> PassOutcome {
        let start = Instant::now();
        self.pass_counter += 1;
        let pass = self.pass_counter;

        // ──────── EnumeratingInitial ────────
        // Snapshot images; every image starts removable.
        let images = match snapshot_images(self.client) {
            Ok(images) => images,
            // Failure this early short-circuited normal pacing, so back off
            // by both configured periods.
            Err(e) => return self.retry("enumerate-initial", &e, self.combined_backoff()),
        };
        let mut candidates = CandidateSet::seed(images.iter().map(|img| img.id.clone()));
        self.log(ActivityEvent::PassStarted {
            pass,
            examined: candidates.len(),
        });

        // Resolve usage; any container's image is not removable.
        let in_use = match resolve_usage(self.client) {
            Ok(in_use) => in_use,
            Err(e) => return self.retry("usage-initial", &e, self.combined_backoff()),
        };
        for image_id in &in_use {
            candidates.exclude(image_id);
        }

        // ──────── Locking ────────
        // Matching runs against a fresh listing: tags can have moved since
        // the seeding snapshot. Exclusions land on the same candidate set.
        let patterns = LockPattern::parse_list(&self.config.locked_images);
        if !patterns.is_empty() {
            let fresh = match snapshot_images(self.client) {
                Ok(fresh) => fresh,
                Err(e) => return self.retry("lock-refresh", &e, self.combined_backoff()),
            };
            apply_locks(&mut candidates, &patterns, &fresh);
        }

        // ──────── AwaitingGrace ────────
        if !self.wait(self.config.grace(), false) {
            return PassOutcome::Interrupted;
        }

        // ──────── EnumeratingFinal ────────
        // Containers only; usage discovered during the grace window rescues
        // its image from the same candidate set. A failure here backs off by
        // the interval alone — the pass already paid the grace wait.
        let in_use_final = match resolve_usage(self.client) {
            Ok(in_use) => in_use,
            Err(e) => return self.retry("usage-final", &e, self.config.interval()),
        };
        for image_id in &in_use_final {
            candidates.exclude(image_id);
        }

        // ──────── Deleting ────────
        let mut victims = candidates.removable_ids();
        victims.sort_unstable();
        let deletion: DeletionReport = self.executor.execute(self.client, &victims);

        let report = PassReport {
            examined: candidates.len(),
            removed: deletion.removed,
            failed: deletion.failed,
            duration: start.elapsed(),
        };
        self.log(ActivityEvent::PassCompleted {
            pass,
            removed: report.removed,
            failed: report.failed,
            duration_ms: u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
        });
        PassOutcome::Completed(report)
    }

    // ──────────────────── helpers ────────────────────

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Backoff for failures before the grace wait.
    fn combined_backoff(&self) -> Duration {
        self.config.interval() + self.config.grace()
    }

    /// Interruptible wait. Returns `false` if shutdown was requested before
    /// the duration elapsed. With `allow_wake`, a pending sweep-now request
    /// ends the wait early (returning `true`).
    fn wait(&mut self, duration: Duration, allow_wake: bool) -> bool {
        let mut remaining = duration;
        while !remaining.is_zero() {
            if self.stopped() {
                return false;
            }
            if allow_wake && self.sweep_now.swap(false, Ordering::Relaxed) {
                eprintln!("[IMR-SWEEP] immediate sweep requested, cutting cooldown short");
                return true;
            }
            let slice = remaining.min(WAIT_SLICE);
            self.clock.sleep(slice);
            remaining -= slice;
        }
        !self.stopped()
    }

    fn retry(&self, phase: &'static str, error: &ReaperError, backoff: Duration) -> PassOutcome {
        eprintln!("[IMR-SWEEP] {phase} failed, retrying in {}s: {error}", backoff.as_secs());
        self.log(ActivityEvent::SweepRetried {
            phase,
            backoff_secs: backoff.as_secs(),
            error_code: error.code().to_string(),
            error_message: error.to_string(),
        });
        PassOutcome::Retry { phase, backoff }
    }

    fn log(&self, event: ActivityEvent) {
        if let Some(logger) = &self.logger {
            logger.send(event);
        }
    }
}
