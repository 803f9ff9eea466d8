//! Deletion executor: removes surviving candidates, tolerating per-image
//! failures.
//!
//! Each removal is attempted independently. A failure (image already gone,
//! or still referenced as another image's parent layer) is logged and does
//! not abort the remaining deletions; there is no in-pass retry — a failed
//! image simply becomes a candidate again next pass if still unreferenced.

#![allow(missing_docs)]

use std::time::{Duration, Instant};

use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::runtime::RuntimeClient;

// ──────────────────── report types ────────────────────

/// Summary after a deletion batch completes.
#[derive(Debug, Clone, Default)]
pub struct DeletionReport {
    pub attempted: usize,
    pub removed: usize,
    pub failed: usize,
    pub duration: Duration,
    pub errors: Vec<RemovalFailure>,
}

/// A single removal failure record.
#[derive(Debug, Clone)]
pub struct RemovalFailure {
    pub image_id: String,
    pub error_code: String,
    pub error_message: String,
}

// ──────────────────── executor ────────────────────

/// Removes a batch of candidate images through the runtime client.
pub struct DeletionExecutor {
    logger: Option<ActivityLoggerHandle>,
}

impl DeletionExecutor {
    /// Create an executor with an optional logger handle.
    pub fn new(logger: Option<ActivityLoggerHandle>) -> Self {
        Self { logger }
    }

    /// Remove every id in `image_ids`, independently.
    pub fn execute(&self, client: &dyn RuntimeClient, image_ids: &[String]) -> DeletionReport {
        let start = Instant::now();
        let mut report = DeletionReport {
            attempted: image_ids.len(),
            ..DeletionReport::default()
        };

        for id in image_ids {
            match client.remove_image(id) {
                Ok(()) => {
                    report.removed += 1;
                    self.log_event(ActivityEvent::ImageRemoved {
                        image: id.clone(),
                    });
                }
                Err(e) => {
                    report.failed += 1;
                    let failure = RemovalFailure {
                        image_id: id.clone(),
                        error_code: e.code().to_string(),
                        error_message: e.to_string(),
                    };
                    eprintln!("[IMR-SWEEP] failed to remove image {id}: {e}");
                    self.log_event(ActivityEvent::ImageRemovalFailed {
                        image: id.clone(),
                        error_code: failure.error_code.clone(),
                        error_message: failure.error_message.clone(),
                    });
                    report.errors.push(failure);
                }
            }
        }

        report.duration = start.elapsed();
        report
    }

    fn log_event(&self, event: ActivityEvent) {
        if let Some(logger) = &self.logger {
            logger.send(event);
        }
    }
}
