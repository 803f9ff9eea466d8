//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use image_reaper::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{ReaperError, Result};

// Runtime
pub use crate::runtime::docker::DockerRuntime;
pub use crate::runtime::{ContainerDetail, ContainerRecord, ImageRecord, RuntimeClient};

// Sweep
pub use crate::sweep::candidates::CandidateSet;
pub use crate::sweep::deletion::{DeletionExecutor, DeletionReport};
pub use crate::sweep::locks::LockPattern;
pub use crate::sweep::scheduler::{PassClock, PassOutcome, PassReport, SweepScheduler};
