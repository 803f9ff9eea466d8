#![forbid(unsafe_code)]

//! Image Reaper (imgr) — background service that deletes container images no
//! container references, after a configurable grace period.
//!
//! The sweep is deliberately conservative: candidates are computed from a
//! snapshot, the daemon waits out a grace period, then re-checks container
//! usage before deleting anything. Images named by the configured allowlist
//! are never touched.
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use image_reaper::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use image_reaper::core::config::Config;
//! use image_reaper::sweep::scheduler::SweepScheduler;
//! ```

pub mod prelude;

pub mod core;
#[cfg(feature = "daemon")]
pub mod daemon;
pub mod logger;
pub mod runtime;
pub mod sweep;
