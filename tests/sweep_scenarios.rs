//! Full-pass sweep scenarios against a scripted in-memory runtime.
//!
//! These exercise the whole pipeline (candidate seeding, usage resolution,
//! lock matching, grace re-check, deletion) through `SweepScheduler::run_once`
//! with grace set to zero so passes finish instantly. Mid-grace state changes
//! are modeled by switching the container list after the first usage
//! resolution, since the final re-check is the only observer of the grace
//! window.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use image_reaper::core::config::SweepConfig;
use image_reaper::core::errors::{ReaperError, Result};
use image_reaper::runtime::{ContainerDetail, ContainerRecord, ImageRecord, RuntimeClient};
use image_reaper::sweep::scheduler::{PassClock, PassOutcome, SweepScheduler};

// ──────────────────── fake runtime ────────────────────

#[derive(Default)]
struct FakeState {
    /// Current image list: (id, repo_tags).
    images: Vec<(String, Vec<String>)>,
    /// Current containers: (container id, image id).
    containers: Vec<(String, String)>,
    /// Swapped in for the second and later `list_containers` calls, modeling
    /// containers created or destroyed during the grace window.
    containers_after_grace: Option<Vec<(String, String)>>,
    /// Container ids whose inspection fails.
    inspect_failures: HashSet<String>,
    /// Image ids whose removal fails.
    remove_failures: HashSet<String>,
    /// `list_containers` call on which to fail (1-based), once.
    fail_list_containers_on_call: Option<usize>,
    /// Every call in order: "list_images", "list_containers", "inspect:<id>",
    /// "remove:<id>".
    calls: Vec<String>,
    removed: Vec<String>,
    list_containers_calls: usize,
}

struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    fn new(images: &[(&str, &[&str])], containers: &[(&str, &str)]) -> Self {
        let state = FakeState {
            images: images
                .iter()
                .map(|&(id, tags)| {
                    (
                        id.to_string(),
                        tags.iter().map(ToString::to_string).collect(),
                    )
                })
                .collect(),
            containers: containers
                .iter()
                .map(|&(cid, img)| (cid.to_string(), img.to_string()))
                .collect(),
            ..FakeState::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    fn removed(&self) -> Vec<String> {
        self.with(|s| s.removed.clone())
    }

    fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }
}

impl RuntimeClient for FakeRuntime {
    fn list_images(&self) -> Result<Vec<ImageRecord>> {
        self.with(|s| {
            s.calls.push("list_images".to_string());
            Ok(s.images
                .iter()
                .map(|(id, tags)| ImageRecord {
                    id: id.clone(),
                    repo_tags: tags.clone(),
                })
                .collect())
        })
    }

    fn list_containers(&self) -> Result<Vec<ContainerRecord>> {
        self.with(|s| {
            s.calls.push("list_containers".to_string());
            s.list_containers_calls += 1;
            if s.fail_list_containers_on_call == Some(s.list_containers_calls) {
                return Err(ReaperError::Enumeration {
                    what: "containers",
                    details: "daemon unavailable".to_string(),
                });
            }
            if s.list_containers_calls >= 2 {
                if let Some(after) = &s.containers_after_grace {
                    return Ok(after
                        .iter()
                        .map(|(cid, _)| ContainerRecord { id: cid.clone() })
                        .collect());
                }
            }
            Ok(s.containers
                .iter()
                .map(|(cid, _)| ContainerRecord { id: cid.clone() })
                .collect())
        })
    }

    fn inspect_container(&self, id: &str) -> Result<ContainerDetail> {
        self.with(|s| {
            s.calls.push(format!("inspect:{id}"));
            if s.inspect_failures.contains(id) {
                return Err(ReaperError::Inspect {
                    container: id.to_string(),
                    details: "no such container".to_string(),
                });
            }
            let source = if s.list_containers_calls >= 2 {
                s.containers_after_grace.as_ref().unwrap_or(&s.containers)
            } else {
                &s.containers
            };
            source
                .iter()
                .find(|(cid, _)| cid == id)
                .map(|(cid, img)| ContainerDetail {
                    id: cid.clone(),
                    image_id: img.clone(),
                })
                .ok_or_else(|| ReaperError::Inspect {
                    container: id.to_string(),
                    details: "no such container".to_string(),
                })
        })
    }

    fn remove_image(&self, id: &str) -> Result<()> {
        self.with(|s| {
            s.calls.push(format!("remove:{id}"));
            if s.remove_failures.contains(id) {
                return Err(ReaperError::Removal {
                    image: id.to_string(),
                    details: "image is being used".to_string(),
                });
            }
            s.removed.push(id.to_string());
            Ok(())
        })
    }
}

// ──────────────────── harness ────────────────────

struct NoopClock;

impl PassClock for NoopClock {
    fn sleep(&mut self, _slice: Duration) {}
}

fn config(interval: u64, grace: u64, locked: &str) -> SweepConfig {
    SweepConfig {
        interval_secs: interval,
        grace_secs: grace,
        locked_images: locked.to_string(),
    }
}

fn run_pass(runtime: &FakeRuntime, config: SweepConfig) -> PassOutcome {
    let mut scheduler = SweepScheduler::new(
        runtime,
        config,
        Box::new(NoopClock),
        Arc::new(AtomicBool::new(false)),
        Arc::new(AtomicBool::new(false)),
        None,
    );
    scheduler.run_once()
}

fn completed(outcome: PassOutcome) -> image_reaper::sweep::scheduler::PassReport {
    match outcome {
        PassOutcome::Completed(report) => report,
        other => panic!("expected completed pass, got {other:?}"),
    }
}

// ──────────────────── happy-path scenarios ────────────────────

#[test]
fn unreferenced_image_is_removed() {
    let runtime = FakeRuntime::new(&[("img-a", &["app:1.0"])], &[]);

    let report = completed(run_pass(&runtime, config(1, 0, "")));
    assert_eq!(report.examined, 1);
    assert_eq!(report.removed, 1);
    assert_eq!(runtime.removed(), vec!["img-a"]);
}

#[test]
fn image_held_by_container_survives() {
    let runtime = FakeRuntime::new(
        &[("img-a", &["app:1.0"]), ("img-b", &["other:2.0"])],
        &[("c1", "img-a")],
    );

    let report = completed(run_pass(&runtime, config(1, 0, "")));
    assert_eq!(report.examined, 2);
    assert_eq!(report.removed, 1);
    assert_eq!(runtime.removed(), vec!["img-b"]);
}

#[test]
fn image_held_by_stopped_container_survives() {
    // The fake reports every container regardless of state, mirroring the
    // all-states listing the scheduler requires. A container counts as usage
    // no matter its lifecycle state.
    let runtime = FakeRuntime::new(&[("img-a", &["app:1.0"])], &[("c-stopped", "img-a")]);

    let report = completed(run_pass(&runtime, config(1, 0, "")));
    assert_eq!(report.removed, 0);
    assert!(runtime.removed().is_empty());
}

#[test]
fn container_created_during_grace_rescues_image() {
    let runtime = FakeRuntime::new(&[("img-a", &["app:1.0"])], &[]);
    runtime.with(|s| {
        s.containers_after_grace = Some(vec![("c-new".to_string(), "img-a".to_string())]);
    });

    let report = completed(run_pass(&runtime, config(1, 0, "")));
    assert_eq!(report.removed, 0);
    assert!(runtime.removed().is_empty());
}

#[test]
fn container_destroyed_during_grace_does_not_free_image_this_pass() {
    // Usage exclusions accumulate within a pass: once excluded, an image
    // stays excluded even if its container vanished by the final re-check.
    // It becomes eligible again next pass.
    let runtime = FakeRuntime::new(&[("img-a", &["app:1.0"])], &[("c1", "img-a")]);
    runtime.with(|s| s.containers_after_grace = Some(Vec::new()));

    let report = completed(run_pass(&runtime, config(1, 0, "")));
    assert_eq!(report.removed, 0);
    assert!(runtime.removed().is_empty());
}

#[test]
fn second_pass_after_removal_is_a_no_op() {
    let runtime = FakeRuntime::new(&[("img-a", &["app:1.0"])], &[]);

    let first = completed(run_pass(&runtime, config(1, 0, "")));
    assert_eq!(first.removed, 1);

    // Reflect the removal in the fake's image list.
    runtime.with(|s| s.images.retain(|(id, _)| id != "img-a"));

    let second = completed(run_pass(&runtime, config(1, 0, "")));
    assert_eq!(second.examined, 0);
    assert_eq!(second.removed, 0);
    assert_eq!(runtime.removed(), vec!["img-a"]);
}

// ──────────────────── lock scenarios ────────────────────

#[test]
fn exact_lock_protects_only_that_tag() {
    let runtime = FakeRuntime::new(
        &[("img-a", &["app:1.0"]), ("img-b", &["app:2.0"])],
        &[],
    );

    let report = completed(run_pass(&runtime, config(1, 0, "app:1.0")));
    assert_eq!(report.removed, 1);
    assert_eq!(runtime.removed(), vec!["img-b"]);
}

#[test]
fn repository_lock_protects_every_tag() {
    let runtime = FakeRuntime::new(
        &[
            ("img-a", &["app:1.0"]),
            ("img-b", &["app:2.0"]),
            ("img-c", &["other:1.0"]),
        ],
        &[],
    );

    let report = completed(run_pass(&runtime, config(1, 0, "app")));
    assert_eq!(report.removed, 1);
    assert_eq!(runtime.removed(), vec!["img-c"]);
}

#[test]
fn repository_lock_requires_exact_repository_name() {
    // "app" must not lock "application:1.0".
    let runtime = FakeRuntime::new(&[("img-a", &["application:1.0"])], &[]);

    let report = completed(run_pass(&runtime, config(1, 0, "app")));
    assert_eq!(report.removed, 1);
    assert_eq!(runtime.removed(), vec!["img-a"]);
}

#[test]
fn lock_matching_uses_the_refreshed_image_list() {
    // Tags can move between the seeding listing and lock matching, so the
    // scheduler must re-list images for the lock phase.
    let runtime = FakeRuntime::new(
        &[("img-a", &["app:1.0"]), ("img-b", &["app:candidate"])],
        &[],
    );

    let report = completed(run_pass(&runtime, config(1, 0, "app:candidate")));
    assert_eq!(report.removed, 1);
    assert_eq!(runtime.removed(), vec!["img-a"]);

    let listings = runtime
        .calls()
        .iter()
        .filter(|c| *c == "list_images")
        .count();
    assert_eq!(listings, 2, "lock matching must re-list images");
}

#[test]
fn no_lock_refresh_when_allowlist_is_empty() {
    let runtime = FakeRuntime::new(&[("img-a", &["app:1.0"])], &[]);

    completed(run_pass(&runtime, config(1, 0, "")));
    let listings = runtime
        .calls()
        .iter()
        .filter(|c| *c == "list_images")
        .count();
    assert_eq!(listings, 1);
}

#[test]
fn untagged_image_cannot_be_locked() {
    let runtime = FakeRuntime::new(&[("img-a", &[] as &[&str])], &[]);

    let report = completed(run_pass(&runtime, config(1, 0, "app")));
    assert_eq!(report.removed, 1);
    assert_eq!(runtime.removed(), vec!["img-a"]);
}

// ──────────────────── failure scenarios ────────────────────

#[test]
fn inspect_failure_aborts_the_batch_before_any_removal() {
    let runtime = FakeRuntime::new(
        &[("img-a", &["app:1.0"]), ("img-b", &["other:2.0"])],
        &[("c1", "img-a"), ("c2", "img-a")],
    );
    runtime.with(|s| {
        s.inspect_failures.insert("c2".to_string());
    });

    let outcome = run_pass(&runtime, config(2, 5, ""));
    let PassOutcome::Retry { phase, backoff } = outcome else {
        panic!("expected retry outcome");
    };
    assert_eq!(phase, "usage-initial");
    // Early-phase failure backs off by interval + grace.
    assert_eq!(backoff, Duration::from_secs(7));
    assert!(runtime.removed().is_empty());
    assert!(
        !runtime.calls().iter().any(|c| c.starts_with("remove:")),
        "no removal may happen after a failed usage resolution"
    );
}

#[test]
fn enumeration_failure_after_grace_backs_off_by_interval_only() {
    let runtime = FakeRuntime::new(&[("img-a", &["app:1.0"])], &[]);
    runtime.with(|s| s.fail_list_containers_on_call = Some(2));

    let outcome = run_pass(&runtime, config(2, 5, ""));
    let PassOutcome::Retry { phase, backoff } = outcome else {
        panic!("expected retry outcome");
    };
    assert_eq!(phase, "usage-final");
    assert_eq!(backoff, Duration::from_secs(2));
    assert!(runtime.removed().is_empty());
}

#[test]
fn removal_failure_does_not_abort_remaining_deletions() {
    let runtime = FakeRuntime::new(
        &[
            ("img-a", &["a:1"]),
            ("img-b", &["b:1"]),
            ("img-c", &["c:1"]),
        ],
        &[],
    );
    runtime.with(|s| {
        s.remove_failures.insert("img-b".to_string());
    });

    let report = completed(run_pass(&runtime, config(1, 0, "")));
    assert_eq!(report.removed, 2);
    assert_eq!(report.failed, 1);
    let mut removed = runtime.removed();
    removed.sort();
    assert_eq!(removed, vec!["img-a", "img-c"]);
}

#[test]
fn retried_pass_recomputes_candidates_from_scratch() {
    let runtime = FakeRuntime::new(&[("img-a", &["app:1.0"])], &[("c1", "img-a")]);
    runtime.with(|s| {
        s.inspect_failures.insert("c1".to_string());
    });

    let outcome = run_pass(&runtime, config(1, 0, ""));
    assert!(matches!(outcome, PassOutcome::Retry { .. }));

    // The failure clears; the next pass must list images again rather than
    // reuse stale candidates.
    runtime.with(|s| s.inspect_failures.clear());
    let report = completed(run_pass(&runtime, config(1, 0, "")));
    assert_eq!(report.removed, 0); // c1 still holds img-a
    let listings = runtime
        .calls()
        .iter()
        .filter(|c| *c == "list_images")
        .count();
    assert_eq!(listings, 2, "each pass starts from a fresh image listing");
}

// ──────────────────── ordering invariants ────────────────────

#[test]
fn deletion_happens_strictly_after_both_usage_checks() {
    let runtime = FakeRuntime::new(&[("img-a", &["app:1.0"])], &[("c1", "img-x")]);

    completed(run_pass(&runtime, config(1, 0, "")));

    let calls = runtime.calls();
    let last_list = calls
        .iter()
        .rposition(|c| c == "list_containers")
        .expect("containers listed");
    let first_remove = calls
        .iter()
        .position(|c| c.starts_with("remove:"))
        .expect("removal issued");
    assert!(
        last_list < first_remove,
        "final usage check must precede deletion: {calls:?}"
    );
    assert_eq!(
        calls.iter().filter(|c| *c == "list_containers").count(),
        2,
        "usage is resolved once before and once after the grace period"
    );
}
