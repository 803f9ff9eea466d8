//! Lock matcher: the operator allowlist that exempts images from deletion.
//!
//! Two pattern forms, decided by the presence of a `:` in the trimmed entry:
//! - `repo:tag` — exact match against a repo-tag string.
//! - `repo` — repository prefix: protects every tag of that repository
//!   (matches any repo-tag starting with `repo:`).
//!
//! Patterns are cheap to parse and are re-parsed each pass from the raw
//! config string. Matching always runs against a freshly listed image set,
//! since tags can move between the seeding snapshot and the locking step.

use crate::runtime::ImageRecord;
use crate::sweep::candidates::CandidateSet;

/// One parsed allowlist entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockPattern {
    /// `repo:tag` — must equal the repo-tag string exactly.
    Exact(String),
    /// Bare `repo` — any tag of this repository is protected.
    Repository(String),
}

impl LockPattern {
    /// Parse a single entry. Surrounding whitespace is trimmed; entries that
    /// trim to the empty string (stray commas) are skipped.
    #[must_use]
    pub fn parse(entry: &str) -> Option<Self> {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.contains(':') {
            Some(Self::Exact(trimmed.to_string()))
        } else {
            Some(Self::Repository(trimmed.to_string()))
        }
    }

    /// Parse a comma-separated allowlist string.
    #[must_use]
    pub fn parse_list(raw: &str) -> Vec<Self> {
        raw.split(',').filter_map(Self::parse).collect()
    }

    /// Whether this pattern protects the given repo-tag string.
    #[must_use]
    pub fn matches(&self, repo_tag: &str) -> bool {
        match self {
            Self::Exact(pat) => repo_tag == pat,
            Self::Repository(repo) => {
                repo_tag.len() > repo.len()
                    && repo_tag.starts_with(repo.as_str())
                    && repo_tag.as_bytes()[repo.len()] == b':'
            }
        }
    }
}

/// Whether any repo-tag of `image` matches any pattern.
#[must_use]
pub fn is_locked(image: &ImageRecord, patterns: &[LockPattern]) -> bool {
    image
        .repo_tags
        .iter()
        .any(|rt| patterns.iter().any(|p| p.matches(rt)))
}

/// Exclude every image whose repo-tags match any pattern from the candidate
/// set. `images` must be a fresh listing taken at lock time.
pub fn apply_locks(set: &mut CandidateSet, patterns: &[LockPattern], images: &[ImageRecord]) {
    if patterns.is_empty() {
        return;
    }
    for image in images {
        if is_locked(image, patterns) {
            set.exclude(&image.id);
        }
    }
}
