//! Candidate set: the per-pass map of image id → removable flag.
//!
//! Built fresh at the start of every pass and discarded at the end; no
//! candidate information survives a pass. Exclusions (usage or lock) only
//! ever clear the flag — nothing within a pass sets it back, which is what
//! lets phase-1 usage marks, lock marks, and phase-2 usage marks accumulate
//! on the same set.

use std::collections::HashMap;

/// Per-pass map of image id → removable flag.
#[derive(Debug, Default)]
pub struct CandidateSet {
    flags: HashMap<String, bool>,
}

impl CandidateSet {
    /// Seed from an image snapshot: every image starts removable.
    pub fn seed<I, S>(image_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            flags: image_ids.into_iter().map(|id| (id.into(), true)).collect(),
        }
    }

    /// Mark an image not removable. Ids not in the set are ignored (the
    /// image appeared after seeding; it was never a candidate).
    pub fn exclude(&mut self, image_id: &str) {
        if let Some(flag) = self.flags.get_mut(image_id) {
            *flag = false;
        }
    }

    /// Whether an image is still flagged removable.
    #[must_use]
    pub fn is_removable(&self, image_id: &str) -> bool {
        self.flags.get(image_id).copied().unwrap_or(false)
    }

    /// Ids still flagged removable, in arbitrary order.
    #[must_use]
    pub fn removable_ids(&self) -> Vec<String> {
        self.flags
            .iter()
            .filter(|&(_, &removable)| removable)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Number of seeded images.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Whether the set holds no images at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Number of ids still flagged removable.
    #[must_use]
    pub fn removable_count(&self) -> usize {
        self.flags.values().filter(|&&removable| removable).count()
    }
}
