//! Accumulated run output and its metadata.
//!
//! The checkpoint only grows: `push` is the sole mutator and keeps
//! `meta.count` equal to the number of items. Id uniqueness is enforced by the
//! driver's skip logic, not here.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::hit::EnrichedHit;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointMeta {
    pub generated_at: DateTime<Utc>,
    pub count: usize,
    #[serde(default)]
    pub error_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub items: Vec<EnrichedHit>,
    pub meta: CheckpointMeta,
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self::empty()
    }
}

impl Checkpoint {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            meta: CheckpointMeta {
                generated_at: Utc::now(),
                count: 0,
                error_count: 0,
            },
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, item: EnrichedHit) {
        self.items.push(item);
        self.meta.count = self.items.len();
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = EnrichedHit>) {
        self.items.extend(items);
        self.meta.count = self.items.len();
    }

    /// Ids already present, used to skip work on resume.
    pub fn processed_ids(&self) -> HashSet<String> {
        self.items.iter().map(|item| item.id.clone()).collect()
    }

    /// Refresh run metadata right before a save.
    pub fn stamp(&mut self, error_count: usize) {
        self.meta.generated_at = Utc::now();
        self.meta.count = self.items.len();
        self.meta.error_count = error_count;
    }

    /// Structural consistency of a checkpoint read back from disk.
    pub fn is_consistent(&self) -> bool {
        self.meta.count == self.items.len()
    }
}
